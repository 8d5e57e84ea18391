//! # Capability Context
//!
//! The object every handler call receives in place of ambient access: every
//! fs/fetch/env/platform/shell/state/artifacts/events/invoke call is gated by
//! the invocation's compiled `PermissionMatcher` (§4.2). Structurally this
//! generalizes the teacher's `plugins::mod` `PluginHooks`/`Plugin`
//! dispatch-by-variant pattern — there it dispatched a gateway plugin hook by
//! request phase; here it dispatches a capability call by shim, gated by a
//! permission check instead of always running.
//!
//! The LIFO cleanup stack (§3/§4.1) is the one piece of mutable state a
//! handler can add to: `register_cleanup` pushes a cleanup closure that the
//! runner drains in reverse order after the handler returns, each bounded by
//! a 5s default timeout.

pub mod artifacts;
pub mod env;
pub mod events;
pub mod fetch;
pub mod fs;
pub mod invoke;
pub mod platform;
pub mod shell;
pub mod state;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::context::invoke::PluginInvoker;
use crate::descriptor::Descriptor;
use crate::error::RuntimeError;
use crate::permissions::PermissionMatcher;
use crate::plugin::PluginRegistry;
use crate::scheduler::broker::JobBroker;
use crate::trace::TraceContext;
use pluginhost_sdk::PlatformBundle;

pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

type CleanupFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type CleanupFn = Box<dyn FnOnce() -> CleanupFuture + Send>;

/// Everything a handler is allowed to touch, assembled fresh for every
/// invocation by the runner.
pub struct CapabilityContext {
    pub descriptor: Descriptor,
    pub matcher: Arc<PermissionMatcher>,
    pub platform: Arc<PlatformBundle>,
    pub broker: Option<Arc<JobBroker>>,
    pub invoker: Option<Arc<dyn PluginInvoker>>,
    /// The plugin registry, needed only to resolve another plugin's artifact
    /// root for cross-plugin `artifacts.read` (§4.8). Not set by every
    /// construction site; absent just means cross-plugin reads aren't
    /// available in that context (e.g. a unit test with no registry).
    pub registry: Option<Arc<tokio::sync::RwLock<PluginRegistry>>>,
    pub trace: Mutex<TraceContext>,
    cleanup_stack: Mutex<Vec<CleanupFn>>,
}

impl CapabilityContext {
    pub fn new(
        descriptor: Descriptor,
        matcher: Arc<PermissionMatcher>,
        platform: Arc<PlatformBundle>,
        broker: Option<Arc<JobBroker>>,
    ) -> Self {
        let trace = TraceContext::new_root();
        Self {
            descriptor,
            matcher,
            platform,
            broker,
            invoker: None,
            registry: None,
            trace: Mutex::new(trace),
            cleanup_stack: Mutex::new(Vec::new()),
        }
    }

    pub fn with_invoker(mut self, invoker: Arc<dyn PluginInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn with_registry(mut self, registry: Arc<tokio::sync::RwLock<PluginRegistry>>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub(crate) fn broker_invoker(&self) -> Result<&Arc<dyn PluginInvoker>, RuntimeError> {
        self.invoker.as_ref().ok_or_else(|| RuntimeError::UnknownError {
            message: "no plugin invoker configured for cross-plugin calls".to_string(),
        })
    }

    /// Push a cleanup action onto the LIFO stack. Handlers call this after
    /// acquiring any resource (a temp file, a lock, a subprocess) that must
    /// be released even if a later step in the handler fails.
    pub async fn register_cleanup<F, Fut>(&self, cleanup: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: CleanupFn = Box::new(move || Box::pin(cleanup()));
        self.cleanup_stack.lock().await.push(boxed);
    }

    /// Drains the cleanup stack in LIFO order, bounding each entry by
    /// `DEFAULT_CLEANUP_TIMEOUT`. A cleanup that times out or panics is
    /// logged and does not block the remaining entries (§3 cleanup stack:
    /// best-effort, non-fatal).
    pub async fn run_cleanup_stack(&self) {
        let mut stack = self.cleanup_stack.lock().await;
        while let Some(cleanup) = stack.pop() {
            match tokio::time::timeout(DEFAULT_CLEANUP_TIMEOUT, cleanup()).await {
                Ok(()) => {}
                Err(_) => {
                    tracing::warn!(
                        plugin_id = %self.descriptor.plugin_id,
                        "cleanup action exceeded timeout, continuing"
                    );
                }
            }
        }
    }

    pub fn permission_denied(&self, hint: impl Into<String>) -> RuntimeError {
        RuntimeError::permission_denied(
            format!(
                "plugin '{}' lacks permission for this call",
                self.descriptor.plugin_id
            ),
            Some(hint.into()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PermissionSpec;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_descriptor() -> Descriptor {
        Descriptor {
            host_type: crate::descriptor::HostType::Cli,
            plugin_id: "demo".to_string(),
            plugin_version: "1.0.0".to_string(),
            request_id: "req-1".to_string(),
            parent_request_id: None,
            tenant_id: None,
            invocation_depth: 0,
            cwd: "/tmp".to_string(),
            outdir: None,
            permissions: PermissionSpec::default(),
            host_context: json!({}),
        }
    }

    #[tokio::test]
    async fn cleanup_stack_runs_in_lifo_order() {
        let ctx = CapabilityContext::new(
            test_descriptor(),
            Arc::new(PermissionMatcher::compile(PermissionSpec::default())),
            Arc::new(PlatformBundle::default()),
            None,
        );
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            ctx.register_cleanup(move || async move {
                order.lock().await.push(i);
            })
            .await;
        }
        ctx.run_cleanup_stack().await;
        assert_eq!(*order.lock().await, vec![2, 1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_cleanup_does_not_block_remaining_entries() {
        let ctx = CapabilityContext::new(
            test_descriptor(),
            Arc::new(PermissionMatcher::compile(PermissionSpec::default())),
            Arc::new(PlatformBundle::default()),
            None,
        );
        let ran = Arc::new(AtomicU32::new(0));
        let slow_ran = ran.clone();
        ctx.register_cleanup(move || async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            slow_ran.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        let fast_ran = ran.clone();
        ctx.register_cleanup(move || async move {
            fast_ran.fetch_add(10, Ordering::SeqCst);
        })
        .await;
        ctx.run_cleanup_stack().await;
        // The slow cleanup times out (never increments); the fast one runs.
        assert_eq!(ran.load(Ordering::SeqCst), 10);
    }
}
