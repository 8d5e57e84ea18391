//! # Invocation Runner (§4.1)
//!
//! The single entry point every execution backend calls through: resolve the
//! handler, build the capability context, run the handler under a deadline,
//! drain the cleanup stack, inject execution metadata, and normalize
//! whatever came back into an `InvocationResult`. Structurally this plays
//! the role the teacher's request-handling pipeline in `handlers::mod` plays
//! for an HTTP request — compose pre/post steps around a single dispatch
//! point — generalized from "route an LLM chat request" to "run one
//! plugin handler to completion."

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;

use crate::context::invoke::PluginInvoker;
use crate::context::CapabilityContext;
use crate::descriptor::{Descriptor, InvocationResult, ResultError};
use crate::error::RuntimeError;
use crate::metrics;
use crate::permissions::PermissionMatcher;
use crate::plugin::PluginRegistry;
use crate::trace::ExecutionMetadata;
use pluginhost_sdk::PlatformBundle;

pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Runner {
    pub registry: Arc<tokio::sync::RwLock<PluginRegistry>>,
    pub platform: Arc<PlatformBundle>,
    pub invoker: Option<Arc<dyn PluginInvoker>>,
}

impl Runner {
    pub fn new(
        registry: Arc<tokio::sync::RwLock<PluginRegistry>>,
        platform: Arc<PlatformBundle>,
        invoker: Option<Arc<dyn PluginInvoker>>,
    ) -> Self {
        Self {
            registry,
            platform,
            invoker,
        }
    }

    /// Run `handler_ref` under `descriptor`, enforcing `timeout` as the
    /// execution deadline (§4.1 step 4). Never panics: handler panics are
    /// not caught here (that's the execution backend's job — in-process
    /// backends run inside `tokio::task::spawn` which converts a panic into
    /// a `JoinError`, worker-pool backends run in a separate process
    /// entirely), but every `Result` path is normalized into
    /// `InvocationResult`.
    pub async fn run(
        &self,
        descriptor: Descriptor,
        handler_ref: String,
        input: Value,
        timeout: Duration,
    ) -> InvocationResult {
        let started = Instant::now();
        let plugin_id = descriptor.plugin_id.clone();
        let handler_id = handler_ref.clone();
        let host = descriptor.host_type.as_str().to_string();
        let tenant_id = descriptor.tenant_id.clone();
        let request_id = descriptor.request_id.clone();
        let plugin_version = descriptor.plugin_version.clone();

        let outcome = self.run_inner(descriptor, &handler_ref, input, timeout).await;
        let duration = started.elapsed();

        let ok = outcome.is_ok();
        metrics::record_invocation(&plugin_id, &handler_id, duration, ok).await;

        let metadata = ExecutionMetadata {
            executed_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            plugin_id,
            plugin_version,
            handler_id,
            host,
            tenant_id,
            request_id,
        };

        match outcome {
            Ok(data) => InvocationResult {
                ok: true,
                data: Some(data),
                error: None,
                execution_time_ms: duration.as_millis() as u64,
                metadata,
            },
            Err(err) => InvocationResult {
                ok: false,
                data: None,
                error: Some(ResultError::from(err)),
                execution_time_ms: duration.as_millis() as u64,
                metadata,
            },
        }
    }

    async fn run_inner(
        &self,
        descriptor: Descriptor,
        handler_ref: &str,
        input: Value,
        timeout: Duration,
    ) -> Result<Value, RuntimeError> {
        let registry = self.registry.read().await;
        let loaded = registry
            .get(&descriptor.plugin_id)
            .ok_or_else(|| RuntimeError::HandlerNotFound {
                handler_ref: handler_ref.to_string(),
            })?;
        let handler = loaded
            .resolve(handler_ref)
            .ok_or_else(|| RuntimeError::HandlerNotFound {
                handler_ref: handler_ref.to_string(),
            })?;
        drop(registry);

        let matcher = Arc::new(PermissionMatcher::compile(descriptor.permissions.clone()));
        let mut ctx = CapabilityContext::new(descriptor, matcher, self.platform.clone(), None)
            .with_registry(self.registry.clone());
        if let Some(invoker) = &self.invoker {
            ctx = ctx.with_invoker(invoker.clone());
        }

        let result = tokio::time::timeout(timeout, handler.execute(&ctx, input)).await;
        ctx.run_cleanup_stack().await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(RuntimeError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::HostType;
    use crate::handler::FnHandler;
    use crate::permissions::PermissionSpec;
    use crate::plugin::{HandlerDescriptor, LoadedPlugin, PluginManifest};
    use serde_json::json;

    fn test_descriptor() -> Descriptor {
        Descriptor {
            host_type: HostType::Cli,
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

    async fn registry_with_echo() -> Arc<tokio::sync::RwLock<PluginRegistry>> {
        let manifest = PluginManifest {
            id: "demo".to_string(),
            version: "1.0.0".to_string(),
            permissions: PermissionSpec::default(),
            handlers: vec![HandlerDescriptor {
                handler_ref: "echo".to_string(),
                kind: Default::default(),
            }],
        };
        let mut plugin = LoadedPlugin::new(manifest);
        plugin.register(
            "echo",
            Arc::new(FnHandler(|_ctx, input| async move { Ok(input) })),
        );
        let mut registry = PluginRegistry::new();
        registry.insert(plugin);
        Arc::new(tokio::sync::RwLock::new(registry))
    }

    #[tokio::test]
    async fn successful_handler_returns_ok_with_metadata() {
        let runner = Runner::new(registry_with_echo().await, Arc::new(PlatformBundle::default()), None);
        let result = runner
            .run(test_descriptor(), "echo".to_string(), json!({"x": 1}), Duration::from_secs(1))
            .await;
        assert!(result.ok);
        assert_eq!(result.metadata.plugin_id, "demo");
        let data = result.data.unwrap();
        assert_eq!(data["x"], 1);
        assert!(data.get("meta").is_none());
    }

    #[tokio::test]
    async fn missing_handler_is_not_found() {
        let runner = Runner::new(registry_with_echo().await, Arc::new(PlatformBundle::default()), None);
        let result = runner
            .run(test_descriptor(), "missing".to_string(), json!({}), Duration::from_secs(1))
            .await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().code, "HANDLER_NOT_FOUND");
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let manifest = PluginManifest {
            id: "demo".to_string(),
            version: "1.0.0".to_string(),
            permissions: PermissionSpec::default(),
            handlers: vec![],
        };
        let mut plugin = LoadedPlugin::new(manifest);
        plugin.register(
            "slow",
            Arc::new(FnHandler(|_ctx, _input| async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(json!({}))
            })),
        );
        let mut registry = PluginRegistry::new();
        registry.insert(plugin);
        let runner = Runner::new(
            Arc::new(tokio::sync::RwLock::new(registry)),
            Arc::new(PlatformBundle::default()),
            None,
        );
        let result = runner
            .run(test_descriptor(), "slow".to_string(), json!({}), Duration::from_millis(10))
            .await;
        assert!(!result.ok);
        assert_eq!(result.error.unwrap().code, "TIMEOUT");
    }
}
