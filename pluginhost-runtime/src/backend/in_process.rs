//! # In-Process Backend (§4.4)
//!
//! Runs the handler directly through the shared `Runner`, no subprocess
//! isolation. This is the trust-boundary-light path: suitable for a CLI host
//! or first-party handlers, not for untrusted plugin code (that's what the
//! worker-pool backend is for). Rolling execution-time stats are served by
//! the shared `metrics` module rather than kept locally, so both backends
//! report through the same snapshot API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::descriptor::{Descriptor, InvocationResult};
use crate::runner::Runner;

use super::ExecutionBackend;

pub struct InProcessBackend {
    runner: Arc<Runner>,
}

impl InProcessBackend {
    pub fn new(runner: Arc<Runner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ExecutionBackend for InProcessBackend {
    async fn execute(
        &self,
        descriptor: Descriptor,
        handler_ref: String,
        input: Value,
        timeout: Duration,
    ) -> InvocationResult {
        self.runner.run(descriptor, handler_ref, input, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::HostType;
    use crate::handler::FnHandler;
    use crate::permissions::PermissionSpec;
    use crate::plugin::{LoadedPlugin, PluginManifest, PluginRegistry};
    use pluginhost_sdk::PlatformBundle;
    use serde_json::json;
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn dispatches_through_shared_runner() {
        let manifest = PluginManifest {
            id: "demo".to_string(),
            version: "1.0.0".to_string(),
            permissions: PermissionSpec::default(),
            handlers: vec![],
        };
        let mut plugin = LoadedPlugin::new(manifest);
        plugin.register("echo", Arc::new(FnHandler(|_ctx, input| async move { Ok(input) })));
        let mut registry = PluginRegistry::new();
        registry.insert(plugin);

        let runner = Arc::new(Runner::new(
            Arc::new(RwLock::new(registry)),
            Arc::new(PlatformBundle::default()),
            None,
        ));
        let backend = InProcessBackend::new(runner);

        let descriptor = Descriptor {
            host_type: HostType::Cli,
            plugin_id: "demo".to_string(),
            plugin_version: "1.0.0".to_string(),
            request_id: "r1".to_string(),
            parent_request_id: None,
            tenant_id: None,
            invocation_depth: 0,
            cwd: "/tmp".to_string(),
            outdir: None,
            permissions: PermissionSpec::default(),
            host_context: json!({}),
        };
        let result = backend
            .execute(descriptor, "echo".to_string(), json!({"y": 2}), Duration::from_secs(1))
            .await;
        assert!(result.ok);
    }
}
