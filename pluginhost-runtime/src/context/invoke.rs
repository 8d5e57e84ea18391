//! # Cross-Plugin Invoke Shim (§4.8)
//!
//! Invoking another plugin's handler is permission-gated by `invoke.allow`/
//! `invoke.deny` and depth-guarded by `Descriptor::for_invoke_call`
//! (`MAX_INVOCATION_DEPTH`, §3). The actual dispatch is delegated back to
//! whatever owns the full plugin registry (the runner) through the
//! `PluginInvoker` seam, so this module never has to know about the runner
//! directly — it only builds the call, checks the grant, and forwards.

use async_trait::async_trait;
use serde_json::Value;

use crate::descriptor::Descriptor;
use crate::error::RuntimeError;
use crate::permissions::PermissionSpec;

use super::CapabilityContext;

#[async_trait]
pub trait PluginInvoker: Send + Sync {
    async fn invoke(
        &self,
        descriptor: Descriptor,
        handler_ref: &str,
        input: Value,
    ) -> Result<Value, RuntimeError>;

    fn permissions_for(&self, plugin_id: &str) -> Option<PermissionSpec>;
}

/// `target` is a `pluginId:METHOD /path`-style pattern candidate, matched
/// against `invoke.allow`/`invoke.deny` (§6).
pub async fn call(
    ctx: &CapabilityContext,
    target_plugin_id: &str,
    handler_ref: &str,
    input: Value,
) -> Result<Value, RuntimeError> {
    if !ctx.matcher.can_invoke(target_plugin_id) {
        return Err(ctx.permission_denied(format!("add \"{target_plugin_id}\" to invoke.allow")));
    }
    let invoker = ctx.broker_invoker()?;
    let callee_permissions = invoker
        .permissions_for(target_plugin_id)
        .ok_or_else(|| RuntimeError::HandlerNotFound {
            handler_ref: format!("{target_plugin_id}:{handler_ref}"),
        })?;
    let callee_descriptor = ctx.descriptor.for_invoke_call(
        target_plugin_id.to_string(),
        "".to_string(),
        callee_permissions,
        uuid::Uuid::new_v4().to_string(),
    )?;
    invoker.invoke(callee_descriptor, handler_ref, input).await
}
