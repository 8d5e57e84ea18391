//! # State Shim (§4.8)
//!
//! Thin key/value storage layered on the platform `cache` grant, namespaced
//! `tenantId:pluginId:key` so two plugins (or the same plugin under two
//! tenants) never collide, regardless of the raw key a handler passes in.

use std::time::Duration;

use serde_json::Value;

use crate::error::RuntimeError;

use super::CapabilityContext;

fn namespaced_key(ctx: &CapabilityContext, key: &str) -> String {
    format!(
        "{}:{}:{}",
        ctx.descriptor.tenant_id.as_deref().unwrap_or("_"),
        ctx.descriptor.plugin_id,
        key
    )
}

fn require_cache(ctx: &CapabilityContext) -> Result<&dyn pluginhost_sdk::PlatformCache, RuntimeError> {
    if !ctx.matcher.cache_grant().is_granted() {
        return Err(ctx.permission_denied("grant platform.cache"));
    }
    ctx.platform
        .cache
        .as_deref()
        .ok_or_else(|| RuntimeError::UnknownError {
            message: "no cache backend configured".to_string(),
        })
}

pub async fn get(ctx: &CapabilityContext, key: &str) -> Result<Option<Value>, RuntimeError> {
    let cache = require_cache(ctx)?;
    cache
        .get(&namespaced_key(ctx, key))
        .await
        .map_err(|e| RuntimeError::UnknownError { message: e.to_string() })
}

pub async fn set(
    ctx: &CapabilityContext,
    key: &str,
    value: Value,
    ttl: Option<Duration>,
) -> Result<(), RuntimeError> {
    let cache = require_cache(ctx)?;
    cache
        .set(&namespaced_key(ctx, key), value, ttl)
        .await
        .map_err(|e| RuntimeError::UnknownError { message: e.to_string() })
}

pub async fn delete(ctx: &CapabilityContext, key: &str) -> Result<(), RuntimeError> {
    let cache = require_cache(ctx)?;
    cache
        .delete(&namespaced_key(ctx, key))
        .await
        .map_err(|e| RuntimeError::UnknownError { message: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Descriptor, HostType};
    use crate::permissions::{PermissionMatcher, PermissionSpec, PlatformSpec};
    use pluginhost_sdk::PlatformBundle;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn key_is_namespaced_by_tenant_and_plugin() {
        let spec = PermissionSpec {
            platform: PlatformSpec::default(),
            ..Default::default()
        };
        let ctx = CapabilityContext::new(
            Descriptor {
                host_type: HostType::Cli,
                plugin_id: "demo".to_string(),
                plugin_version: "1.0.0".to_string(),
                request_id: "r1".to_string(),
                parent_request_id: None,
                tenant_id: Some("acme".to_string()),
                invocation_depth: 0,
                cwd: "/tmp".to_string(),
                outdir: None,
                permissions: spec.clone(),
                host_context: json!({}),
            },
            Arc::new(PermissionMatcher::compile(spec)),
            Arc::new(PlatformBundle::default()),
            None,
        );
        assert_eq!(namespaced_key(&ctx, "count"), "acme:demo:count");
    }
}
