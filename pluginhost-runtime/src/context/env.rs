//! # Environment Shim (§4.2.3)
//!
//! Reading an ungranted variable never throws: it returns `None`, the same
//! as a missing variable, so a plugin cannot use env access to probe which
//! variables exist on the host.

use super::CapabilityContext;

pub fn read(ctx: &CapabilityContext, name: &str) -> Option<String> {
    if !ctx.matcher.can_read_env(name) {
        return None;
    }
    std::env::var(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Descriptor, HostType};
    use crate::permissions::{EnvironmentSpec, PermissionMatcher, PermissionSpec};
    use pluginhost_sdk::PlatformBundle;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx_with_env(read: &[&str]) -> CapabilityContext {
        let spec = PermissionSpec {
            environment: EnvironmentSpec {
                read: read.iter().map(|s| s.to_string()).collect(),
            },
            ..Default::default()
        };
        CapabilityContext::new(
            Descriptor {
                host_type: HostType::Cli,
                plugin_id: "demo".to_string(),
                plugin_version: "1.0.0".to_string(),
                request_id: "r1".to_string(),
                parent_request_id: None,
                tenant_id: None,
                invocation_depth: 0,
                cwd: "/tmp".to_string(),
                outdir: None,
                permissions: spec.clone(),
                host_context: json!({}),
            },
            Arc::new(PermissionMatcher::compile(spec)),
            Arc::new(PlatformBundle::default()),
            None,
        )
    }

    #[test]
    fn ungranted_read_returns_none_not_error() {
        std::env::set_var("PLUGINHOST_TEST_SECRET", "top-secret");
        let ctx = ctx_with_env(&[]);
        assert_eq!(read(&ctx, "PLUGINHOST_TEST_SECRET"), None);
        std::env::remove_var("PLUGINHOST_TEST_SECRET");
    }

    #[test]
    fn granted_read_returns_value() {
        std::env::set_var("PLUGINHOST_TEST_VISIBLE", "hello");
        let ctx = ctx_with_env(&["PLUGINHOST_TEST_VISIBLE"]);
        assert_eq!(read(&ctx, "PLUGINHOST_TEST_VISIBLE"), Some("hello".to_string()));
        std::env::remove_var("PLUGINHOST_TEST_VISIBLE");
    }
}
