//! # Events Shim (§4.8)
//!
//! Publishing is gated by `events.produce` patterns and `maxPayloadBytes`;
//! consuming by `events.consume` patterns. `events.scopes` further restricts
//! which topic prefixes a plugin may touch at all, applied before the
//! produce/consume pattern check.

use serde_json::Value;

use crate::error::RuntimeError;

use super::CapabilityContext;

fn in_scope(ctx: &CapabilityContext, topic: &str) -> bool {
    let scopes = &ctx.matcher.spec.events.scopes;
    scopes.is_empty() || scopes.iter().any(|s| topic.starts_with(s.as_str()))
}

fn matches_patterns(patterns: &[String], topic: &str) -> bool {
    patterns
        .iter()
        .any(|p| glob::Pattern::new(p).map(|pat| pat.matches(topic)).unwrap_or(false))
}

pub async fn publish(ctx: &CapabilityContext, topic: &str, payload: Value) -> Result<(), RuntimeError> {
    if !in_scope(ctx, topic) || !matches_patterns(&ctx.matcher.spec.events.produce, topic) {
        return Err(ctx.permission_denied(format!("add \"{topic}\" to events.produce")));
    }
    if let Some(max) = ctx.matcher.spec.events.max_payload_bytes {
        let size = serde_json::to_vec(&payload)
            .map(|b| b.len())
            .unwrap_or(usize::MAX);
        if size > max {
            return Err(RuntimeError::ValidationError {
                message: format!("event payload {size} bytes exceeds maxPayloadBytes {max}"),
            });
        }
    }
    let bus = ctx
        .platform
        .event_bus
        .as_ref()
        .ok_or_else(|| RuntimeError::UnknownError {
            message: "no event bus configured".to_string(),
        })?;
    bus.publish(topic, payload)
        .await
        .map_err(|e| RuntimeError::UnknownError { message: e.to_string() })
}

pub fn can_consume(ctx: &CapabilityContext, topic: &str) -> bool {
    in_scope(ctx, topic) && matches_patterns(&ctx.matcher.spec.events.consume, topic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Descriptor, HostType};
    use crate::permissions::{EventsSpec, PermissionMatcher, PermissionSpec};
    use pluginhost_sdk::PlatformBundle;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx_with_events(spec: EventsSpec) -> CapabilityContext {
        let spec = PermissionSpec {
            events: spec,
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
    fn scope_restricts_topics_outside_prefix() {
        let ctx = ctx_with_events(EventsSpec {
            produce: vec!["jobs.*".to_string()],
            scopes: vec!["jobs.".to_string()],
            ..Default::default()
        });
        assert!(!in_scope(&ctx, "billing.charge"));
        assert!(in_scope(&ctx, "jobs.completed"));
    }

    #[tokio::test]
    async fn publish_denied_without_produce_grant() {
        let ctx = ctx_with_events(EventsSpec::default());
        let result = publish(&ctx, "jobs.completed", json!({})).await;
        assert!(result.is_err());
    }
}
