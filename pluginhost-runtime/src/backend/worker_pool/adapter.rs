//! # Adapter-Call Dispatch (§4.6)
//!
//! Satisfies a worker subprocess's `adapter-call` message against the host's
//! own `PlatformBundle`, through the same permission-governed shims
//! in-process handlers use (`context::platform`). A worker never holds the
//! platform services itself — only the host does — so every cache/storage/
//! vectorStore/llm/analytics call a worker-pool plugin makes is proxied back
//! over the wire to here, and the result relayed as an `adapter-response`.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::context::platform as shim;
use crate::context::CapabilityContext;
use crate::error::RuntimeError;
use pluginhost_sdk::{ChatMessage, ChatOptions, VectorRecord};

pub async fn dispatch(
    ctx: &CapabilityContext,
    adapter: &str,
    method: &str,
    args: Value,
) -> Result<Value, RuntimeError> {
    match (adapter, method) {
        ("cache", "get") => {
            let key = field_str(&args, "key")?;
            let value = shim::cache_get(ctx, &key).await?;
            Ok(serde_json::json!({ "value": value }))
        }
        ("cache", "set") => {
            let key = field_str(&args, "key")?;
            let value = args.get("value").cloned().unwrap_or(Value::Null);
            let ttl = args
                .get("ttlMs")
                .and_then(Value::as_u64)
                .map(Duration::from_millis);
            shim::cache_set(ctx, &key, value, ttl).await?;
            Ok(Value::Null)
        }
        ("cache", "clear") => {
            shim::cache_clear(ctx).await?;
            Ok(Value::Null)
        }
        ("storage", "read") => {
            let path = field_str(&args, "path")?;
            let data = shim::storage_read(ctx, &path).await?;
            Ok(serde_json::json!({ "data": data }))
        }
        ("storage", "write") => {
            let path = field_str(&args, "path")?;
            let data: Vec<u8> = from_field(&args, "data")?;
            shim::storage_write(ctx, &path, data).await?;
            Ok(Value::Null)
        }
        ("vectorStore", "upsert") => {
            let namespace = field_str(&args, "namespace")?;
            let records: Vec<VectorRecord> = from_field(&args, "records")?;
            shim::vector_upsert(ctx, &namespace, records).await?;
            Ok(Value::Null)
        }
        ("vectorStore", "query") => {
            let namespace = field_str(&args, "namespace")?;
            let vector: Vec<f32> = from_field(&args, "vector")?;
            let top_k = args.get("topK").and_then(Value::as_u64).unwrap_or(10) as usize;
            let matches = shim::vector_query(ctx, &namespace, vector, top_k).await?;
            serde_json::to_value(matches).map_err(|e| RuntimeError::UnknownError { message: e.to_string() })
        }
        ("llm", "chat") => {
            let messages: Vec<ChatMessage> = from_field(&args, "messages")?;
            let options: ChatOptions = match args.get("options") {
                Some(v) => serde_json::from_value(v.clone()).map_err(|e| RuntimeError::UnknownError {
                    message: format!("invalid chat options: {e}"),
                })?,
                None => ChatOptions::default(),
            };
            let reply = shim::llm_chat(ctx, messages, options).await?;
            Ok(serde_json::json!({ "content": reply.content, "model": reply.model }))
        }
        ("analytics", "track") => {
            let event = field_str(&args, "event")?;
            let properties: HashMap<String, Value> = match args.get("properties") {
                Some(v) => serde_json::from_value(v.clone()).map_err(|e| RuntimeError::UnknownError {
                    message: format!("invalid analytics properties: {e}"),
                })?,
                None => HashMap::new(),
            };
            shim::analytics_track(ctx, &event, &properties);
            Ok(Value::Null)
        }
        (other_adapter, other_method) => Err(RuntimeError::UnknownError {
            message: format!("unknown adapter call {other_adapter}.{other_method}"),
        }),
    }
}

fn field_str(args: &Value, name: &str) -> Result<String, RuntimeError> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RuntimeError::UnknownError {
            message: format!("adapter call missing required field {name}"),
        })
}

fn from_field<T: serde::de::DeserializeOwned>(args: &Value, name: &str) -> Result<T, RuntimeError> {
    let field = args.get(name).cloned().unwrap_or(Value::Array(Vec::new()));
    serde_json::from_value(field).map_err(|e| RuntimeError::UnknownError {
        message: format!("adapter call field {name} malformed: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Descriptor, HostType};
    use crate::permissions::{PermissionMatcher, PermissionSpec};
    use pluginhost_sdk::PlatformBundle;
    use std::sync::Arc;

    fn test_ctx(spec: PermissionSpec) -> CapabilityContext {
        let descriptor = Descriptor {
            host_type: HostType::Job,
            plugin_id: "demo".to_string(),
            plugin_version: "1.0.0".to_string(),
            request_id: "r1".to_string(),
            parent_request_id: None,
            tenant_id: None,
            invocation_depth: 0,
            cwd: ".".to_string(),
            outdir: None,
            permissions: PermissionSpec::default(),
            host_context: Value::Null,
        };
        CapabilityContext::new(
            descriptor,
            Arc::new(PermissionMatcher::compile(spec)),
            Arc::new(PlatformBundle::default()),
            None,
        )
    }

    #[tokio::test]
    async fn unknown_adapter_is_rejected() {
        let ctx = test_ctx(PermissionSpec::default());
        let err = dispatch(&ctx, "teleport", "go", Value::Null).await.unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownError { .. }));
    }

    #[tokio::test]
    async fn cache_get_without_grant_or_service_is_denied() {
        let ctx = test_ctx(PermissionSpec::default());
        let err = dispatch(&ctx, "cache", "get", serde_json::json!({ "key": "k" }))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::PermissionDenied { .. }));
    }
}
