//! # Platform-Service Proxy (§4.2.4 / §4.3)
//!
//! Wraps each `pluginhost_sdk::platform` service behind the invocation's
//! grant: an ungranted service is simply absent from the plugin's view, and
//! a scoped grant restricts the namespace/key prefix a call may touch (§4.3
//! governance). This is the "capability governance" layer the teacher's
//! `gateway_caching`/provider clients never needed, since a gateway serves
//! one tenant's request at a time rather than mediating many plugins
//! sharing the same backing services.

use std::time::Duration;

use pluginhost_sdk::{ChatMessage, ChatOptions, ChatReply, VectorMatch, VectorRecord};
use serde_json::Value;

use crate::error::RuntimeError;

use super::CapabilityContext;

fn denied(ctx: &CapabilityContext, service: &str) -> RuntimeError {
    ctx.permission_denied(format!("grant platform.{service}"))
}

pub async fn cache_get(ctx: &CapabilityContext, key: &str) -> Result<Option<Value>, RuntimeError> {
    if !ctx.matcher.cache_grant().allows_prefix(key) {
        return Err(denied(ctx, "cache"));
    }
    let cache = ctx.platform.cache.as_ref().ok_or_else(|| denied(ctx, "cache"))?;
    cache.get(key).await.map_err(|e| RuntimeError::UnknownError { message: e.to_string() })
}

pub async fn cache_set(
    ctx: &CapabilityContext,
    key: &str,
    value: Value,
    ttl: Option<Duration>,
) -> Result<(), RuntimeError> {
    if !ctx.matcher.cache_grant().allows_prefix(key) {
        return Err(denied(ctx, "cache"));
    }
    let cache = ctx.platform.cache.as_ref().ok_or_else(|| denied(ctx, "cache"))?;
    cache.set(key, value, ttl).await.map_err(|e| RuntimeError::UnknownError { message: e.to_string() })
}

pub async fn cache_clear(ctx: &CapabilityContext) -> Result<(), RuntimeError> {
    if !ctx.matcher.cache_grant().is_unrestricted() {
        return Err(denied(ctx, "cache (unrestricted required to clear)"));
    }
    let cache = ctx.platform.cache.as_ref().ok_or_else(|| denied(ctx, "cache"))?;
    cache.clear().await.map_err(|e| RuntimeError::UnknownError { message: e.to_string() })
}

pub async fn storage_read(ctx: &CapabilityContext, path: &str) -> Result<Vec<u8>, RuntimeError> {
    if !ctx.matcher.storage_grant().allows_prefix(path) {
        return Err(denied(ctx, "storage"));
    }
    let storage = ctx.platform.storage.as_ref().ok_or_else(|| denied(ctx, "storage"))?;
    storage.read(path).await.map_err(|e| RuntimeError::UnknownError { message: e.to_string() })
}

pub async fn storage_write(ctx: &CapabilityContext, path: &str, data: Vec<u8>) -> Result<(), RuntimeError> {
    if !ctx.matcher.storage_grant().allows_prefix(path) {
        return Err(denied(ctx, "storage"));
    }
    let storage = ctx.platform.storage.as_ref().ok_or_else(|| denied(ctx, "storage"))?;
    storage.write(path, data).await.map_err(|e| RuntimeError::UnknownError { message: e.to_string() })
}

/// §4.3: IDs are prefixed with the validated namespace before reaching the
/// backing store, since `VectorStore` has no native per-tenant isolation
/// beyond the `namespace` string it's handed.
pub async fn vector_upsert(
    ctx: &CapabilityContext,
    namespace: &str,
    records: Vec<VectorRecord>,
) -> Result<(), RuntimeError> {
    if !ctx.matcher.vector_store_grant().allows_prefix(namespace) {
        return Err(denied(ctx, "vectorStore"));
    }
    let store = ctx.platform.vector_store.as_ref().ok_or_else(|| denied(ctx, "vectorStore"))?;
    let prefixed = records
        .into_iter()
        .map(|mut r| {
            r.id = format!("{namespace}{}", r.id);
            r
        })
        .collect();
    store
        .upsert(namespace, prefixed)
        .await
        .map_err(|e| RuntimeError::UnknownError { message: e.to_string() })
}

/// §4.3: results are filtered to IDs within the validated namespace and the
/// prefix is stripped back off before the handler sees them.
pub async fn vector_query(
    ctx: &CapabilityContext,
    namespace: &str,
    vector: Vec<f32>,
    top_k: usize,
) -> Result<Vec<VectorMatch>, RuntimeError> {
    if !ctx.matcher.vector_store_grant().allows_prefix(namespace) {
        return Err(denied(ctx, "vectorStore"));
    }
    let store = ctx.platform.vector_store.as_ref().ok_or_else(|| denied(ctx, "vectorStore"))?;
    let matches = store
        .query(namespace, vector, top_k)
        .await
        .map_err(|e| RuntimeError::UnknownError { message: e.to_string() })?;
    Ok(matches
        .into_iter()
        .filter_map(|mut m| {
            m.id = m.id.strip_prefix(namespace)?.to_string();
            Some(m)
        })
        .collect())
}

pub async fn llm_chat(
    ctx: &CapabilityContext,
    messages: Vec<ChatMessage>,
    options: ChatOptions,
) -> Result<ChatReply, RuntimeError> {
    if !ctx.matcher.llm_grant().is_granted() {
        return Err(denied(ctx, "llm"));
    }
    let llm = ctx.platform.llm.as_ref().ok_or_else(|| denied(ctx, "llm"))?;
    llm.chat(messages, options)
        .await
        .map_err(|e| RuntimeError::UnknownError { message: e.to_string() })
}

pub fn analytics_track(ctx: &CapabilityContext, event: &str, properties: &std::collections::HashMap<String, Value>) {
    if !ctx.matcher.spec.platform.analytics.is_granted() {
        return;
    }
    if let Some(analytics) = &ctx.platform.analytics {
        analytics.track(event, properties);
    }
}
