//! # Plugin Host SDK
//!
//! The abstract platform-service traits the plugin execution runtime
//! consumes (`platform`), their default in-process implementations
//! (`cache_backend`'s memory/Redis cache), the capability error type shims
//! map into, and shared wire-format helpers (`common::duration_serde`) used
//! by both this crate and `pluginhost-runtime`.
//!
//! A real deployment supplies its own `Cache`/`Storage`/`VectorStore`/
//! `LlmProxy`/`Analytics`/`EventBus` implementations (a Redis cluster, an
//! object store, a hosted vector database, a real model provider) and hands
//! them to the runtime as a `PlatformBundle`; this crate only defines the
//! seam and ships the one concrete adapter (`MemoryOrRedisCache`) simple
//! enough to need no external service to exist.
//!
//! ## License
//!
//! This project is licensed under the MIT License - see the [LICENSE](LICENSE) file for details.

pub mod cache_backend;
pub mod common;
pub mod error;
pub mod platform;

pub use cache_backend::MemoryOrRedisCache;
pub use error::CapabilityError;
pub use platform::{
    Analytics, Cache as PlatformCache, ChatMessage, ChatOptions, ChatReply, Embeddings, EventBus,
    Logger, LlmProxy, PlatformBundle, Storage, VectorMatch, VectorRecord, VectorStore,
};

/// Result type for capability-trait operations.
pub type Result<T> = std::result::Result<T, CapabilityError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;

    #[tokio::test]
    async fn cache_set_then_get_roundtrips() {
        let cache = MemoryOrRedisCache::new(None, Duration::from_secs(30), 16);
        cache.set("ns:key", Value::from("value"), None).await.unwrap();
        assert_eq!(cache.get("ns:key").await.unwrap(), Some(Value::from("value")));
    }

    #[test]
    fn platform_bundle_defaults_to_empty() {
        let bundle = PlatformBundle::default();
        assert!(bundle.cache.is_none());
        assert!(bundle.llm.is_none());
    }
}
