//! # Platform-Service Traits
//!
//! The abstract capability interfaces the execution core consumes, per
//! SPEC_FULL.md §1/§4.3. Concrete implementations (a real LLM provider, a
//! real vector database) are explicitly out of scope for the core; this
//! module only defines the seam. The default `Cache` implementation ships
//! here because the runner needs *some* working cache to pass its own tests,
//! mirroring the teacher's `CacheManager` (Memory/Redis dual backend).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CapabilityError;

#[async_trait]
pub trait Logger: Send + Sync {
    fn info(&self, message: &str, fields: &HashMap<String, Value>);
    fn warn(&self, message: &str, fields: &HashMap<String, Value>);
    fn error(&self, message: &str, fields: &HashMap<String, Value>);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub content: String,
    pub model: String,
}

#[async_trait]
pub trait LlmProxy: Send + Sync {
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> Result<ChatReply, CapabilityError>;
}

#[async_trait]
pub trait Embeddings: Send + Sync {
    async fn embed(&self, input: Vec<String>, model: Option<String>) -> Result<Vec<Vec<f32>>, CapabilityError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Value,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<(), CapabilityError>;
    async fn query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, CapabilityError>;
    /// Best-effort global count, not namespace-filtered (Open Question #2 in
    /// DESIGN.md).
    async fn count(&self) -> Result<u64, CapabilityError>;
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CapabilityError>;
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CapabilityError>;
    async fn delete(&self, key: &str) -> Result<(), CapabilityError>;
    async fn incr(&self, key: &str, by: i64, ttl: Duration) -> Result<i64, CapabilityError>;
    /// Requires the unrestricted grant at the call site (Open Question #1).
    async fn clear(&self) -> Result<(), CapabilityError>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>, CapabilityError>;
    async fn write(&self, path: &str, data: Vec<u8>) -> Result<(), CapabilityError>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>, CapabilityError>;
    async fn delete(&self, path: &str) -> Result<(), CapabilityError>;
}

#[async_trait]
pub trait Analytics: Send + Sync {
    fn track(&self, event: &str, properties: &HashMap<String, Value>);
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), CapabilityError>;
}

/// The full bundle of platform services a plugin may be handed, each
/// optional depending on what the manifest declares and the permission spec
/// grants (§4.2.4). The context builder wraps each `Some` with its namespace
/// check before exposing it to the handler.
pub struct PlatformBundle {
    pub logger: Option<std::sync::Arc<dyn Logger>>,
    pub llm: Option<std::sync::Arc<dyn LlmProxy>>,
    pub embeddings: Option<std::sync::Arc<dyn Embeddings>>,
    pub vector_store: Option<std::sync::Arc<dyn VectorStore>>,
    pub cache: Option<std::sync::Arc<dyn Cache>>,
    pub storage: Option<std::sync::Arc<dyn Storage>>,
    pub analytics: Option<std::sync::Arc<dyn Analytics>>,
    pub event_bus: Option<std::sync::Arc<dyn EventBus>>,
}

impl Default for PlatformBundle {
    fn default() -> Self {
        Self {
            logger: None,
            llm: None,
            embeddings: None,
            vector_store: None,
            cache: None,
            storage: None,
            analytics: None,
            event_bus: None,
        }
    }
}
