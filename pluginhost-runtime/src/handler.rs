//! # Handler Trait
//!
//! Per §9's re-architecture note, dynamic module loading is replaced by a
//! compiled-in registry of `Handler` implementations keyed by `handlerRef`.
//! Structurally this mirrors the teacher's `Plugin` trait in
//! `plugins::mod` (async `execute`, `Send + Sync` object-safe).

use async_trait::async_trait;
use serde_json::Value;

use crate::context::CapabilityContext;
use crate::error::RuntimeError;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn execute(&self, ctx: &CapabilityContext, input: Value) -> Result<Value, RuntimeError>;
}

/// Adapts a plain async function into a `Handler`, for handlers that don't
/// need their own struct.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(&CapabilityContext, Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, RuntimeError>> + Send,
{
    async fn execute(&self, ctx: &CapabilityContext, input: Value) -> Result<Value, RuntimeError> {
        (self.0)(ctx, input).await
    }
}
