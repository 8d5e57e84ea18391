//! # Execution Backends (§4.4, §4.5)
//!
//! Two interchangeable ways to run a handler: in-process (direct call
//! through the `Runner`, §4.4) and worker-pool (subprocess isolation over
//! IPC, §4.5). Both implement `ExecutionBackend` so the job broker and the
//! host-facing dispatch layer don't need to know which one is active.

pub mod in_process;
pub mod worker_pool;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::descriptor::{Descriptor, InvocationResult};

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute(
        &self,
        descriptor: Descriptor,
        handler_ref: String,
        input: Value,
        timeout: Duration,
    ) -> InvocationResult;
}
