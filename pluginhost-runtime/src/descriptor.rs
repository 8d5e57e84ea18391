//! The value types that flow through the runner: the immutable per-invocation
//! descriptor, the request envelope, and the result envelope (§3, §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RuntimeError;
use crate::permissions::PermissionSpec;
use crate::trace::ExecutionMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostType {
    Cli,
    Rest,
    Ws,
    Workflow,
    Webhook,
    Job,
}

impl HostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Rest => "rest",
            Self::Ws => "ws",
            Self::Workflow => "workflow",
            Self::Webhook => "webhook",
            Self::Job => "job",
        }
    }
}

/// Maximum cross-plugin invocation depth before the runner refuses to start
/// the call (§9, recursion-bomb guard).
pub const MAX_INVOCATION_DEPTH: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub host_type: HostType,
    pub plugin_id: String,
    pub plugin_version: String,
    pub request_id: String,
    pub parent_request_id: Option<String>,
    pub tenant_id: Option<String>,
    pub invocation_depth: u32,
    pub cwd: String,
    pub outdir: Option<String>,
    pub permissions: PermissionSpec,
    pub host_context: Value,
}

impl Descriptor {
    /// Build the descriptor for a cross-plugin `invoke.call`, incrementing
    /// depth and refusing once it would exceed `MAX_INVOCATION_DEPTH`.
    pub fn for_invoke_call(
        &self,
        callee_plugin_id: String,
        callee_version: String,
        callee_permissions: PermissionSpec,
        request_id: String,
    ) -> Result<Descriptor, RuntimeError> {
        let depth = self.invocation_depth + 1;
        if depth > MAX_INVOCATION_DEPTH {
            return Err(RuntimeError::PermissionDenied {
                message: format!("invocation depth {depth} exceeds maximum {MAX_INVOCATION_DEPTH}"),
                hint: None,
            });
        }
        Ok(Descriptor {
            host_type: self.host_type,
            plugin_id: callee_plugin_id,
            plugin_version: callee_version,
            request_id,
            parent_request_id: Some(self.request_id.clone()),
            tenant_id: self.tenant_id.clone(),
            invocation_depth: depth,
            cwd: self.cwd.clone(),
            outdir: self.outdir.clone(),
            permissions: callee_permissions,
            host_context: self.host_context.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub execution_id: String,
    pub descriptor: Descriptor,
    pub plugin_root: String,
    pub handler_ref: String,
    pub input: Value,
    pub workspace: WorkspaceSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkspaceSpec {
    Local,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvocationResult {
    pub ok: bool,
    pub data: Option<Value>,
    pub error: Option<ResultError>,
    pub execution_time_ms: u64,
    pub metadata: ExecutionMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultError {
    pub code: String,
    pub message: String,
    pub name: Option<String>,
    pub stack: Option<String>,
}

impl From<RuntimeError> for ResultError {
    fn from(err: RuntimeError) -> Self {
        let (name, stack) = match &err {
            RuntimeError::HandlerError { name, stack, .. } => (name.clone(), stack.clone()),
            _ => (None, None),
        };
        ResultError {
            code: err.code().to_string(),
            message: err.to_string(),
            name,
            stack,
        }
    }
}
