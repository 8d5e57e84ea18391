//! # Runtime Error Taxonomy
//!
//! The closed set of error codes the execution runtime can fail an
//! invocation with. Every failure path — permission gates, the invocation
//! runner, both execution backends, the IPC boundary, and the job broker —
//! normalizes into one of these variants before it reaches a caller.
//!
//! Pool-level and job-broker failures map onto HTTP status codes for the
//! optional admin surface (`QUEUE_FULL` → 429, `ACQUIRE_TIMEOUT` /
//! `WORKER_UNHEALTHY` → 503, `WORKER_CRASHED` → 500, `PERMISSION_DENIED` →
//! 403); everything else normalizes to 500 with its code preserved in the
//! body so a caller can branch on it directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// The closed error taxonomy. Every variant carries a stable `code()` string
/// that crosses the subprocess IPC boundary unchanged; unknown codes
/// received from a worker collapse to `UnknownError`.
#[derive(Debug, thiserror::Error, Clone)]
pub enum RuntimeError {
    #[error("execution exceeded its deadline")]
    Timeout,

    #[error("invocation was cancelled")]
    Aborted,

    #[error("permission denied: {message}")]
    PermissionDenied {
        message: String,
        /// Remediation hint, e.g. "add <path> to fs.write allow".
        hint: Option<String>,
    },

    #[error("handler not found: {handler_ref}")]
    HandlerNotFound { handler_ref: String },

    #[error("handler does not expose execute: {handler_ref}")]
    HandlerContractError { handler_ref: String },

    #[error("handler error: {message}")]
    HandlerError {
        message: String,
        name: Option<String>,
        code: Option<String>,
        stack: Option<String>,
    },

    #[error("workspace error: {message}")]
    WorkspaceError { message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("queue full: {current}/{limit}")]
    QueueFull { current: usize, limit: usize },

    #[error("no worker became available within {timeout_ms}ms")]
    AcquireTimeout { timeout_ms: u64 },

    #[error("worker {worker_id} crashed")]
    WorkerCrashed { worker_id: String },

    #[error("worker {worker_id} failed health check")]
    WorkerUnhealthy { worker_id: String },

    #[error("job permission denied: {message}")]
    JobPermissionDenied { message: String },

    #[error("job handler invalid: {handler_ref}")]
    JobHandlerInvalid { handler_ref: String },

    #[error("job quota exceeded: {window}s window, {current}/{limit}, resets at {reset_at}")]
    JobQuotaExceeded {
        limit: u64,
        current: u64,
        window: u64,
        reset_at: i64,
    },

    #[error("job timeout {requested_ms}ms exceeds maximum {max_ms}ms")]
    JobTimeoutExceeded { requested_ms: u64, max_ms: u64 },

    #[error("job timeout {requested_ms}ms below minimum {min_ms}ms")]
    JobTimeoutBelowMin { requested_ms: u64, min_ms: u64 },

    #[error("job interval {requested_ms}ms exceeds maximum {max_ms}ms")]
    JobIntervalExceeded { requested_ms: u64, max_ms: u64 },

    #[error("job interval {requested_ms}ms below minimum {min_ms}ms")]
    JobIntervalBelowMin { requested_ms: u64, min_ms: u64 },

    #[error("invalid schedule expression: {expression}")]
    JobScheduleInvalid { expression: String },

    #[error("job submission rejected, system is in {state} state")]
    JobSubmitRejectedDegraded { state: String },

    #[error("job execution failed: {message}")]
    JobExecutionFailed { message: String },

    #[error("job {job_id} timed out")]
    JobTimeout { job_id: String },

    #[error("job {job_id} cancelled")]
    JobCancelled { job_id: String },

    #[error("unknown error: {message}")]
    UnknownError { message: String },
}

impl RuntimeError {
    /// The stable code carried across the IPC boundary and surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::Aborted => "ABORTED",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::HandlerNotFound { .. } => "HANDLER_NOT_FOUND",
            Self::HandlerContractError { .. } => "HANDLER_CONTRACT_ERROR",
            Self::HandlerError { .. } => "HANDLER_ERROR",
            Self::WorkspaceError { .. } => "WORKSPACE_ERROR",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::QueueFull { .. } => "QUEUE_FULL",
            Self::AcquireTimeout { .. } => "ACQUIRE_TIMEOUT",
            Self::WorkerCrashed { .. } => "WORKER_CRASHED",
            Self::WorkerUnhealthy { .. } => "WORKER_UNHEALTHY",
            Self::JobPermissionDenied { .. } => "JOB_PERMISSION_DENIED",
            Self::JobHandlerInvalid { .. } => "JOB_HANDLER_INVALID",
            Self::JobQuotaExceeded { .. } => "JOB_QUOTA_EXCEEDED",
            Self::JobTimeoutExceeded { .. } => "JOB_TIMEOUT_EXCEEDED",
            Self::JobTimeoutBelowMin { .. } => "JOB_TIMEOUT_BELOW_MIN",
            Self::JobIntervalExceeded { .. } => "JOB_INTERVAL_EXCEEDED",
            Self::JobIntervalBelowMin { .. } => "JOB_INTERVAL_BELOW_MIN",
            Self::JobScheduleInvalid { .. } => "JOB_SCHEDULE_INVALID",
            Self::JobSubmitRejectedDegraded { .. } => "JOB_SUBMIT_REJECTED_DEGRADED",
            Self::JobExecutionFailed { .. } => "JOB_EXECUTION_FAILED",
            Self::JobTimeout { .. } => "JOB_TIMEOUT",
            Self::JobCancelled { .. } => "JOB_CANCELLED",
            Self::UnknownError { .. } => "UNKNOWN_ERROR",
        }
    }

    pub fn permission_denied(message: impl Into<String>, hint: Option<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
            hint,
        }
    }

    /// Build a `RuntimeError` from a code rehydrated across the IPC boundary.
    /// Unknown codes collapse to `UnknownError`, per §7's propagation policy.
    pub fn from_wire(code: &str, message: String) -> Self {
        match code {
            "TIMEOUT" => Self::Timeout,
            "ABORTED" => Self::Aborted,
            "PERMISSION_DENIED" => Self::PermissionDenied {
                message,
                hint: None,
            },
            "WORKSPACE_ERROR" => Self::WorkspaceError { message },
            "VALIDATION_ERROR" => Self::ValidationError { message },
            _ => Self::UnknownError { message },
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::PermissionDenied { .. }
            | Self::JobPermissionDenied { .. }
            | Self::JobHandlerInvalid { .. } => StatusCode::FORBIDDEN,
            Self::HandlerNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ValidationError { .. }
            | Self::JobScheduleInvalid { .. }
            | Self::JobTimeoutExceeded { .. }
            | Self::JobTimeoutBelowMin { .. }
            | Self::JobIntervalExceeded { .. }
            | Self::JobIntervalBelowMin { .. } => StatusCode::BAD_REQUEST,
            Self::QueueFull { .. } | Self::JobQuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::AcquireTimeout { .. }
            | Self::WorkerUnhealthy { .. }
            | Self::JobSubmitRejectedDegraded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Aborted => StatusCode::CONFLICT,
            Self::Timeout | Self::JobTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    hint: Option<String>,
}

impl IntoResponse for RuntimeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let hint = match &self {
            Self::PermissionDenied { hint, .. } => hint.clone(),
            _ => None,
        };
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            hint,
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(RuntimeError::Timeout.code(), "TIMEOUT");
        assert_eq!(
            RuntimeError::WorkerCrashed { worker_id: "3".to_string() }.code(),
            "WORKER_CRASHED"
        );
    }

    #[test]
    fn unknown_wire_code_collapses() {
        let err = RuntimeError::from_wire("SOMETHING_NEW", "oops".into());
        assert_eq!(err.code(), "UNKNOWN_ERROR");
    }

    #[test]
    fn status_mapping_matches_spec() {
        assert_eq!(
            RuntimeError::QueueFull { current: 5, limit: 5 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            RuntimeError::AcquireTimeout { timeout_ms: 100 }.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RuntimeError::WorkerCrashed { worker_id: "1".to_string() }.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
