//! # Error Handling Utilities ("Root-Cause" layer)
//!
//! Ambient error-context and retry plumbing shared by every module, the same
//! shape as the teacher's `error_handling` module: an `ErrorContext` builder,
//! an `ErrorSeverity` scale, a `retry_with_backoff` helper, and `ResultExt`/
//! `OptionExt` extension traits — now converting into `RuntimeError` instead
//! of a gateway-specific error enum.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::RuntimeError;

/// Coarse severity used to decide logging level and whether an operation is
/// worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Which subsystem produced the error, used to pick the `RuntimeError`
/// variant in `log_and_convert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Config,
    Permission,
    Handler,
    Workspace,
    Worker,
    Job,
    Internal,
}

#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub module: String,
    pub operation: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: Option<String>,
    pub tenant_id: Option<String>,
    pub severity: ErrorSeverity,
}

impl ErrorContext {
    pub fn new(module: &str, operation: &str, details: &str) -> Self {
        Self {
            module: module.to_string(),
            operation: operation.to_string(),
            details: details.to_string(),
            timestamp: Utc::now(),
            request_id: None,
            tenant_id: None,
            severity: ErrorSeverity::Medium,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn format(&self) -> String {
        format!(
            "[{}::{}] {} (request_id={:?}, tenant_id={:?}, severity={:?})",
            self.module, self.operation, self.details, self.request_id, self.tenant_id, self.severity
        )
    }

    pub fn is_critical(&self) -> bool {
        self.severity == ErrorSeverity::Critical
    }

    pub fn should_retry(&self) -> bool {
        matches!(self.severity, ErrorSeverity::Low | ErrorSeverity::Medium)
    }
}

pub struct ErrorHandler;

impl ErrorHandler {
    /// Run a synchronous closure, converting any `anyhow::Error` into a
    /// `RuntimeError` tagged by `error_type`, logging at a level derived from
    /// the subsystem.
    pub fn handle_sync_operation<T, F>(
        operation: F,
        context: &str,
        error_type: ErrorType,
    ) -> Result<T, RuntimeError>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        operation().map_err(|e| Self::log_and_convert(e, context, error_type))
    }

    pub async fn handle_async_operation<T, F, Fut>(
        operation: F,
        context: &str,
        error_type: ErrorType,
    ) -> Result<T, RuntimeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        operation()
            .await
            .map_err(|e| Self::log_and_convert(e, context, error_type))
    }

    pub fn log_and_convert(error: anyhow::Error, context: &str, error_type: ErrorType) -> RuntimeError {
        let message = error.to_string();
        match error_type {
            ErrorType::Config | ErrorType::Internal => {
                tracing::error!(context, error = %message, "internal error");
                RuntimeError::UnknownError { message }
            }
            ErrorType::Permission => {
                tracing::warn!(context, error = %message, "permission denied");
                RuntimeError::PermissionDenied { message, hint: None }
            }
            ErrorType::Handler => {
                tracing::warn!(context, error = %message, "handler error");
                RuntimeError::HandlerError {
                    message,
                    name: None,
                    code: None,
                    stack: None,
                }
            }
            ErrorType::Workspace => {
                tracing::error!(context, error = %message, "workspace error");
                RuntimeError::WorkspaceError { message }
            }
            ErrorType::Worker => {
                tracing::error!(context, error = %message, "worker error");
                RuntimeError::UnknownError { message }
            }
            ErrorType::Job => {
                tracing::warn!(context, error = %message, "job execution failed");
                RuntimeError::JobExecutionFailed { message }
            }
        }
    }

    pub fn require_some<T>(value: Option<T>, context: &str) -> Result<T, RuntimeError> {
        value.ok_or_else(|| {
            tracing::warn!(context, "required value missing");
            RuntimeError::ValidationError {
                message: format!("{context}: required value missing"),
            }
        })
    }

    pub fn validate_range<T: PartialOrd + std::fmt::Display>(
        value: T,
        min: T,
        max: T,
        field: &str,
    ) -> Result<(), RuntimeError> {
        if value < min || value > max {
            return Err(RuntimeError::ValidationError {
                message: format!("{field} must be between {min} and {max}, got {value}"),
            });
        }
        Ok(())
    }
}

/// Retries `operation` up to `max_retries` times with exponential backoff
/// (capped at 30s between attempts), logging each failed attempt, matching
/// the teacher's `retry_with_backoff`.
pub async fn retry_with_backoff<T, E, F, Fut>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
    context: ErrorContext,
) -> Result<T, RuntimeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = initial_delay;
    let mut last_error = String::new();

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_error = err.to_string();
                if attempt < max_retries {
                    tracing::warn!(
                        attempt,
                        max_retries,
                        error = %last_error,
                        context = %context.format(),
                        "operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                } else {
                    tracing::error!(
                        attempts = max_retries + 1,
                        error = %last_error,
                        context = %context.format(),
                        "operation failed after all retries"
                    );
                }
            }
        }
    }

    Err(RuntimeError::UnknownError { message: last_error })
}

pub trait ResultExt<T> {
    fn with_runtime_context(self, context: &str) -> Result<T, RuntimeError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn with_runtime_context(self, context: &str) -> Result<T, RuntimeError> {
        self.map_err(|e| {
            let message = format!("{context}: {e}");
            tracing::error!(context, error = %e, "operation failed");
            RuntimeError::UnknownError { message }
        })
    }
}

pub trait OptionExt<T> {
    fn ok_or_runtime_error(self, context: &str) -> Result<T, RuntimeError>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_runtime_error(self, context: &str) -> Result<T, RuntimeError> {
        self.ok_or_else(|| RuntimeError::ValidationError {
            message: format!("{context}: missing value"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn error_context_formats_with_fields() {
        let ctx = ErrorContext::new("scheduler", "submit", "queue full")
            .with_request_id("req-1")
            .with_severity(ErrorSeverity::High);
        assert!(ctx.format().contains("scheduler::submit"));
        assert!(!ctx.is_critical());
        assert!(!ctx.should_retry());
    }

    #[test]
    fn validate_range_rejects_out_of_bounds() {
        assert!(ErrorHandler::validate_range(5, 1, 10, "x").is_ok());
        assert!(ErrorHandler::validate_range(50, 1, 10, "x").is_err());
    }

    #[test]
    fn result_ext_wraps_with_context() {
        let result: Result<u32, &str> = Err("boom");
        let wrapped = result.with_runtime_context("loading manifest");
        assert!(wrapped.is_err());
    }

    #[test]
    fn option_ext_converts_none() {
        let value: Option<u32> = None;
        assert!(value.ok_or_runtime_error("plugin id").is_err());
    }

    #[tokio::test]
    async fn retry_with_backoff_succeeds_eventually() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let result: Result<u32, RuntimeError> = retry_with_backoff(
            move || {
                let attempts = attempts_clone.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            },
            5,
            Duration::from_millis(1),
            ErrorContext::new("test", "retry", "flaky op"),
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
