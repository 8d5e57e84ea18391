//! # Job Broker (§4.7)
//!
//! Owns everything a submitted-or-scheduled job passes through before it
//! reaches an `ExecutionBackend`: the `jobs.submit`/`jobs.schedule`
//! permission gate, the per-handler `QuotaTracker`, timeout/interval
//! validation against the plugin's declared limits, and the
//! `DegradationGate`. It also implements `PluginInvoker`, so a handler's
//! `invoke.call` (§4.8) and a scheduled job both end up dispatching through
//! the same backend without the capability context needing to know the
//! difference.

use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::backend::ExecutionBackend;
use crate::context::invoke::PluginInvoker;
use crate::descriptor::Descriptor;
use crate::error::RuntimeError;
use crate::permissions::{PermissionMatcher, PermissionSpec};
use crate::plugin::PluginRegistry;
use crate::runner::DEFAULT_INVOCATION_TIMEOUT;

use super::cron;
use super::degradation::{DegradationGate, DegradationState};
use super::job::{Job, JobStatus, JobSubmission, ScheduleSpec, ScheduledJob};
use super::quota::QuotaTracker;

pub struct JobBroker {
    backend: Arc<dyn ExecutionBackend>,
    registry: Arc<RwLock<PluginRegistry>>,
    quotas: QuotaTracker,
    degradation: DegradationGate,
    queue: Mutex<BinaryHeap<Job>>,
    scheduled: Mutex<Vec<ScheduledJob>>,
}

impl JobBroker {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        registry: Arc<RwLock<PluginRegistry>>,
        scheduler_config: crate::config::SchedulerConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            quotas: QuotaTracker::new(),
            degradation: DegradationGate::new(scheduler_config),
            queue: Mutex::new(BinaryHeap::new()),
            scheduled: Mutex::new(Vec::new()),
        }
    }

    async fn matcher_for(&self, plugin_id: &str) -> Result<PermissionMatcher, RuntimeError> {
        let registry = self.registry.read().await;
        let manifest = registry
            .manifest(plugin_id)
            .ok_or_else(|| RuntimeError::HandlerNotFound {
                handler_ref: plugin_id.to_string(),
            })?;
        Ok(PermissionMatcher::compile(manifest.permissions.clone()))
    }

    fn check_timeout_limits(
        matcher: &PermissionMatcher,
        requested_ms: u64,
    ) -> Result<(), RuntimeError> {
        if let Some(limits) = &matcher.spec.jobs.submit.timeout_limits {
            if requested_ms > limits.max {
                return Err(RuntimeError::JobTimeoutExceeded {
                    requested_ms,
                    max_ms: limits.max,
                });
            }
            if requested_ms < limits.min {
                return Err(RuntimeError::JobTimeoutBelowMin {
                    requested_ms,
                    min_ms: limits.min,
                });
            }
        }
        Ok(())
    }

    fn check_interval_limits(
        matcher: &PermissionMatcher,
        requested_ms: u64,
    ) -> Result<(), RuntimeError> {
        if let Some(limits) = &matcher.spec.jobs.schedule.interval_limits {
            if requested_ms > limits.max {
                return Err(RuntimeError::JobIntervalExceeded {
                    requested_ms,
                    max_ms: limits.max,
                });
            }
            if requested_ms < limits.min {
                return Err(RuntimeError::JobIntervalBelowMin {
                    requested_ms,
                    min_ms: limits.min,
                });
            }
        }
        Ok(())
    }

    /// Submit a one-off job (§4.7 submit path): permission check, quota
    /// check, timeout-limit validation, degradation gate, then enqueue.
    pub async fn submit(&self, plugin_id: &str, submission: JobSubmission) -> Result<Job, RuntimeError> {
        let matcher = self.matcher_for(plugin_id).await?;
        if !matcher.can_submit_job(&submission.handler_ref) {
            return Err(RuntimeError::JobPermissionDenied {
                message: format!("plugin '{plugin_id}' may not submit jobs for {}", submission.handler_ref),
            });
        }
        self.quotas
            .check_and_increment(plugin_id, &submission.handler_ref, &matcher.spec.jobs.submit.quotas)?;
        Self::check_timeout_limits(&matcher, submission.timeout_ms)?;

        if let Some(delay) = self.degradation.gate_submit().await? {
            tokio::time::sleep(delay).await;
        }

        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            submission,
            status: JobStatus::Queued,
            submitted_at: chrono::Utc::now(),
        };
        self.queue.lock().await.push(job.clone());
        Ok(job)
    }

    /// Register a recurring schedule (§4.7 schedule path, §6 grammar).
    pub async fn schedule(
        &self,
        plugin_id: &str,
        handler_ref: String,
        schedule: ScheduleSpec,
        input: Value,
        timeout_ms: u64,
    ) -> Result<ScheduledJob, RuntimeError> {
        let matcher = self.matcher_for(plugin_id).await?;
        if !matcher.can_schedule_job(&handler_ref) {
            return Err(RuntimeError::JobPermissionDenied {
                message: format!("plugin '{plugin_id}' may not schedule jobs for {handler_ref}"),
            });
        }
        self.quotas
            .check_and_increment(plugin_id, &handler_ref, &matcher.spec.jobs.schedule.quotas)?;
        Self::check_timeout_limits(&matcher, timeout_ms)?;
        if let ScheduleSpec::Interval { literal } = &schedule {
            let ms = cron::parse_interval(literal)?.as_millis() as u64;
            Self::check_interval_limits(&matcher, ms)?;
        }
        let next_run_at = cron::next_run_after(&schedule, chrono::Utc::now())?;

        let scheduled_job = ScheduledJob {
            id: uuid::Uuid::new_v4().to_string(),
            plugin_id: plugin_id.to_string(),
            handler_ref,
            schedule,
            input,
            timeout_ms,
            next_run_at,
            enabled: true,
        };
        self.scheduled.lock().await.push(scheduled_job.clone());
        Ok(scheduled_job)
    }

    /// Pop and run the highest-priority queued job, if any.
    pub async fn run_next(&self) -> Option<crate::descriptor::InvocationResult> {
        let job = self.queue.lock().await.pop()?;
        let descriptor = self.descriptor_for(&job.submission.plugin_id).await.ok()?;
        Some(
            self.backend
                .execute(
                    descriptor,
                    job.submission.handler_ref,
                    job.submission.input,
                    Duration::from_millis(job.submission.timeout_ms),
                )
                .await,
        )
    }

    /// Advance every due scheduled job's `next_run_at` and run it.
    pub async fn tick(&self) {
        let due: Vec<ScheduledJob> = {
            let mut scheduled = self.scheduled.lock().await;
            let now = chrono::Utc::now();
            let mut due = Vec::new();
            for job in scheduled.iter_mut() {
                if job.enabled && job.next_run_at <= now {
                    due.push(job.clone());
                    if let Ok(next) = cron::next_run_after(&job.schedule, now) {
                        job.next_run_at = next;
                    }
                }
            }
            due
        };
        for job in due {
            if let Ok(descriptor) = self.descriptor_for(&job.plugin_id).await {
                let _ = self
                    .backend
                    .execute(
                        descriptor,
                        job.handler_ref,
                        job.input,
                        Duration::from_millis(job.timeout_ms),
                    )
                    .await;
            }
        }
    }

    /// Current queue depth, fed into the degradation gate by the runtime's
    /// periodic load-sampling task (§4.7) alongside a CPU reading.
    pub async fn queue_depth(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Feed a fresh load sample into the degradation gate. Exposed so the
    /// runtime can poll real load outside of this module's own tests.
    pub async fn sample_load(&self, cpu: f32, queue_depth: usize) -> DegradationState {
        self.degradation.sample(cpu, queue_depth).await
    }

    async fn descriptor_for(&self, plugin_id: &str) -> Result<Descriptor, RuntimeError> {
        let registry = self.registry.read().await;
        let manifest = registry
            .manifest(plugin_id)
            .ok_or_else(|| RuntimeError::HandlerNotFound {
                handler_ref: plugin_id.to_string(),
            })?;
        Ok(Descriptor {
            host_type: crate::descriptor::HostType::Job,
            plugin_id: manifest.id.clone(),
            plugin_version: manifest.version.clone(),
            request_id: uuid::Uuid::new_v4().to_string(),
            parent_request_id: None,
            tenant_id: None,
            invocation_depth: 0,
            cwd: ".".to_string(),
            outdir: None,
            permissions: manifest.permissions.clone(),
            host_context: Value::Null,
        })
    }
}

#[async_trait]
impl PluginInvoker for JobBroker {
    async fn invoke(
        &self,
        mut descriptor: Descriptor,
        handler_ref: &str,
        input: Value,
    ) -> Result<Value, RuntimeError> {
        let registry = self.registry.read().await;
        let manifest = registry
            .manifest(&descriptor.plugin_id)
            .ok_or_else(|| RuntimeError::HandlerNotFound {
                handler_ref: format!("{}:{handler_ref}", descriptor.plugin_id),
            })?;
        descriptor.plugin_version = manifest.version.clone();
        drop(registry);

        let result = self
            .backend
            .execute(descriptor, handler_ref.to_string(), input, DEFAULT_INVOCATION_TIMEOUT)
            .await;
        if result.ok {
            Ok(result.data.unwrap_or(Value::Null))
        } else {
            let error = result.error.expect("non-ok result carries an error");
            Err(RuntimeError::from_wire(&error.code, error.message))
        }
    }

    fn permissions_for(&self, plugin_id: &str) -> Option<PermissionSpec> {
        // `try_read` rather than an async lock: `PluginInvoker::permissions_for`
        // is a sync trait method (§4.8's seam predates this broker needing to
        // await), so a contended registry simply reports "unknown" for this
        // call rather than blocking.
        self.registry
            .try_read()
            .ok()
            .and_then(|r| r.manifest(plugin_id).map(|m| m.permissions.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::in_process::InProcessBackend;
    use crate::handler::FnHandler;
    use crate::plugin::{HandlerDescriptor, LoadedPlugin, PluginManifest};
    use crate::runner::Runner;
    use serde_json::json;

    async fn broker_with_echo(permissions: PermissionSpec) -> JobBroker {
        let manifest = PluginManifest {
            id: "demo".to_string(),
            version: "1.0.0".to_string(),
            permissions,
            handlers: vec![HandlerDescriptor {
                handler_ref: "echo".to_string(),
                kind: Default::default(),
            }],
        };
        let mut plugin = LoadedPlugin::new(manifest);
        plugin.register(
            "echo",
            Arc::new(FnHandler(|_ctx, input| async move { Ok(input) })),
        );
        let mut registry = PluginRegistry::new();
        registry.insert(plugin);
        let registry = Arc::new(RwLock::new(registry));
        let runner = Arc::new(Runner::new(registry.clone(), Arc::new(pluginhost_sdk::PlatformBundle::default()), None));
        let backend: Arc<dyn ExecutionBackend> = Arc::new(InProcessBackend::new(runner));
        JobBroker::new(backend, registry, default_scheduler_config())
    }

    fn default_scheduler_config() -> crate::config::SchedulerConfig {
        crate::config::SchedulerConfig {
            tick_interval: Duration::from_secs(1),
            timezone: "UTC".to_string(),
            degraded_delay_ms: 0,
            critical_delay_ms: 0,
            reject_on_critical: false,
            cpu_degraded_threshold: 0.70,
            cpu_critical_threshold: 0.90,
            cpu_return_to_normal_threshold: 0.55,
            queue_depth_degraded_threshold: 50,
            queue_depth_critical_threshold: 90,
            debounce_interval: Duration::from_millis(0),
        }
    }

    #[tokio::test]
    async fn submit_is_denied_without_a_jobs_submit_grant() {
        let broker = broker_with_echo(PermissionSpec::default()).await;
        let submission = JobSubmission {
            plugin_id: "demo".to_string(),
            handler_ref: "echo".to_string(),
            input: json!({}),
            timeout_ms: 1000,
            priority: 0,
        };
        let result = broker.submit("demo", submission).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn submit_and_run_round_trips_through_the_backend() {
        let mut permissions = PermissionSpec::default();
        permissions.jobs.submit.handlers = vec!["echo".to_string()];
        let broker = broker_with_echo(permissions).await;
        let submission = JobSubmission {
            plugin_id: "demo".to_string(),
            handler_ref: "echo".to_string(),
            input: json!({"x": 7}),
            timeout_ms: 1000,
            priority: 0,
        };
        broker.submit("demo", submission).await.unwrap();
        let result = broker.run_next().await.unwrap();
        assert!(result.ok);
    }

    #[tokio::test]
    async fn invoke_routes_through_the_backend_and_returns_its_data() {
        let mut permissions = PermissionSpec::default();
        permissions.jobs.submit.handlers = vec!["echo".to_string()];
        let broker = broker_with_echo(permissions).await;
        let descriptor = Descriptor {
            host_type: crate::descriptor::HostType::Cli,
            plugin_id: "demo".to_string(),
            plugin_version: String::new(),
            request_id: "r1".to_string(),
            parent_request_id: None,
            tenant_id: None,
            invocation_depth: 1,
            cwd: ".".to_string(),
            outdir: None,
            permissions: PermissionSpec::default(),
            host_context: Value::Null,
        };
        let result = broker.invoke(descriptor, "echo", json!({"y": 1})).await.unwrap();
        assert_eq!(result["y"], 1);
    }
}
