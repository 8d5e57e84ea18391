//! # Worker-Pool Backend (§4.5)
//!
//! Runs handlers in isolated subprocess workers over the IPC framing in
//! `ipc.rs`. The pool itself owns acquire/release, queueing beyond
//! `max_queue_size` (`QUEUE_FULL`), acquire-timeout (`ACQUIRE_TIMEOUT`),
//! periodic health checks, and recycling a worker once it passes
//! `max_requests_per_worker` or `max_uptime_per_worker`. Grounded on the
//! teacher's connection-pool-shaped code in `gateway_caching`'s Redis
//! connection handling, generalized from "a reusable Redis connection" to
//! "a reusable subprocess."

pub mod adapter;
pub mod ipc;
pub mod worker;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};

use crate::config::WorkerPoolConfig;
use crate::context::CapabilityContext;
use crate::descriptor::{Descriptor, InvocationResult, ResultError};
use crate::error::RuntimeError;
use crate::permissions::PermissionMatcher;
use crate::plugin::PluginRegistry;
use crate::trace::ExecutionMetadata;
use pluginhost_sdk::PlatformBundle;

use self::worker::{Worker, WorkerState};

use super::ExecutionBackend;

pub struct WorkerPoolBackend {
    config: WorkerPoolConfig,
    command: String,
    args: Vec<String>,
    registry: Arc<tokio::sync::RwLock<PluginRegistry>>,
    platform: Arc<PlatformBundle>,
    workers: Mutex<Vec<Arc<Worker>>>,
    acquire_gate: Semaphore,
    queued: AtomicUsize,
    next_id: AtomicUsize,
}

impl WorkerPoolBackend {
    pub fn new(
        config: WorkerPoolConfig,
        command: String,
        args: Vec<String>,
        registry: Arc<tokio::sync::RwLock<PluginRegistry>>,
        platform: Arc<PlatformBundle>,
    ) -> Self {
        let max = config.max;
        Self {
            config,
            command,
            args,
            registry,
            platform,
            workers: Mutex::new(Vec::new()),
            acquire_gate: Semaphore::new(max),
            queued: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Compile the calling plugin's permissions into a `CapabilityContext` so
    /// the worker's reader task can satisfy `adapter_call` messages the same
    /// way the in-process backend's handlers would (§4.6). Falls back to the
    /// descriptor's own embedded permissions (e.g. a job broker invocation)
    /// when the plugin isn't in the registry.
    async fn context_for(&self, descriptor: Descriptor) -> Arc<CapabilityContext> {
        let spec = {
            let registry = self.registry.read().await;
            registry
                .manifest(&descriptor.plugin_id)
                .map(|m| m.permissions.clone())
                .unwrap_or_else(|| descriptor.permissions.clone())
        };
        let matcher = Arc::new(PermissionMatcher::compile(spec));
        Arc::new(
            CapabilityContext::new(descriptor, matcher, self.platform.clone(), None)
                .with_registry(self.registry.clone()),
        )
    }

    async fn spawn_worker(&self, cwd: &str) -> Result<Arc<Worker>, RuntimeError> {
        let id = format!("worker-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let (worker, _handlers) = Worker::spawn(
            id,
            &self.command,
            &self.args,
            cwd,
            self.config.startup_timeout,
        )
        .await?;
        Ok(Arc::new(worker))
    }

    /// Drop any worker the reader task marked crashed and hand its permit
    /// back, so a dead subprocess doesn't permanently shrink the pool.
    async fn prune_crashed(&self, workers: &mut Vec<Arc<Worker>>) {
        let mut i = 0;
        while i < workers.len() {
            if workers[i].state().await == WorkerState::Crashed {
                workers.remove(i);
                self.acquire_gate.add_permits(1);
            } else {
                i += 1;
            }
        }
    }

    /// §4.5 acquire algorithm: reuse an idle worker, else spawn up to `max`,
    /// else wait on the queue up to `acquire_timeout`, else give up.
    async fn acquire(&self, cwd: &str) -> Result<Arc<Worker>, RuntimeError> {
        {
            let mut workers = self.workers.lock().await;
            self.prune_crashed(&mut workers).await;
            for w in workers.iter() {
                if w.state().await == WorkerState::Idle {
                    return Ok(w.clone());
                }
            }
        }

        if self.queued.load(Ordering::SeqCst) >= self.config.max_queue_size {
            return Err(RuntimeError::QueueFull {
                current: self.queued.load(Ordering::SeqCst),
                limit: self.config.max_queue_size,
            });
        }
        self.queued.fetch_add(1, Ordering::SeqCst);

        let permit = tokio::time::timeout(self.config.acquire_timeout, self.acquire_gate.acquire()).await;
        self.queued.fetch_sub(1, Ordering::SeqCst);

        let permit = permit
            .map_err(|_| RuntimeError::AcquireTimeout {
                timeout_ms: self.config.acquire_timeout.as_millis() as u64,
            })?
            .map_err(|_| RuntimeError::UnknownError {
                message: "worker pool semaphore closed".to_string(),
            })?;

        let mut workers = self.workers.lock().await;
        self.prune_crashed(&mut workers).await;
        for w in workers.iter() {
            if w.state().await == WorkerState::Idle {
                // Reusing an existing worker, not spawning one: let `permit`
                // drop here and return its capacity to the semaphore instead
                // of forgetting it, or every reuse would leak a permit.
                return Ok(w.clone());
            }
        }
        // Spawning a new worker: this permit now represents its slot for the
        // rest of its life, returned via `add_permits` on recycle/eviction.
        permit.forget();
        let worker = self.spawn_worker(cwd).await?;
        workers.push(worker.clone());
        Ok(worker)
    }

    async fn maybe_recycle(&self, worker: &Arc<Worker>) {
        let exceeded_requests = worker.request_count() >= self.config.max_requests_per_worker;
        let exceeded_uptime = worker.uptime() >= self.config.max_uptime_per_worker;
        if exceeded_requests || exceeded_uptime {
            worker.shutdown(self.config.shutdown_grace).await;
            let mut workers = self.workers.lock().await;
            workers.retain(|w| !Arc::ptr_eq(w, worker));
            self.acquire_gate.add_permits(1);
        }
    }

    /// Pings every tracked worker, logging `WorkerUnhealthy` for any miss so
    /// the taxonomy entry corresponds to a real condition. A failed ping
    /// already leaves the worker `Crashed` (see `Worker::ping`); the next
    /// `acquire()` evicts it and replaces it on demand (§4.5, §6).
    pub async fn health_check(&self) -> Vec<(String, bool)> {
        let workers = self.workers.lock().await;
        let mut out = Vec::new();
        for w in workers.iter() {
            let healthy = w.ping(self.config.health_check_timeout).await;
            if !healthy {
                let err = RuntimeError::WorkerUnhealthy {
                    worker_id: w.id.clone(),
                };
                tracing::warn!(worker_id = %w.id, error = %err, "worker failed health check");
            }
            out.push((w.id.clone(), healthy));
        }
        out
    }

    /// Fraction of the pool currently busy, used as the load-sampling task's
    /// CPU reading (§4.7). The runtime has no OS-level CPU metrics dependency
    /// (see DESIGN.md); in-process worker utilization is the load signal it
    /// can actually observe.
    pub async fn utilization(&self) -> f32 {
        let workers = self.workers.lock().await;
        if self.config.max == 0 {
            return 0.0;
        }
        let mut busy = 0usize;
        for w in workers.iter() {
            if w.state().await == WorkerState::Busy {
                busy += 1;
            }
        }
        busy as f32 / self.config.max as f32
    }

    pub async fn shutdown_all(&self) {
        let workers = self.workers.lock().await;
        for w in workers.iter() {
            w.shutdown(self.config.shutdown_grace).await;
        }
    }

    /// Eagerly spawn workers per `config.warmup` before the pool serves its
    /// first request (§9 Open Question #3: `maxHandlers` falls back to
    /// `topN(pool.min)`). Called once from `main.rs` at startup.
    pub async fn warmup(&self, cwd: &str) -> Result<(), RuntimeError> {
        let target = match &self.config.warmup {
            crate::config::WarmupMode::None => 0,
            crate::config::WarmupMode::TopN { n } => *n,
            crate::config::WarmupMode::MaxHandlers => self.config.min,
        };

        let mut workers = self.workers.lock().await;
        while workers.len() < target {
            let permit = self.acquire_gate.acquire().await.map_err(|_| RuntimeError::UnknownError {
                message: "worker pool semaphore closed".to_string(),
            })?;
            let worker = self.spawn_worker(cwd).await?;
            permit.forget();
            workers.push(worker);
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionBackend for WorkerPoolBackend {
    async fn execute(
        &self,
        descriptor: Descriptor,
        handler_ref: String,
        input: Value,
        timeout: Duration,
    ) -> InvocationResult {
        let started = std::time::Instant::now();
        let plugin_id = descriptor.plugin_id.clone();
        let plugin_version = descriptor.plugin_version.clone();
        let host = descriptor.host_type.as_str().to_string();
        let tenant_id = descriptor.tenant_id.clone();
        let request_id = descriptor.request_id.clone();
        let cwd = descriptor.cwd.clone();

        let outcome = async {
            let worker = self.acquire(&cwd).await?;
            let ctx = self.context_for(descriptor).await;
            let result = worker.call(ctx, handler_ref.clone(), input, timeout).await;
            self.maybe_recycle(&worker).await;
            result
        }
        .await;

        let duration = started.elapsed();
        crate::metrics::record_invocation(&plugin_id, &handler_ref, duration, outcome.is_ok()).await;

        let metadata = ExecutionMetadata {
            executed_at: chrono::Utc::now(),
            duration_ms: duration.as_millis() as u64,
            plugin_id,
            plugin_version,
            handler_id: handler_ref,
            host,
            tenant_id,
            request_id,
        };

        match outcome {
            Ok(data) => InvocationResult {
                ok: true,
                data: Some(data),
                error: None,
                execution_time_ms: duration.as_millis() as u64,
                metadata,
            },
            Err(err) => InvocationResult {
                ok: false,
                data: None,
                error: Some(ResultError::from(err)),
                execution_time_ms: duration.as_millis() as u64,
                metadata,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_starts_with_empty_worker_set() {
        let pool = WorkerPoolBackend::new(
            WorkerPoolConfig {
                min: 0,
                max: 2,
                max_requests_per_worker: 10,
                max_uptime_per_worker: Duration::from_secs(60),
                max_queue_size: 5,
                acquire_timeout: Duration::from_millis(100),
                max_concurrent_per_plugin: None,
                health_check_interval: Duration::from_secs(5),
                health_check_timeout: Duration::from_secs(1),
                startup_timeout: Duration::from_secs(1),
                shutdown_grace: Duration::from_secs(1),
                warmup: crate::config::WarmupMode::None,
            },
            "true".to_string(),
            vec![],
            Arc::new(tokio::sync::RwLock::new(PluginRegistry::new())),
            Arc::new(PlatformBundle::default()),
        );
        assert_eq!(pool.queued.load(Ordering::SeqCst), 0);
    }
}
