//! # Worker Process (§4.5)
//!
//! One spawned subprocess plus the bookkeeping the pool needs to decide when
//! to recycle it: request count, uptime, and last-known health. The worker
//! state machine (`stopped -> starting -> idle -> busy -> draining ->
//! stopped`) lives in `WorkerState`; `mod.rs`'s pool owns the transitions,
//! this module only exposes the primitives (`spawn`, `call`, `ping`,
//! `shutdown`) each transition needs.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};

use crate::context::CapabilityContext;
use crate::descriptor::Descriptor;
use crate::error::RuntimeError;

use super::adapter;
use super::ipc::{HostMessage, IpcReader, IpcWriter, PendingMap, WorkerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Starting,
    Idle,
    Busy,
    Draining,
    /// The reader task hit an unrecoverable IPC error (malformed frame, dead
    /// pipe) or a `ping` missed its pong. Never reused; the pool evicts it
    /// and returns its permit (§4.5, §6).
    Crashed,
}

type SharedChild = Arc<Mutex<Child>>;
type SharedState = Arc<Mutex<WorkerState>>;
type SharedWriter = Arc<Mutex<IpcWriter<tokio::process::ChildStdin>>>;
/// The `CapabilityContext` of the invocation currently in flight on this
/// worker, if any — the reader task consults it to satisfy `adapter_call`
/// messages against the host's `PlatformBundle` (§4.6). A worker only ever
/// has one invocation in flight (it's marked `Busy` for the duration), so a
/// single slot is enough.
type CurrentCtx = Arc<Mutex<Option<Arc<CapabilityContext>>>>;
/// Single-slot correlation for `ping`/`pong`: `Pong` carries no request id,
/// so unlike `call()` this can't key off `PendingMap`.
type PendingPong = Arc<Mutex<Option<oneshot::Sender<()>>>>;

pub struct Worker {
    pub id: String,
    child: SharedChild,
    writer: SharedWriter,
    pending: PendingMap,
    pending_pong: PendingPong,
    current_ctx: CurrentCtx,
    reader_task: tokio::task::JoinHandle<()>,
    started_at: Instant,
    request_count: AtomicU64,
    state: SharedState,
}

impl Worker {
    /// Spawn `command` with stdio piped, wait for its startup handshake
    /// (`WorkerMessage::Ready`) within `startup_timeout`, and return the
    /// running worker.
    pub async fn spawn(
        id: String,
        command: &str,
        args: &[String],
        cwd: &str,
        startup_timeout: Duration,
    ) -> Result<(Self, Vec<String>), RuntimeError> {
        let mut child = Command::new(command)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::WorkerCrashed {
                worker_id: format!("{id} (spawn failed: {e})"),
            })?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let writer: SharedWriter = Arc::new(Mutex::new(IpcWriter::new(stdin)));
        let mut reader = IpcReader::new(stdout);

        let ready = tokio::time::timeout(startup_timeout, reader.recv())
            .await
            .map_err(|_| RuntimeError::WorkerCrashed {
                worker_id: format!("{id} (startup handshake timed out)"),
            })?;

        let handlers = match ready {
            Some(Ok(WorkerMessage::Ready { handlers })) => handlers,
            Some(Ok(_other)) => {
                return Err(RuntimeError::WorkerCrashed {
                    worker_id: format!("{id} (expected ready handshake)"),
                })
            }
            Some(Err(e)) => return Err(e),
            None => {
                return Err(RuntimeError::WorkerCrashed {
                    worker_id: format!("{id} (worker exited before handshake)"),
                })
            }
        };

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let pending_pong: PendingPong = Arc::new(Mutex::new(None));
        let current_ctx: CurrentCtx = Arc::new(Mutex::new(None));
        let state: SharedState = Arc::new(Mutex::new(WorkerState::Idle));
        let child: SharedChild = Arc::new(Mutex::new(child));
        let reader_pending = pending.clone();
        let reader_pending_pong = pending_pong.clone();
        let reader_ctx = current_ctx.clone();
        let reader_writer = writer.clone();
        let reader_state = state.clone();
        let reader_child = child.clone();
        let reader_task = tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Some(Ok(message @ WorkerMessage::Result { .. })) => {
                        let request_id = match &message {
                            WorkerMessage::Result { request_id, .. } => request_id.clone(),
                            _ => unreachable!(),
                        };
                        if let Some(tx) = reader_pending.lock().await.remove(&request_id) {
                            let _ = tx.send(message);
                        }
                    }
                    Some(Ok(WorkerMessage::Pong)) => {
                        if let Some(tx) = reader_pending_pong.lock().await.take() {
                            let _ = tx.send(());
                        }
                    }
                    Some(Ok(WorkerMessage::AdapterCall {
                        request_id,
                        adapter,
                        method,
                        args,
                    })) => {
                        let ctx = reader_ctx.lock().await.clone();
                        let writer = reader_writer.clone();
                        tokio::spawn(async move {
                            let response = match ctx {
                                Some(ctx) => match adapter::dispatch(&ctx, &adapter, &method, args).await {
                                    Ok(data) => HostMessage::AdapterResponse {
                                        request_id,
                                        ok: true,
                                        data: Some(data),
                                        error_code: None,
                                        error_message: None,
                                    },
                                    Err(e) => HostMessage::AdapterResponse {
                                        request_id,
                                        ok: false,
                                        data: None,
                                        error_code: Some(e.code().to_string()),
                                        error_message: Some(e.to_string()),
                                    },
                                },
                                None => HostMessage::AdapterResponse {
                                    request_id,
                                    ok: false,
                                    data: None,
                                    error_code: Some("UNKNOWN_ERROR".to_string()),
                                    error_message: Some("no invocation in flight on this worker".to_string()),
                                },
                            };
                            let _ = writer.lock().await.send(&response).await;
                        });
                    }
                    Some(Ok(_other)) => {}
                    Some(Err(e)) => {
                        // A malformed frame means the framing itself can no
                        // longer be trusted; closing the pipe and failing
                        // in-flight calls beats limping on (§6).
                        tracing::warn!(error = %e, "worker IPC read error, marking worker crashed");
                        *reader_state.lock().await = WorkerState::Crashed;
                        reader_pending.lock().await.clear();
                        if let Some(tx) = reader_pending_pong.lock().await.take() {
                            drop(tx);
                        }
                        let _ = reader_child.lock().await.start_kill();
                        break;
                    }
                    None => break,
                }
            }
        });

        Ok((
            Self {
                id,
                child,
                writer,
                pending,
                pending_pong,
                current_ctx,
                reader_task,
                started_at: Instant::now(),
                request_count: AtomicU64::new(0),
                state,
            },
            handlers,
        ))
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.lock().await
    }

    pub async fn set_state(&self, new_state: WorkerState) {
        *self.state.lock().await = new_state;
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    pub async fn call(
        &self,
        ctx: Arc<CapabilityContext>,
        handler_ref: String,
        input: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, RuntimeError> {
        self.set_state(WorkerState::Busy).await;
        self.request_count.fetch_add(1, Ordering::SeqCst);

        let descriptor: Descriptor = ctx.descriptor.clone();
        let request_id = descriptor.request_id.clone();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);
        *self.current_ctx.lock().await = Some(ctx);

        self.writer
            .lock()
            .await
            .send(&HostMessage::Invoke {
                request_id: request_id.clone(),
                descriptor,
                handler_ref,
                input,
            })
            .await?;

        let result = tokio::time::timeout(timeout, rx).await;
        // Don't clobber a `Crashed` the reader task may have set concurrently
        // (e.g. a malformed frame arrived while this call was in flight).
        {
            let mut state = self.state.lock().await;
            if *state != WorkerState::Crashed {
                *state = WorkerState::Idle;
            }
        }
        *self.current_ctx.lock().await = None;

        match result {
            Ok(Ok(WorkerMessage::Result {
                ok,
                data,
                error_code,
                error_message,
                ..
            })) => {
                if ok {
                    Ok(data.unwrap_or(serde_json::Value::Null))
                } else {
                    Err(RuntimeError::from_wire(
                        error_code.as_deref().unwrap_or("UNKNOWN_ERROR"),
                        error_message.unwrap_or_default(),
                    ))
                }
            }
            Ok(Ok(_other)) => Err(RuntimeError::WorkerCrashed {
                worker_id: self.id.clone(),
            }),
            Ok(Err(_canceled)) => Err(RuntimeError::WorkerCrashed {
                worker_id: self.id.clone(),
            }),
            Err(_timeout) => {
                self.pending.lock().await.remove(&request_id);
                let _ = self.writer.lock().await.send(&HostMessage::Cancel { request_id }).await;
                Err(RuntimeError::Timeout)
            }
        }
    }

    /// Round-trips a `Ping`/`Pong` through the reader task. A missed or
    /// absent pong marks the worker crashed so the pool won't hand it out
    /// again (§4.5, §6).
    pub async fn ping(&self, timeout: Duration) -> bool {
        let (tx, rx) = oneshot::channel();
        *self.pending_pong.lock().await = Some(tx);

        if self.writer.lock().await.send(&HostMessage::Ping).await.is_err() {
            self.pending_pong.lock().await.take();
            self.set_state(WorkerState::Crashed).await;
            return false;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => true,
            _ => {
                self.pending_pong.lock().await.take();
                self.set_state(WorkerState::Crashed).await;
                false
            }
        }
    }

    pub async fn shutdown(&self, grace: Duration) {
        self.set_state(WorkerState::Draining).await;
        let _ = self.writer.lock().await.send(&HostMessage::Shutdown).await;
        let mut child = self.child.lock().await;
        let exited = tokio::time::timeout(grace, child.wait()).await;
        if exited.is_err() {
            let _ = child.kill().await;
        }
        self.reader_task.abort();
        self.set_state(WorkerState::Stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_state_transitions_are_distinct() {
        assert_ne!(WorkerState::Idle, WorkerState::Busy);
        assert_ne!(WorkerState::Starting, WorkerState::Draining);
    }
}
