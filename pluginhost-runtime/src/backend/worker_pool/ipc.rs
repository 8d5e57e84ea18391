//! # Subprocess IPC (§4.6)
//!
//! Newline-delimited JSON over the worker's stdio, the simplest framing that
//! works across any language a worker process might be written in. Grounded
//! on `tokio_util::codec::LinesCodec` wrapping `tokio::process::Child`'s
//! piped stdio, the same "frame a byte stream into discrete units" pattern
//! the teacher applies to its streaming SSE responses, here applied to a
//! subprocess pipe instead of an HTTP body.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use futures::{SinkExt, StreamExt};

use crate::descriptor::Descriptor;
use crate::error::RuntimeError;

/// Host -> worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostMessage {
    Invoke {
        request_id: String,
        descriptor: Descriptor,
        handler_ref: String,
        input: Value,
    },
    Cancel {
        request_id: String,
    },
    /// Reply to a worker's `adapter_call`, proxying a platform-service result
    /// (cache/storage/vectorStore/llm/analytics) back into the subprocess.
    AdapterResponse {
        request_id: String,
        ok: bool,
        data: Option<Value>,
        error_code: Option<String>,
        error_message: Option<String>,
    },
    Ping,
    Shutdown,
}

/// Worker -> host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerMessage {
    Ready {
        handlers: Vec<String>,
    },
    Result {
        request_id: String,
        ok: bool,
        data: Option<Value>,
        error_code: Option<String>,
        error_message: Option<String>,
    },
    /// A worker asking the host to satisfy a platform-service call
    /// (`adapter.method(args)`) on its behalf, mid-invocation (§4.6).
    AdapterCall {
        request_id: String,
        adapter: String,
        method: String,
        args: Value,
    },
    Pong,
    Log {
        level: String,
        message: String,
    },
}

/// Pending-request correlation map: one entry per in-flight `request_id`,
/// resolved when the worker's `Result` message for it arrives.
pub type PendingMap = std::sync::Arc<tokio::sync::Mutex<HashMap<String, oneshot::Sender<WorkerMessage>>>>;

pub struct IpcWriter<W> {
    inner: FramedWrite<W, LinesCodec>,
}

impl<W: AsyncWrite + Unpin> IpcWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: FramedWrite::new(writer, LinesCodec::new()),
        }
    }

    pub async fn send(&mut self, message: &HostMessage) -> Result<(), RuntimeError> {
        let line = serde_json::to_string(message).map_err(|e| RuntimeError::UnknownError {
            message: format!("encode IPC message: {e}"),
        })?;
        self.inner.send(line).await.map_err(|e| RuntimeError::UnknownError {
            message: format!("write IPC message: {e}"),
        })
    }
}

pub struct IpcReader<R> {
    inner: FramedRead<R, LinesCodec>,
}

impl<R: AsyncRead + Unpin> IpcReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: FramedRead::new(reader, LinesCodec::new()),
        }
    }

    /// Returns `None` once the worker's stdout closes (process exited).
    pub async fn recv(&mut self) -> Option<Result<WorkerMessage, RuntimeError>> {
        let line = self.inner.next().await?;
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                return Some(Err(RuntimeError::UnknownError {
                    message: format!("read IPC message: {e}"),
                }))
            }
        };
        Some(
            serde_json::from_str(&line).map_err(|e| RuntimeError::UnknownError {
                message: format!("decode IPC message {line:?}: {e}"),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_message_round_trips_json() {
        let msg = HostMessage::Ping;
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"kind\":\"ping\""));
    }

    #[test]
    fn adapter_call_round_trips_json() {
        let msg = WorkerMessage::AdapterCall {
            request_id: "r1".to_string(),
            adapter: "cache".to_string(),
            method: "get".to_string(),
            args: serde_json::json!({"key": "k"}),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: WorkerMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            WorkerMessage::AdapterCall { adapter, method, .. } => {
                assert_eq!(adapter, "cache");
                assert_eq!(method, "get");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn worker_result_round_trips_json() {
        let msg = WorkerMessage::Result {
            request_id: "r1".to_string(),
            ok: true,
            data: Some(serde_json::json!({"x": 1})),
            error_code: None,
            error_message: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: WorkerMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            WorkerMessage::Result { request_id, ok, .. } => {
                assert_eq!(request_id, "r1");
                assert!(ok);
            }
            _ => panic!("wrong variant"),
        }
    }
}
