//! Per-invocation trace context: a trace/span id pair, an attribute map that
//! only grows, and an append-only event log. Generalized from the gateway's
//! `RequestContext` into the spec's trace model.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub name: String,
    pub ts: i64,
    pub attrs: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub attributes: HashMap<String, Value>,
    pub events: Vec<TraceEvent>,
}

impl TraceContext {
    pub fn new_root() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            span_id: Uuid::new_v4().to_string(),
            parent_span_id: None,
            attributes: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// A child span inheriting the parent's `trace_id`, used for cross-plugin
    /// `invoke.call` (§4.8) so nested invocations stay in one trace.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: Uuid::new_v4().to_string(),
            parent_span_id: Some(self.span_id.clone()),
            attributes: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn record_event(&mut self, name: impl Into<String>, attrs: HashMap<String, Value>) {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        self.events.push(TraceEvent {
            name: name.into(),
            ts,
            attrs,
        });
    }
}

/// Standard fields the runner reports alongside a handler's result on the
/// separate `metadata` field of `InvocationResult`; the handler's own
/// returned data is passed through unmodified (§4.1, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub executed_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
    pub plugin_id: String,
    pub plugin_version: String,
    pub handler_id: String,
    pub host: String,
    pub tenant_id: Option<String>,
    pub request_id: String,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_inherits_trace_id_new_span() {
        let root = TraceContext::new_root();
        let child = root.child();
        assert_eq!(root.trace_id, child.trace_id);
        assert_ne!(root.span_id, child.span_id);
        assert_eq!(child.parent_span_id.as_deref(), Some(root.span_id.as_str()));
    }

    #[test]
    fn events_are_append_only() {
        let mut ctx = TraceContext::new_root();
        ctx.record_event("started", HashMap::new());
        ctx.record_event("finished", HashMap::new());
        assert_eq!(ctx.events.len(), 2);
        assert_eq!(ctx.events[0].name, "started");
    }
}
