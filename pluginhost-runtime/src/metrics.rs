//! # Execution Metrics
//!
//! Rolling invocation-time statistics per `(plugin_id, handler_ref)`, the
//! same ring-buffer + percentile pattern as the teacher's `MetricsCollector`
//! (fixed-capacity `VecDeque`, sorted-latency percentile lookup,
//! Prometheus-text rendering), generalized from per-request LLM gateway
//! metrics (provider/model/cost/tokens) to per-invocation runtime metrics
//! (plugin, handler, success/failure, duration).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Ring-buffer capacity per handler, matching §4.4's rolling stats note.
const SAMPLE_CAPACITY: usize = 1000;

static COLLECTOR: OnceLock<Arc<RwLock<MetricsCollector>>> = OnceLock::new();

fn collector() -> &'static Arc<RwLock<MetricsCollector>> {
    COLLECTOR.get_or_init(|| Arc::new(RwLock::new(MetricsCollector::default())))
}

#[derive(Debug, Clone)]
struct Sample {
    duration_ms: u64,
    ok: bool,
}

#[derive(Debug, Default)]
struct HandlerStats {
    samples: VecDeque<Sample>,
}

impl HandlerStats {
    fn record(&mut self, duration_ms: u64, ok: bool) {
        self.samples.push_back(Sample { duration_ms, ok });
        if self.samples.len() > SAMPLE_CAPACITY {
            self.samples.pop_front();
        }
    }

    fn snapshot(&self) -> HandlerSnapshot {
        if self.samples.is_empty() {
            return HandlerSnapshot::default();
        }
        let mut durations: Vec<u64> = self.samples.iter().map(|s| s.duration_ms).collect();
        durations.sort_unstable();
        let total = durations.len();
        let avg = durations.iter().sum::<u64>() as f64 / total as f64;
        let percentile = |p: f64| -> f64 {
            let idx = ((total as f64 - 1.0) * p).round() as usize;
            durations.get(idx).copied().unwrap_or(0) as f64
        };
        let failures = self.samples.iter().filter(|s| !s.ok).count();
        HandlerSnapshot {
            count: total as u64,
            average_ms: avg,
            p95_ms: percentile(0.95),
            p99_ms: percentile(0.99),
            error_rate: failures as f64 / total as f64,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerSnapshot {
    pub count: u64,
    pub average_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub error_rate: f64,
}

#[derive(Debug, Default)]
struct MetricsCollector {
    start: Option<Instant>,
    per_handler: HashMap<String, HandlerStats>,
}

impl MetricsCollector {
    fn key(plugin_id: &str, handler_ref: &str) -> String {
        format!("{plugin_id}#{handler_ref}")
    }
}

pub async fn record_invocation(plugin_id: &str, handler_ref: &str, duration: Duration, ok: bool) {
    let collector = collector();
    let mut collector = collector.write().await;
    if collector.start.is_none() {
        collector.start = Some(Instant::now());
    }
    collector
        .per_handler
        .entry(MetricsCollector::key(plugin_id, handler_ref))
        .or_default()
        .record(duration.as_millis() as u64, ok);
}

pub async fn snapshot(plugin_id: &str, handler_ref: &str) -> HandlerSnapshot {
    let collector = collector();
    let collector = collector.read().await;
    collector
        .per_handler
        .get(&MetricsCollector::key(plugin_id, handler_ref))
        .map(HandlerStats::snapshot)
        .unwrap_or_default()
}

pub async fn all_snapshots() -> HashMap<String, HandlerSnapshot> {
    let collector = collector();
    let collector = collector.read().await;
    collector
        .per_handler
        .iter()
        .map(|(k, v)| (k.clone(), v.snapshot()))
        .collect()
}

pub async fn prometheus_text() -> String {
    let snapshots = all_snapshots().await;
    let mut out = String::new();
    for (key, snap) in &snapshots {
        out.push_str(&format!(
            "pluginhost_invocations_total{{handler=\"{key}\"}} {}\n",
            snap.count
        ));
        out.push_str(&format!(
            "pluginhost_invocation_latency_avg_ms{{handler=\"{key}\"}} {}\n",
            snap.average_ms
        ));
        out.push_str(&format!(
            "pluginhost_invocation_latency_p95_ms{{handler=\"{key}\"}} {}\n",
            snap.p95_ms
        ));
        out.push_str(&format!(
            "pluginhost_invocation_latency_p99_ms{{handler=\"{key}\"}} {}\n",
            snap.p99_ms
        ));
        out.push_str(&format!(
            "pluginhost_invocation_error_rate{{handler=\"{key}\"}} {}\n",
            snap.error_rate
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn percentiles_track_recorded_samples() {
        for ms in [10, 20, 30, 40, 100] {
            record_invocation("demo", "test#percentiles", Duration::from_millis(ms), true).await;
        }
        let snap = snapshot("demo", "test#percentiles").await;
        assert_eq!(snap.count, 5);
        assert!(snap.p99_ms >= 40.0);
    }

    #[tokio::test]
    async fn error_rate_reflects_failures() {
        record_invocation("demo", "test#errors", Duration::from_millis(5), true).await;
        record_invocation("demo", "test#errors", Duration::from_millis(5), false).await;
        let snap = snapshot("demo", "test#errors").await;
        assert_eq!(snap.error_rate, 0.5);
    }
}
