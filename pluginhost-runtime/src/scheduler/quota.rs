//! # Job Quota Tracking (§4.7)
//!
//! Sliding-window request counters per `(plugin_id, handler_ref)`, one
//! window each for per-minute/per-hour/per-day quotas. Grounded on the
//! teacher's `auth::RateLimits::check_sliding_window_limits` — fixed-size
//! buckets keyed by `now / window_secs`, pruned of anything older than the
//! window — generalized from "requests per API key" to "job submissions per
//! plugin handler."

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::RuntimeError;
use crate::permissions::JobQuotas;

const MINUTE: u64 = 60;
const HOUR: u64 = 3600;
const DAY: u64 = 86400;

#[derive(Debug, Default, Clone)]
struct Bucket {
    window: u64,
    count: u64,
}

#[derive(Debug, Default)]
struct Counters {
    minute: Bucket,
    hour: Bucket,
    day: Bucket,
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

fn bump(bucket: &mut Bucket, window_secs: u64) -> u64 {
    let current_window = now_secs() / window_secs;
    if bucket.window != current_window {
        bucket.window = current_window;
        bucket.count = 0;
    }
    bucket.count += 1;
    bucket.count
}

pub struct QuotaTracker {
    counters: Mutex<HashMap<String, Counters>>,
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn key(plugin_id: &str, handler_ref: &str) -> String {
        format!("{plugin_id}#{handler_ref}")
    }

    /// Increments all three windows and checks them against `quotas`,
    /// rejecting with the first exceeded window (§7 `JOB_QUOTA_EXCEEDED`).
    pub fn check_and_increment(
        &self,
        plugin_id: &str,
        handler_ref: &str,
        quotas: &JobQuotas,
    ) -> Result<(), RuntimeError> {
        let mut counters = self.counters.lock().unwrap();
        let entry = counters.entry(Self::key(plugin_id, handler_ref)).or_default();

        let minute_count = bump(&mut entry.minute, MINUTE);
        if let Some(limit) = quotas.per_minute {
            if minute_count > limit {
                return Err(RuntimeError::JobQuotaExceeded {
                    limit,
                    current: minute_count,
                    window: MINUTE,
                    reset_at: ((entry.minute.window + 1) * MINUTE) as i64,
                });
            }
        }

        let hour_count = bump(&mut entry.hour, HOUR);
        if let Some(limit) = quotas.per_hour {
            if hour_count > limit {
                return Err(RuntimeError::JobQuotaExceeded {
                    limit,
                    current: hour_count,
                    window: HOUR,
                    reset_at: ((entry.hour.window + 1) * HOUR) as i64,
                });
            }
        }

        let day_count = bump(&mut entry.day, DAY);
        if let Some(limit) = quotas.per_day {
            if day_count > limit {
                return Err(RuntimeError::JobQuotaExceeded {
                    limit,
                    current: day_count,
                    window: DAY,
                    reset_at: ((entry.day.window + 1) * DAY) as i64,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_once_per_minute_quota_exceeded() {
        let tracker = QuotaTracker::new();
        let quotas = JobQuotas {
            per_minute: Some(2),
            per_hour: None,
            per_day: None,
        };
        assert!(tracker.check_and_increment("p", "h", &quotas).is_ok());
        assert!(tracker.check_and_increment("p", "h", &quotas).is_ok());
        let result = tracker.check_and_increment("p", "h", &quotas);
        assert!(result.is_err());
    }

    #[test]
    fn separate_handlers_have_independent_counters() {
        let tracker = QuotaTracker::new();
        let quotas = JobQuotas {
            per_minute: Some(1),
            per_hour: None,
            per_day: None,
        };
        assert!(tracker.check_and_increment("p", "h1", &quotas).is_ok());
        assert!(tracker.check_and_increment("p", "h2", &quotas).is_ok());
    }
}
