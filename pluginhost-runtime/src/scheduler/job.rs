//! # Job & Schedule Types (§3, §6)

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    pub plugin_id: String,
    pub handler_ref: String,
    pub input: Value,
    pub timeout_ms: u64,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub submission: JobSubmission,
    pub status: JobStatus,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

/// A recurring schedule: either a cron expression or an interval literal
/// (`"30s"`, `"5m"`, `"1h"`, `"1d"`, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScheduleSpec {
    Cron { expression: String },
    Interval { literal: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub plugin_id: String,
    pub handler_ref: String,
    pub schedule: ScheduleSpec,
    pub input: Value,
    pub timeout_ms: u64,
    pub next_run_at: chrono::DateTime<chrono::Utc>,
    pub enabled: bool,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    /// Higher `priority` sorts first; ties broken by earlier submission, so
    /// `BinaryHeap` (a max-heap) pops the highest-priority, oldest job first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.submission
            .priority
            .cmp(&other.submission.priority)
            .then_with(|| other.submitted_at.cmp(&self.submitted_at))
    }
}
