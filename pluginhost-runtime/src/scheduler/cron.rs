//! # Schedule Expressions (§6)
//!
//! A `ScheduleSpec` is either a standard five/six-field cron expression (via
//! the `cron` crate) or an interval literal using the same `"30s"/"5m"/"1h"/
//! "1d"` grammar the rest of the runtime parses durations with. Both reduce
//! to "what's the next run time, given the last one."

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::parse_duration;
use crate::error::RuntimeError;
use crate::scheduler::job::ScheduleSpec;

/// Validate `spec` and return the first run time after `from`.
pub fn next_run_after(spec: &ScheduleSpec, from: DateTime<Utc>) -> Result<DateTime<Utc>, RuntimeError> {
    match spec {
        ScheduleSpec::Cron { expression } => {
            let schedule = cron::Schedule::from_str(expression).map_err(|_| RuntimeError::JobScheduleInvalid {
                expression: expression.clone(),
            })?;
            schedule
                .after(&from)
                .next()
                .ok_or_else(|| RuntimeError::JobScheduleInvalid {
                    expression: expression.clone(),
                })
        }
        ScheduleSpec::Interval { literal } => {
            let interval = parse_interval(literal)?;
            Ok(from + chrono::Duration::from_std(interval).map_err(|_| RuntimeError::JobScheduleInvalid {
                expression: literal.clone(),
            })?)
        }
    }
}

/// Parse an interval literal, mapping the generic duration-parse failure
/// onto the job-schedule error taxonomy rather than a bare config error.
pub fn parse_interval(literal: &str) -> Result<Duration, RuntimeError> {
    parse_duration(literal).map_err(|_| RuntimeError::JobScheduleInvalid {
        expression: literal.to_string(),
    })
}

/// Validate a schedule expression without needing a reference instant, used
/// at registration time before the first `next_run_at` is computed.
pub fn validate(spec: &ScheduleSpec) -> Result<(), RuntimeError> {
    next_run_after(spec, Utc::now()).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_expression_yields_a_future_run() {
        let spec = ScheduleSpec::Cron {
            expression: "0 * * * * *".to_string(),
        };
        let now = Utc::now();
        let next = next_run_after(&spec, now).unwrap();
        assert!(next > now);
    }

    #[test]
    fn invalid_cron_expression_is_rejected() {
        let spec = ScheduleSpec::Cron {
            expression: "not a cron expression".to_string(),
        };
        assert!(next_run_after(&spec, Utc::now()).is_err());
    }

    #[test]
    fn interval_literal_advances_by_the_parsed_duration() {
        let spec = ScheduleSpec::Interval {
            literal: "30s".to_string(),
        };
        let now = Utc::now();
        let next = next_run_after(&spec, now).unwrap();
        assert_eq!((next - now).num_seconds(), 30);
    }

    #[test]
    fn malformed_interval_literal_is_rejected() {
        let spec = ScheduleSpec::Interval {
            literal: "soon".to_string(),
        };
        assert!(next_run_after(&spec, Utc::now()).is_err());
    }
}
