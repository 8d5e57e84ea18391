//! # Runtime Configuration
//!
//! Loads, validates, and applies environment overrides to the runtime's
//! configuration, the way the teacher's `config::Config` does: TOML file →
//! env overrides → multi-stage `validate()`. Sections here cover the
//! execution runtime's own concerns (worker pool, scheduler, plugin
//! discovery) instead of an LLM gateway's (providers, routing, auth).

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error_handling::{ErrorHandler, ErrorType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub server: AdminServerConfig,
    pub worker_pool: WorkerPoolConfig,
    pub scheduler: SchedulerConfig,
    pub plugins: PluginsConfig,
    pub logging: LoggingConfig,
}

/// Bind address for the optional admin/status surface (§10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "pluginhost_sdk::common::duration_serde")]
    pub timeout: Duration,
}

/// §4.5 worker-pool tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    pub min: usize,
    pub max: usize,
    pub max_requests_per_worker: u64,
    #[serde(with = "pluginhost_sdk::common::duration_serde")]
    pub max_uptime_per_worker: Duration,
    pub max_queue_size: usize,
    #[serde(with = "pluginhost_sdk::common::duration_serde")]
    pub acquire_timeout: Duration,
    pub max_concurrent_per_plugin: Option<usize>,
    #[serde(with = "pluginhost_sdk::common::duration_serde")]
    pub health_check_interval: Duration,
    #[serde(with = "pluginhost_sdk::common::duration_serde")]
    pub health_check_timeout: Duration,
    #[serde(with = "pluginhost_sdk::common::duration_serde")]
    pub startup_timeout: Duration,
    #[serde(with = "pluginhost_sdk::common::duration_serde")]
    pub shutdown_grace: Duration,
    pub warmup: WarmupMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum WarmupMode {
    None,
    TopN { n: usize },
    MaxHandlers,
}

/// §4.7 scheduler tunables: tick interval, degradation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(with = "pluginhost_sdk::common::duration_serde")]
    pub tick_interval: Duration,
    pub timezone: String,
    pub degraded_delay_ms: u64,
    pub critical_delay_ms: u64,
    pub reject_on_critical: bool,
    pub cpu_degraded_threshold: f32,
    pub cpu_critical_threshold: f32,
    pub cpu_return_to_normal_threshold: f32,
    pub queue_depth_degraded_threshold: usize,
    pub queue_depth_critical_threshold: usize,
    #[serde(with = "pluginhost_sdk::common::duration_serde")]
    pub debounce_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    pub discovery_roots: Vec<String>,
    pub manifest_filename: String,
    /// Command used to spawn each worker-pool subprocess (§4.5). The worker
    /// itself multiplexes plugins by `descriptor.plugin_id` on each `Invoke`
    /// message, so one command serves every discovered plugin.
    pub worker_command: String,
    #[serde(default)]
    pub worker_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogOutput {
    Stdout,
    Stderr,
    File { path: String },
}

impl RuntimeConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: RuntimeConfig = toml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate_schema()?;
        Ok(config)
    }

    pub fn validate_schema(&self) -> anyhow::Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("server host cannot be empty"));
        }
        if self.worker_pool.min > self.worker_pool.max {
            return Err(anyhow::anyhow!("worker_pool.min cannot exceed worker_pool.max"));
        }
        if self.worker_pool.max == 0 {
            return Err(anyhow::anyhow!("worker_pool.max must be at least 1"));
        }
        if self.scheduler.tick_interval.as_millis() == 0 {
            return Err(anyhow::anyhow!("scheduler.tick_interval cannot be 0"));
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(host) = env::var("PLUGINHOST_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(port_str) = env::var("PLUGINHOST_PORT") {
            let port: u16 = port_str
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid PLUGINHOST_PORT: {port_str}"))?;
            self.server.port = port;
        }
        if let Ok(level) = env::var("PLUGINHOST_LOG_LEVEL") {
            let valid_levels = ["trace", "debug", "info", "warn", "error"];
            if valid_levels.contains(&level.as_str()) {
                self.logging.level = level;
            } else {
                return Err(anyhow::anyhow!("invalid PLUGINHOST_LOG_LEVEL: {level}"));
            }
        }
        if let Ok(workers) = env::var("PLUGINHOST_WORKER_MAX") {
            self.worker_pool.max = workers
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid PLUGINHOST_WORKER_MAX: {workers}"))?;
        }
        if let Ok(roots) = env::var("PLUGINHOST_PLUGIN_ROOTS") {
            self.plugins.discovery_roots =
                roots.split(',').map(|s| s.trim().to_string()).collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ErrorHandler::handle_sync_operation(
            || {
                self.validate_worker_pool()?;
                self.validate_scheduler()?;
                self.validate_logging()?;
                Ok(())
            },
            "Configuration validation",
            ErrorType::Config,
        )
        .map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(())
    }

    fn validate_worker_pool(&self) -> anyhow::Result<()> {
        if self.worker_pool.max_queue_size == 0 {
            return Err(anyhow::anyhow!("worker_pool.max_queue_size cannot be 0"));
        }
        if self.worker_pool.acquire_timeout.as_millis() == 0 {
            return Err(anyhow::anyhow!("worker_pool.acquire_timeout cannot be 0"));
        }
        if let WarmupMode::TopN { n } = &self.worker_pool.warmup {
            if *n > self.worker_pool.max {
                return Err(anyhow::anyhow!(
                    "worker_pool.warmup topN {} cannot exceed worker_pool.max {}",
                    n,
                    self.worker_pool.max
                ));
            }
        }
        Ok(())
    }

    fn validate_scheduler(&self) -> anyhow::Result<()> {
        if self.scheduler.cpu_degraded_threshold >= self.scheduler.cpu_critical_threshold {
            return Err(anyhow::anyhow!(
                "scheduler.cpu_degraded_threshold must be lower than cpu_critical_threshold"
            ));
        }
        if self.scheduler.cpu_return_to_normal_threshold >= self.scheduler.cpu_degraded_threshold {
            return Err(anyhow::anyhow!(
                "scheduler.cpu_return_to_normal_threshold must be lower than cpu_degraded_threshold (hysteresis)"
            ));
        }
        Ok(())
    }

    fn validate_logging(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!("invalid log level: {}", self.logging.level));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            server: AdminServerConfig {
                host: "127.0.0.1".to_string(),
                port: 7447,
                timeout: Duration::from_secs(30),
            },
            worker_pool: WorkerPoolConfig {
                min: 1,
                max: 4,
                max_requests_per_worker: 500,
                max_uptime_per_worker: Duration::from_secs(3600),
                max_queue_size: 100,
                acquire_timeout: Duration::from_secs(10),
                max_concurrent_per_plugin: None,
                health_check_interval: Duration::from_secs(15),
                health_check_timeout: Duration::from_secs(5),
                startup_timeout: Duration::from_secs(10),
                shutdown_grace: Duration::from_secs(5),
                warmup: WarmupMode::None,
            },
            scheduler: SchedulerConfig {
                tick_interval: Duration::from_secs(1),
                timezone: "UTC".to_string(),
                degraded_delay_ms: 1000,
                critical_delay_ms: 5000,
                reject_on_critical: false,
                cpu_degraded_threshold: 0.70,
                cpu_critical_threshold: 0.90,
                cpu_return_to_normal_threshold: 0.55,
                queue_depth_degraded_threshold: 50,
                queue_depth_critical_threshold: 90,
                debounce_interval: Duration::from_secs(30),
            },
            plugins: PluginsConfig {
                discovery_roots: vec!["./plugins".to_string()],
                manifest_filename: "plugin.json".to_string(),
                worker_command: "pluginhost-worker".to_string(),
                worker_args: Vec::new(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
                output: LogOutput::Stdout,
            },
        }
    }
}

/// `"30s"/"1m"/"2h"` duration literal grammar, also used by the cron module
/// to parse interval-literal schedules (§6).
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    pluginhost_sdk::common::duration_serde::parse_duration(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = RuntimeConfig::default();
        assert!(config.validate_schema().is_ok());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn min_exceeding_max_is_rejected() {
        let mut config = RuntimeConfig::default();
        config.worker_pool.min = 5;
        config.worker_pool.max = 2;
        assert!(config.validate_schema().is_err());
    }

    #[test]
    fn hysteresis_thresholds_must_be_ordered() {
        let mut config = RuntimeConfig::default();
        config.scheduler.cpu_return_to_normal_threshold = 0.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = RuntimeConfig::default();
        std::env::set_var("PLUGINHOST_PORT", "9100");
        std::env::set_var("PLUGINHOST_LOG_LEVEL", "debug");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.logging.level, "debug");
        std::env::remove_var("PLUGINHOST_PORT");
        std::env::remove_var("PLUGINHOST_LOG_LEVEL");
    }

    #[test]
    fn duration_literal_parsing() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert!(parse_duration("").is_err());
    }
}
