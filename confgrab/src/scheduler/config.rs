//! Scheduler configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::channel::EngineConfig;

/// A task run periodically while the scheduler is running.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleEntry {
    /// Task name from the inventory.
    pub task: String,

    /// Time between runs. The first run happens one interval after start.
    #[serde(with = "secs")]
    pub interval: Duration,
}

impl ScheduleEntry {
    pub fn new(task: impl Into<String>, interval: Duration) -> Self {
        Self {
            task: task.into(),
            interval,
        }
    }
}

/// Configuration for the job scheduler.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of concurrent sessions.
    pub workers: usize,

    /// Budget for a whole job, connect included.
    #[serde(with = "secs")]
    pub job_timeout: Duration,

    /// Hard limit on opening a transport.
    #[serde(with = "secs")]
    pub connect_timeout: Duration,

    /// Extra attempts for connect failures and dropped connections.
    pub job_retries: u32,

    /// Pause between job attempts.
    #[serde(with = "secs")]
    pub retry_delay: Duration,

    /// Periodic task runs.
    pub schedule: Vec<ScheduleEntry>,

    /// Expect engine settings for every session.
    pub engine: EngineConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            job_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(30),
            job_retries: 0,
            retry_delay: Duration::from_secs(5),
            schedule: Vec::new(),
            engine: EngineConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Create a config with the given number of workers.
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    /// Set the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the whole-job budget.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Set the connect guard.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the number of extra attempts for transient failures.
    pub fn with_job_retries(mut self, retries: u32) -> Self {
        self.job_retries = retries;
        self
    }

    /// Set the pause between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run `task` every `interval` while running.
    pub fn with_schedule(mut self, task: impl Into<String>, interval: Duration) -> Self {
        self.schedule.push(ScheduleEntry::new(task, interval));
        self
    }

    /// Set the engine settings.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

/// Serde adapter for durations written as (possibly fractional) seconds.
pub mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| de::Error::custom(format!("invalid duration: {} seconds", secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.workers, 10);
        assert_eq!(config.job_retries, 0);
        assert!(config.schedule.is_empty());
    }

    #[test]
    fn test_builder() {
        let config = SchedulerConfig::new(4)
            .with_job_timeout(Duration::from_secs(60))
            .with_job_retries(2)
            .with_schedule("nightly", Duration::from_secs(86400));

        assert_eq!(config.workers, 4);
        assert_eq!(config.job_timeout, Duration::from_secs(60));
        assert_eq!(config.job_retries, 2);
        assert_eq!(config.schedule[0].task, "nightly");
    }

    #[test]
    fn test_deserialize_seconds() {
        let config: SchedulerConfig = serde_json::from_str(
            r#"{
                "workers": 20,
                "job_timeout": 120,
                "connect_timeout": 7.5,
                "schedule": [{"task": "core", "interval": 3600}],
                "engine": {"timeout": 15, "strip_ansi": false}
            }"#,
        )
        .unwrap();

        assert_eq!(config.workers, 20);
        assert_eq!(config.job_timeout, Duration::from_secs(120));
        assert_eq!(config.connect_timeout, Duration::from_millis(7500));
        assert_eq!(config.schedule[0].interval, Duration::from_secs(3600));
        assert_eq!(config.engine.timeout, Duration::from_secs(15));
        assert!(!config.engine.strip_ansi);
        // Unset fields keep their defaults
        assert_eq!(config.engine.line_terminator, "\n");
        assert_eq!(config.retry_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let result: Result<SchedulerConfig, _> = serde_json::from_str(r#"{"job_timeout": -1}"#);
        assert!(result.is_err());
    }
}
