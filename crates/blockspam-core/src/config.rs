//! Run configuration.

use std::time::Duration;

/// Settings for one run. Built once before launching and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Node endpoint every task dials.
    pub endpoint: String,

    /// Number of tasks launched in the run.
    pub concurrency: usize,

    /// Pause between two successive launches.
    pub delay: Duration,

    /// Deadline of each task, counted from its launch.
    pub timeout: Duration,
}

impl RunConfig {
    /// Create a config for the given endpoint with default pacing.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the number of tasks.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the inter-launch delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the per-task timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Minimum time the launch loop takes for this config.
    pub fn min_launch_time(&self) -> Duration {
        let gaps = self.concurrency.saturating_sub(1);
        self.delay
            .saturating_mul(u32::try_from(gaps).unwrap_or(u32::MAX))
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:50051".to_string(),
            concurrency: 1,
            delay: Duration::ZERO,
            timeout: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.endpoint, "http://127.0.0.1:50051");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.delay, Duration::ZERO);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_config_builder() {
        let config = RunConfig::new("http://localhost:8544")
            .with_concurrency(10)
            .with_delay(Duration::from_millis(5))
            .with_timeout(Duration::from_secs(2));

        assert_eq!(config.endpoint, "http://localhost:8544");
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.min_launch_time(), Duration::from_millis(45));
    }

    #[test]
    fn test_min_launch_time_without_tasks() {
        let config = RunConfig::default()
            .with_concurrency(0)
            .with_delay(Duration::from_secs(1));
        assert_eq!(config.min_launch_time(), Duration::ZERO);
    }
}
