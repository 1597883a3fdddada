//! Engine configuration
//!
//! Defines the tunables shared by every run: connection timeouts, retry
//! policy for transient failures, and default result-set bounds.

use std::time::Duration;

/// Engine configuration
///
/// Step timeouts come from the pipeline definition; everything here applies
/// to all pipelines executed by this engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long to wait for a handle to a system to be opened
    pub connect_timeout: Duration,

    /// Retries for transient connection failures (query errors are never retried)
    pub max_retries: u32,

    /// Delay before the first retry, doubled on each subsequent attempt
    pub retry_backoff: Duration,

    /// Row cap used by row-diff steps that do not set their own
    pub default_row_cap: usize,

    /// Number of mismatched rows kept as samples in a row-diff payload
    pub default_sample_size: usize,

    /// Number of historical runs fed to the trend pass at the end of a run
    pub history_window: usize,
}

impl EngineConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - RECON_CONNECT_TIMEOUT (seconds, default: 10)
    /// - RECON_MAX_RETRIES (default: 2)
    /// - RECON_RETRY_BACKOFF_MS (default: 200)
    /// - RECON_ROW_CAP (default: 10000)
    /// - RECON_SAMPLE_SIZE (default: 10)
    /// - RECON_HISTORY_WINDOW (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let connect_timeout = env_parse::<u64>("RECON_CONNECT_TIMEOUT")
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout);

        let max_retries = env_parse::<u32>("RECON_MAX_RETRIES").unwrap_or(defaults.max_retries);

        let retry_backoff = env_parse::<u64>("RECON_RETRY_BACKOFF_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_backoff);

        let default_row_cap =
            env_parse::<usize>("RECON_ROW_CAP").unwrap_or(defaults.default_row_cap);

        let default_sample_size =
            env_parse::<usize>("RECON_SAMPLE_SIZE").unwrap_or(defaults.default_sample_size);

        let history_window =
            env_parse::<usize>("RECON_HISTORY_WINDOW").unwrap_or(defaults.history_window);

        Self {
            connect_timeout,
            max_retries,
            retry_backoff,
            default_row_cap,
            default_sample_size,
            history_window,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.connect_timeout.is_zero() {
            anyhow::bail!("connect_timeout must be greater than 0");
        }

        if self.max_retries > 5 {
            anyhow::bail!("max_retries must be at most 5");
        }

        if self.default_row_cap == 0 {
            anyhow::bail!("default_row_cap must be greater than 0");
        }

        if self.history_window == 0 {
            anyhow::bail!("history_window must be greater than 0");
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_backoff: Duration::from_millis(200),
            default_row_cap: 10_000,
            default_sample_size: 10,
            history_window: 10,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_backoff, Duration::from_millis(200));
        assert_eq!(config.default_row_cap, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.default_row_cap = 0;
        assert!(config.validate().is_err());

        config.default_row_cap = 100;
        config.max_retries = 9;
        assert!(config.validate().is_err());

        config.max_retries = 1;
        assert!(config.validate().is_ok());
    }
}
