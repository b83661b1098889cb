use super::paths::DataPaths;
use crate::services::catalog_sync::DEFAULT_EVENT_BUFFER;

/// Application configuration
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | WORK_DIR | ./stockroom-data | Working directory (image cache, logs) |
/// | ENVIRONMENT | development | development / staging / production |
/// | LOG_LEVEL | info | Default tracing filter |
/// | LOG_JSON | false | JSON log output |
/// | EVENT_BUFFER | 256 | Per-subscription event channel capacity |
///
/// # Example
///
/// ```ignore
/// WORK_DIR=/data/stockroom LOG_LEVEL=debug cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory holding the image cache and logs
    pub work_dir: String,
    /// development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    /// Capacity of each subscription's event channel
    pub event_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./stockroom-data".into()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: std::env::var("LOG_JSON")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            event_buffer: std::env::var("EVENT_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_EVENT_BUFFER),
        }
    }

    /// Load a `.env` file if present, then read the environment
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::from_env()
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<String>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer.max(1);
        self
    }

    /// On-disk layout rooted at `work_dir`
    pub fn paths(&self) -> DataPaths {
        DataPaths::new(&self.work_dir)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let config = Config::from_env()
            .with_work_dir("/tmp/stockroom-test")
            .with_event_buffer(0);
        assert_eq!(config.work_dir, "/tmp/stockroom-test");
        assert_eq!(config.event_buffer, 1);
        assert_eq!(
            config.paths().assets_dir(),
            std::path::PathBuf::from("/tmp/stockroom-test/cache/images")
        );
    }

    #[test]
    fn test_environment_flags() {
        let mut config = Config::from_env();
        config.environment = "production".into();
        assert!(config.is_production());
        assert!(!config.is_development());
    }
}
