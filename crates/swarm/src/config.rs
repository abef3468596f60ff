//! Configuration for a swarm run.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a swarm run.
#[derive(Clone, Debug, PartialEq)]
pub struct SwarmConfig {
    /// Base URL of the instance under test.
    pub host: String,

    /// Credential CSV produced by the provisioning script.
    pub credentials_path: PathBuf,

    /// Number of concurrent simulated users.
    pub users: usize,

    /// Users started per second until `users` are running.
    pub spawn_rate: f64,

    /// How long users keep performing actions once the first one starts.
    pub run_time: Duration,

    /// Lower bound of the pause between two actions of one user.
    pub wait_min: Duration,

    /// Upper bound of the pause between two actions of one user.
    pub wait_max: Duration,

    /// Per-request timeout.
    pub request_timeout: Duration,

    /// Seed for every user's RNG.
    pub seed: u64,

    /// Per-action weight overrides, keyed by action name. 0 disables.
    pub weights: HashMap<String, u32>,

    /// Wait this long for the instance to answer before starting, if set.
    pub wait_ready: Option<Duration>,
}

impl SwarmConfig {
    /// Create a configuration with defaults for everything but the target.
    pub fn new(host: impl Into<String>, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            credentials_path: credentials_path.into(),
            users: 10,
            spawn_rate: 1.0,
            run_time: Duration::from_secs(60),
            wait_min: Duration::from_secs(1),
            wait_max: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            seed: 12345,
            weights: HashMap::new(),
            wait_ready: None,
        }
    }

    /// Set the number of simulated users.
    pub fn with_users(mut self, users: usize) -> Self {
        self.users = users;
        self
    }

    /// Set the spawn rate in users per second.
    pub fn with_spawn_rate(mut self, rate: f64) -> Self {
        self.spawn_rate = rate;
        self
    }

    /// Set the run time.
    pub fn with_run_time(mut self, run_time: Duration) -> Self {
        self.run_time = run_time;
        self
    }

    /// Set the think time bounds between actions.
    pub fn with_wait_time(mut self, min: Duration, max: Duration) -> Self {
        self.wait_min = min;
        self.wait_max = max;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Override one action's weight.
    pub fn with_weight(mut self, action: impl Into<String>, weight: u32) -> Self {
        self.weights.insert(action.into(), weight);
        self
    }

    /// Wait for the instance before starting.
    pub fn with_wait_ready(mut self, timeout: Duration) -> Self {
        self.wait_ready = Some(timeout);
        self
    }

    /// Delay between two user spawns, saturating for rates too small to
    /// express. [`SwarmConfig::validate`] rejects such rates.
    pub fn spawn_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.spawn_rate).unwrap_or(Duration::MAX)
    }

    /// Check values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.users == 0 {
            return Err(ConfigError::Invalid("users must be at least 1".into()));
        }
        if !(self.spawn_rate.is_finite() && self.spawn_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "spawn rate must be positive, got {}",
                self.spawn_rate
            )));
        }
        if Duration::try_from_secs_f64(1.0 / self.spawn_rate).is_err() {
            return Err(ConfigError::Invalid(format!(
                "spawn rate {} is too small",
                self.spawn_rate
            )));
        }
        if self.wait_min > self.wait_max {
            return Err(ConfigError::Invalid(format!(
                "wait min {:?} exceeds wait max {:?}",
                self.wait_min, self.wait_max
            )));
        }
        Ok(())
    }

    /// Apply every field set in a config file.
    pub fn apply_file(mut self, file: ConfigFile) -> Result<Self, ConfigError> {
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(path) = file.credentials {
            self.credentials_path = path;
        }
        if let Some(users) = file.users {
            self.users = users;
        }
        if let Some(rate) = file.spawn_rate {
            self.spawn_rate = rate;
        }
        if let Some(run_time) = file.run_time {
            self.run_time = parse_duration("run_time", &run_time)?;
        }
        if let Some(wait_min) = file.wait_min {
            self.wait_min = parse_duration("wait_min", &wait_min)?;
        }
        if let Some(wait_max) = file.wait_max {
            self.wait_max = parse_duration("wait_max", &wait_max)?;
        }
        if let Some(timeout) = file.request_timeout {
            self.request_timeout = parse_duration("request_timeout", &timeout)?;
        }
        if let Some(seed) = file.seed {
            self.seed = seed;
        }
        if let Some(wait_ready) = file.wait_ready {
            self.wait_ready = Some(parse_duration("wait_ready", &wait_ready)?);
        }
        self.weights.extend(file.weights);
        Ok(self)
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self::new("http://localhost:3000", "test_users.csv")
    }
}

/// On-disk TOML configuration. Every field is optional; durations use
/// humantime syntax (`"90s"`, `"5m"`).
///
/// ```toml
/// host = "https://mastodon.test"
/// users = 50
/// run_time = "10m"
///
/// [weights]
/// post_status = 4
/// update_profile = 0
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub host: Option<String>,
    pub credentials: Option<PathBuf>,
    pub users: Option<usize>,
    pub spawn_rate: Option<f64>,
    pub run_time: Option<String>,
    pub wait_min: Option<String>,
    pub wait_max: Option<String>,
    pub request_timeout: Option<String>,
    pub seed: Option<u64>,
    pub wait_ready: Option<String>,
    #[serde(default)]
    pub weights: HashMap<String, u32>,
}

impl ConfigFile {
    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse TOML text.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}

fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|source| ConfigError::Duration {
        field,
        value: value.to_string(),
        source,
    })
}

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid duration `{value}` for {field}: {source}")]
    Duration {
        field: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SwarmConfig::default();
        assert_eq!(config.users, 10);
        assert_eq!(config.spawn_rate, 1.0);
        assert_eq!(config.run_time, Duration::from_secs(60));
        assert_eq!(config.wait_min, Duration::from_secs(1));
        assert_eq!(config.wait_max, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.weights.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SwarmConfig::new("https://example.test", "users.csv")
            .with_users(3)
            .with_spawn_rate(4.0)
            .with_wait_time(Duration::ZERO, Duration::from_millis(10))
            .with_weight("post_status", 5);

        assert_eq!(config.users, 3);
        assert_eq!(config.spawn_interval(), Duration::from_millis(250));
        assert_eq!(config.weights.get("post_status"), Some(&5));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = SwarmConfig::default();
        assert!(base.clone().with_users(0).validate().is_err());
        assert!(base.clone().with_spawn_rate(0.0).validate().is_err());
        assert!(base.clone().with_spawn_rate(f64::NAN).validate().is_err());
        assert!(base.clone().with_spawn_rate(1e-30).validate().is_err());
        assert!(base
            .with_wait_time(Duration::from_secs(5), Duration::from_secs(1))
            .validate()
            .is_err());
    }

    #[test]
    fn test_tiny_spawn_rate_does_not_panic() {
        let config = SwarmConfig::default().with_spawn_rate(1e-30);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.spawn_interval(), Duration::MAX);

        let slow = SwarmConfig::default().with_spawn_rate(0.5);
        assert!(slow.validate().is_ok());
        assert_eq!(slow.spawn_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = ConfigFile::parse(
            r#"
            host = "https://mastodon.test"
            users = 50
            run_time = "10m"
            wait_min = "500ms"
            wait_ready = "2m"

            [weights]
            post_status = 4
            update_profile = 0
            "#,
        )
        .unwrap();

        let config = SwarmConfig::default().apply_file(file).unwrap();
        assert_eq!(config.host, "https://mastodon.test");
        assert_eq!(config.users, 50);
        assert_eq!(config.run_time, Duration::from_secs(600));
        assert_eq!(config.wait_min, Duration::from_millis(500));
        assert_eq!(config.wait_max, Duration::from_secs(5));
        assert_eq!(config.wait_ready, Some(Duration::from_secs(120)));
        assert_eq!(config.weights.get("update_profile"), Some(&0));
    }

    #[test]
    fn test_file_errors() {
        assert!(matches!(
            ConfigFile::parse("userz = 3"),
            Err(ConfigError::Parse(_))
        ));

        let file = ConfigFile::parse(r#"run_time = "soon""#).unwrap();
        assert!(matches!(
            SwarmConfig::default().apply_file(file),
            Err(ConfigError::Duration { field: "run_time", .. })
        ));

        assert!(matches!(
            ConfigFile::load("/nonexistent/fediload.toml"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "seed = 7\nspawn_rate = 2.5").unwrap();

        let parsed = ConfigFile::load(file.path()).unwrap();
        assert_eq!(parsed.seed, Some(7));
        assert_eq!(parsed.spawn_rate, Some(2.5));
    }
}
