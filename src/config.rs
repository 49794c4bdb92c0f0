use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_derive::Deserialize;

use crate::util::deserialize_duration;

/// What a worker does when a request fails for any reason other than a timeout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Log and keep requesting.
    Continue,
    /// Log and retire the worker.
    Stop,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        ErrorPolicy::Continue
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingUrl,
    NoThreads,
    RuntimeTooLong,
    Read(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::MissingUrl => write!(f, "a target url is required"),
            ConfigError::NoThreads => write!(f, "at least one thread is required"),
            ConfigError::RuntimeTooLong => {
                write!(f, "threads, stagger and minutes add up to an unrepresentable runtime")
            }
            ConfigError::Read(e) => write!(f, "failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config file: {}", e),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Read(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Settings for a load test run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Target url. A missing scheme becomes `http://`.
    pub url: String,
    /// Number of concurrent workers, each on its own OS thread.
    pub threads: u32,
    /// Minutes to hold peak load once every worker is running.
    pub minutes: u64,
    /// Pause between starting one worker and the next. Ramps load up gradually instead of
    /// opening every connection at once.
    pub stagger_delay: Duration,
    /// How long in-flight requests get to finish after the stop signal before workers are joined.
    pub drain_timeout: Duration,
    /// Upper bound on waiting for the workers to terminate once stopped. Shared by the whole pool
    /// since every worker is stopped at once.
    pub join_timeout: Duration,
    /// Per-request timeout handed to the transport.
    pub request_timeout: Duration,
    pub error_policy: ErrorPolicy,
}

impl Config {
    pub fn new(url: &str) -> Config {
        Config {
            url: url.to_string(),
            threads: 1,
            minutes: 1,
            stagger_delay: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            error_policy: ErrorPolicy::default(),
        }
    }

    /// Length of the steady-state window. Saturates; `validate` rejects windows that overflow.
    pub fn peak_duration(&self) -> Duration {
        self.checked_peak_duration().unwrap_or(Duration::MAX)
    }

    /// Ramp-up plus steady state. Drain and join time is not included. Saturates like
    /// `peak_duration`.
    pub fn intended_runtime(&self) -> Duration {
        self.checked_intended_runtime().unwrap_or(Duration::MAX)
    }

    fn checked_peak_duration(&self) -> Option<Duration> {
        self.minutes.checked_mul(60).map(Duration::from_secs)
    }

    fn checked_intended_runtime(&self) -> Option<Duration> {
        self.stagger_delay
            .checked_mul(self.threads)?
            .checked_add(self.checked_peak_duration()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if self.threads == 0 {
            return Err(ConfigError::NoThreads);
        }
        if self.checked_intended_runtime().is_none() {
            return Err(ConfigError::RuntimeTooLong);
        }

        Ok(())
    }
}

/// On-disk form of `Config`. Every field is optional; command line flags win over the file.
///
/// ```toml
/// url = "localhost:8000"
/// threads = 4
/// minutes = 2
/// stagger_delay = "10s"
/// drain_timeout = "5s"
/// error_policy = "stop"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub url: Option<String>,
    pub threads: Option<u32>,
    pub minutes: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub stagger_delay: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub drain_timeout: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub join_timeout: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub request_timeout: Option<Duration>,
    pub error_policy: Option<ErrorPolicy>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(ConfigError::Read)?;
        FileConfig::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<FileConfig, ConfigError> {
        toml::from_str(contents).map_err(ConfigError::Parse)
    }

    /// Seed a builder with whatever the file sets.
    pub fn into_builder(self) -> ConfigBuilder {
        let mut builder = ConfigBuilder::new(self.url.as_deref().unwrap_or(""));

        if let Some(threads) = self.threads {
            builder = builder.threads(threads);
        }
        if let Some(minutes) = self.minutes {
            builder = builder.minutes(minutes);
        }
        if let Some(delay) = self.stagger_delay {
            builder = builder.stagger_delay(delay);
        }
        if let Some(timeout) = self.drain_timeout {
            builder = builder.drain_timeout(timeout);
        }
        if let Some(timeout) = self.join_timeout {
            builder = builder.join_timeout(timeout);
        }
        if let Some(timeout) = self.request_timeout {
            builder = builder.request_timeout(timeout);
        }
        if let Some(policy) = self.error_policy {
            builder = builder.error_policy(policy);
        }

        builder
    }
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(url: &str) -> ConfigBuilder {
        ConfigBuilder {
            config: Config::new(url),
        }
    }

    /// Consume the builder and return the inner object, if it's usable
    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    pub fn url(mut self, url: &str) -> ConfigBuilder {
        self.config.url = url.to_string();
        self
    }

    pub fn threads(mut self, threads: u32) -> ConfigBuilder {
        self.config.threads = threads;
        self
    }

    pub fn minutes(mut self, minutes: u64) -> ConfigBuilder {
        self.config.minutes = minutes;
        self
    }

    pub fn stagger_delay(mut self, stagger_delay: Duration) -> ConfigBuilder {
        self.config.stagger_delay = stagger_delay;
        self
    }

    pub fn drain_timeout(mut self, drain_timeout: Duration) -> ConfigBuilder {
        self.config.drain_timeout = drain_timeout;
        self
    }

    pub fn join_timeout(mut self, join_timeout: Duration) -> ConfigBuilder {
        self.config.join_timeout = join_timeout;
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> ConfigBuilder {
        self.config.request_timeout = request_timeout;
        self
    }

    pub fn error_policy(mut self, error_policy: ErrorPolicy) -> ConfigBuilder {
        self.config.error_policy = error_policy;
        self
    }
}
