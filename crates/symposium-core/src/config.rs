//! Configuration loading and typed config structures for the Symposium
//! simulation.
//!
//! The canonical configuration lives in `symposium-config.yaml`. This module
//! defines strongly-typed structs that mirror the YAML structure, and
//! provides a loader that reads, overrides from the environment, and
//! validates the file. Every key has a default, so an empty file (or no
//! file at all) yields the classic five-agent run.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use symposium_types::Scheduling;

/// Environment variable overriding [`SimulationConfig::scheduling`].
pub const ENV_SCHEDULING: &str = "SYMPOSIUM_SCHEDULING";

/// Environment variable overriding [`RingConfig::agent_count`].
pub const ENV_AGENT_COUNT: &str = "SYMPOSIUM_AGENT_COUNT";

/// Environment variable overriding [`RingConfig::target_action_count`].
///
/// An empty value or `none` clears the target.
pub const ENV_TARGET_ACTION_COUNT: &str = "SYMPOSIUM_TARGET_ACTION_COUNT";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range, or an override is malformed.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `symposium-config.yaml`. Immutable once the run
/// starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Ring size, timing, and success target.
    #[serde(default)]
    pub ring: RingConfig,

    /// Liveness monitor settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Which scheduling model drives the run.
    #[serde(default)]
    pub scheduling: Scheduling,

    /// Runtime sizing for the preemptive model.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Diagnostic logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where the event stream goes.
    #[serde(default)]
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `SYMPOSIUM_SCHEDULING` overrides `scheduling`
    /// - `SYMPOSIUM_AGENT_COUNT` overrides `ring.agent_count`
    /// - `SYMPOSIUM_TARGET_ACTION_COUNT` overrides `ring.target_action_count`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if an override or value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if an override or value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_without_env(yaml)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration with environment overrides applied, for runs
    /// without a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an override is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without consulting the
    /// environment. Validation still runs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] or [`ConfigError::Invalid`].
    pub fn parse_without_env(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process
    /// environment).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a set variable does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_SCHEDULING) {
            self.scheduling =
                Scheduling::from_name(&val).ok_or_else(|| ConfigError::Invalid {
                    reason: format!("{ENV_SCHEDULING}: unknown scheduling model {val:?}"),
                })?;
        }
        if let Some(val) = lookup(ENV_AGENT_COUNT) {
            self.ring.agent_count = val.trim().parse().map_err(|e| ConfigError::Invalid {
                reason: format!("{ENV_AGENT_COUNT}: {e}"),
            })?;
        }
        if let Some(val) = lookup(ENV_TARGET_ACTION_COUNT) {
            let trimmed = val.trim();
            self.ring.target_action_count =
                if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(trimmed.parse().map_err(|e| ConfigError::Invalid {
                        reason: format!("{ENV_TARGET_ACTION_COUNT}: {e}"),
                    })?)
                };
        }
        Ok(())
    }

    /// Check every range constraint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ring.validate()?;
        self.monitor.validate()?;
        if self.runtime.worker_threads == Some(0) {
            return Err(ConfigError::Invalid {
                reason: "runtime.worker_threads must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Ring size, timing, and success target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RingConfig {
    /// Number of agents (and resources) in the ring. Must be at least 1.
    #[serde(default = "default_agent_count")]
    pub agent_count: usize,

    /// Longest an agent may go without acting before it is starved.
    #[serde(default = "default_die_timeout_ms")]
    pub die_timeout_ms: u64,

    /// How long an agent holds both resources while acting.
    #[serde(default = "default_act_duration_ms")]
    pub act_duration_ms: u64,

    /// How long an agent rests between cycles.
    #[serde(default = "default_rest_duration_ms")]
    pub rest_duration_ms: u64,

    /// Actions every agent must complete for the run to succeed.
    ///
    /// `None` runs until an agent starves.
    #[serde(default = "default_target_action_count")]
    pub target_action_count: Option<u64>,
}

impl RingConfig {
    /// Die timeout as a [`Duration`].
    pub const fn die_timeout(&self) -> Duration {
        Duration::from_millis(self.die_timeout_ms)
    }

    /// Act duration as a [`Duration`].
    pub const fn act_duration(&self) -> Duration {
        Duration::from_millis(self.act_duration_ms)
    }

    /// Rest duration as a [`Duration`].
    pub const fn rest_duration(&self) -> Duration {
        Duration::from_millis(self.rest_duration_ms)
    }

    /// Check the ring constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `agent_count` is 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_count == 0 {
            return Err(ConfigError::Invalid {
                reason: "ring.agent_count must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            agent_count: default_agent_count(),
            die_timeout_ms: default_die_timeout_ms(),
            act_duration_ms: default_act_duration_ms(),
            rest_duration_ms: default_rest_duration_ms(),
            target_action_count: default_target_action_count(),
        }
    }
}

/// Liveness monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonitorConfig {
    /// Milliseconds between scans. Must be at least 1.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl MonitorConfig {
    /// Poll interval as a [`Duration`].
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check the monitor constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the poll interval is 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "monitor.poll_interval_ms must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Runtime sizing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RuntimeConfig {
    /// Worker threads for the preemptive runtime (`None` = tokio default).
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

/// Diagnostic log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Diagnostic log format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Destination of the event stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutput {
    /// Plain single-line console output on stdout.
    #[default]
    Console,
    /// Structured `tracing` events.
    Tracing,
    /// Both of the above.
    Both,
}

/// Event stream output configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutputConfig {
    /// Where events are written.
    #[serde(default)]
    pub events: EventOutput,
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_agent_count() -> usize {
    5
}

const fn default_die_timeout_ms() -> u64 {
    1200
}

const fn default_act_duration_ms() -> u64 {
    200
}

const fn default_rest_duration_ms() -> u64 {
    200
}

#[allow(clippy::unnecessary_wraps)]
const fn default_target_action_count() -> Option<u64> {
    Some(5)
}

const fn default_poll_interval_ms() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_owned()
}
