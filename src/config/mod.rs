//! Configuration management for the harness and the instances it launches.
//!
//! Provides hierarchical configuration loading with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`PD_HARNESS__` prefix)
//! - Component-wise validation
mod harness;
mod instance;
pub use harness::*;
pub use instance::*;

#[cfg(test)]
mod instance_test;

use std::env;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

pub(crate) const ENV_PREFIX: &str = "PD_HARNESS";

/// Settings of the harness itself
///
/// Combines all harness configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct HarnessConfig {
    /// Leader convergence polling budget
    #[serde(default)]
    pub leader_poll: LeaderPollConfig,
    /// Region heartbeat driver behavior
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// HTTP client bound to unix sockets
    #[serde(default)]
    pub http: HttpClientConfig,
    /// Layout and timing of the instances created for a test cluster
    #[serde(default)]
    pub cluster: TestClusterConfig,
}

impl HarnessConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `PD_HARNESS__` prefix (highest priority)
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("PD_HARNESS__LEADER_POLL__MAX_ATTEMPTS", "20");
    /// let cfg = HarnessConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        self.leader_poll.validate()?;
        self.heartbeat.validate()?;
        self.http.validate()?;
        self.cluster.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

pub(super) fn invalid(msg: impl Into<String>) -> Error {
    Error::Config(ConfigError::Message(msg.into()))
}
