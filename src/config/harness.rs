use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Bounded retry with fixed backoff used while waiting for a leader.
///
/// The worst case wait is `interval_ms * max_attempts` (50s by default).
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct LeaderPollConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_poll_max_attempts")]
    pub max_attempts: usize,
}

impl Default for LeaderPollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_attempts: default_poll_max_attempts(),
        }
    }
}

impl LeaderPollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(invalid("leader_poll.interval_ms must be greater than 0"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("leader_poll.max_attempts must be greater than 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Fixed wait after each heartbeat send so the server can apply it
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Budget for [`crate::harness::wait_region_reported`]
    #[serde(default = "default_observe_attempts")]
    pub observe_attempts: usize,

    #[serde(default = "default_observe_interval_ms")]
    pub observe_interval_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            observe_attempts: default_observe_attempts(),
            observe_interval_ms: default_observe_interval_ms(),
        }
    }
}

impl HeartbeatConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn observe_interval(&self) -> Duration {
        Duration::from_millis(self.observe_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.observe_attempts == 0 {
            return Err(invalid("heartbeat.observe_attempts must be greater than 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct HttpClientConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl HttpClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(invalid("http.request_timeout_ms must be greater than 0"));
        }
        Ok(())
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}
fn default_poll_max_attempts() -> usize {
    100
}
fn default_settle_delay_ms() -> u64 {
    200
}
fn default_observe_attempts() -> usize {
    50
}
fn default_observe_interval_ms() -> u64 {
    20
}
fn default_request_timeout_ms() -> u64 {
    15_000
}
