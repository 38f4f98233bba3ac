//! Per-connection settings.
//!
//! `Config` deserializes with defaults for every missing field, so a host
//! application can nest it in its own configuration file.

use serde::Deserialize;
use std::time::Duration;

/// Default cap on a single frame payload and on an assembled message (16 MiB).
pub const DEFAULT_MAX_SIZE: usize = 16 * 1024 * 1024;

/// Default time allowed for a PONG after a heartbeat PING.
pub const DEFAULT_PONG_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Largest payload accepted in one inbound frame.
    pub max_frame_size: u64,
    /// Largest inbound message after reassembling its fragments.
    pub max_message_size: usize,
    /// Answer every PING with a PONG carrying the same payload.
    pub auto_pong: bool,
    /// Heartbeat PING period. No heartbeat when unset.
    pub ping_interval_ms: Option<u64>,
    pub pong_timeout_ms: u64,
    /// Bound on a single frame write. Unbounded when unset.
    pub write_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_SIZE as u64,
            max_message_size: DEFAULT_MAX_SIZE,
            auto_pong: true,
            ping_interval_ms: None,
            pong_timeout_ms: DEFAULT_PONG_TIMEOUT_MS,
            write_timeout_ms: None,
        }
    }
}

impl Config {
    pub fn with_max_frame_size(mut self, size: u64) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_auto_pong(mut self, enabled: bool) -> Self {
        self.auto_pong = enabled;
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration, pong_timeout: Duration) -> Self {
        self.ping_interval_ms = Some(millis(interval));
        self.pong_timeout_ms = millis(pong_timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = Some(millis(timeout));
        self
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval_ms.map(Duration::from_millis)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
