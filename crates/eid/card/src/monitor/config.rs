//! Presence monitor configuration

use std::time::Duration;

use tracing::debug;

/// Environment variable forcing the polling strategy, `1`/`true` for active probing
pub const ACTIVE_PROBE_ENV: &str = "EID_ACTIVE_PROBE";

/// How the monitor finds out whether a card sits in the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingStrategy {
    /// Block in the terminal's status wait until presence changes or `timeout` passes
    Blocking {
        /// Longest single wait; the stop signal is checked between waits
        timeout: Duration,
    },
    /// Probe with a short-lived connection and sleep `interval` between probes
    ///
    /// For PC/SC stacks whose status wait returns immediately instead of blocking.
    ActiveProbe {
        /// Pause after each probe
        interval: Duration,
    },
}

impl PollingStrategy {
    /// Default timeout of a blocking status wait
    pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

    /// Default pause between active probes
    pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(300);

    /// Blocking waits with the default timeout
    pub const fn blocking() -> Self {
        Self::Blocking {
            timeout: Self::DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Active probing with the default interval
    pub const fn active_probe() -> Self {
        Self::ActiveProbe {
            interval: Self::DEFAULT_PROBE_INTERVAL,
        }
    }

    /// Pick the strategy for this host
    ///
    /// [`ACTIVE_PROBE_ENV`] wins when it holds a recognizable flag. Otherwise macOS
    /// gets active probing, its PC/SC status wait does not block reliably.
    pub fn detect() -> Self {
        let forced = std::env::var(ACTIVE_PROBE_ENV)
            .ok()
            .and_then(|value| parse_flag(&value));
        let active = forced.unwrap_or(cfg!(target_os = "macos"));
        debug!(?forced, active, "Selected polling strategy");

        if active { Self::active_probe() } else { Self::blocking() }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration for [`PresenceMonitor`](super::PresenceMonitor)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Presence detection strategy
    pub strategy: PollingStrategy,
    /// Pause after a failed reconnect before the next cycle
    pub fault_backoff: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            strategy: PollingStrategy::detect(),
            fault_backoff: Duration::from_secs(1),
        }
    }
}

impl MonitorConfig {
    /// Set the polling strategy
    pub const fn with_strategy(mut self, strategy: PollingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the pause after a failed reconnect
    pub const fn with_fault_backoff(mut self, backoff: Duration) -> Self {
        self.fault_backoff = backoff;
        self
    }
}
