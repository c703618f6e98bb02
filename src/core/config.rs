//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the relay runtime. A config is
//! handed to [`Relay::builder`](crate::Relay::builder) once at startup; every
//! component reads its knobs from there.
//!
//! ## Sentinel values
//! - `dispatch_workers = 0` → unlimited (no pool semaphore created)
//! - `plugin_queue_capacity = 0` → unbounded plugin queues
//! - `result_queue_capacity = 0` → unbounded result queues
//! - `max_outstanding = 0` → no outstanding-count alarm
//! - `stale_after = 0s` → no staleness alarm
//! - `restore_hold = 0s` → unmatched restore outcomes are held indefinitely

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Global configuration for the relay runtime.
///
/// Defines:
/// - **Dispatch**: size of the shared worker pool
/// - **Completion tracking**: tracker period, per-task poll wait, pressure alarms
/// - **Plugins**: queue capacity and queue poll interval
/// - **Results**: result source period, retry backoff, result queue capacity
/// - **Shutdown**: grace period
///
/// ## Notes
/// All fields are public for flexibility. Prefer using helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum number of dispatch tasks awaiting plugin outcomes at once.
    ///
    /// - `0` = unlimited (no semaphore)
    /// - `n > 0` = at most `n` tasks hold a pool slot simultaneously
    pub dispatch_workers: usize,

    /// Period of the completion tracker.
    pub tracker_interval: Duration,

    /// Bounded wait applied to each dispatch task while the tracker polls it.
    pub tracker_poll_timeout: Duration,

    /// How long a plugin worker waits on its queue before re-checking cancellation.
    pub plugin_poll_interval: Duration,

    /// Default capacity of each plugin's inbound queue (`0` = unbounded).
    ///
    /// A plugin may override it through [`Plugin::queue_capacity`](crate::Plugin::queue_capacity).
    pub plugin_queue_capacity: usize,

    /// Outstanding-entry count above which a pressure notification is raised (`0` = never).
    pub max_outstanding: usize,

    /// Age of the oldest outstanding entry above which a staleness notification
    /// is raised (`0s` = never).
    pub stale_after: Duration,

    /// Period at which every result source is asked to collect results.
    pub results_interval: Duration,

    /// Delay policy applied after a result source fails.
    pub results_backoff: BackoffPolicy,

    /// Capacity of the primary and secondary result queues (`0` = unbounded).
    pub result_queue_capacity: usize,

    /// How long restore outcomes wait for a matching result before they are
    /// dropped with a notification (`0s` = forever).
    pub restore_hold: Duration,

    /// Maximum time to wait for loops and plugin workers on shutdown.
    pub grace: Duration,
}

impl Config {
    /// Returns the pool size as an `Option`.
    ///
    /// - `None` → unlimited (no semaphore)
    /// - `Some(n)` → at most `n` concurrent dispatch tasks
    #[inline]
    pub fn pool_limit(&self) -> Option<usize> {
        match self.dispatch_workers {
            0 => None,
            n => Some(n),
        }
    }

    /// Returns the default plugin queue capacity (`None` = unbounded).
    #[inline]
    pub fn plugin_queue_limit(&self) -> Option<usize> {
        match self.plugin_queue_capacity {
            0 => None,
            n => Some(n),
        }
    }

    /// Returns the result queue capacity (`None` = unbounded).
    #[inline]
    pub fn result_queue_limit(&self) -> Option<usize> {
        match self.result_queue_capacity {
            0 => None,
            n => Some(n),
        }
    }

    /// Returns the restore hold limit (`None` = hold forever).
    #[inline]
    pub fn restore_hold_limit(&self) -> Option<Duration> {
        if self.restore_hold == Duration::ZERO {
            None
        } else {
            Some(self.restore_hold)
        }
    }

    /// Returns the outstanding-count alarm threshold (`None` = disabled).
    #[inline]
    pub fn outstanding_alarm(&self) -> Option<usize> {
        match self.max_outstanding {
            0 => None,
            n => Some(n),
        }
    }

    /// Returns the staleness alarm age (`None` = disabled).
    #[inline]
    pub fn stale_alarm(&self) -> Option<Duration> {
        if self.stale_after == Duration::ZERO {
            None
        } else {
            Some(self.stale_after)
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `dispatch_workers = 8`
    /// - `tracker_interval = 10s`, `tracker_poll_timeout = 100ms`
    /// - `plugin_poll_interval = 10s`, `plugin_queue_capacity = 0` (unbounded)
    /// - `max_outstanding = 10_000`, `stale_after = 10min`
    /// - `results_interval = 60s`, `results_backoff = BackoffPolicy::default()`
    /// - `result_queue_capacity = 0` (unbounded), `restore_hold = 1h`
    /// - `grace = 30s`
    fn default() -> Self {
        Self {
            dispatch_workers: 8,
            tracker_interval: Duration::from_secs(10),
            tracker_poll_timeout: Duration::from_millis(100),
            plugin_poll_interval: Duration::from_secs(10),
            plugin_queue_capacity: 0,
            max_outstanding: 10_000,
            stale_after: Duration::from_secs(600),
            results_interval: Duration::from_secs(60),
            results_backoff: BackoffPolicy::default(),
            result_queue_capacity: 0,
            restore_hold: Duration::from_secs(3600),
            grace: Duration::from_secs(30),
        }
    }
}
