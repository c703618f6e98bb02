//! Retry delays for failing result sources.
//!
//! A [`ResultSource`](crate::ResultSource) that fails is not dropped: its poller
//! waits a little longer before the next attempt, then falls back to the regular
//! [`Config::results_interval`](crate::Config::results_interval) once it succeeds.
//!
//! ## Contents
//! - [`BackoffPolicy`] how the delay grows with consecutive failures
//! - [`JitterPolicy`]  randomization so sources failing together do not retry together
//!
//! ## Wiring
//! ```text
//! Config { results_interval, results_backoff: BackoffPolicy, .. }
//!      └─► results::source::SourcePoller:
//!           - Ok(())  → sleep(results_interval), failures = 0
//!           - Err(e)  → notify, sleep(backoff.next(failures)), failures += 1
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
