//! # Result sources: periodic producers of result envelopes.
//!
//! A plugin that reports results to the metadata store exposes a
//! [`ResultSource`]. The relay polls each source on its own task:
//!
//! ```text
//! loop:
//!   source.collect(&sinks)
//!     ├─ Ok  → failures = 0; sleep(results_interval)
//!     └─ Err → notify; sleep(backoff.next(failures)); failures += 1
//! ```
//!
//! Cancellation is checked while sleeping; a `collect` call in progress is
//! allowed to finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::HandlerError;
use crate::notify::{Notification, NotifierRef};
use crate::policies::BackoffPolicy;
use crate::results::sinks::ResultSinks;

/// Producer of result envelopes, polled periodically.
#[async_trait]
pub trait ResultSource: Send + Sync + 'static {
    /// Name used in logs and notifications.
    fn name(&self) -> &str;

    /// Gathers whatever results are available and publishes them to `sinks`.
    async fn collect(&self, sinks: &ResultSinks) -> Result<(), HandlerError>;
}

/// Shared handle to a result source.
pub type ResultSourceRef = Arc<dyn ResultSource>;

/// Drives one [`ResultSource`] until cancelled.
pub(crate) struct SourcePoller {
    pub(crate) source: ResultSourceRef,
    pub(crate) sinks: ResultSinks,
    pub(crate) interval: Duration,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) notifier: NotifierRef,
}

impl SourcePoller {
    pub(crate) async fn run(self, token: CancellationToken) {
        let mut failures: u32 = 0;
        while !token.is_cancelled() {
            let delay = match self.source.collect(&self.sinks).await {
                Ok(()) => {
                    failures = 0;
                    self.interval
                }
                Err(err) => {
                    let delay = self.backoff.next(failures);
                    failures = failures.saturating_add(1);
                    warn!(source = self.source.name(), error = %err, failures, retry_in = ?delay, "result collection failed");
                    self.notifier.notify(Notification::cause(
                        format!("result source '{}' failed to collect results", self.source.name()),
                        err,
                    ));
                    delay
                }
            };
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!(source = self.source.name(), "result source stopped");
    }
}
