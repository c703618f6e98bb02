//! # Reconciliation writer: results → stored metadata.
//!
//! ## Loop
//! ```text
//! select (restores first):
//!   restore envelope → hold_restores        (latest per restore point kept)
//!   primary envelope → reconcile
//!
//! reconcile(primary):
//!   locator = store.locate(entity)        ── none      → skip (debug)
//!   metadata = store.read_metadata(loc)   ── non-2xx   → notify(Http), skip
//!   merge held restores for entity        (match on restore point)
//!   metadata.metadata.backupResults = { results: [...] }
//!   store.write_metadata(loc, metadata)   ── non-2xx   → notify(Http), no retry
//! ```
//!
//! ## Rules
//! - One write attempt per primary envelope (at most once per cycle).
//! - Restore outcomes are absorbed as soon as they are published, so producers
//!   never wait on primary traffic.
//! - Held restores are only consumed by a successful write; any failed cycle
//!   leaves them for the next envelope of the same entity.
//! - Restores held longer than the hold limit are dropped with a notification.
//! - Store failures never stop the loop.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::notify::{Notification, NotifierRef};
use crate::results::envelope::{RestoreEnvelope, ResultEnvelope};
use crate::results::merge;
use crate::results::sinks::ResultQueues;
use crate::store::StoreRef;

/// What happened to one primary envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Metadata written back.
    Written,
    /// The store has no locator for the entity.
    UnknownEntity,
    /// Current metadata could not be read.
    ReadFailed,
    /// Updated metadata could not be written.
    WriteFailed,
}

/// Restore outcomes of one entity waiting for a matching result.
#[derive(Debug, Clone)]
struct HeldRestores {
    envelope: RestoreEnvelope,
    since: Instant,
}

/// Single consumer of the result queues.
pub struct ReconcileWriter {
    store: StoreRef,
    notifier: NotifierRef,
    hold_limit: Option<Duration>,
    pending_restores: HashMap<String, HeldRestores>,
}

impl ReconcileWriter {
    /// Creates a writer over `store` that holds restores indefinitely.
    pub fn new(store: StoreRef, notifier: NotifierRef) -> Self {
        Self {
            store,
            notifier,
            hold_limit: None,
            pending_restores: HashMap::new(),
        }
    }

    /// Drops held restores older than `limit` (`None` = never).
    pub fn with_hold_limit(mut self, limit: Option<Duration>) -> Self {
        self.hold_limit = limit;
        self
    }

    pub(crate) async fn run(mut self, mut queues: ResultQueues, token: CancellationToken) {
        let mut restores_open = true;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = queues.secondary.recv(), if restores_open => match next {
                    Some(restores) => self.hold_restores(restores),
                    None => restores_open = false,
                },
                next = queues.primary.recv() => match next {
                    Some(envelope) => {
                        self.reconcile(envelope).await;
                    }
                    None => break,
                },
            }
        }
        debug!(pending_restores = self.pending_restores.len(), "reconciliation writer stopped");
    }

    /// Keeps restore outcomes until the next primary envelope for their entity.
    pub fn hold_restores(&mut self, envelope: RestoreEnvelope) {
        self.evict_expired();
        match self.pending_restores.get_mut(&envelope.entity) {
            Some(held) => {
                // Latest outcome per restore point wins.
                for restore in envelope.restores {
                    held.envelope
                        .restores
                        .retain(|r| r.restore_point != restore.restore_point);
                    held.envelope.restores.push(restore);
                }
            }
            None => {
                self.pending_restores.insert(
                    envelope.entity.clone(),
                    HeldRestores {
                        envelope,
                        since: Instant::now(),
                    },
                );
            }
        }
    }

    /// Number of entities with restore outcomes waiting for a result.
    pub fn held_entities(&self) -> usize {
        self.pending_restores.len()
    }

    fn evict_expired(&mut self) {
        let Some(limit) = self.hold_limit else {
            return;
        };
        self.pending_restores.retain(|entity, held| {
            let age = held.since.elapsed();
            if age <= limit {
                return true;
            }
            let count = held.envelope.restores.len();
            warn!(entity = %entity, count, ?age, "dropping unmatched restore outcomes");
            self.notifier.notify(Notification::message(format!(
                "dropped {count} restore outcome(s) of {entity}: no matching backup result within {limit:?}"
            )));
            false
        });
    }

    /// Runs one reconciliation for `envelope`.
    pub async fn reconcile(&mut self, mut envelope: ResultEnvelope) -> ReconcileOutcome {
        self.evict_expired();
        let owned = envelope.entity.clone();
        let entity = owned.as_str();

        let Some(locator) = self.store.locate(entity).await else {
            debug!(entity, "no locator for entity, results skipped");
            return ReconcileOutcome::UnknownEntity;
        };

        let response = match self.store.read_metadata(&locator).await {
            Ok(response) => response,
            Err(err) => {
                error!(entity, %locator, error = %err, "metadata read failed");
                self.notifier.notify(Notification::cause(
                    format!("failed to retrieve current metadata of {entity}"),
                    err,
                ));
                return ReconcileOutcome::ReadFailed;
            }
        };
        let status = response.status;
        let Some(mut metadata) = response.into_success() else {
            error!(entity, %locator, %status, "metadata read returned non-success status");
            self.notifier.notify(Notification::http(
                "failed to retrieve current metadata",
                locator,
                status,
            ));
            return ReconcileOutcome::ReadFailed;
        };

        let held = self.pending_restores.remove(entity);
        if let Some(held) = &held {
            if let Some(unmatched) = merge::correlate(&mut envelope, held.envelope.clone()) {
                self.pending_restores.insert(
                    owned.clone(),
                    HeldRestores {
                        envelope: unmatched,
                        since: held.since,
                    },
                );
            }
        }

        merge::apply_results(&mut metadata, &envelope);

        let outcome = match self.store.write_metadata(&locator, &metadata).await {
            Ok(status) if status.is_success() => {
                debug!(entity, results = envelope.results.len(), "results written");
                ReconcileOutcome::Written
            }
            Ok(status) => {
                error!(entity, %locator, %status, "metadata write returned non-success status");
                self.notifier.notify(Notification::http(
                    format!("failed to update backup status of {entity}"),
                    locator,
                    status,
                ));
                ReconcileOutcome::WriteFailed
            }
            Err(err) => {
                error!(entity, %locator, error = %err, "metadata write failed");
                self.notifier.notify(Notification::cause(
                    format!("failed to update backup status of {entity}"),
                    err,
                ));
                ReconcileOutcome::WriteFailed
            }
        };
        if outcome == ReconcileOutcome::WriteFailed {
            if let Some(held) = held {
                self.pending_restores.insert(owned, held);
            }
        }
        outcome
    }
}
