//! Result queues between result sources and the reconciliation writer.

use crate::error::QueueError;
use crate::queue::{self, QueueReceiver, QueueSender};
use crate::results::envelope::{RestoreEnvelope, ResultEnvelope};

/// Producer side of the result queues, handed to every [`ResultSource`](crate::ResultSource).
///
/// Cheap to clone; all clones feed the same writer.
#[derive(Clone)]
pub struct ResultSinks {
    primary: QueueSender<ResultEnvelope>,
    secondary: QueueSender<RestoreEnvelope>,
}

impl ResultSinks {
    /// Publishes primary results, waiting for room if the queue is bounded and full.
    pub async fn publish(&self, envelope: ResultEnvelope) -> Result<(), QueueError> {
        self.primary.send(envelope).await
    }

    /// Publishes primary results without waiting.
    pub fn try_publish(&self, envelope: ResultEnvelope) -> Result<(), QueueError> {
        self.primary.try_send(envelope).map_err(|(err, _)| err)
    }

    /// Publishes correlated restore outcomes, waiting for room if needed.
    ///
    /// They are merged into the next primary envelope of the same entity.
    pub async fn publish_restores(&self, envelope: RestoreEnvelope) -> Result<(), QueueError> {
        self.secondary.send(envelope).await
    }

    /// Publishes correlated restore outcomes without waiting.
    pub fn try_publish_restores(&self, envelope: RestoreEnvelope) -> Result<(), QueueError> {
        self.secondary.try_send(envelope).map_err(|(err, _)| err)
    }
}

impl std::fmt::Debug for ResultSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSinks").finish_non_exhaustive()
    }
}

/// Consumer side, owned by the writer.
pub(crate) struct ResultQueues {
    pub(crate) primary: QueueReceiver<ResultEnvelope>,
    pub(crate) secondary: QueueReceiver<RestoreEnvelope>,
}

/// Creates both queues with the same capacity (`None` = unbounded).
pub(crate) fn result_channels(capacity: Option<usize>) -> (ResultSinks, ResultQueues) {
    let (primary_tx, primary_rx) = queue::channel(capacity);
    let (secondary_tx, secondary_rx) = queue::channel(capacity);
    (
        ResultSinks {
            primary: primary_tx,
            secondary: secondary_tx,
        },
        ResultQueues {
            primary: primary_rx,
            secondary: secondary_rx,
        },
    )
}
