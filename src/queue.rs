//! # Bounded-or-unbounded mpsc queues.
//!
//! Plugin inbound queues and result queues can be configured either way
//! (`capacity = 0` means unbounded). [`channel`] hides the choice behind one
//! sender/receiver pair so callers only deal with [`QueueError`].

use tokio::sync::mpsc;

use crate::error::QueueError;

/// Sending half of a queue.
pub(crate) enum QueueSender<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        match self {
            QueueSender::Bounded(tx) => QueueSender::Bounded(tx.clone()),
            QueueSender::Unbounded(tx) => QueueSender::Unbounded(tx.clone()),
        }
    }
}

/// Receiving half of a queue.
pub(crate) enum QueueReceiver<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

/// Creates a queue; `None` capacity means unbounded, `Some(0)` is clamped to 1.
pub(crate) fn channel<T>(capacity: Option<usize>) -> (QueueSender<T>, QueueReceiver<T>) {
    match capacity {
        Some(cap) => {
            let (tx, rx) = mpsc::channel(cap.max(1));
            (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueues without waiting; a full bounded queue refuses the item.
    ///
    /// The refused item is handed back so the caller can settle it.
    pub(crate) fn try_send(&self, item: T) -> Result<(), (QueueError, T)> {
        match self {
            QueueSender::Bounded(tx) => tx.try_send(item).map_err(|e| match e {
                mpsc::error::TrySendError::Full(item) => (QueueError::Full, item),
                mpsc::error::TrySendError::Closed(item) => (QueueError::Closed, item),
            }),
            QueueSender::Unbounded(tx) => tx.send(item).map_err(|e| (QueueError::Closed, e.0)),
        }
    }

    /// Enqueues, waiting for room if the queue is bounded and full.
    pub(crate) async fn send(&self, item: T) -> Result<(), QueueError> {
        match self {
            QueueSender::Bounded(tx) => tx.send(item).await.map_err(|_| QueueError::Closed),
            QueueSender::Unbounded(tx) => tx.send(item).map_err(|_| QueueError::Closed),
        }
    }
}

impl<T> QueueReceiver<T> {
    /// Waits for the next item; `None` once every sender is gone.
    pub(crate) async fn recv(&mut self) -> Option<T> {
        match self {
            QueueReceiver::Bounded(rx) => rx.recv().await,
            QueueReceiver::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Takes an item only if one is already queued.
    pub(crate) fn try_recv(&mut self) -> Option<T> {
        match self {
            QueueReceiver::Bounded(rx) => rx.try_recv().ok(),
            QueueReceiver::Unbounded(rx) => rx.try_recv().ok(),
        }
    }

    /// Refuses further sends; already queued items can still be received.
    pub(crate) fn close(&mut self) {
        match self {
            QueueReceiver::Bounded(rx) => rx.close(),
            QueueReceiver::Unbounded(rx) => rx.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_refuses_when_full() {
        let (tx, mut rx) = channel::<u32>(Some(1));
        assert!(tx.try_send(1).is_ok());
        let (err, item) = tx.try_send(2).unwrap_err();
        assert_eq!(err, QueueError::Full);
        assert_eq!(item, 2);
        assert_eq!(rx.recv().await, Some(1));
    }

    #[tokio::test]
    async fn test_closed_receiver_refuses_and_keeps_backlog() {
        let (tx, mut rx) = channel::<u32>(None);
        tx.try_send(7).unwrap();
        rx.close();
        assert_eq!(tx.try_send(8).unwrap_err().0, QueueError::Closed);
        assert_eq!(rx.try_recv(), Some(7));
        assert_eq!(rx.try_recv(), None);
    }
}
