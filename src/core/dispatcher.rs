//! # Dispatcher: fan one event out to every interested plugin.
//!
//! ```text
//! dispatch(ev)
//!   ├─ registry.interested_in(type) == [] → dropped, nothing tracked
//!   └─ for each interested plugin:
//!        ├─ runtime.enqueue(Delivery { ev, ack })      (never waits)
//!        └─ pool.submit(await ack) → DispatchTask
//!      outstanding.insert(EventKey { ts, seq }, tasks)
//! ```
//!
//! `dispatch` never waits on plugin processing; its only suspension point is the
//! short lock on the outstanding map.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::core::outstanding::{EventKey, Outstanding, OutstandingEntry};
use crate::core::pool::WorkerPool;
use crate::core::registry::PluginRegistry;
use crate::error::HandlerError;
use crate::events::DomainEvent;
use crate::plugins::Delivery;

/// Routes events to plugins and records what is still outstanding.
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
    pool: WorkerPool,
    outstanding: Arc<Outstanding>,
    seq: AtomicU64,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<PluginRegistry>,
        pool: WorkerPool,
        outstanding: Arc<Outstanding>,
    ) -> Self {
        Self {
            registry,
            pool,
            outstanding,
            seq: AtomicU64::new(0),
        }
    }

    /// Hands `event` to every interested plugin.
    ///
    /// Returns the number of plugins the event was dispatched to (`0` = dropped).
    pub async fn dispatch(&self, event: DomainEvent) -> usize {
        let interested = self.registry.interested_in(event.event_type());
        if interested.is_empty() {
            debug!(event = %event, "no plugin handles event, dropped");
            return 0;
        }

        let event = Arc::new(event);
        let mut tasks = Vec::with_capacity(interested.len());
        for runtime in interested {
            let (delivery, outcome) = Delivery::new(Arc::clone(&event));
            runtime.enqueue(delivery);
            tasks.push(self.pool.submit(runtime.shared_name(), async move {
                outcome.await.unwrap_or(Err(HandlerError::Cancelled))
            }));
        }

        let key = EventKey {
            timestamp: event.timestamp,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        debug!(event = %event, plugins = tasks.len(), "event dispatched");
        self.outstanding
            .insert(key, OutstandingEntry::new(Arc::clone(&event), tasks))
            .await;
        interested.len()
    }

    pub(crate) fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}
