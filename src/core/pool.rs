//! # Shared worker pool for dispatch tasks.
//!
//! Every (event, plugin) pairing becomes one [`DispatchTask`]: a tokio task that
//! takes a pool slot, then waits for the plugin's outcome for that event. The
//! number of tasks holding a slot at once is bounded by a semaphore
//! ([`Config::dispatch_workers`](crate::Config::dispatch_workers), `0` = unlimited).
//!
//! ```text
//! submit(plugin, fut) ──► tokio::spawn ──► acquire permit ──► fut.await ──► Result
//!                               │
//!                               └──► DispatchTask { plugin, join }  (polled by the tracker)
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time;

use crate::error::HandlerError;

/// Bounded pool of dispatch tasks.
#[derive(Debug)]
pub struct WorkerPool {
    semaphore: Option<Arc<Semaphore>>,
}

impl WorkerPool {
    /// Creates a pool with at most `limit` tasks holding a slot (`None` = unlimited).
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            semaphore: limit.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    /// Spawns a dispatch task for `plugin`.
    ///
    /// The returned handle is never awaited by the submitter; the tracker polls it.
    pub fn submit<F>(&self, plugin: Arc<str>, fut: F) -> DispatchTask
    where
        F: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let join = tokio::spawn(async move {
            let _permit = match semaphore {
                Some(sem) => match sem.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_closed) => return Err(HandlerError::Cancelled),
                },
                None => None,
            };
            fut.await
        });
        DispatchTask { plugin, join }
    }

    /// Closes the pool: tasks still waiting for a slot finish as cancelled.
    pub fn close(&self) {
        if let Some(sem) = &self.semaphore {
            sem.close();
        }
    }

    /// Free slots, `None` if the pool is unlimited.
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }
}

/// Result of polling a [`DispatchTask`] with a bounded wait.
#[derive(Debug, PartialEq, Eq)]
pub enum TaskPoll {
    /// The task finished (successfully or not).
    Done(Result<(), HandlerError>),
    /// The wait elapsed first.
    Pending,
}

/// Handle on one (event, plugin) dispatch task.
#[derive(Debug)]
pub struct DispatchTask {
    plugin: Arc<str>,
    join: JoinHandle<Result<(), HandlerError>>,
}

impl DispatchTask {
    /// Plugin the task reports for.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// True if the task has finished; does not consume the outcome.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits at most `wait` for the outcome.
    ///
    /// Must not be called again once it returned [`TaskPoll::Done`].
    pub async fn poll_for(&mut self, wait: Duration) -> TaskPoll {
        match time::timeout(wait, &mut self.join).await {
            Ok(Ok(outcome)) => TaskPoll::Done(outcome),
            Ok(Err(join_err)) if join_err.is_panic() => TaskPoll::Done(Err(HandlerError::Panicked {
                info: join_err.to_string(),
            })),
            Ok(Err(_aborted)) => TaskPoll::Done(Err(HandlerError::Cancelled)),
            Err(_elapsed) => TaskPoll::Pending,
        }
    }
}
