//! Asynchronous plugin results and their reconciliation into the metadata store.
//!
//! ## Architecture
//! ```text
//! ResultSource(s) ──collect(&sinks)──► [primary queue]   ──┐
//!   (polled every results_interval)   [secondary queue] ──┼──► ReconcileWriter ──► MetadataStore
//!                                                          │     merge on restore point
//!                                                          │     replace metadata.backupResults
//! ```
//!
//! ## Contents
//! - [`ResultEnvelope`], [`SubResult`], [`ResultStatus`] primary results
//! - [`RestoreEnvelope`], [`RestoreOutcome`] correlated secondary results
//! - [`ResultSource`] producer trait, [`ResultSinks`] its output queues
//! - [`ReconcileWriter`] the single queue consumer

mod envelope;
pub mod merge;
mod sinks;
mod source;
mod writer;

pub use envelope::{
    DATE_FORMAT, DEFAULT_KIND, DEFAULT_NAME, RestoreEnvelope, RestoreOutcome, ResultEnvelope,
    ResultStatus, SubResult,
};
pub use sinks::ResultSinks;
pub use source::{ResultSource, ResultSourceRef};
pub use writer::{ReconcileOutcome, ReconcileWriter};

pub(crate) use sinks::result_channels;
pub(crate) use source::SourcePoller;
