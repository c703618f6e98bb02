//! Correlation of restore outcomes and placement of results in stored metadata.
//!
//! Stored layout:
//! ```text
//! {
//!   "metadata": {
//!     "backupResults": { "results": [ {record}, ... ] },
//!     ...other keys left untouched...
//!   },
//!   ...
//! }
//! ```

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::results::envelope::{RestoreEnvelope, ResultEnvelope};
use crate::store::Metadata;

/// Top-level section holding every result kind.
pub const METADATA: &str = "metadata";
/// Section replaced by each reconciliation.
pub const LAST_BACKUPS: &str = "backupResults";
/// Key of the result list inside [`LAST_BACKUPS`].
pub const RESULTS: &str = "results";

/// Attaches restore outcomes to the primary results sharing their restore point.
///
/// Returns the outcomes that matched nothing, or `None` if all matched.
pub fn correlate(primary: &mut ResultEnvelope, secondary: RestoreEnvelope) -> Option<RestoreEnvelope> {
    let mut unmatched = Vec::new();
    for restore in secondary.restores {
        let target = primary
            .results
            .iter_mut()
            .find(|r| r.restore_point.as_deref() == Some(restore.restore_point.as_str()));
        match target {
            Some(result) => {
                debug!(entity = %primary.entity, restore_point = %restore.restore_point, "restore outcome merged");
                result.restore = Some(restore);
            }
            None => unmatched.push(restore),
        }
    }
    if unmatched.is_empty() {
        None
    } else {
        Some(RestoreEnvelope::new(secondary.entity, unmatched))
    }
}

/// Replaces the entity's stored result list with the envelope's results.
///
/// Creates the `metadata` section when absent (or not an object); other keys
/// are preserved.
pub fn apply_results(metadata: &mut Metadata, envelope: &ResultEnvelope) {
    let root = metadata.as_map_mut();
    let section = root
        .entry(METADATA)
        .or_insert_with(|| Value::Object(Map::new()));
    if !section.is_object() {
        warn!(entity = %envelope.entity, "metadata section is not an object, replacing it");
        *section = Value::Object(Map::new());
    }
    if let Value::Object(section) = section {
        let mut backups = Map::new();
        backups.insert(RESULTS.into(), Value::Array(envelope.records()));
        section.insert(LAST_BACKUPS.into(), Value::Object(backups));
    }
}
