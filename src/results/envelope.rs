//! Result envelopes produced by plugins for the metadata store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Date format used in stored result records.
pub const DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S %z";

/// Name given to a result when the producer sets none.
pub const DEFAULT_NAME: &str = "defined_hour";

/// Kind given to a result when the producer sets none.
pub const DEFAULT_KIND: &str = "3";

/// Outcome of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultStatus {
    /// Finished successfully.
    #[serde(rename = "done")]
    Done,
    /// Still running.
    #[serde(rename = "progress")]
    InProgress,
    /// Finished with an error.
    #[serde(rename = "failed")]
    Failed,
}

impl ResultStatus {
    /// Stored representation: `done`, `progress` or `failed`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Done => "done",
            ResultStatus::InProgress => "progress",
            ResultStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a restore attached to the backup it restored from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Restore point the restore used; matches [`SubResult::restore_point`].
    pub restore_point: String,
    /// When the restore finished (or was last seen).
    pub date: DateTime<Utc>,
    /// Restore status.
    pub status: ResultStatus,
    /// Failure reason, if any.
    pub reason: Option<String>,
}

impl RestoreOutcome {
    /// Creates a restore outcome for `restore_point`.
    pub fn new(restore_point: impl Into<String>, date: DateTime<Utc>, status: ResultStatus) -> Self {
        Self {
            restore_point: restore_point.into(),
            date,
            status,
            reason: None,
        }
    }

    /// Sets the failure reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// One operation outcome, flattened into a record when stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResult {
    /// When the operation finished (or was last seen).
    pub date: DateTime<Utc>,
    /// Operation status.
    pub status: ResultStatus,
    /// Schedule or job name.
    pub name: String,
    /// Produced size in bytes.
    pub size: u64,
    /// Producer-defined kind tag.
    pub kind: String,
    /// Failure reason, if any.
    pub reason: Option<String>,
    /// Restore point id, the key restore outcomes are matched on.
    pub restore_point: Option<String>,
    /// Restore outcome merged from a secondary envelope.
    pub restore: Option<RestoreOutcome>,
}

impl SubResult {
    /// Creates a result with the default name and kind, size `0`.
    pub fn new(date: DateTime<Utc>, status: ResultStatus) -> Self {
        Self {
            date,
            status,
            name: DEFAULT_NAME.to_string(),
            size: 0,
            kind: DEFAULT_KIND.to_string(),
            reason: None,
            restore_point: None,
            restore: None,
        }
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the size in bytes.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Sets the kind tag.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Sets the failure reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the restore point id.
    pub fn with_restore_point(mut self, restore_point: impl Into<String>) -> Self {
        self.restore_point = Some(restore_point.into());
        self
    }

    /// Flattens the result into the stored key/value record.
    ///
    /// Keys: `date`, `status`, `name`, `size`, `type`, then when set `reason`,
    /// `restorePoint`, and for a merged restore `restore`, `restoreDate`,
    /// `restoreReason`.
    pub fn to_record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert("date".into(), self.date.format(DATE_FORMAT).to_string().into());
        record.insert("status".into(), self.status.as_str().into());
        record.insert("name".into(), self.name.clone().into());
        record.insert("size".into(), self.size.into());
        record.insert("type".into(), self.kind.clone().into());
        if let Some(reason) = &self.reason {
            record.insert("reason".into(), reason.clone().into());
        }
        if let Some(point) = &self.restore_point {
            record.insert("restorePoint".into(), point.clone().into());
        }
        if let Some(restore) = &self.restore {
            record.insert("restore".into(), restore.status.as_str().into());
            record.insert(
                "restoreDate".into(),
                restore.date.format(DATE_FORMAT).to_string().into(),
            );
            if let Some(reason) = &restore.reason {
                record.insert("restoreReason".into(), reason.clone().into());
            }
        }
        record
    }
}

/// Primary results for one entity ("backup outcome").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEnvelope {
    /// Entity the results belong to.
    pub entity: String,
    /// Results, in producer order.
    pub results: Vec<SubResult>,
}

impl ResultEnvelope {
    /// Creates an envelope.
    pub fn new(entity: impl Into<String>, results: Vec<SubResult>) -> Self {
        Self {
            entity: entity.into(),
            results,
        }
    }

    /// Stored records, in order.
    pub fn records(&self) -> Vec<Value> {
        self.results
            .iter()
            .map(|r| Value::Object(r.to_record()))
            .collect()
    }
}

/// Correlated secondary results for one entity ("restore outcome").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreEnvelope {
    /// Entity the restores belong to.
    pub entity: String,
    /// Restore outcomes.
    pub restores: Vec<RestoreOutcome>,
}

impl RestoreEnvelope {
    /// Creates an envelope.
    pub fn new(entity: impl Into<String>, restores: Vec<RestoreOutcome>) -> Self {
        Self {
            entity: entity.into(),
            restores,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_record_uses_stored_keys_and_format() {
        let date = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        let record = SubResult::new(date, ResultStatus::InProgress)
            .with_size(2048)
            .with_restore_point("rp-9")
            .to_record();

        assert_eq!(
            Value::Object(record),
            json!({
                "date": "2024/03/07 09:05:01 +0000",
                "status": "progress",
                "name": "defined_hour",
                "size": 2048,
                "type": "3",
                "restorePoint": "rp-9"
            })
        );
    }

    #[test]
    fn test_status_serde_matches_stored_names() {
        assert_eq!(serde_json::to_value(ResultStatus::Failed).unwrap(), json!("failed"));
        let parsed: ResultStatus = serde_json::from_value(json!("progress")).unwrap();
        assert_eq!(parsed, ResultStatus::InProgress);
    }
}
