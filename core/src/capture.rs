//! Snapshot capture
//!
//! Writes one history row per record, inside the caller's transaction.
//! A batch runs under its own savepoint, so a failed batch leaves no rows
//! behind even if the caller keeps its transaction open.

use chrono::Utc;

use crate::errors::{HistoryError, Result};
use crate::mirror::HistoryOptions;
use crate::store::{Entity, Scope};
use crate::value::{Record, Value};

const CAPTURE_SAVEPOINT: &str = "revtrail_capture";

pub struct SnapshotCapturer {
    mirror: Entity,
    source_fields: Vec<String>,
    archived_at_field: String,
}

impl SnapshotCapturer {
    /// `source_fields` are the tracked entity's fields, copied verbatim into
    /// each history row.
    pub fn new(mirror: Entity, source_fields: Vec<String>, options: &HistoryOptions) -> Self {
        Self {
            mirror,
            source_fields,
            archived_at_field: options.archived_at_field.clone(),
        }
    }

    pub fn mirror(&self) -> &Entity {
        &self.mirror
    }

    /// Insert one history row per record. Returns the number written.
    pub fn capture_all(&self, scope: &Scope<'_>, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let archived_at = Value::from(Utc::now());
        scope
            .savepoint(CAPTURE_SAVEPOINT, || {
                for record in records {
                    let row = self.history_row(record, archived_at.clone());
                    scope.insert(self.mirror.schema(), &row)?;
                }
                Ok(records.len())
            })
            .map_err(|e| HistoryError::snapshot(self.mirror.name(), e))
            .inspect(|written| {
                tracing::debug!(entity = %self.mirror.name(), written, "captured snapshots");
            })
            .inspect_err(|e| {
                tracing::warn!(entity = %self.mirror.name(), error = %e, "snapshot capture failed");
            })
    }

    fn history_row(&self, record: &Record, archived_at: Value) -> Record {
        let mut row: Record = self
            .source_fields
            .iter()
            .map(|name| (name.as_str(), record.get(name).cloned().unwrap_or(Value::Null)))
            .collect();
        row.set(self.archived_at_field.as_str(), archived_at);
        row
    }
}
