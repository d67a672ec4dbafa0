//! Tracking entry point
//!
//! `track` derives and registers the mirror entity, guards it, and returns
//! the tracked entity decorated with the history interceptor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::capture::SnapshotCapturer;
use crate::errors::{HistoryError, Result};
use crate::filter::Filter;
use crate::guard::ReadOnlyGuard;
use crate::interceptor::HistoryInterceptor;
use crate::mirror::{HistoryOptions, mirror_schema};
use crate::store::{Entity, Store};
use crate::value::{Record, Value};

/// One captured revision of a tracked record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub revision: i64,
    pub archived_at: DateTime<Utc>,
    /// Field values as they were before the mutation
    pub values: Record,
}

/// A tracked entity together with its mirror.
#[derive(Debug, Clone)]
pub struct Tracked {
    entity: Entity,
    history: Entity,
    options: HistoryOptions,
}

/// Track `entity` with the default history naming (`<name>History`).
pub async fn track(store: &Store, entity: Entity) -> Result<Tracked> {
    track_with(store, entity, HistoryOptions::default()).await
}

pub async fn track_with(store: &Store, entity: Entity, options: HistoryOptions) -> Result<Tracked> {
    if store.entity(entity.name()).is_none() {
        return Err(HistoryError::schema(format!(
            "entity {} must be defined on this store before tracking",
            entity.name()
        )));
    }
    let mirror = mirror_schema(entity.schema(), &options)?;

    let history = store
        .define(mirror)
        .await?
        .with_hooks(Arc::new(ReadOnlyGuard));
    store.install(&history)?;

    let source_fields = entity.schema().field_names().map(str::to_string).collect();
    let capturer = SnapshotCapturer::new(history.clone(), source_fields, &options);
    let tracked = entity.with_hooks(Arc::new(HistoryInterceptor::new(capturer)));
    store.install(&tracked)?;

    tracing::info!(
        entity = %tracked.name(),
        history = %history.name(),
        "history tracking enabled"
    );

    Ok(Tracked {
        entity: tracked,
        history,
        options,
    })
}

impl Tracked {
    /// The tracked entity, with the interceptor installed.
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// The read-only mirror entity.
    pub fn history(&self) -> &Entity {
        &self.history
    }

    pub fn options(&self) -> &HistoryOptions {
        &self.options
    }

    /// All revisions of the record with primary key `pk`, oldest first.
    pub async fn history_for(
        &self,
        store: &Store,
        pk: impl Into<Value>,
    ) -> Result<Vec<HistoryRecord>> {
        let filter = Filter::eq(self.entity.primary_key(), pk);
        store
            .find_all(&self.history, filter)
            .await?
            .into_iter()
            .map(|row| self.decode(row))
            .collect()
    }

    pub async fn history_count(&self, store: &Store, pk: impl Into<Value>) -> Result<usize> {
        let filter = Filter::eq(self.entity.primary_key(), pk);
        store.count(&self.history, filter).await
    }

    fn decode(&self, mut row: Record) -> Result<HistoryRecord> {
        let revision = row
            .remove(&self.options.revision_field)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| HistoryError::Decode("history row without revision id".to_string()))?;

        let archived_at = match row.remove(&self.options.archived_at_field) {
            Some(Value::Text(ts)) => DateTime::parse_from_rfc3339(&ts)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    HistoryError::Decode(format!("revision {revision}: bad timestamp `{ts}`: {e}"))
                })?,
            _ => {
                return Err(HistoryError::Decode(format!(
                    "revision {revision}: missing capture timestamp"
                )));
            }
        };

        Ok(HistoryRecord {
            revision,
            archived_at,
            values: row,
        })
    }
}
