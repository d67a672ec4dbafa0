//! Read-only guard for mirror entities
//!
//! Rejects every update and destroy, single or bulk. Inserts are not
//! hooked, so the snapshot capturer can still write history rows.

use crate::errors::{HistoryError, Result};
use crate::filter::Filter;
use crate::hooks::{HookContext, MutationHooks};
use crate::value::Record;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReadOnlyGuard;

impl ReadOnlyGuard {
    fn reject(ctx: &HookContext<'_>, operation: &'static str) -> Result<()> {
        tracing::warn!(
            entity = %ctx.schema.name,
            operation,
            "rejected mutation of history records"
        );
        Err(HistoryError::immutable(ctx.schema.name.clone(), operation))
    }
}

impl MutationHooks for ReadOnlyGuard {
    fn name(&self) -> &str {
        "read_only_guard"
    }

    fn before_update(&self, ctx: &HookContext<'_>, _record: &Record) -> Result<()> {
        Self::reject(ctx, "update")
    }

    fn before_destroy(&self, ctx: &HookContext<'_>, _record: &Record) -> Result<()> {
        Self::reject(ctx, "destroy")
    }

    fn before_bulk_update(
        &self,
        ctx: &HookContext<'_>,
        _filter: &Filter,
        _changes: &Record,
    ) -> Result<()> {
        Self::reject(ctx, "bulk update")
    }

    fn before_bulk_destroy(&self, ctx: &HookContext<'_>, _filter: &Filter) -> Result<()> {
        Self::reject(ctx, "bulk destroy")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntitySchema, FieldDef, FieldType};
    use crate::store::Store;
    use std::sync::Arc;

    fn notes() -> EntitySchema {
        EntitySchema::new("notes", "id")
            .field(FieldDef::new("id", FieldType::Integer).auto_increment())
            .field(FieldDef::new("body", FieldType::Text))
    }

    #[tokio::test]
    async fn inserts_pass_and_mutations_fail() {
        let store = Store::open_in_memory().expect("store");
        let notes = store
            .define(notes())
            .await
            .expect("define")
            .with_hooks(Arc::new(ReadOnlyGuard));

        let row = store
            .create(&notes, Record::new().with("body", "kept"))
            .await
            .expect("create is not guarded");

        let err = store
            .update(&notes, row.clone().with("body", "changed"))
            .await
            .expect_err("update");
        assert!(matches!(
            err,
            HistoryError::ImmutabilityViolation { ref entity, operation: "update" } if entity == "notes"
        ));

        let err = store.destroy(&notes, row).await.expect_err("destroy");
        assert!(err.is_immutability_violation());

        let err = store
            .bulk_update(&notes, Filter::all(), Record::new().with("body", "x"))
            .await
            .expect_err("bulk update");
        assert!(err.is_immutability_violation());

        let err = store.truncate(&notes).await.expect_err("truncate");
        assert!(err.is_immutability_violation());

        let rows = store.find_all(&notes, Filter::all()).await.expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("body"), Some("kept"));
    }
}
