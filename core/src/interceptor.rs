//! History interceptor for tracked entities
//!
//! Resolves the records a mutation is about to touch, reading them through
//! the mutation's own transaction, and captures their persisted state
//! before the mutation statement runs.

use crate::capture::SnapshotCapturer;
use crate::errors::{HistoryError, Result};
use crate::filter::Filter;
use crate::hooks::{HookContext, MutationHooks};
use crate::value::Record;

pub struct HistoryInterceptor {
    capturer: SnapshotCapturer,
}

impl HistoryInterceptor {
    pub fn new(capturer: SnapshotCapturer) -> Self {
        Self { capturer }
    }

    /// Snapshot the persisted row behind `record`, ignoring its pending values.
    fn capture_single(&self, ctx: &HookContext<'_>, record: &Record) -> Result<()> {
        let pk = match record.get(&ctx.schema.primary_key) {
            Some(pk) if !pk.is_null() => pk,
            _ => {
                return Err(HistoryError::schema(format!(
                    "cannot capture {} record without `{}`",
                    ctx.schema.name, ctx.schema.primary_key
                )));
            }
        };
        let persisted = ctx
            .scope
            .select(ctx.schema, &Filter::eq(&ctx.schema.primary_key, pk.clone()))?;
        self.capturer.capture_all(ctx.scope, &persisted)?;
        Ok(())
    }

    /// Materialize the affected set with the mutation's filter, then snapshot it.
    fn capture_matching(&self, ctx: &HookContext<'_>, filter: &Filter) -> Result<()> {
        let affected = ctx.scope.select(ctx.schema, filter)?;
        tracing::debug!(
            entity = %ctx.schema.name,
            affected = affected.len(),
            unrestricted = filter.is_unrestricted(),
            "resolved bulk affected set"
        );
        self.capturer.capture_all(ctx.scope, &affected)?;
        Ok(())
    }
}

impl MutationHooks for HistoryInterceptor {
    fn name(&self) -> &str {
        "history_interceptor"
    }

    fn before_update(&self, ctx: &HookContext<'_>, record: &Record) -> Result<()> {
        self.capture_single(ctx, record)
    }

    fn before_destroy(&self, ctx: &HookContext<'_>, record: &Record) -> Result<()> {
        self.capture_single(ctx, record)
    }

    fn before_bulk_update(
        &self,
        ctx: &HookContext<'_>,
        filter: &Filter,
        _changes: &Record,
    ) -> Result<()> {
        self.capture_matching(ctx, filter)
    }

    fn before_bulk_destroy(&self, ctx: &HookContext<'_>, filter: &Filter) -> Result<()> {
        self.capture_matching(ctx, filter)
    }
}
