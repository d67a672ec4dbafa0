//! Before-mutation lifecycle hooks
//!
//! Hooks run inside the transaction of the operation that triggered them,
//! before the mutation statement executes. Returning an error aborts the
//! mutation and rolls back the enclosing transaction.

use crate::errors::Result;
use crate::filter::Filter;
use crate::schema::EntitySchema;
use crate::store::Scope;
use crate::value::Record;

/// What a hook sees of the operation that triggered it.
pub struct HookContext<'a> {
    /// Transaction-bound scope of the triggering operation
    pub scope: &'a Scope<'a>,
    /// Schema of the entity being mutated
    pub schema: &'a EntitySchema,
}

/// Capability set attached to an entity.
///
/// Every method defaults to a no-op so implementors only override the
/// operations they care about.
pub trait MutationHooks: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// `record` carries the primary key and the pending (unsaved) values.
    fn before_update(&self, _ctx: &HookContext<'_>, _record: &Record) -> Result<()> {
        Ok(())
    }

    fn before_destroy(&self, _ctx: &HookContext<'_>, _record: &Record) -> Result<()> {
        Ok(())
    }

    /// `filter` is the exact filter the bulk update will use.
    fn before_bulk_update(
        &self,
        _ctx: &HookContext<'_>,
        _filter: &Filter,
        _changes: &Record,
    ) -> Result<()> {
        Ok(())
    }

    fn before_bulk_destroy(&self, _ctx: &HookContext<'_>, _filter: &Filter) -> Result<()> {
        Ok(())
    }
}
