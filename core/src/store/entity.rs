//! Entity handles
//!
//! An `Entity` pairs a schema with the hooks attached to it. Handles are
//! cheap to clone and immutable: attaching hooks produces a new handle and
//! leaves the original untouched.

use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::filter::Filter;
use crate::hooks::{HookContext, MutationHooks};
use crate::schema::EntitySchema;
use crate::value::Record;

use super::Scope;

#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

struct EntityInner {
    schema: EntitySchema,
    hooks: Vec<Arc<dyn MutationHooks>>,
}

impl Entity {
    pub(crate) fn new(schema: EntitySchema) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                schema,
                hooks: Vec::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.schema.name
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.inner.schema
    }

    pub fn primary_key(&self) -> &str {
        &self.inner.schema.primary_key
    }

    /// Compose the existing hooks with `hooks`.
    ///
    /// Existing hooks keep running first, in their original order.
    pub fn with_hooks(&self, hooks: Arc<dyn MutationHooks>) -> Self {
        let mut all = self.inner.hooks.clone();
        all.push(hooks);
        Self {
            inner: Arc::new(EntityInner {
                schema: self.inner.schema.clone(),
                hooks: all,
            }),
        }
    }

    pub fn hook_names(&self) -> Vec<&str> {
        self.inner.hooks.iter().map(|h| h.name()).collect()
    }

    pub(crate) fn run_before_update(&self, scope: &Scope<'_>, record: &Record) -> Result<()> {
        let ctx = self.context(scope);
        self.inner
            .hooks
            .iter()
            .try_for_each(|h| h.before_update(&ctx, record))
    }

    pub(crate) fn run_before_destroy(&self, scope: &Scope<'_>, record: &Record) -> Result<()> {
        let ctx = self.context(scope);
        self.inner
            .hooks
            .iter()
            .try_for_each(|h| h.before_destroy(&ctx, record))
    }

    pub(crate) fn run_before_bulk_update(
        &self,
        scope: &Scope<'_>,
        filter: &Filter,
        changes: &Record,
    ) -> Result<()> {
        let ctx = self.context(scope);
        self.inner
            .hooks
            .iter()
            .try_for_each(|h| h.before_bulk_update(&ctx, filter, changes))
    }

    pub(crate) fn run_before_bulk_destroy(&self, scope: &Scope<'_>, filter: &Filter) -> Result<()> {
        let ctx = self.context(scope);
        self.inner
            .hooks
            .iter()
            .try_for_each(|h| h.before_bulk_destroy(&ctx, filter))
    }

    fn context<'a>(&'a self, scope: &'a Scope<'a>) -> HookContext<'a> {
        HookContext {
            scope,
            schema: &self.inner.schema,
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("name", &self.name())
            .field("hooks", &self.hook_names())
            .finish()
    }
}
