//! SQLite-backed record store
//!
//! Provides:
//! - A per-store entity catalog (schema registration)
//! - Async CRUD, each call wrapped in its own implicit transaction
//! - Caller-owned transactions via [`Store::transaction`]

pub mod connection;
pub mod entity;
pub mod scope;
pub mod transactions;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use rusqlite::TransactionBehavior;

use crate::config::RevtrailConfig;
use crate::errors::{HistoryError, Result};
use crate::filter::Filter;
use crate::schema::EntitySchema;
use crate::value::{Record, Value};

pub use connection::SqlitePool;
pub use entity::Entity;
pub use scope::Scope;
use transactions::{execute_in_transaction, with_connection};

/// Handle to a record store. Cheap to clone; clones share the pool and
/// the catalog.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    catalog: Arc<RwLock<BTreeMap<String, Entity>>>,
}

impl Store {
    /// Open the database configured in `cfg`.
    pub fn open(cfg: &RevtrailConfig) -> Result<Self> {
        let path = cfg.resolved_db_path();
        if path.as_os_str() == ":memory:" {
            return Self::open_in_memory();
        }
        Self::open_path(
            &path,
            cfg.pool_size,
            Duration::from_millis(cfg.busy_timeout_ms),
        )
    }

    pub fn open_path(path: &Path, pool_size: u32, busy_timeout: Duration) -> Result<Self> {
        let pool = connection::initialize_pool(path, pool_size, busy_timeout)?;
        Ok(Self::from_pool(pool))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_pool(connection::initialize_memory_pool()?))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            catalog: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────────────

    /// Register a schema and create its table (and indexes) if missing.
    ///
    /// Each entity name can be defined once per store.
    pub async fn define(&self, schema: EntitySchema) -> Result<Entity> {
        schema.validate()?;
        if self.entity(&schema.name).is_some() {
            return Err(HistoryError::schema(format!(
                "entity {} is already defined",
                schema.name
            )));
        }

        let mut ddl = vec![schema.create_table_sql()];
        ddl.extend(schema.create_index_sql());
        ddl.extend(schema.create_trigger_sql());
        with_connection(&self.pool, move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                for stmt in &ddl {
                    tx.execute_batch(stmt)?;
                }
                Ok(())
            })
        })
        .await?;

        let entity = Entity::new(schema);
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        if catalog.contains_key(entity.name()) {
            return Err(HistoryError::schema(format!(
                "entity {} is already defined",
                entity.name()
            )));
        }
        catalog.insert(entity.name().to_string(), entity.clone());

        tracing::debug!(entity = %entity.name(), "entity defined");
        Ok(entity)
    }

    /// Replace the catalog entry of an already-defined entity with a
    /// decorated handle (same schema, more hooks).
    pub fn install(&self, entity: &Entity) -> Result<()> {
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        match catalog.get(entity.name()) {
            Some(existing) if existing.schema() == entity.schema() => {
                catalog.insert(entity.name().to_string(), entity.clone());
                Ok(())
            }
            Some(_) => Err(HistoryError::schema(format!(
                "entity {} is registered with a different schema",
                entity.name()
            ))),
            None => Err(HistoryError::schema(format!(
                "entity {} is not defined",
                entity.name()
            ))),
        }
    }

    /// Look up a registered entity by name.
    pub fn entity(&self, name: &str) -> Option<Entity> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn entity_names(&self) -> Vec<String> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Transactions
    // ─────────────────────────────────────────────────────────────────────────────

    /// Run `f` inside a caller-owned transaction.
    ///
    /// Every operation issued through the `Scope` joins this transaction,
    /// hooks included. Commits when `f` returns `Ok`, rolls everything back
    /// otherwise.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Scope<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        with_connection(&self.pool, move |conn| {
            execute_in_transaction(conn, TransactionBehavior::Immediate, |tx| {
                f(&Scope::new(tx))
            })
        })
        .await
    }

    async fn read<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Scope<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        with_connection(&self.pool, move |conn| f(&Scope::new(conn))).await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Single-call operations (implicit transaction)
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn create(&self, entity: &Entity, record: Record) -> Result<Record> {
        let entity = entity.clone();
        self.transaction(move |scope| scope.create(&entity, &record))
            .await
    }

    pub async fn update(&self, entity: &Entity, record: Record) -> Result<usize> {
        let entity = entity.clone();
        self.transaction(move |scope| scope.update(&entity, &record))
            .await
    }

    pub async fn destroy(&self, entity: &Entity, record: Record) -> Result<usize> {
        let entity = entity.clone();
        self.transaction(move |scope| scope.destroy(&entity, &record))
            .await
    }

    pub async fn bulk_update(&self, entity: &Entity, filter: Filter, changes: Record) -> Result<usize> {
        let entity = entity.clone();
        self.transaction(move |scope| scope.bulk_update(&entity, &filter, &changes))
            .await
    }

    pub async fn bulk_destroy(&self, entity: &Entity, filter: Filter) -> Result<usize> {
        let entity = entity.clone();
        self.transaction(move |scope| scope.bulk_destroy(&entity, &filter))
            .await
    }

    pub async fn truncate(&self, entity: &Entity) -> Result<usize> {
        let entity = entity.clone();
        self.transaction(move |scope| scope.truncate(&entity)).await
    }

    pub async fn find_all(&self, entity: &Entity, filter: Filter) -> Result<Vec<Record>> {
        let entity = entity.clone();
        self.read(move |scope| scope.find_all(&entity, &filter))
            .await
    }

    pub async fn find_by_pk(&self, entity: &Entity, pk: impl Into<Value>) -> Result<Option<Record>> {
        let entity = entity.clone();
        let pk = pk.into();
        self.read(move |scope| scope.find_by_pk(&entity, pk)).await
    }

    pub async fn count(&self, entity: &Entity, filter: Filter) -> Result<usize> {
        let entity = entity.clone();
        self.read(move |scope| scope.count(&entity, &filter)).await
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("entities", &self.entity_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookContext, MutationHooks};
    use crate::schema::{FieldDef, FieldType};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn items() -> EntitySchema {
        EntitySchema::new("items", "id")
            .field(FieldDef::new("id", FieldType::Integer).auto_increment())
            .field(FieldDef::new("label", FieldType::Text).not_null())
            .field(FieldDef::new("qty", FieldType::Integer).default_value(0))
    }

    #[derive(Default)]
    struct Counting {
        updates: AtomicUsize,
        bulk: AtomicUsize,
    }

    impl MutationHooks for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn before_update(&self, _ctx: &HookContext<'_>, _record: &Record) -> Result<()> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn before_bulk_destroy(&self, _ctx: &HookContext<'_>, _filter: &Filter) -> Result<()> {
            self.bulk.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn create_fills_defaults_and_key() {
        let store = Store::open_in_memory().expect("store");
        let items = store.define(items()).await.expect("define");

        let created = store
            .create(&items, Record::new().with("label", "bolt"))
            .await
            .expect("create");
        assert_eq!(created.get_i64("id"), Some(1));
        assert_eq!(created.get_i64("qty"), Some(0));
    }

    #[tokio::test]
    async fn define_twice_is_rejected() {
        let store = Store::open_in_memory().expect("store");
        store.define(items()).await.expect("define");
        let err = store.define(items()).await.expect_err("duplicate");
        assert!(err.to_string().contains("already defined"));
    }

    #[tokio::test]
    async fn hooks_compose_without_touching_original() {
        let store = Store::open_in_memory().expect("store");
        let plain = store.define(items()).await.expect("define");
        let hooks = Arc::new(Counting::default());
        let hooked = plain.with_hooks(hooks.clone());
        assert!(plain.hook_names().is_empty());
        assert_eq!(hooked.hook_names(), vec!["counting"]);

        let row = store
            .create(&plain, Record::new().with("label", "nut"))
            .await
            .expect("create");

        store
            .update(&plain, row.clone().with("qty", 3))
            .await
            .expect("update");
        assert_eq!(hooks.updates.load(Ordering::SeqCst), 0);

        store
            .update(&hooked, row.with("qty", 4))
            .await
            .expect("update");
        assert_eq!(hooks.updates.load(Ordering::SeqCst), 1);

        store.truncate(&hooked).await.expect("truncate");
        assert_eq!(hooks.bulk.load(Ordering::SeqCst), 1);
        assert_eq!(store.count(&plain, Filter::all()).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn install_replaces_catalog_entry() {
        let store = Store::open_in_memory().expect("store");
        let plain = store.define(items()).await.expect("define");
        let hooked = plain.with_hooks(Arc::new(Counting::default()));
        store.install(&hooked).expect("install");
        let looked_up = store.entity("items").expect("registered");
        assert_eq!(looked_up.hook_names(), vec!["counting"]);

        let stranger = Entity::new(EntitySchema::new("ghost", "id"));
        assert!(store.install(&stranger).is_err());
    }

    #[tokio::test]
    async fn caller_transaction_rolls_back_on_error() {
        let store = Store::open_in_memory().expect("store");
        let items = store.define(items()).await.expect("define");

        let handle = items.clone();
        let result: Result<()> = store
            .transaction(move |scope| {
                scope.create(&handle, &Record::new().with("label", "washer"))?;
                Err(HistoryError::Transaction("abort".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.count(&items, Filter::all()).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn update_without_key_is_rejected() {
        let store = Store::open_in_memory().expect("store");
        let items = store.define(items()).await.expect("define");
        let err = store
            .update(&items, Record::new().with("label", "x"))
            .await
            .expect_err("no pk");
        assert_eq!(err.category(), crate::errors::ErrorCategory::Schema);
    }
}
