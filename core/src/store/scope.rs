//! Transaction-bound operations
//!
//! A `Scope` wraps a connection that is already inside a transaction. All
//! mutations run the entity's before-hooks first, on the same connection
//! and under one savepoint with the mutation statement, so hook side
//! effects commit or roll back together with the mutation.

use rusqlite::{Connection, params_from_iter};

use super::entity::Entity;
use super::transactions::execute_in_savepoint;
use crate::errors::{HistoryError, Result};
use crate::filter::Filter;
use crate::schema::{EntitySchema, quote_ident};
use crate::value::{Record, Value};

/// Wraps a mutation together with its hooks. A failed statement also
/// undoes whatever the hooks wrote.
const MUTATION_SAVEPOINT: &str = "revtrail_mutation";

pub struct Scope<'c> {
    conn: &'c Connection,
}

impl<'c> Scope<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn find_all(&self, entity: &Entity, filter: &Filter) -> Result<Vec<Record>> {
        self.select(entity.schema(), filter)
    }

    pub fn find_by_pk(&self, entity: &Entity, pk: impl Into<Value>) -> Result<Option<Record>> {
        let filter = Filter::eq(entity.primary_key(), pk);
        Ok(self.select(entity.schema(), &filter)?.into_iter().next())
    }

    pub fn count(&self, entity: &Entity, filter: &Filter) -> Result<usize> {
        let schema = entity.schema();
        let (where_sql, params) = filter.to_sql(schema, 1)?;
        let sql = format!("SELECT COUNT(*) FROM {}{where_sql}", quote_ident(&schema.name));
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Read persisted rows, bypassing hooks. Rows come back in primary key order.
    pub(crate) fn select(&self, schema: &EntitySchema, filter: &Filter) -> Result<Vec<Record>> {
        let (where_sql, params) = filter.to_sql(schema, 1)?;
        let names: Vec<&str> = schema.field_names().collect();
        let columns: Vec<String> = names.iter().map(|n| quote_ident(n)).collect();
        let sql = format!(
            "SELECT {} FROM {}{where_sql} ORDER BY {}",
            columns.join(", "),
            quote_ident(&schema.name),
            quote_ident(&schema.primary_key)
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            let mut record = Record::new();
            for (idx, name) in names.iter().enumerate() {
                record.set(*name, row.get::<_, Value>(idx)?);
            }
            Ok(record)
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────────

    /// Insert a record and return it as persisted (defaults and generated
    /// primary key filled in). Creation runs no hooks.
    pub fn create(&self, entity: &Entity, record: &Record) -> Result<Record> {
        let rowid = self.insert(entity.schema(), record)?;
        let pk = record
            .get(entity.primary_key())
            .cloned()
            .unwrap_or(Value::Integer(rowid));

        self.find_by_pk(entity, pk)?.ok_or_else(|| {
            HistoryError::Transaction(format!(
                "inserted {} row {rowid} is not readable",
                entity.name()
            ))
        })
    }

    /// Hook-free insert. Returns the SQLite rowid.
    pub(crate) fn insert(&self, schema: &EntitySchema, record: &Record) -> Result<i64> {
        let mut columns = Vec::with_capacity(record.len());
        let mut params = Vec::with_capacity(record.len());
        for (name, value) in record.iter() {
            schema.require_field(name)?;
            columns.push(quote_ident(name));
            params.push(value);
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&schema.name))
        } else {
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&schema.name),
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        self.conn.execute(&sql, params_from_iter(params))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Persist the non-key fields of `record` onto the row with its primary key.
    ///
    /// Returns the number of rows changed (0 if the record is not persisted).
    pub fn update(&self, entity: &Entity, record: &Record) -> Result<usize> {
        let schema = entity.schema();
        let pk = require_pk(entity, record)?;

        let changes: Record = record
            .iter()
            .filter(|(name, _)| *name != schema.primary_key)
            .map(|(name, value)| (name, value.clone()))
            .collect();
        if changes.is_empty() {
            return Ok(0);
        }
        for name in changes.names() {
            schema.require_field(name)?;
        }

        let filter = Filter::eq(&schema.primary_key, pk);
        let changed = self.savepoint(MUTATION_SAVEPOINT, || {
            entity.run_before_update(self, record)?;
            self.execute_update(schema, &filter, &changes)
        })?;
        tracing::debug!(entity = %entity.name(), changed, "update applied");
        Ok(changed)
    }

    /// Delete the row with the record's primary key.
    pub fn destroy(&self, entity: &Entity, record: &Record) -> Result<usize> {
        let schema = entity.schema();
        let pk = require_pk(entity, record)?;

        let filter = Filter::eq(&schema.primary_key, pk);
        let deleted = self.savepoint(MUTATION_SAVEPOINT, || {
            entity.run_before_destroy(self, record)?;
            self.execute_delete(schema, &filter)
        })?;
        tracing::debug!(entity = %entity.name(), deleted, "destroy applied");
        Ok(deleted)
    }

    /// Apply `changes` to every row matching `filter`.
    pub fn bulk_update(&self, entity: &Entity, filter: &Filter, changes: &Record) -> Result<usize> {
        let schema = entity.schema();
        if changes.is_empty() {
            return Ok(0);
        }
        for name in changes.names() {
            schema.require_field(name)?;
        }

        let changed = self.savepoint(MUTATION_SAVEPOINT, || {
            entity.run_before_bulk_update(self, filter, changes)?;
            self.execute_update(schema, filter, changes)
        })?;
        tracing::debug!(entity = %entity.name(), changed, "bulk update applied");
        Ok(changed)
    }

    /// Delete every row matching `filter`.
    pub fn bulk_destroy(&self, entity: &Entity, filter: &Filter) -> Result<usize> {
        let deleted = self.savepoint(MUTATION_SAVEPOINT, || {
            entity.run_before_bulk_destroy(self, filter)?;
            self.execute_delete(entity.schema(), filter)
        })?;
        tracing::debug!(entity = %entity.name(), deleted, "bulk destroy applied");
        Ok(deleted)
    }

    /// Delete every row. Hooks see an unrestricted bulk destroy.
    pub fn truncate(&self, entity: &Entity) -> Result<usize> {
        self.bulk_destroy(entity, &Filter::all())
    }

    /// Run `operation` under a savepoint of this scope's transaction.
    pub fn savepoint<T>(&self, name: &str, operation: impl FnOnce() -> Result<T>) -> Result<T> {
        crate::schema::validate_identifier(name)?;
        execute_in_savepoint(self.conn, name, operation)
    }

    fn execute_update(&self, schema: &EntitySchema, filter: &Filter, changes: &Record) -> Result<usize> {
        let mut params: Vec<Value> = Vec::with_capacity(changes.len());
        let mut assignments = Vec::with_capacity(changes.len());
        for (name, value) in changes.iter() {
            params.push(value.clone());
            assignments.push(format!("{} = ?{}", quote_ident(name), params.len()));
        }

        let (where_sql, where_params) = filter.to_sql(schema, params.len() + 1)?;
        params.extend(where_params);

        let sql = format!(
            "UPDATE {} SET {}{where_sql}",
            quote_ident(&schema.name),
            assignments.join(", ")
        );
        Ok(self.conn.execute(&sql, params_from_iter(params.iter()))?)
    }

    fn execute_delete(&self, schema: &EntitySchema, filter: &Filter) -> Result<usize> {
        let (where_sql, params) = filter.to_sql(schema, 1)?;
        let sql = format!("DELETE FROM {}{where_sql}", quote_ident(&schema.name));
        Ok(self.conn.execute(&sql, params_from_iter(params.iter()))?)
    }
}

fn require_pk(entity: &Entity, record: &Record) -> Result<Value> {
    match record.get(entity.primary_key()) {
        Some(pk) if !pk.is_null() => Ok(pk.clone()),
        _ => Err(HistoryError::schema(format!(
            "{} record has no `{}` value",
            entity.name(),
            entity.primary_key()
        ))),
    }
}
