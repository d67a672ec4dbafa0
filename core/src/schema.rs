//! Entity schemas
//!
//! An `EntitySchema` is an ordered list of field definitions plus the name
//! of the primary key field. Schemas render their own `CREATE TABLE` and
//! `CREATE INDEX` statements.

use crate::errors::{HistoryError, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Real,
    Text,
    Blob,
    /// Stored as INTEGER 0/1
    Boolean,
    /// Stored as RFC 3339 TEXT
    Timestamp,
}

impl FieldType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
            Self::Text | Self::Timestamp => "TEXT",
            Self::Blob => "BLOB",
        }
    }
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: FieldType,

    #[serde(default = "default_nullable")]
    pub nullable: bool,

    #[serde(default)]
    pub default: Option<Value>,

    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub indexed: bool,

    /// Only meaningful on an INTEGER primary key
    #[serde(default)]
    pub auto_increment: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            default: None,
            unique: false,
            indexed: false,
            auto_increment: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    pub primary_key: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Reject UPDATE and DELETE at the storage layer
    #[serde(default)]
    pub append_only: bool,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            fields: Vec::new(),
            append_only: false,
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn append_only(mut self) -> Self {
        self.append_only = true;
        self
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_def(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Fail with a schema error unless `name` is a declared field.
    pub(crate) fn require_field(&self, name: &str) -> Result<()> {
        if self.has_field(name) {
            Ok(())
        } else {
            Err(HistoryError::schema(format!(
                "unknown field `{name}` on {}",
                self.name
            )))
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;

        if self.fields.is_empty() {
            return Err(HistoryError::schema(format!(
                "{} declares no fields",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            validate_identifier(&field.name)?;
            if !seen.insert(field.name.as_str()) {
                return Err(HistoryError::schema(format!(
                    "duplicate field `{}` on {}",
                    field.name, self.name
                )));
            }
            if field.auto_increment
                && (field.name != self.primary_key || field.ty != FieldType::Integer)
            {
                return Err(HistoryError::schema(format!(
                    "`{}` on {}: auto_increment requires an INTEGER primary key",
                    field.name, self.name
                )));
            }
        }

        if !self.has_field(&self.primary_key) {
            return Err(HistoryError::schema(format!(
                "primary key `{}` is not a field of {}",
                self.primary_key, self.name
            )));
        }

        Ok(())
    }

    pub(crate) fn create_table_sql(&self) -> String {
        let columns: Vec<String> = self
            .fields
            .iter()
            .map(|field| {
                let mut column = format!("{} {}", quote_ident(&field.name), field.ty.sql_type());
                if field.name == self.primary_key {
                    column.push_str(" PRIMARY KEY");
                    if field.auto_increment {
                        column.push_str(" AUTOINCREMENT");
                    }
                } else if field.unique {
                    column.push_str(" UNIQUE");
                }
                if !field.nullable {
                    column.push_str(" NOT NULL");
                }
                if let Some(default) = &field.default {
                    column.push_str(" DEFAULT ");
                    column.push_str(&default.sql_literal());
                }
                column
            })
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            columns.join(", ")
        )
    }

    pub(crate) fn create_index_sql(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.indexed && f.name != self.primary_key)
            .map(|f| {
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    quote_ident(&format!("idx_{}_{}", self.name, f.name)),
                    quote_ident(&self.name),
                    quote_ident(&f.name)
                )
            })
            .collect()
    }

    /// Triggers that abort any UPDATE or DELETE on an append-only table.
    pub(crate) fn create_trigger_sql(&self) -> Vec<String> {
        if !self.append_only {
            return Vec::new();
        }
        ["UPDATE", "DELETE"]
            .into_iter()
            .map(|op| {
                format!(
                    "CREATE TRIGGER IF NOT EXISTS {} BEFORE {op} ON {} \
                     BEGIN SELECT RAISE(ABORT, '{} records are append-only'); END",
                    quote_ident(&format!("trg_{}_no_{}", self.name, op.to_lowercase())),
                    quote_ident(&self.name),
                    self.name
                )
            })
            .collect()
    }
}

/// Identifiers must match `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_identifier(ident: &str) -> Result<()> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(HistoryError::schema(format!("invalid identifier `{ident}`")))
    }
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{ident}\"")
}
