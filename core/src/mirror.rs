//! Mirror schema derivation
//!
//! A mirror schema copies every tracked field (names, types, defaults,
//! nullability), demotes the tracked primary key to a plain indexed field,
//! and adds an auto-assigned revision key plus a capture timestamp.

use serde::Deserialize;

use crate::errors::{HistoryError, Result};
use crate::schema::{EntitySchema, FieldDef, FieldType};

/// Naming of the mirror entity and its synthetic fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryOptions {
    /// Appended to the tracked entity name
    #[serde(default = "default_suffix")]
    pub suffix: String,

    /// Revision identifier (mirror primary key)
    #[serde(default = "default_revision_field")]
    pub revision_field: String,

    /// Capture timestamp
    #[serde(default = "default_archived_at_field")]
    pub archived_at_field: String,
}

fn default_suffix() -> String {
    "History".to_string()
}

fn default_revision_field() -> String {
    "hid".to_string()
}

fn default_archived_at_field() -> String {
    "archived_at".to_string()
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            suffix: default_suffix(),
            revision_field: default_revision_field(),
            archived_at_field: default_archived_at_field(),
        }
    }
}

impl HistoryOptions {
    pub fn mirror_name(&self, tracked: &str) -> String {
        format!("{tracked}{}", self.suffix)
    }
}

/// Derive the mirror schema of `tracked`.
pub fn mirror_schema(tracked: &EntitySchema, options: &HistoryOptions) -> Result<EntitySchema> {
    tracked.validate()?;

    if options.revision_field == options.archived_at_field {
        return Err(HistoryError::schema(format!(
            "revision and timestamp fields are both named `{}`",
            options.revision_field
        )));
    }
    for synthetic in [&options.revision_field, &options.archived_at_field] {
        if tracked.has_field(synthetic) {
            return Err(HistoryError::schema(format!(
                "{} already has a field named `{synthetic}`",
                tracked.name
            )));
        }
    }

    let mut mirror = EntitySchema::new(
        options.mirror_name(&tracked.name),
        options.revision_field.clone(),
    )
    .append_only()
    .field(
        FieldDef::new(options.revision_field.clone(), FieldType::Integer)
            .not_null()
            .auto_increment(),
    );

    for field in &tracked.fields {
        let mut copy = field.clone();
        // Several revisions may repeat any value, the old key included.
        copy.unique = false;
        copy.auto_increment = false;
        if copy.name == tracked.primary_key {
            copy.indexed = true;
        }
        mirror = mirror.field(copy);
    }

    mirror = mirror.field(
        FieldDef::new(options.archived_at_field.clone(), FieldType::Timestamp).not_null(),
    );

    mirror.validate()?;
    Ok(mirror)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn users() -> EntitySchema {
        EntitySchema::new("users", "id")
            .field(FieldDef::new("id", FieldType::Integer).auto_increment())
            .field(FieldDef::new("email", FieldType::Text).not_null().unique())
            .field(FieldDef::new("name", FieldType::Text).default_value("anon"))
    }

    #[test]
    fn mirror_demotes_key_and_adds_revision() {
        let mirror = mirror_schema(&users(), &HistoryOptions::default()).expect("mirror");

        assert_eq!(mirror.name, "usersHistory");
        assert_eq!(mirror.primary_key, "hid");
        assert_eq!(
            mirror.field_names().collect::<Vec<_>>(),
            vec!["hid", "id", "email", "name", "archived_at"]
        );

        let id = mirror.field_def("id").expect("id");
        assert!(id.indexed);
        assert!(!id.auto_increment);
        assert!(!id.unique);

        let email = mirror.field_def("email").expect("email");
        assert!(!email.unique);
        assert!(!email.nullable);

        assert_eq!(
            mirror.field_def("name").and_then(|f| f.default.clone()),
            Some(Value::from("anon"))
        );

        let hid = mirror.field_def("hid").expect("hid");
        assert!(hid.auto_increment);
        assert!(mirror.append_only);
        assert!(!users().append_only);
    }

    #[test]
    fn mirror_ddl_has_no_unique_constraints() {
        let mirror = mirror_schema(&users(), &HistoryOptions::default()).expect("mirror");
        let ddl = mirror.create_table_sql();
        assert!(ddl.contains("\"hid\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL"));
        assert!(!ddl.contains("UNIQUE"));
        assert_eq!(
            mirror.create_index_sql(),
            vec!["CREATE INDEX IF NOT EXISTS \"idx_usersHistory_id\" ON \"usersHistory\" (\"id\")"]
        );
    }

    #[test]
    fn custom_names_apply() {
        let options = HistoryOptions {
            suffix: "_revisions".into(),
            revision_field: "rev".into(),
            archived_at_field: "captured_at".into(),
        };
        let mirror = mirror_schema(&users(), &options).expect("mirror");
        assert_eq!(mirror.name, "users_revisions");
        assert_eq!(mirror.primary_key, "rev");
        assert!(mirror.has_field("captured_at"));
    }

    #[test]
    fn colliding_synthetic_field_is_rejected() {
        let tracked = users().field(FieldDef::new("hid", FieldType::Integer));
        let err = mirror_schema(&tracked, &HistoryOptions::default()).expect_err("collision");
        assert!(err.to_string().contains("hid"));
    }
}
