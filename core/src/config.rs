//! revtrail configuration loading
//!
//! Loads configuration from `~/.config/revtrail/revtrail.toml` (or the path
//! in `REVTRAIL_CONFIG`). A missing file yields the defaults.

use crate::errors::{HistoryError, Result};
use crate::mirror::HistoryOptions;
use crate::schema::{EntitySchema, validate_identifier};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct RevtrailConfig {
    /// Path to the SQLite database (`:memory:` for a private in-memory db)
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Maximum pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a connection waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Naming of the mirror entities
    #[serde(default)]
    pub history: HistoryOptions,

    /// Entities to track
    #[serde(default, rename = "entity")]
    pub entities: Vec<EntitySchema>,
}

fn default_db_path() -> String {
    dirs::home_dir()
        .map(|h| {
            h.join(".config")
                .join("revtrail")
                .join("revtrail.db")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "revtrail.db".to_string())
}

fn default_pool_size() -> u32 {
    4
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for RevtrailConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            history: HistoryOptions::default(),
            entities: Vec::new(),
        }
    }
}

impl RevtrailConfig {
    pub const ENV_CONFIG_PATH: &'static str = "REVTRAIL_CONFIG";
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "revtrail.toml";

    /// Load from the resolved config path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::resolve_config_path();

        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "revtrail config not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HistoryError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: RevtrailConfig = toml::from_str(contents)
            .map_err(|e| HistoryError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("revtrail")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(HistoryError::config("pool_size must be at least 1"));
        }

        for field in [
            &self.history.revision_field,
            &self.history.archived_at_field,
        ] {
            validate_identifier(field).map_err(|e| {
                HistoryError::config_with_source("invalid [history] field name", e)
            })?;
        }
        if !self.history.suffix.is_empty()
            && !self
                .history
                .suffix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(HistoryError::config(format!(
                "invalid history suffix `{}`",
                self.history.suffix
            )));
        }

        for entity in &self.entities {
            entity.validate().map_err(|e| {
                HistoryError::config_with_source(format!("invalid entity `{}`", entity.name), e)
            })?;
        }

        Ok(())
    }

    /// Expand a leading `~/` in `db_path`.
    pub fn resolved_db_path(&self) -> PathBuf {
        let path = &self.db_path;
        if let Some(stripped) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(stripped);
        }
        PathBuf::from(path)
    }

    pub fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.iter().find(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    #[test]
    fn default_config() {
        let cfg = RevtrailConfig::default();
        assert_eq!(cfg.pool_size, 4);
        assert_eq!(cfg.history.suffix, "History");
        assert_eq!(cfg.history.revision_field, "hid");
        assert!(cfg.entities.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let cfg = RevtrailConfig::parse(
            r#"
            db_path = ":memory:"
            pool_size = 2

            [history]
            suffix = "_history"

            [[entity]]
            name = "users"
            primary_key = "id"

            [[entity.fields]]
            name = "id"
            type = "integer"
            auto_increment = true

            [[entity.fields]]
            name = "name"
            type = "text"
            "#,
        )
        .expect("parse");

        assert_eq!(cfg.pool_size, 2);
        assert_eq!(cfg.history.suffix, "_history");
        assert_eq!(cfg.history.archived_at_field, "archived_at");
        let users = cfg.entity("users").expect("users");
        assert_eq!(users.fields[1].ty, FieldType::Text);
        assert_eq!(cfg.resolved_db_path(), PathBuf::from(":memory:"));
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(RevtrailConfig::parse("pool_size = 0").is_err());
        assert!(RevtrailConfig::parse("[history]\nsuffix = \"-x\"").is_err());
        assert!(RevtrailConfig::parse("[history]\nrevision_field = \"1x\"").is_err());
        let err = RevtrailConfig::parse(
            r#"
            [[entity]]
            name = "users"
            primary_key = "missing"

            [[entity.fields]]
            name = "id"
            type = "integer"
            "#,
        )
        .expect_err("bad entity");
        assert_eq!(err.category(), crate::errors::ErrorCategory::Config);
    }

    #[test]
    fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("revtrail.toml");
        std::fs::write(&path, "busy_timeout_ms = 250\n").expect("write");
        let cfg = RevtrailConfig::load_from_path(&path).expect("load");
        assert_eq!(cfg.busy_timeout_ms, 250);
    }
}
