//! revtrail command line
//!
//! Opens the configured database, tracks every configured entity, and
//! runs one command against it.
//!
//! ## Commands
//!
//! - `revtrail sync` - Create tables and history mirrors for all entities
//! - `revtrail entities` - List tracked entities and their mirrors
//! - `revtrail insert|update|delete` - Mutate records (updates and deletes are captured)
//! - `revtrail history <entity> <id>` - Show captured revisions of one record
//! - `revtrail count <entity>` - Count live or history rows
//!
//! ## Exit Codes
//! - 0: Success
//! - 1: Usage, configuration or storage error
//! - 2: Attempted mutation of history rows
//! - 3: Snapshot capture failed (the mutation was rolled back)

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use revtrail_core::{
    EntitySchema, ErrorCategory, FieldType, Filter, HistoryError, Record, RevtrailConfig, Store,
    Tracked, Value, track_with,
};

/// revtrail: append-only revision history for SQLite records
#[derive(Debug, Parser)]
#[command(name = "revtrail", version)]
pub struct Cli {
    /// Config file (default: $REVTRAIL_CONFIG or ~/.config/revtrail/revtrail.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the configured database path
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create tables and history mirrors for every configured entity
    Sync,

    /// List configured entities and their history mirrors
    Entities {
        /// Output as JSON for automation
        #[arg(long)]
        json: bool,
    },

    /// Insert a record (`field=value` pairs)
    Insert(InsertArgs),

    /// Update one record by primary key
    Update(UpdateArgs),

    /// Delete one record by primary key
    Delete(RecordArgs),

    /// Show the captured revisions of one record, oldest first
    History(HistoryArgs),

    /// Count rows of an entity
    Count(CountArgs),
}

#[derive(Debug, Parser)]
pub struct InsertArgs {
    pub entity: String,

    /// Field assignments, e.g. `name=foo`
    #[arg(value_name = "FIELD=VALUE")]
    pub values: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct UpdateArgs {
    pub entity: String,
    pub id: String,

    /// Field assignments, e.g. `name=bar`
    #[arg(value_name = "FIELD=VALUE", required = true)]
    pub values: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct RecordArgs {
    pub entity: String,
    pub id: String,
}

#[derive(Debug, Parser)]
pub struct HistoryArgs {
    pub entity: String,
    pub id: String,

    /// Output as JSON for automation
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CountArgs {
    pub entity: String,

    /// Count history rows instead of live rows
    #[arg(long)]
    pub history: bool,
}

impl Cli {
    /// Run the command and return the process exit code.
    pub async fn run(self) -> i32 {
        match self.execute().await {
            Ok(()) => 0,
            Err(err) => {
                eprintln!("error: {err:#}");
                exit_code(&err)
            }
        }
    }

    async fn execute(self) -> anyhow::Result<()> {
        let cfg = self.load_config()?;
        let workspace = Workspace::open(&cfg).await?;

        match self.command {
            Command::Sync => {
                for tracked in workspace.tracked.values() {
                    println!("{} -> {}", tracked.entity().name(), tracked.history().name());
                }
                println!("{} entities tracked", workspace.tracked.len());
            }
            Command::Entities { json } => print_entities(&workspace, json)?,
            Command::Insert(args) => {
                let tracked = workspace.get(&args.entity)?;
                let record = parse_assignments(tracked.entity().schema(), &args.values)?;
                let created = workspace.store.create(tracked.entity(), record).await?;
                println!("{}", serde_json::to_string(&created)?);
            }
            Command::Update(args) => {
                let tracked = workspace.get(&args.entity)?;
                let schema = tracked.entity().schema();
                let mut record = parse_assignments(schema, &args.values)?;
                record.set(schema.primary_key.as_str(), parse_key(schema, &args.id)?);
                let changed = workspace.store.update(tracked.entity(), record).await?;
                println!("{changed} row(s) updated");
            }
            Command::Delete(args) => {
                let tracked = workspace.get(&args.entity)?;
                let schema = tracked.entity().schema();
                let record = Record::new().with(schema.primary_key.as_str(), parse_key(schema, &args.id)?);
                let deleted = workspace.store.destroy(tracked.entity(), record).await?;
                println!("{deleted} row(s) deleted");
            }
            Command::History(args) => {
                let tracked = workspace.get(&args.entity)?;
                let pk = parse_key(tracked.entity().schema(), &args.id)?;
                let revisions = tracked.history_for(&workspace.store, pk).await?;
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&revisions)?);
                } else if revisions.is_empty() {
                    println!("no history for {} {}", args.entity, args.id);
                } else {
                    for rev in &revisions {
                        let fields: Vec<String> = rev
                            .values
                            .iter()
                            .map(|(name, value)| format!("{name}={value}"))
                            .collect();
                        println!(
                            "#{} {} {}",
                            rev.revision,
                            rev.archived_at.to_rfc3339(),
                            fields.join(" ")
                        );
                    }
                }
            }
            Command::Count(args) => {
                let tracked = workspace.get(&args.entity)?;
                let entity = if args.history {
                    tracked.history()
                } else {
                    tracked.entity()
                };
                let count = workspace.store.count(entity, Filter::all()).await?;
                println!("{count}");
            }
        }

        Ok(())
    }

    fn load_config(&self) -> anyhow::Result<RevtrailConfig> {
        let mut cfg = match &self.config {
            Some(path) => RevtrailConfig::load_from_path(path)?,
            None => RevtrailConfig::load()?,
        };
        if let Some(db) = &self.db {
            cfg.db_path = db.clone();
        }
        Ok(cfg)
    }
}

/// An open store with every configured entity tracked.
struct Workspace {
    store: Store,
    tracked: BTreeMap<String, Tracked>,
}

impl Workspace {
    async fn open(cfg: &RevtrailConfig) -> anyhow::Result<Self> {
        let store = Store::open(cfg)
            .with_context(|| format!("failed to open {}", cfg.resolved_db_path().display()))?;

        let mut tracked = BTreeMap::new();
        for schema in &cfg.entities {
            let entity = store.define(schema.clone()).await?;
            let handle = track_with(&store, entity, cfg.history.clone()).await?;
            tracked.insert(schema.name.clone(), handle);
        }
        tracing::debug!(entities = tracked.len(), "workspace ready");

        Ok(Self { store, tracked })
    }

    fn get(&self, name: &str) -> anyhow::Result<&Tracked> {
        self.tracked
            .get(name)
            .ok_or_else(|| anyhow!("unknown entity `{name}`"))
    }
}

fn print_entities(workspace: &Workspace, json: bool) -> anyhow::Result<()> {
    if json {
        let entries: Vec<serde_json::Value> = workspace
            .tracked
            .values()
            .map(|t| {
                serde_json::json!({
                    "entity": t.entity().name(),
                    "history": t.history().name(),
                    "primary_key": t.entity().primary_key(),
                    "fields": t.entity().schema().field_names().collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for t in workspace.tracked.values() {
        let fields: Vec<&str> = t.entity().schema().field_names().collect();
        println!(
            "{} (key {}) -> {} [{}]",
            t.entity().name(),
            t.entity().primary_key(),
            t.history().name(),
            fields.join(", ")
        );
    }
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<HistoryError>().map(HistoryError::category) {
        Some(ErrorCategory::Immutability) => 2,
        Some(ErrorCategory::Snapshot) => 3,
        _ => 1,
    }
}

/// Parse `field=value` pairs against the entity's field types.
pub fn parse_assignments(schema: &EntitySchema, pairs: &[String]) -> anyhow::Result<Record> {
    let mut record = Record::new();
    for pair in pairs {
        let Some((name, raw)) = pair.split_once('=') else {
            bail!("expected FIELD=VALUE, got `{pair}`");
        };
        record.set(name, parse_field(schema, name, raw)?);
    }
    Ok(record)
}

fn parse_key(schema: &EntitySchema, raw: &str) -> anyhow::Result<Value> {
    parse_field(schema, &schema.primary_key, raw)
}

fn parse_field(schema: &EntitySchema, name: &str, raw: &str) -> anyhow::Result<Value> {
    let field = schema
        .field_def(name)
        .ok_or_else(|| anyhow!("{} has no field `{name}`", schema.name))?;
    if raw == "null" {
        return Ok(Value::Null);
    }

    let value = match field.ty {
        FieldType::Integer => Value::Integer(
            raw.parse()
                .with_context(|| format!("`{name}` expects an integer, got `{raw}`"))?,
        ),
        FieldType::Real => Value::Real(
            raw.parse()
                .with_context(|| format!("`{name}` expects a number, got `{raw}`"))?,
        ),
        FieldType::Boolean => match raw {
            "true" | "1" => Value::from(true),
            "false" | "0" => Value::from(false),
            _ => bail!("`{name}` expects true or false, got `{raw}`"),
        },
        FieldType::Text | FieldType::Timestamp => Value::from(raw),
        FieldType::Blob => Value::Blob(raw.as_bytes().to_vec()),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use revtrail_core::FieldDef;

    fn schema() -> EntitySchema {
        EntitySchema::new("users", "id")
            .field(FieldDef::new("id", FieldType::Integer))
            .field(FieldDef::new("name", FieldType::Text))
            .field(FieldDef::new("active", FieldType::Boolean))
            .field(FieldDef::new("score", FieldType::Real))
    }

    #[test]
    fn assignments_follow_field_types() {
        let pairs = vec![
            "name=a=b".to_string(),
            "active=true".to_string(),
            "score=1.5".to_string(),
            "id=null".to_string(),
        ];
        let record = parse_assignments(&schema(), &pairs).expect("parse");
        assert_eq!(record.get_str("name"), Some("a=b"));
        assert_eq!(record.get("active"), Some(&Value::Integer(1)));
        assert_eq!(record.get("score"), Some(&Value::Real(1.5)));
        assert_eq!(record.get("id"), Some(&Value::Null));
    }

    #[test]
    fn bad_assignments_are_rejected() {
        let s = schema();
        assert!(parse_assignments(&s, &["name".to_string()]).is_err());
        assert!(parse_assignments(&s, &["missing=1".to_string()]).is_err());
        assert!(parse_key(&s, "abc").is_err());
        assert_eq!(parse_key(&s, "42").expect("key"), Value::Integer(42));
    }

    #[test]
    fn exit_codes_follow_error_category() {
        let immutable = anyhow::Error::new(HistoryError::immutable("usersHistory", "update"));
        assert_eq!(exit_code(&immutable), 2);
        let other = anyhow!("unknown entity `x`");
        assert_eq!(exit_code(&other), 1);
    }
}
