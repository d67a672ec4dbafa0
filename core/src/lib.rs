//! Append-only revision history for SQLite-backed record stores
//!
//! Tracking an entity adds a mirror entity (`<name>History` by default)
//! and an interceptor on the tracked entity. Before every update or
//! destroy, single or bulk, the interceptor reads the rows about to change
//! through the mutation's own transaction and writes one history row per
//! record. History rows are insert-only: updates and destroys on the mirror
//! fail with [`HistoryError::ImmutabilityViolation`].
//!
//! ```rust,no_run
//! use revtrail_core::{EntitySchema, FieldDef, FieldType, Record, Store, track};
//!
//! # async fn example() -> revtrail_core::Result<()> {
//! let store = Store::open_in_memory()?;
//! let users = store
//!     .define(
//!         EntitySchema::new("users", "id")
//!             .field(FieldDef::new("id", FieldType::Integer).auto_increment())
//!             .field(FieldDef::new("name", FieldType::Text)),
//!     )
//!     .await?;
//! let users = track(&store, users).await?;
//!
//! let row = store.create(users.entity(), Record::new().with("name", "foo")).await?;
//! store.update(users.entity(), row.with("name", "bar")).await?;
//! assert_eq!(users.history_count(&store, 1).await?, 1);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod capture;
pub mod config;
pub mod errors;
pub mod filter;
pub mod guard;
pub mod hooks;
pub mod interceptor;
pub mod mirror;
pub mod schema;
pub mod store;
pub mod tracked;
pub mod value;

pub use capture::SnapshotCapturer;
pub use config::RevtrailConfig;
pub use errors::{ErrorCategory, HistoryError, Result};
pub use filter::{Filter, Op};
pub use guard::ReadOnlyGuard;
pub use hooks::{HookContext, MutationHooks};
pub use interceptor::HistoryInterceptor;
pub use mirror::{HistoryOptions, mirror_schema};
pub use schema::{EntitySchema, FieldDef, FieldType};
pub use store::{Entity, Scope, Store};
pub use tracked::{HistoryRecord, Tracked, track, track_with};
pub use value::{Record, Value};

/// revtrail version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
