//! # Ability SQL
//!
//! Turns the rules of an [`Ability`](ability_rules::Ability) into SQL, so the
//! records an ability permits can be listed, counted and paged in the
//! database rather than checked one by one.
//!
//! ## Overview
//!
//! The ability-sql crate handles:
//! - **Schema**: Models, columns (including enums) and associations
//! - **Translation**: Rules to null-safe `WHERE` conditions with `EXISTS` sub-selects
//! - **Accessible queries**: Filtering, ordering, paging, counting and eager loading
//! - **Stores**: SQLite (default) and PostgreSQL (`postgres` feature) via sqlx
//!
//! ## Usage
//!
//! ```rust
//! use ability_rules::{Ability, Action, Conditions, Record};
//! use ability_sql::{ColumnType, Database, Model, Schema, SqliteStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ability_sql::SqlError> {
//! let schema = Schema::new()
//!     .with_model(Model::new("Parent", "parents").has_many("children", "Child", "parent_id"))
//!     .with_model(
//!         Model::new("Child", "children")
//!             .belongs_to("parent", "Parent", "parent_id")
//!             .column("name", ColumnType::Text),
//!     );
//! let db = Database::new(SqliteStore::memory().await?, schema)?;
//! db.migrate().await?;
//!
//! let parent = db.create(Record::new("Parent")).await?;
//! let parent_id = parent.get("id").as_i64().unwrap_or_default();
//! db.create(Record::new("Child").with("parent_id", parent_id).with("name", "y")).await?;
//!
//! let mut ability = Ability::new();
//! ability.can(
//!     Action::Read,
//!     "Parent",
//!     Conditions::new().association("children", Conditions::new().eq("name", "y")),
//! );
//!
//! let parents = db.accessible_by(&ability, Action::Read, "Parent")?.fetch_all().await?;
//! assert_eq!(parents.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod accessible;
pub mod config;
pub mod database;
pub mod error;
pub mod loader;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod schema;
pub mod store;
pub mod translator;

// Re-export main types for convenience
pub use accessible::{AccessibleBy, AccessibleQuery};
pub use config::{ConfigError, StoreConfig};
pub use database::Database;
pub use error::{SqlError, SqlResult};
#[cfg(feature = "postgres")]
pub use postgres::PgStore;
pub use schema::{Association, Column, ColumnType, EnumMapping, Model, Schema, SortOrder};
pub use store::{Backend, SqliteStore, Store};
pub use translator::{Filter, Translator};
