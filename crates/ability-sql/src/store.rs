//! # Stores
//!
//! A [`Store`] runs rendered SQL against a database and decodes rows into
//! [`Record`]s using the model's column types.
//!
//! | Backend  | Type          | Feature    |
//! |----------|---------------|------------|
//! | SQLite   | [`SqliteStore`] | default  |
//! | Postgres | `PgStore`     | `postgres` |

use ability_rules::{Record, Value};
use async_trait::async_trait;
use sea_query::{
    InsertStatement, PostgresQueryBuilder, SelectStatement, SqliteQueryBuilder,
    TableCreateStatement,
};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::str::FromStr;

use crate::config::{ConfigError, StoreConfig};
use crate::error::SqlResult;
use crate::schema::{ColumnType, Model};

/// SQL dialect of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// SQLite.
    Sqlite,
    /// PostgreSQL.
    Postgres,
}

impl Backend {
    /// Render a select statement.
    pub fn select(&self, statement: &SelectStatement) -> String {
        match self {
            Backend::Sqlite => statement.to_string(SqliteQueryBuilder),
            Backend::Postgres => statement.to_string(PostgresQueryBuilder),
        }
    }

    /// Render an insert statement.
    pub fn insert(&self, statement: &InsertStatement) -> String {
        match self {
            Backend::Sqlite => statement.to_string(SqliteQueryBuilder),
            Backend::Postgres => statement.to_string(PostgresQueryBuilder),
        }
    }

    /// Render a table definition.
    pub fn create_table(&self, statement: &TableCreateStatement) -> String {
        match self {
            Backend::Sqlite => statement.to_string(SqliteQueryBuilder),
            Backend::Postgres => statement.to_string(PostgresQueryBuilder),
        }
    }
}

/// Executes SQL and decodes records.
#[async_trait]
pub trait Store: Send + Sync {
    /// Dialect statements must be rendered in.
    fn backend(&self) -> Backend;

    /// Execute a statement, returning the number of affected rows.
    async fn execute(&self, sql: &str) -> SqlResult<u64>;

    /// Run a select whose columns are `model`'s columns.
    async fn fetch_records(&self, sql: &str, model: &Model) -> SqlResult<Vec<Record>>;

    /// Run a select returning a single integer.
    async fn fetch_count(&self, sql: &str) -> SqlResult<i64>;

    /// Run an insert returning the new primary key.
    async fn insert_returning_id(&self, sql: &str) -> SqlResult<i64>;
}

/// SQLite store backed by a sqlx pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect using a configuration.
    ///
    /// In-memory databases are kept on a single connection that is never
    /// recycled, so the data lives as long as the store.
    #[tracing::instrument(skip(config), fields(memory = config.is_memory()))]
    pub async fn connect(config: &StoreConfig) -> SqlResult<Self> {
        config.validate()?;
        let mut options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| ConfigError::InvalidValue {
                key: "ABILITY_DATABASE_URL".to_string(),
                message: e.to_string(),
            })?
            .create_if_missing(true);
        if !config.is_memory() {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.pool_size())
            .acquire_timeout(config.connect_timeout());
        if config.is_memory() {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        tracing::debug!("sqlite pool created");
        Ok(Self { pool })
    }

    /// Connect to a fresh in-memory database.
    pub async fn memory() -> SqlResult<Self> {
        Self::connect(&StoreConfig::default()).await
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    #[tracing::instrument(skip(self))]
    async fn execute(&self, sql: &str) -> SqlResult<u64> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self, model), fields(model = %model.name))]
    async fn fetch_records(&self, sql: &str, model: &Model) -> SqlResult<Vec<Record>> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        tracing::debug!(rows = rows.len(), "records fetched");
        rows.iter().map(|row| decode_row(row, model)).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_count(&self, sql: &str) -> SqlResult<i64> {
        let row = sqlx::query(sql).fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    #[tracing::instrument(skip(self))]
    async fn insert_returning_id(&self, sql: &str) -> SqlResult<i64> {
        let row = sqlx::query(sql).fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }
}

fn decode_row(row: &SqliteRow, model: &Model) -> SqlResult<Record> {
    let mut record = Record::new(model.name.clone());
    for column in model.columns() {
        let name = column.name.as_str();
        let raw = match &column.ty {
            ColumnType::Integer | ColumnType::Enum(_) => {
                Value::from(row.try_get::<Option<i64>, _>(name)?)
            }
            ColumnType::Float => Value::from(row.try_get::<Option<f64>, _>(name)?),
            ColumnType::Text => Value::from(row.try_get::<Option<String>, _>(name)?),
            ColumnType::Boolean => Value::from(row.try_get::<Option<bool>, _>(name)?),
        };
        record.set(name, column.decode(raw));
    }
    Ok(record)
}
