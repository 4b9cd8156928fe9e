//! PostgreSQL store.
//!
//! Only compiled with the `postgres` feature.

use ability_rules::{Record, Value};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::config::StoreConfig;
use crate::error::SqlResult;
use crate::schema::{ColumnType, Model};
use crate::store::{Backend, Store};

/// PostgreSQL store backed by a sqlx pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using a configuration.
    #[tracing::instrument(skip(config))]
    pub async fn connect(config: &StoreConfig) -> SqlResult<Self> {
        config.validate()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size())
            .acquire_timeout(config.connect_timeout())
            .connect(&config.database_url)
            .await?;

        tracing::debug!("postgres pool created");
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> Backend {
        Backend::Postgres
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
        Ok(i64::from(row.try_get::<i32, _>(0)?))
    }
}

// Integer columns are created as `integer` (int4) by the table builder.
fn decode_row(row: &PgRow, model: &Model) -> SqlResult<Record> {
    let mut record = Record::new(model.name.clone());
    for column in model.columns() {
        let name = column.name.as_str();
        let raw = match &column.ty {
            ColumnType::Integer | ColumnType::Enum(_) => {
                Value::from(row.try_get::<Option<i32>, _>(name)?.map(i64::from))
            }
            ColumnType::Float => Value::from(row.try_get::<Option<f64>, _>(name)?),
            ColumnType::Text => Value::from(row.try_get::<Option<String>, _>(name)?),
            ColumnType::Boolean => Value::from(row.try_get::<Option<bool>, _>(name)?),
        };
        record.set(name, column.decode(raw));
    }
    Ok(record)
}
