//! # Database
//!
//! Pairs a [`Store`] with the [`Schema`] describing its tables. Creates the
//! tables, writes and reads records, follows associations and builds
//! accessible-record queries.

use ability_rules::{Ability, Action, Record};
use sea_query::{Alias, ColumnDef, Expr, Query, SelectStatement, SimpleExpr, Table};
use std::fmt;
use std::sync::Arc;

use crate::accessible::AccessibleQuery;
use crate::config::{StoreConfig, UrlScheme};
use crate::error::SqlResult;
use crate::loader::{self, Include};
use crate::schema::{ColumnType, Model, Schema};
use crate::store::{Backend, SqliteStore, Store};
use crate::translator::{Filter, Translator};

/// A store and its schema.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn Store>,
    schema: Arc<Schema>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.store.backend())
            .field("models", &self.schema.models().len())
            .finish()
    }
}

impl Database {
    /// Create a database after validating the schema.
    pub fn new<S: Store + 'static>(store: S, schema: Schema) -> SqlResult<Self> {
        Self::from_parts(Arc::new(store), Arc::new(schema))
    }

    /// Create a database from shared parts after validating the schema.
    pub fn from_parts(store: Arc<dyn Store>, schema: Arc<Schema>) -> SqlResult<Self> {
        schema.validate()?;
        Ok(Self { store, schema })
    }

    /// Connect to the database named by the configuration.
    pub async fn connect(config: &StoreConfig, schema: Schema) -> SqlResult<Self> {
        match config.scheme()? {
            UrlScheme::Sqlite => Self::new(SqliteStore::connect(config).await?, schema),
            #[cfg(feature = "postgres")]
            UrlScheme::Postgres => Self::new(crate::postgres::PgStore::connect(config).await?, schema),
            #[cfg(not(feature = "postgres"))]
            UrlScheme::Postgres => {
                Err(crate::config::ConfigError::UnsupportedUrl(config.database_url.clone()).into())
            }
        }
    }

    /// The schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The store.
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// The store's dialect.
    pub fn backend(&self) -> Backend {
        self.store.backend()
    }

    /// Create a table for every model, skipping existing ones.
    #[tracing::instrument(skip(self))]
    pub async fn migrate(&self) -> SqlResult<()> {
        let backend = self.backend();
        for model in self.schema.models() {
            let mut table = Table::create();
            table.table(Alias::new(model.table.as_str())).if_not_exists();
            for column in model.columns() {
                let mut definition = ColumnDef::new(Alias::new(column.name.as_str()));
                if column.name == model.primary_key {
                    definition.integer().not_null().auto_increment().primary_key();
                } else {
                    match column.ty {
                        ColumnType::Integer | ColumnType::Enum(_) => definition.integer(),
                        ColumnType::Float => definition.double(),
                        ColumnType::Text => definition.text(),
                        ColumnType::Boolean => definition.boolean(),
                    };
                }
                table.col(&mut definition);
            }
            self.store.execute(&backend.create_table(&table)).await?;
            tracing::debug!(table = %model.table, "table ready");
        }
        Ok(())
    }

    /// Insert a record, returning it with its primary key set.
    ///
    /// Fields must be columns of the record's model. Enum fields may be given
    /// as names or stored integers and come back as names.
    #[tracing::instrument(skip(self, record), fields(model = %record.model))]
    pub async fn create(&self, mut record: Record) -> SqlResult<Record> {
        let model = self.schema.model(&record.model)?;

        let mut columns = Vec::new();
        let mut values: Vec<SimpleExpr> = Vec::new();
        for (name, value) in &record.fields {
            if *name == model.primary_key && value.is_null() {
                continue;
            }
            let column = model.column_named(name)?;
            columns.push(Alias::new(name.as_str()));
            values.push(column.encode(&model.name, value)?.into());
        }

        let mut statement = Query::insert();
        statement
            .into_table(Alias::new(model.table.as_str()))
            .returning_col(Alias::new(model.primary_key.as_str()));
        if columns.is_empty() {
            statement.or_default_values();
        } else {
            statement.columns(columns).values(values)?;
        }
        let sql = self.backend().insert(&statement);

        let id = self.store.insert_returning_id(&sql).await?;
        record.set(model.primary_key.clone(), id);
        for column in model.columns() {
            if let Some(value) = record.fields.get_mut(&column.name) {
                *value = column.decode(std::mem::take(value));
            }
        }
        Ok(record)
    }

    /// Fetch a record by primary key.
    pub async fn find(&self, model: &str, id: i64) -> SqlResult<Option<Record>> {
        let model = self.schema.model(model)?;
        let mut statement = select_columns(model);
        statement.and_where(
            Expr::col((
                Alias::new(model.table.as_str()),
                Alias::new(model.primary_key.as_str()),
            ))
            .eq(id),
        );
        let sql = self.backend().select(&statement);
        let mut records = self.store.fetch_records(&sql, model).await?;
        Ok(records.pop())
    }

    /// Load an association path (e.g. `children.toys`) onto a record.
    pub async fn load(&self, record: &mut Record, path: &str) -> SqlResult<()> {
        let model = self.schema.model(&record.model)?;
        let includes = Include::parse_paths([path]);
        loader::preload(self, model, std::slice::from_mut(record), &includes).await
    }

    /// Records associated with `record` through `association`, without
    /// attaching them.
    pub async fn related(&self, record: &Record, association: &str) -> SqlResult<Vec<Record>> {
        let model = self.schema.model(&record.model)?;
        let association = model.association_named(association)?;
        let hops = self.schema.resolve_path(model, association)?;
        let mut groups = loader::load_path(self, std::slice::from_ref(record), association, &hops).await?;
        Ok(groups.pop().unwrap_or_default())
    }

    /// Query for the records of `model` that `ability` permits `action` on.
    ///
    /// # Errors
    ///
    /// Unknown model, column, association or enum value in a relevant rule,
    /// and [`SqlError::UntranslatableRule`](crate::SqlError::UntranslatableRule)
    /// when a relevant rule uses a predicate.
    pub fn accessible_by(
        &self,
        ability: &Ability,
        action: Action,
        model: &str,
    ) -> SqlResult<AccessibleQuery<'_>> {
        let model = self.schema.model(model)?;
        let rules = ability.relevant_rules(action, &model.name);
        let mut translator = Translator::new(&self.schema);
        let filter = translator.rules(model, action, &rules)?;
        tracing::debug!(
            model = %model.name,
            %action,
            rules = rules.len(),
            "accessible filter compiled"
        );
        Ok(AccessibleQuery::new(self, model, filter, translator.aliases_used()))
    }

    /// Unrestricted query over every record of `model`.
    pub fn all(&self, model: &str) -> SqlResult<AccessibleQuery<'_>> {
        let model = self.schema.model(model)?;
        Ok(AccessibleQuery::new(self, model, Filter::All, 0))
    }
}

/// `SELECT <every column> FROM <table>`.
pub(crate) fn select_columns(model: &Model) -> SelectStatement {
    let table = Alias::new(model.table.as_str());
    Query::select()
        .columns(
            model
                .columns()
                .iter()
                .map(|column| (table.clone(), Alias::new(column.name.as_str()))),
        )
        .from(table.clone())
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::error::SqlError;
    use ability_rules::{Conditions, Value};

    fn schema() -> Schema {
        Schema::new()
            .with_model(
                Model::new("Parent", "parents")
                    .has_many("children", "Child", "parent_id")
                    .has_one("eldest", "Child", "parent_id"),
            )
            .with_model(
                Model::new("Child", "children")
                    .belongs_to("parent", "Parent", "parent_id")
                    .column("name", ColumnType::Text)
                    .enumeration("status", [("active", 0), ("archived", 1)]),
            )
    }

    async fn database() -> Database {
        let db = Database::new(SqliteStore::memory().await.unwrap(), schema()).unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let db = database().await;
        let parent = db.create(Record::new("Parent")).await.unwrap();
        let parent_id = parent.get("id").as_i64().unwrap();

        let child = db
            .create(
                Record::new("Child")
                    .with("parent_id", parent_id)
                    .with("name", "a")
                    .with("status", 1),
            )
            .await
            .unwrap();
        assert_eq!(child.get("status"), &Value::from("archived"));

        let found = db
            .find("Child", child.get("id").as_i64().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, child);
        assert!(db.find("Child", 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = database().await;
        db.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_column() {
        let db = database().await;
        let result = db.create(Record::new("Parent").with("nickname", "x")).await;
        assert!(matches!(result, Err(SqlError::UnknownColumn { .. })));
    }

    #[tokio::test]
    async fn test_load_and_related() {
        let db = database().await;
        let parent = db.create(Record::new("Parent")).await.unwrap();
        let id = parent.get("id").as_i64().unwrap();
        for name in ["a", "b"] {
            db.create(Record::new("Child").with("parent_id", id).with("name", name))
                .await
                .unwrap();
        }

        let mut loaded = parent.clone();
        db.load(&mut loaded, "children").await.unwrap();
        assert_eq!(loaded.related("children").len(), 2);

        db.load(&mut loaded, "eldest").await.unwrap();
        assert_eq!(loaded.related("eldest").len(), 1);
        assert_eq!(loaded.related("eldest")[0].get("name"), &Value::from("a"));

        let child = &loaded.related("children")[1];
        let parents = db.related(child, "parent").await.unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].get("id"), &Value::Int(id));
    }

    #[tokio::test]
    async fn test_empty_insert_escapes_identifiers() {
        let schema = Schema::new().with_model(Model::new("Odd", r#"odd"table"#));
        let db = Database::new(SqliteStore::memory().await.unwrap(), schema).unwrap();
        db.migrate().await.unwrap();

        let first = db.create(Record::new("Odd")).await.unwrap();
        let second = db.create(Record::new("Odd")).await.unwrap();
        assert_eq!(first.get("id"), &Value::Int(1));
        assert_eq!(second.get("id"), &Value::Int(2));
        assert_eq!(db.all("Odd").unwrap().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_has_one_resolves_to_first_child() {
        let db = database().await;
        let parent = db.create(Record::new("Parent")).await.unwrap();
        let id = parent.get("id").as_i64().unwrap();
        for name in ["a", "b"] {
            db.create(Record::new("Child").with("parent_id", id).with("name", name))
                .await
                .unwrap();
        }
        let mut loaded = parent.clone();
        db.load(&mut loaded, "eldest").await.unwrap();

        for (name, visible) in [("a", true), ("b", false)] {
            let mut ability = Ability::new();
            ability.can(
                Action::Read,
                "Parent",
                Conditions::new().association("eldest", Conditions::new().eq("name", name)),
            );
            let found = db
                .accessible_by(&ability, Action::Read, "Parent")
                .unwrap()
                .fetch_all()
                .await
                .unwrap();
            assert_eq!(found.len() == 1, visible, "eldest named {name}");
            assert_eq!(ability.permits(Action::Read, &loaded), visible, "eldest named {name}");
        }
    }

    #[tokio::test]
    async fn test_invalid_schema_is_rejected() {
        let store = SqliteStore::memory().await.unwrap();
        let schema = Schema::new()
            .with_model(Model::new("Parent", "parents").has_many("children", "Child", "parent_id"));
        assert!(matches!(
            Database::new(store, schema),
            Err(SqlError::UnknownModel(name)) if name == "Child"
        ));
    }

    #[tokio::test]
    async fn test_postgres_url_needs_feature() {
        if cfg!(feature = "postgres") {
            return;
        }
        let config = StoreConfig::new("postgres://localhost/ability");
        assert!(matches!(
            Database::connect(&config, schema()).await,
            Err(SqlError::Config(ConfigError::UnsupportedUrl(_)))
        ));
    }
}
