//! # Accessible queries
//!
//! An [`AccessibleQuery`] selects the records of one model that an ability
//! permits an action on. Further filters, ordering, paging and eager loading
//! compose with the permission filter without changing which records
//! qualify.
//!
//! ```text
//! SELECT "parents"."id" FROM "parents"
//! WHERE EXISTS(SELECT "children_1"."id" FROM "children" AS "children_1"
//!               WHERE "children_1"."parent_id" = "parents"."id" AND ...)
//!   AND (NOT EXISTS(...))
//! ```

use ability_rules::{Ability, Action, Conditions, Record};
use sea_query::{Alias, Expr, Query, SelectStatement};

use crate::database::{select_columns, Database};
use crate::error::SqlResult;
use crate::loader::{self, Include};
use crate::schema::{Model, SortOrder};
use crate::store::Backend;
use crate::translator::{Filter, Translator};

/// Builder for the accessible records of a model.
#[derive(Debug, Clone)]
pub struct AccessibleQuery<'a> {
    db: &'a Database,
    model: &'a Model,
    permitted: Filter,
    aliases: usize,
    filters: Vec<Conditions>,
    order: Vec<(String, SortOrder)>,
    limit: Option<u64>,
    offset: Option<u64>,
    includes: Vec<String>,
}

impl<'a> AccessibleQuery<'a> {
    pub(crate) fn new(db: &'a Database, model: &'a Model, permitted: Filter, aliases: usize) -> Self {
        Self {
            db,
            model,
            permitted,
            aliases,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            includes: Vec::new(),
        }
    }

    /// The queried model.
    pub fn model(&self) -> &'a Model {
        self.model
    }

    /// Additionally require `conditions`.
    pub fn filter(mut self, conditions: Conditions) -> Self {
        self.filters.push(conditions);
        self
    }

    /// Order by a column of the model.
    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order.push((column.into(), order));
        self
    }

    /// Return at most `limit` records.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` records.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Eager load an association path such as `children` or `children.toys`.
    pub fn includes(mut self, path: impl Into<String>) -> Self {
        self.includes.push(path.into());
        self
    }

    /// Build the select statement.
    ///
    /// # Errors
    ///
    /// Unknown columns or associations in filters or ordering, and values
    /// that do not fit their columns.
    pub fn statement(&self) -> SqlResult<SelectStatement> {
        let mut translator = Translator::starting_at(self.db.schema(), self.aliases);
        let mut filter = self.permitted.clone();
        for conditions in &self.filters {
            filter = filter.and(translator.conditions(self.model, conditions)?);
        }

        let mut select = select_columns(self.model);
        if let Some(condition) = filter.into_condition() {
            select.cond_where(condition);
        }

        let table = Alias::new(self.model.table.as_str());
        for (column, order) in &self.order {
            self.model.column_named(column)?;
            select.order_by((table.clone(), Alias::new(column.as_str())), (*order).into());
        }

        match (self.limit, self.offset) {
            (Some(limit), _) => {
                select.limit(limit);
            }
            // SQLite only accepts OFFSET after a LIMIT
            (None, Some(_)) => {
                select.limit(i64::MAX as u64);
            }
            (None, None) => {}
        }
        if let Some(offset) = self.offset {
            select.offset(offset);
        }
        Ok(select)
    }

    /// SQL in the database's dialect.
    pub fn to_sql(&self) -> SqlResult<String> {
        self.to_sql_for(self.db.backend())
    }

    /// SQL in the given dialect.
    pub fn to_sql_for(&self, backend: Backend) -> SqlResult<String> {
        Ok(backend.select(&self.statement()?))
    }

    /// Fetch the records, with includes loaded.
    pub async fn fetch_all(&self) -> SqlResult<Vec<Record>> {
        let sql = self.to_sql()?;
        tracing::debug!(model = %self.model.name, sql = %sql, "fetching accessible records");
        let mut records = self.db.store().fetch_records(&sql, self.model).await?;

        if !self.includes.is_empty() {
            let includes = Include::parse_paths(&self.includes);
            loader::preload(self.db, self.model, &mut records, &includes).await?;
        }
        Ok(records)
    }

    /// Count the records, honouring limit and offset.
    pub async fn count(&self) -> SqlResult<i64> {
        let statement = Query::select()
            .expr(Expr::cust("COUNT(*)"))
            .from_subquery(self.statement()?, Alias::new("accessible"))
            .to_owned();
        let sql = self.db.backend().select(&statement);
        tracing::debug!(model = %self.model.name, sql = %sql, "counting accessible records");
        self.db.store().fetch_count(&sql).await
    }
}

/// `accessible_by` from the ability's side.
pub trait AccessibleBy {
    /// Query for the records of `model` this ability permits `action` on.
    fn accessible_records<'a>(
        &self,
        db: &'a Database,
        action: Action,
        model: &str,
    ) -> SqlResult<AccessibleQuery<'a>>;
}

impl AccessibleBy for Ability {
    fn accessible_records<'a>(
        &self,
        db: &'a Database,
        action: Action,
        model: &str,
    ) -> SqlResult<AccessibleQuery<'a>> {
        db.accessible_by(self, action, model)
    }
}
