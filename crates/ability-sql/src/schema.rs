//! # Schema
//!
//! Describes the tables behind each model: columns, their types, and the
//! associations that conditions and includes may traverse.
//!
//! ```text
//! Parent (parents)            Child (children)
//!   id        integer   1 ─── *   id         integer
//!                                 parent_id  integer
//!                                 name       text
//! ```
//!
//! ```
//! use ability_sql::{ColumnType, Model, Schema, SortOrder};
//! use ability_sql::schema::Association;
//!
//! let schema = Schema::new()
//!     .with_model(
//!         Model::new("Parent", "parents").association(
//!             Association::has_many("children", "Child", "parent_id")
//!                 .ordered_by("id", SortOrder::Desc),
//!         ),
//!     )
//!     .with_model(
//!         Model::new("Child", "children")
//!             .belongs_to("parent", "Parent", "parent_id")
//!             .column("name", ColumnType::Text),
//!     );
//!
//! assert!(schema.validate().is_ok());
//! assert!(schema.model("Child").unwrap().find_column("parent_id").is_some());
//! ```

use ability_rules::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{SqlError, SqlResult};

/// Deepest chain of through-associations followed before giving up.
const MAX_THROUGH_DEPTH: usize = 8;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl From<SortOrder> for sea_query::Order {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Asc => sea_query::Order::Asc,
            SortOrder::Desc => sea_query::Order::Desc,
        }
    }
}

/// Names of an enum column and the integers they are stored as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMapping {
    variants: Vec<(String, i64)>,
}

impl EnumMapping {
    /// Explicit name/integer pairs.
    pub fn new<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self {
            variants: variants
                .into_iter()
                .map(|(name, stored)| (name.into(), stored))
                .collect(),
        }
    }

    /// Names stored as `0, 1, 2, ...` in the order given.
    pub fn sequential<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().zip(0_i64..))
    }

    /// Stored integer for a name.
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.variants
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, stored)| *stored)
    }

    /// Name for a stored integer.
    pub fn name_of(&self, stored: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, candidate)| *candidate == stored)
            .map(|(name, _)| name.as_str())
    }

    /// All names, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(|(name, _)| name.as_str())
    }
}

/// Column types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit integer.
    Integer,
    /// Double precision float.
    Float,
    /// Text.
    Text,
    /// Boolean.
    Boolean,
    /// Integer column exposed through names.
    Enum(EnumMapping),
}

impl ColumnType {
    /// Short type name for messages.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Enum(_) => "enum",
        }
    }
}

/// A model column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name (also the record field name).
    pub name: String,
    /// Column type.
    pub ty: ColumnType,
}

impl Column {
    /// Create a column.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Convert a record value into a query value for this column.
    ///
    /// # Errors
    ///
    /// [`SqlError::TypeMismatch`] when the value does not fit the column and
    /// [`SqlError::UnknownEnumValue`] for names (or integers) an enum column
    /// does not declare.
    pub fn encode(&self, model: &str, value: &Value) -> SqlResult<sea_query::Value> {
        match (&self.ty, value) {
            (_, Value::Null) => Ok(self.null()),
            (ColumnType::Integer, Value::Int(i)) => Ok((*i).into()),
            (ColumnType::Float, Value::Int(i)) => Ok((*i as f64).into()),
            (ColumnType::Float, Value::Float(f)) => Ok((*f).into()),
            (ColumnType::Text, Value::Text(s)) => Ok(s.clone().into()),
            (ColumnType::Boolean, Value::Bool(b)) => Ok((*b).into()),
            (ColumnType::Enum(mapping), Value::Text(name)) => mapping
                .value_of(name)
                .map(Into::into)
                .ok_or_else(|| self.unknown_enum_value(model, value)),
            (ColumnType::Enum(mapping), Value::Int(stored)) => mapping
                .name_of(*stored)
                .map(|_| (*stored).into())
                .ok_or_else(|| self.unknown_enum_value(model, value)),
            _ => Err(SqlError::TypeMismatch {
                model: model.to_string(),
                column: self.name.clone(),
                expected: self.ty.name(),
                found: value.to_string(),
            }),
        }
    }

    /// Convert a value read from the database into its record form.
    ///
    /// Enum integers become their names; unknown integers are kept as is.
    pub fn decode(&self, raw: Value) -> Value {
        match (&self.ty, raw) {
            (ColumnType::Enum(mapping), Value::Int(stored)) => mapping
                .name_of(stored)
                .map(Value::from)
                .unwrap_or(Value::Int(stored)),
            (_, raw) => raw,
        }
    }

    fn null(&self) -> sea_query::Value {
        match self.ty {
            ColumnType::Integer | ColumnType::Enum(_) => sea_query::Value::BigInt(None),
            ColumnType::Float => sea_query::Value::Double(None),
            ColumnType::Text => sea_query::Value::String(None),
            ColumnType::Boolean => sea_query::Value::Bool(None),
        }
    }

    fn unknown_enum_value(&self, model: &str, value: &Value) -> SqlError {
        SqlError::UnknownEnumValue {
            model: model.to_string(),
            column: self.name.clone(),
            value: value.to_string(),
        }
    }
}

/// How an association links two models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationKind {
    /// Target rows hold the owner's primary key in `foreign_key`.
    HasMany {
        /// Column on the target.
        foreign_key: String,
    },
    /// Like `HasMany`, at most one row.
    HasOne {
        /// Column on the target.
        foreign_key: String,
    },
    /// The owner holds the target's primary key in `foreign_key`.
    BelongsTo {
        /// Column on the owner.
        foreign_key: String,
    },
    /// Follows the owner's `through` association, then `source` on its target.
    Through {
        /// Association on the owner.
        through: String,
        /// Association on the intermediate model.
        source: String,
    },
}

/// A named association between two models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Name used in conditions and includes.
    pub name: String,
    /// Target model name.
    pub target: String,
    /// Link between owner and target.
    pub kind: AssociationKind,
    /// Ordering of loaded records; primary key ascending when empty.
    pub order: Vec<(String, SortOrder)>,
}

impl Association {
    fn build(name: impl Into<String>, target: impl Into<String>, kind: AssociationKind) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            kind,
            order: Vec::new(),
        }
    }

    /// Has-many association.
    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::build(
            name,
            target,
            AssociationKind::HasMany {
                foreign_key: foreign_key.into(),
            },
        )
    }

    /// Has-one association.
    pub fn has_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::build(
            name,
            target,
            AssociationKind::HasOne {
                foreign_key: foreign_key.into(),
            },
        )
    }

    /// Belongs-to association.
    pub fn belongs_to(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::build(
            name,
            target,
            AssociationKind::BelongsTo {
                foreign_key: foreign_key.into(),
            },
        )
    }

    /// Association through another association.
    pub fn through(
        name: impl Into<String>,
        target: impl Into<String>,
        through: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self::build(
            name,
            target,
            AssociationKind::Through {
                through: through.into(),
                source: source.into(),
            },
        )
    }

    /// Add an ordering column for loaded records.
    pub fn ordered_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order.push((column.into(), order));
        self
    }
}

/// A model and the table that stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    /// Model name used in rules and records.
    pub name: String,
    /// Table name.
    pub table: String,
    /// Integer primary key column.
    pub primary_key: String,
    columns: Vec<Column>,
    associations: Vec<Association>,
}

impl Model {
    /// Create a model with an `id` primary key.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: "id".to_string(),
            columns: vec![Column::new("id", ColumnType::Integer)],
            associations: Vec::new(),
        }
    }

    /// Rename the primary key column.
    pub fn with_primary_key(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if let Some(column) = self.columns.first_mut() {
            column.name = name.clone();
        }
        self.primary_key = name;
        self
    }

    /// Add a column.
    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(Column::new(name, ty));
        self
    }

    /// Add an enum column with explicit stored integers.
    pub fn enumeration<I, S>(self, name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        self.column(name, ColumnType::Enum(EnumMapping::new(variants)))
    }

    /// Add an association.
    pub fn association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    /// Add a has-many association.
    pub fn has_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.association(Association::has_many(name, target, foreign_key))
    }

    /// Add a has-one association.
    pub fn has_one(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.association(Association::has_one(name, target, foreign_key))
    }

    /// Add a belongs-to association, adding the integer foreign key column
    /// unless it is already declared.
    pub fn belongs_to(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        let foreign_key = foreign_key.into();
        if self.find_column(&foreign_key).is_none() {
            self.columns
                .push(Column::new(foreign_key.clone(), ColumnType::Integer));
        }
        self.association(Association::belongs_to(name, target, foreign_key))
    }

    /// Add an association through another association.
    pub fn has_many_through(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        through: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        self.association(Association::through(name, target, through, source))
    }

    /// Columns, primary key first.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Associations in declaration order.
    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    /// Look up a column.
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Look up a column, failing with [`SqlError::UnknownColumn`].
    pub fn column_named(&self, name: &str) -> SqlResult<&Column> {
        self.find_column(name)
            .ok_or_else(|| SqlError::unknown_column(&self.name, name))
    }

    /// Look up an association, failing with [`SqlError::UnknownAssociation`].
    pub fn association_named(&self, name: &str) -> SqlResult<&Association> {
        self.associations
            .iter()
            .find(|association| association.name == name)
            .ok_or_else(|| SqlError::unknown_association(&self.name, name))
    }
}

/// How one hop of an association path correlates its two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link<'a> {
    /// `target.foreign_key = owner.primary_key`; `single` for has-one.
    Children {
        /// Column on the target.
        foreign_key: &'a str,
        /// At most one target per owner.
        single: bool,
    },
    /// `target.primary_key = owner.foreign_key`.
    Parent {
        /// Column on the owner.
        foreign_key: &'a str,
    },
}

/// One direct step of a resolved association path.
#[derive(Debug, Clone, Copy)]
pub struct Hop<'a> {
    /// Model the step starts from.
    pub owner: &'a Model,
    /// Direct association followed.
    pub association: &'a Association,
    /// Model the step arrives at.
    pub target: &'a Model,
    /// Key correlation.
    pub link: Link<'a>,
}

/// Registry of models.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    models: Vec<Model>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model.
    pub fn with_model(mut self, model: Model) -> Self {
        self.models.push(model);
        self
    }

    /// Models in registration order.
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Look up a model by name.
    pub fn model(&self, name: &str) -> SqlResult<&Model> {
        self.models
            .iter()
            .find(|model| model.name == name)
            .ok_or_else(|| SqlError::UnknownModel(name.to_string()))
    }

    /// Check that names are unique and every association resolves to
    /// existing models and columns.
    pub fn validate(&self) -> SqlResult<()> {
        let mut names = BTreeSet::new();
        let mut tables = BTreeSet::new();
        for model in &self.models {
            if !names.insert(model.name.as_str()) {
                return Err(invalid(format!("model {} is registered twice", model.name)));
            }
            if !tables.insert(model.table.as_str()) {
                return Err(invalid(format!("table {} is used by two models", model.table)));
            }
            self.validate_model(model)?;
        }
        Ok(())
    }

    fn validate_model(&self, model: &Model) -> SqlResult<()> {
        let mut columns = BTreeSet::new();
        for column in model.columns() {
            if !columns.insert(column.name.as_str()) {
                return Err(invalid(format!(
                    "column {} is declared twice on {}",
                    column.name, model.name
                )));
            }
        }

        let mut associations = BTreeSet::new();
        for association in model.associations() {
            if !associations.insert(association.name.as_str()) {
                return Err(invalid(format!(
                    "association {} is declared twice on {}",
                    association.name, model.name
                )));
            }
            let hops = self.resolve_path(model, association)?;
            let arrival = hops
                .last()
                .map(|hop| hop.target.name.as_str())
                .unwrap_or_default();
            if arrival != association.target {
                return Err(invalid(format!(
                    "association {} on {} arrives at {} instead of {}",
                    association.name, model.name, arrival, association.target
                )));
            }
            let target = self.model(&association.target)?;
            for (column, _) in &association.order {
                target.column_named(column)?;
            }
        }
        Ok(())
    }

    /// Flatten an association into the direct hops it follows.
    ///
    /// # Errors
    ///
    /// Unknown models, associations or foreign key columns along the way, and
    /// through-chains nested deeper than the supported depth.
    pub fn resolve_path<'a>(
        &'a self,
        owner: &'a Model,
        association: &'a Association,
    ) -> SqlResult<Vec<Hop<'a>>> {
        let mut hops = Vec::new();
        self.collect_hops(owner, association, 0, &mut hops)?;
        Ok(hops)
    }

    fn collect_hops<'a>(
        &'a self,
        owner: &'a Model,
        association: &'a Association,
        depth: usize,
        hops: &mut Vec<Hop<'a>>,
    ) -> SqlResult<()> {
        if depth > MAX_THROUGH_DEPTH {
            return Err(invalid(format!(
                "association {} on {} nests through-associations too deeply",
                association.name, owner.name
            )));
        }

        let link = match &association.kind {
            AssociationKind::Through { through, source } => {
                let first = owner.association_named(through)?;
                let start = hops.len();
                self.collect_hops(owner, first, depth + 1, hops)?;
                let middle = hops[start..]
                    .last()
                    .map(|hop| hop.target)
                    .ok_or_else(|| invalid(format!("association {through} has no hops")))?;
                let second = middle.association_named(source)?;
                return self.collect_hops(middle, second, depth + 1, hops);
            }
            AssociationKind::HasMany { foreign_key } => Link::Children {
                foreign_key,
                single: false,
            },
            AssociationKind::HasOne { foreign_key } => Link::Children {
                foreign_key,
                single: true,
            },
            AssociationKind::BelongsTo { foreign_key } => Link::Parent { foreign_key },
        };

        let target = self.model(&association.target)?;
        match link {
            Link::Children { foreign_key, .. } => {
                target.column_named(foreign_key)?;
            }
            Link::Parent { foreign_key } => {
                owner.column_named(foreign_key)?;
            }
        }
        hops.push(Hop {
            owner,
            association,
            target,
            link,
        });
        Ok(())
    }
}

fn invalid(message: String) -> SqlError {
    SqlError::InvalidSchema(message)
}
