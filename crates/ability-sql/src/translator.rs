//! # Translator
//!
//! Compiles rules and conditions into a sea-query [`Condition`] over a
//! model's table.
//!
//! Rules are folded oldest to newest:
//!
//! ```text
//! E0 = false
//! Ei = can    ? (ci OR Ei-1)
//!    : cannot ? (NOT ci AND Ei-1)
//! ```
//!
//! so the newest matching rule decides, exactly like
//! [`Ability::permits`](ability_rules::Ability::permits).
//!
//! Field comparisons are null-safe and two-valued, so `NOT` over any
//! compiled condition is the exact complement. Associations become
//! correlated `EXISTS` sub-selects; the outer query never gains joins and
//! each record appears at most once.

use ability_rules::{Action, Behavior, Clause, Conditions, Matcher, Rule, Value};
use sea_query::{Alias, Cond, Condition, Expr, Order, Query, SimpleExpr};

use crate::error::{SqlError, SqlResult};
use crate::schema::{Hop, Link, Model, Schema};

/// Compiled restriction on a model's rows.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Every row.
    All,
    /// No row.
    Nothing,
    /// Rows satisfying the condition.
    Where(Condition),
}

impl Filter {
    /// Condition for a `WHERE` clause, `None` when every row qualifies.
    pub fn into_condition(self) -> Option<Condition> {
        match self {
            Filter::All => None,
            Filter::Nothing => Some(Cond::all().add(never())),
            Filter::Where(condition) => Some(condition),
        }
    }

    /// `self AND other`.
    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::Nothing, _) | (_, Filter::Nothing) => Filter::Nothing,
            (Filter::All, other) | (other, Filter::All) => other,
            (Filter::Where(left), Filter::Where(right)) => {
                Filter::Where(Cond::all().add(left).add(right))
            }
        }
    }
}

/// Always-false predicate.
pub(crate) fn never() -> SimpleExpr {
    Expr::cust("1 = 0")
}

/// Table reference inside the statement being built.
struct Scope<'a> {
    model: &'a Model,
    alias: String,
}

/// Stateful compiler; hands out a fresh alias to every sub-select.
///
/// The queried table keeps its own name, sub-selects use `{table}_{n}`.
pub struct Translator<'a> {
    schema: &'a Schema,
    aliases: usize,
}

impl<'a> Translator<'a> {
    /// Create a translator for a schema.
    pub fn new(schema: &'a Schema) -> Self {
        Self::starting_at(schema, 0)
    }

    /// Create a translator continuing the alias numbering of another.
    pub fn starting_at(schema: &'a Schema, aliases: usize) -> Self {
        Self { schema, aliases }
    }

    /// Number of sub-select aliases handed out so far.
    pub fn aliases_used(&self) -> usize {
        self.aliases
    }

    /// Compile the rules relevant to `action` on `model` (oldest first).
    ///
    /// # Errors
    ///
    /// [`SqlError::UntranslatableRule`] when a rule uses a predicate, plus any
    /// error from compiling the rules' conditions.
    pub fn rules(&mut self, model: &'a Model, action: Action, rules: &[&Rule]) -> SqlResult<Filter> {
        let root = Scope {
            model,
            alias: model.table.clone(),
        };
        let mut filter = Filter::Nothing;
        // can-conditions OR-ed since the last reset or cannot
        let mut granted: Vec<&Conditions> = Vec::new();

        for rule in rules {
            let Some(conditions) = rule.conditions() else {
                tracing::warn!(model = %model.name, %action, "predicate rule has no SQL form");
                return Err(SqlError::UntranslatableRule {
                    action,
                    model: model.name.clone(),
                });
            };

            if conditions.is_empty() {
                granted.clear();
                filter = match rule.behavior {
                    Behavior::Can => Filter::All,
                    Behavior::Cannot => Filter::Nothing,
                };
                continue;
            }

            let condition = self.conditions_in(&root, conditions)?;
            match rule.behavior {
                Behavior::Can => {
                    if granted.contains(&conditions) {
                        tracing::trace!(model = %model.name, "skipping repeated can rule");
                        continue;
                    }
                    granted.push(conditions);
                    filter = match filter {
                        Filter::All => Filter::All,
                        Filter::Nothing => Filter::Where(condition),
                        Filter::Where(existing) => {
                            Filter::Where(Cond::any().add(condition).add(existing))
                        }
                    };
                }
                Behavior::Cannot => {
                    granted.clear();
                    filter = match filter {
                        Filter::Nothing => Filter::Nothing,
                        Filter::All => Filter::Where(condition.not()),
                        Filter::Where(existing) => {
                            Filter::Where(Cond::all().add(condition.not()).add(existing))
                        }
                    };
                }
            }
        }
        Ok(filter)
    }

    /// Compile standalone conditions on the queried table; empty conditions
    /// select every row.
    pub fn conditions(&mut self, model: &'a Model, conditions: &Conditions) -> SqlResult<Filter> {
        if conditions.is_empty() {
            return Ok(Filter::All);
        }
        let root = Scope {
            model,
            alias: model.table.clone(),
        };
        Ok(Filter::Where(self.conditions_in(&root, conditions)?))
    }

    /// Compile non-empty conditions on a scope.
    fn conditions_in(&mut self, scope: &Scope<'a>, conditions: &Conditions) -> SqlResult<Condition> {
        let mut all = Cond::all();
        for clause in conditions.clauses() {
            all = match clause {
                Clause::Field { name, matcher } => all.add(self.field(scope, name, matcher)?),
                Clause::Association { name, conditions } => {
                    all.add(self.association(scope, name, conditions)?)
                }
                Clause::Not(inner) if inner.is_empty() => all.add(never()),
                Clause::Not(inner) => all.add(self.conditions_in(scope, inner)?.not()),
            };
        }
        Ok(all)
    }

    fn field(&self, scope: &Scope<'a>, name: &str, matcher: &Matcher) -> SqlResult<SimpleExpr> {
        let column = scope.model.column_named(name)?;
        let col = || Expr::col((Alias::new(scope.alias.as_str()), Alias::new(name)));

        match matcher {
            Matcher::Eq(Value::Null) => Ok(col().is_null()),
            Matcher::Eq(value) => {
                let value = column.encode(&scope.model.name, value)?;
                Ok(col().is_not_null().and(col().eq(value)))
            }
            Matcher::In(values) => {
                let includes_null = values.iter().any(Value::is_null);
                let encoded = values
                    .iter()
                    .filter(|value| !value.is_null())
                    .map(|value| column.encode(&scope.model.name, value))
                    .collect::<SqlResult<Vec<_>>>()?;
                let present = (!encoded.is_empty())
                    .then(|| col().is_not_null().and(col().is_in(encoded)));

                Ok(match (includes_null, present) {
                    (false, None) => never(),
                    (false, Some(present)) => present,
                    (true, None) => col().is_null(),
                    (true, Some(present)) => col().is_null().or(present),
                })
            }
        }
    }

    /// An association clause: some related row satisfies the positive
    /// clauses, and no related row satisfies any negated group. With only
    /// negated groups, the positive part is dropped.
    fn association(
        &mut self,
        scope: &Scope<'a>,
        name: &str,
        conditions: &Conditions,
    ) -> SqlResult<Condition> {
        let schema = self.schema;
        let association = scope.model.association_named(name)?;
        let hops = schema.resolve_path(scope.model, association)?;
        let (positive, negated) = conditions.split_negations();

        let mut all = Cond::all();
        if !positive.is_empty() || negated.is_empty() {
            all = all.add(self.exists(scope, &hops, &positive)?);
        }
        for inner in negated {
            all = all.add(Cond::all().add(self.exists(scope, &hops, inner)?).not());
        }
        Ok(all)
    }

    fn exists(
        &mut self,
        outer: &Scope<'a>,
        hops: &[Hop<'a>],
        conditions: &Conditions,
    ) -> SqlResult<SimpleExpr> {
        let (hop, rest) = hops
            .split_first()
            .ok_or_else(|| SqlError::InvalidSchema("empty association path".to_string()))?;
        let inner = Scope {
            model: hop.target,
            alias: self.next_alias(hop.target),
        };

        let mut condition = Cond::all().add(correlation(outer, hop, &inner));
        if let Link::Children { single: true, .. } = hop.link {
            condition = condition.add(self.first_child(outer, hop, &inner));
        }
        if !rest.is_empty() {
            condition = condition.add(self.exists(&inner, rest, conditions)?);
        } else if !conditions.is_empty() {
            condition = condition.add(self.conditions_in(&inner, conditions)?);
        }

        let select = Query::select()
            .column((
                Alias::new(inner.alias.as_str()),
                Alias::new(hop.target.primary_key.as_str()),
            ))
            .from_as(
                Alias::new(hop.target.table.as_str()),
                Alias::new(inner.alias.as_str()),
            )
            .cond_where(condition)
            .to_owned();
        Ok(Expr::exists(select))
    }

    /// A has-one association resolves to a single row: the first by its
    /// ordering, then primary key. Rows behind it never match.
    fn first_child(&mut self, outer: &Scope<'a>, hop: &Hop<'a>, inner: &Scope<'a>) -> SimpleExpr {
        let first = Scope {
            model: hop.target,
            alias: self.next_alias(hop.target),
        };
        let alias = Alias::new(first.alias.as_str());
        let key = hop.target.primary_key.as_str();

        let mut select = Query::select();
        select
            .column((alias.clone(), Alias::new(key)))
            .from_as(Alias::new(hop.target.table.as_str()), alias.clone())
            .and_where(correlation(outer, hop, &first));
        for (column, order) in &hop.association.order {
            select.order_by((alias.clone(), Alias::new(column.as_str())), (*order).into());
        }
        select.order_by((alias, Alias::new(key)), Order::Asc).limit(1);

        Expr::col((Alias::new(inner.alias.as_str()), Alias::new(key))).in_subquery(select)
    }

    fn next_alias(&mut self, model: &Model) -> String {
        self.aliases += 1;
        format!("{}_{}", model.table, self.aliases)
    }
}

fn correlation(outer: &Scope<'_>, hop: &Hop<'_>, inner: &Scope<'_>) -> SimpleExpr {
    let outer_alias = Alias::new(outer.alias.as_str());
    let inner_alias = Alias::new(inner.alias.as_str());
    match hop.link {
        Link::Children { foreign_key, .. } => Expr::col((inner_alias, Alias::new(foreign_key)))
            .equals((outer_alias, Alias::new(outer.model.primary_key.as_str()))),
        Link::Parent { foreign_key } => {
            Expr::col((inner_alias, Alias::new(inner.model.primary_key.as_str())))
                .equals((outer_alias, Alias::new(foreign_key)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use ability_rules::Ability;
    use sea_query::{PostgresQueryBuilder, SqliteQueryBuilder};

    fn schema() -> Schema {
        Schema::new()
            .with_model(
                Model::new("Parent", "parents")
                    .column("name", ColumnType::Text)
                    .has_many("children", "Child", "parent_id"),
            )
            .with_model(
                Model::new("Child", "children")
                    .belongs_to("parent", "Parent", "parent_id")
                    .column("name", ColumnType::Text)
                    .enumeration("status", [("active", 0), ("archived", 1)]),
            )
    }

    fn compile(schema: &Schema, ability: &Ability, model: &str) -> SqlResult<Filter> {
        let model = schema.model(model)?;
        let rules = ability.relevant_rules(Action::Read, &model.name);
        Translator::new(schema).rules(model, Action::Read, &rules)
    }

    fn render(filter: Filter, table: &str) -> String {
        let mut select = Query::select();
        select.column(Alias::new("id")).from(Alias::new(table));
        if let Some(condition) = filter.into_condition() {
            select.cond_where(condition);
        }
        select.to_string(SqliteQueryBuilder)
    }

    #[test]
    fn test_no_rules_is_nothing() {
        let schema = schema();
        let filter = compile(&schema, &Ability::new(), "Parent").unwrap();
        assert!(matches!(filter, Filter::Nothing));
        assert!(render(filter, "parents").contains("1 = 0"));
    }

    #[test]
    fn test_unconditional_resets() {
        let schema = schema();
        let mut ability = Ability::new();
        ability
            .can(Action::Read, "Parent", Conditions::new().eq("name", "a"))
            .can(Action::Read, "Parent", Conditions::new());
        assert!(matches!(compile(&schema, &ability, "Parent").unwrap(), Filter::All));

        ability.cannot(Action::Read, "Parent", Conditions::new());
        assert!(matches!(compile(&schema, &ability, "Parent").unwrap(), Filter::Nothing));
    }

    #[test]
    fn test_null_safe_equality() {
        let schema = schema();
        let mut ability = Ability::new();
        ability
            .can(Action::Read, "Parent", Conditions::new())
            .cannot(Action::Read, "Parent", Conditions::new().eq("name", "a"));

        let sql = render(compile(&schema, &ability, "Parent").unwrap(), "parents");
        assert!(sql.contains(r#""parents"."name" IS NOT NULL"#), "{sql}");
        assert!(sql.contains(r#""parents"."name" = 'a'"#), "{sql}");
        assert!(sql.contains("NOT"), "{sql}");
    }

    #[test]
    fn test_null_in_set() {
        let schema = schema();
        let mut ability = Ability::new();
        ability.can(
            Action::Read,
            "Parent",
            Conditions::new().any_of("name", [Value::Null, Value::from("a")]),
        );
        let sql = render(compile(&schema, &ability, "Parent").unwrap(), "parents");
        assert!(sql.contains(r#""parents"."name" IS NULL"#), "{sql}");
        assert!(sql.contains(r#""parents"."name" IN ('a')"#), "{sql}");
    }

    #[test]
    fn test_empty_set_never_matches() {
        let schema = schema();
        let mut ability = Ability::new();
        ability.can(
            Action::Read,
            "Parent",
            Conditions::new().any_of("name", Vec::<Value>::new()),
        );
        let sql = render(compile(&schema, &ability, "Parent").unwrap(), "parents");
        assert!(sql.contains("1 = 0"), "{sql}");
    }

    #[test]
    fn test_association_uses_exists_with_aliases() {
        let schema = schema();
        let mut ability = Ability::new();
        ability.can(
            Action::Read,
            "Parent",
            Conditions::new()
                .association("children", Conditions::new().eq("name", "y"))
                .not(Conditions::new().association("children", Conditions::new().eq("name", "x"))),
        );
        let sql = render(compile(&schema, &ability, "Parent").unwrap(), "parents");
        assert!(sql.contains("EXISTS"), "{sql}");
        assert!(sql.contains(r#""children" AS "children_1""#), "{sql}");
        assert!(sql.contains(r#""children" AS "children_2""#), "{sql}");
        assert!(sql.contains(r#""children_1"."parent_id" = "parents"."id""#), "{sql}");
        assert!(!sql.contains("JOIN"), "{sql}");
    }

    #[test]
    fn test_belongs_to_correlation() {
        let schema = schema();
        let mut ability = Ability::new();
        ability.can(
            Action::Read,
            "Child",
            Conditions::new().association("parent", Conditions::new().eq("name", "p")),
        );
        let sql = render(compile(&schema, &ability, "Child").unwrap(), "children");
        assert!(sql.contains(r#""parents_1"."id" = "children"."parent_id""#), "{sql}");
    }

    #[test]
    fn test_enum_names_are_encoded() {
        let schema = schema();
        let mut ability = Ability::new();
        ability.can(
            Action::Read,
            "Child",
            Conditions::new().any_of("status", ["active", "archived"]),
        );
        let sql = render(compile(&schema, &ability, "Child").unwrap(), "children");
        assert!(sql.contains(r#""children"."status" IN (0, 1)"#), "{sql}");
    }

    #[test]
    fn test_duplicate_can_rules_emitted_once() {
        let schema = schema();
        let mut ability = Ability::new();
        let conditions = Conditions::new().eq("name", "a");
        ability
            .can(Action::Read, "Parent", conditions.clone())
            .can(Action::Read, "Parent", conditions);
        let sql = render(compile(&schema, &ability, "Parent").unwrap(), "parents");
        assert_eq!(sql.matches("'a'").count(), 1, "{sql}");
    }

    #[test]
    fn test_predicate_rule_is_untranslatable() {
        let schema = schema();
        let mut ability = Ability::new();
        ability.add_rule(Rule::can([Action::Read], ["Parent"]).with_predicate(|_| true));
        assert!(matches!(
            compile(&schema, &ability, "Parent"),
            Err(SqlError::UntranslatableRule { .. })
        ));
    }

    #[test]
    fn test_unknown_names() {
        let schema = schema();
        let mut ability = Ability::new();
        ability.can(Action::Read, "Parent", Conditions::new().eq("nickname", "a"));
        assert!(matches!(
            compile(&schema, &ability, "Parent"),
            Err(SqlError::UnknownColumn { .. })
        ));

        let mut ability = Ability::new();
        ability.can(
            Action::Read,
            "Parent",
            Conditions::new().association("pets", Conditions::new()),
        );
        assert!(matches!(
            compile(&schema, &ability, "Parent"),
            Err(SqlError::UnknownAssociation { .. })
        ));
    }

    #[test]
    fn test_postgres_rendering() {
        let schema = schema();
        let mut ability = Ability::new();
        ability.can(Action::Read, "Parent", Conditions::new().eq("name", "a"));
        let filter = compile(&schema, &ability, "Parent").unwrap();

        let mut select = Query::select();
        select.column(Alias::new("id")).from(Alias::new("parents"));
        if let Some(condition) = filter.into_condition() {
            select.cond_where(condition);
        }
        let sql = select.to_string(PostgresQueryBuilder);
        assert!(sql.contains(r#""parents"."name" = 'a'"#), "{sql}");
    }

    #[test]
    fn test_filter_and() {
        assert!(matches!(Filter::All.and(Filter::Nothing), Filter::Nothing));
        assert!(matches!(Filter::All.and(Filter::All), Filter::All));
        let condition = Cond::all().add(never());
        assert!(matches!(
            Filter::Where(condition).and(Filter::All),
            Filter::Where(_)
        ));
    }
}
