//! Eager loading of associations.
//!
//! Each hop of an include path runs one query: the keys of every owner are
//! batched into a single `IN` list and the rows are grouped back onto their
//! owners. Loaded rows follow the association's ordering, or primary key
//! ascending, and are never restricted by the filter of the outer query.

use ability_rules::Record;
use futures::future::BoxFuture;
use sea_query::{Alias, Expr, Order, Query, SelectStatement};
use std::collections::{BTreeMap, BTreeSet};

use crate::database::Database;
use crate::error::{SqlError, SqlResult};
use crate::schema::{Association, Hop, Link, Model, SortOrder};

/// A parsed include path, e.g. `children.toys`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    /// Association name.
    pub name: String,
    /// Includes on the loaded records.
    pub nested: Vec<Include>,
}

impl Include {
    /// Parse dotted paths into a tree, merging shared prefixes.
    ///
    /// ```
    /// use ability_sql::loader::Include;
    ///
    /// let tree = Include::parse_paths(["children.toys", "children", "owner"]);
    /// assert_eq!(tree.len(), 2);
    /// assert_eq!(tree[0].name, "children");
    /// assert_eq!(tree[0].nested[0].name, "toys");
    /// ```
    pub fn parse_paths<I, S>(paths: I) -> Vec<Include>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree: Vec<Include> = Vec::new();
        for path in paths {
            let mut level = &mut tree;
            for segment in path.as_ref().split('.').filter(|s| !s.is_empty()) {
                let index = match level.iter().position(|include| include.name == segment) {
                    Some(index) => index,
                    None => {
                        level.push(Include {
                            name: segment.to_string(),
                            nested: Vec::new(),
                        });
                        level.len() - 1
                    }
                };
                level = &mut level[index].nested;
            }
        }
        tree
    }
}

/// Load `includes` onto `records`, recursively.
pub(crate) fn preload<'a>(
    db: &'a Database,
    model: &'a Model,
    records: &'a mut [Record],
    includes: &'a [Include],
) -> BoxFuture<'a, SqlResult<()>> {
    Box::pin(async move {
        if records.is_empty() {
            return Ok(());
        }
        for include in includes {
            let association = model.association_named(&include.name)?;
            let hops = db.schema().resolve_path(model, association)?;
            let target = hops
                .last()
                .map(|hop| hop.target)
                .ok_or_else(|| SqlError::InvalidSchema("empty association path".to_string()))?;

            let mut groups = load_path(db, records, association, &hops).await?;
            if !include.nested.is_empty() {
                let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
                let mut flat: Vec<Record> = groups.iter_mut().flat_map(std::mem::take).collect();
                preload(db, target, &mut flat, &include.nested).await?;
                let mut flat = flat.into_iter();
                for (group, size) in groups.iter_mut().zip(sizes) {
                    group.extend(flat.by_ref().take(size));
                }
            }

            for (record, group) in records.iter_mut().zip(groups) {
                record.set_related(include.name.clone(), group);
            }
        }
        Ok(())
    })
}

/// Records reached from each owner along `hops`, aligned with `owners`.
///
/// `association` is the association the hops were resolved from. Its
/// ordering, when declared, decides the order of the final records; this
/// matters for through-associations, whose hops carry their own orderings.
pub(crate) async fn load_path(
    db: &Database,
    owners: &[Record],
    association: &Association,
    hops: &[Hop<'_>],
) -> SqlResult<Vec<Vec<Record>>> {
    let Some((first, rest)) = hops.split_first() else {
        return Ok(vec![Vec::new(); owners.len()]);
    };
    let last = hops.len() - 1;
    let level: Vec<&Record> = owners.iter().collect();
    let order = order_for(association, first, last == 0);
    let (mut groups, _) = load_hop(db, &level, first, order).await?;

    for (index, hop) in rest.iter().enumerate() {
        let level: Vec<&Record> = groups.iter().flatten().collect();
        let order = order_for(association, hop, index + 1 == last);
        let (loaded, rank) = load_hop(db, &level, hop, order).await?;
        let mut loaded = loaded.into_iter();

        let key = hop.target.primary_key.as_str();
        let mut next = Vec::with_capacity(groups.len());
        for group in &groups {
            let mut merged: Vec<Record> = Vec::new();
            for _ in group {
                merged.extend(loaded.next().unwrap_or_default());
            }
            let mut merged = dedup_by_key(merged, key);
            merged.sort_by_key(|record| {
                record
                    .get(key)
                    .as_i64()
                    .and_then(|id| rank.get(&id).copied())
                    .unwrap_or(usize::MAX)
            });
            next.push(merged);
        }
        groups = next;
    }
    Ok(groups)
}

/// Ordering for the rows of `hop`: the loaded association's own ordering on
/// the final hop, otherwise the hop's. A has-one hop keeps its own ordering,
/// which decides the row it resolves to.
fn order_for<'a>(
    association: &'a Association,
    hop: &'a Hop<'_>,
    final_hop: bool,
) -> &'a [(String, SortOrder)] {
    let single = matches!(hop.link, Link::Children { single: true, .. });
    if final_hop && !single && !association.order.is_empty() {
        &association.order
    } else {
        &hop.association.order
    }
}

fn dedup_by_key(records: Vec<Record>, key: &str) -> Vec<Record> {
    let mut seen = BTreeSet::new();
    records
        .into_iter()
        .filter(|record| match record.get(key).as_i64() {
            Some(id) => seen.insert(id),
            None => true,
        })
        .collect()
}

/// One query for a single hop, grouped per owner, with the position of each
/// loaded primary key in the ordered result.
async fn load_hop(
    db: &Database,
    owners: &[&Record],
    hop: &Hop<'_>,
    order: &[(String, SortOrder)],
) -> SqlResult<(Vec<Vec<Record>>, BTreeMap<i64, usize>)> {
    let (owner_key, target_key) = match hop.link {
        Link::Children { foreign_key, .. } => (hop.owner.primary_key.as_str(), foreign_key),
        Link::Parent { foreign_key } => (foreign_key, hop.target.primary_key.as_str()),
    };

    let keys: BTreeSet<i64> = owners
        .iter()
        .filter_map(|owner| owner.get(owner_key).as_i64())
        .collect();
    if keys.is_empty() {
        return Ok((vec![Vec::new(); owners.len()], BTreeMap::new()));
    }

    let sql = db.backend().select(&select_related(hop.target, target_key, keys, order));
    tracing::debug!(association = %hop.association.name, sql = %sql, "loading association");
    let rows = db.store().fetch_records(&sql, hop.target).await?;

    let mut rank = BTreeMap::new();
    let mut by_key: BTreeMap<i64, Vec<Record>> = BTreeMap::new();
    for (position, row) in rows.into_iter().enumerate() {
        if let Some(id) = row.get(&hop.target.primary_key).as_i64() {
            rank.entry(id).or_insert(position);
        }
        if let Some(key) = row.get(target_key).as_i64() {
            by_key.entry(key).or_default().push(row);
        }
    }

    let single = !matches!(hop.link, Link::Children { single: false, .. });
    let groups = owners
        .iter()
        .map(|owner| {
            let mut group = owner
                .get(owner_key)
                .as_i64()
                .and_then(|key| by_key.get(&key).cloned())
                .unwrap_or_default();
            if single {
                group.truncate(1);
            }
            group
        })
        .collect();
    Ok((groups, rank))
}

fn select_related(
    target: &Model,
    target_key: &str,
    keys: BTreeSet<i64>,
    order: &[(String, SortOrder)],
) -> SelectStatement {
    let table = Alias::new(target.table.as_str());
    let mut select = Query::select();
    select
        .columns(
            target
                .columns()
                .iter()
                .map(|column| (table.clone(), Alias::new(column.name.as_str()))),
        )
        .from(table.clone())
        .and_where(Expr::col((table.clone(), Alias::new(target_key))).is_in(keys));

    for (column, order) in order {
        select.order_by((table.clone(), Alias::new(column.as_str())), (*order).into());
    }
    select.order_by((table, Alias::new(target.primary_key.as_str())), Order::Asc);
    select
}
