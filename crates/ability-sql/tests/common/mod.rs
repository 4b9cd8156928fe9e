//! Shared fixture: parents with children and toys, and users reaching
//! groups through memberships.

#![allow(dead_code)]

use ability_rules::Record;
use ability_sql::schema::Association;
use ability_sql::{ColumnType, Database, Model, Schema, SortOrder, SqliteStore};

/// Schema used by every integration suite.
pub fn schema() -> Schema {
    Schema::new()
        .with_model(
            Model::new("Parent", "parents")
                .column("name", ColumnType::Text)
                .association(
                    Association::has_many("children", "Child", "parent_id")
                        .ordered_by("id", SortOrder::Desc),
                ),
        )
        .with_model(
            Model::new("Child", "children")
                .belongs_to("parent", "Parent", "parent_id")
                .column("name", ColumnType::Text)
                .enumeration("status", [("draft", 0), ("published", 1), ("archived", 2)])
                .has_many("toys", "Toy", "child_id"),
        )
        .with_model(
            Model::new("Toy", "toys")
                .belongs_to("child", "Child", "child_id")
                .column("name", ColumnType::Text)
                .column("price", ColumnType::Float),
        )
        .with_model(
            Model::new("User", "users")
                .column("name", ColumnType::Text)
                .has_many("memberships", "Membership", "user_id")
                .association(
                    Association::through("groups", "Group", "memberships", "group")
                        .ordered_by("name", SortOrder::Desc),
                ),
        )
        .with_model(
            Model::new("Membership", "memberships")
                .belongs_to("user", "User", "user_id")
                .belongs_to("group", "Group", "group_id"),
        )
        .with_model(
            Model::new("Group", "groups")
                .column("name", ColumnType::Text)
                .column("public", ColumnType::Boolean),
        )
}

/// Test fixture holding a migrated in-memory database.
pub struct TestFixture {
    /// Database under test.
    pub db: Database,
}

impl TestFixture {
    /// Create a fixture with empty tables.
    pub async fn new() -> Self {
        let store = SqliteStore::memory().await.expect("in-memory sqlite");
        let db = Database::new(store, schema()).expect("valid schema");
        db.migrate().await.expect("migrate");
        Self { db }
    }

    /// Insert a record and return its id.
    pub async fn insert(&self, record: Record) -> i64 {
        let created = self.db.create(record).await.expect("create record");
        created.get("id").as_i64().expect("id assigned")
    }

    /// Insert a parent with children of the given names; returns the parent id.
    pub async fn parent_with_children(&self, name: &str, children: &[&str]) -> i64 {
        let parent = self.insert(Record::new("Parent").with("name", name)).await;
        for child in children {
            self.insert(
                Record::new("Child")
                    .with("parent_id", parent)
                    .with("name", *child),
            )
            .await;
        }
        parent
    }

    /// Insert a child with a status; returns the child id.
    pub async fn child_with_status(&self, parent: i64, name: &str, status: &str) -> i64 {
        self.insert(
            Record::new("Child")
                .with("parent_id", parent)
                .with("name", name)
                .with("status", status),
        )
        .await
    }
}

/// Sorted primary keys of records.
pub fn ids(records: &[Record]) -> Vec<i64> {
    let mut ids: Vec<i64> = records.iter().filter_map(|r| r.get("id").as_i64()).collect();
    ids.sort_unstable();
    ids
}
