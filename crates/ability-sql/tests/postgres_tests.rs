//! Live PostgreSQL run of the three-parent scenario.
//!
//! Runs only with the `postgres` feature and `ABILITY_TEST_POSTGRES_URL`
//! pointing at a scratch database. Tables are created if missing and the
//! rows this test inserts are removed afterwards.

#![cfg(feature = "postgres")]

mod common;

use ability_rules::{Ability, Action, Conditions, Record};
use ability_sql::{Database, PgStore, Store, StoreConfig};

#[tokio::test]
async fn test_three_parents_on_postgres() {
    let Ok(url) = std::env::var("ABILITY_TEST_POSTGRES_URL") else {
        eprintln!("ABILITY_TEST_POSTGRES_URL not set; skipping");
        return;
    };
    let store = PgStore::connect(&StoreConfig::new(url)).await.unwrap();
    store.execute("DROP TABLE IF EXISTS parents, children, toys, users, memberships, groups").await.unwrap();
    let db = Database::new(store, common::schema()).unwrap();
    db.migrate().await.unwrap();

    let mut expected = None;
    for (name, children) in [("both", vec!["x", "y"]), ("only x", vec!["x"]), ("only y", vec!["y"])] {
        let parent = db.create(Record::new("Parent").with("name", name)).await.unwrap();
        let id = parent.get("id").as_i64().unwrap();
        for child in children {
            db.create(Record::new("Child").with("parent_id", id).with("name", child))
                .await
                .unwrap();
        }
        if name == "only y" {
            expected = Some(id);
        }
    }

    let mut ability = Ability::new();
    ability.can(
        Action::Read,
        "Parent",
        Conditions::new().association(
            "children",
            Conditions::new()
                .eq("name", "y")
                .not(Conditions::new().eq("name", "x")),
        ),
    );
    let parents = db
        .accessible_by(&ability, Action::Read, "Parent")
        .unwrap()
        .includes("children")
        .fetch_all()
        .await
        .unwrap();

    assert_eq!(common::ids(&parents), vec![expected.unwrap()]);
    assert_eq!(parents[0].related("children").len(), 1);

    db.store().execute("DROP TABLE parents, children, toys, users, memberships, groups").await.unwrap();
}
