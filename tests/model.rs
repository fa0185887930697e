//! Model Layer Tests
//!
//! Tests for the model layer over both adapters:
//! - Unregistered models fail with NotRegistered
//! - Records round-trip through save and refresh
//! - Tracked mutations (set, unset, increment, push) persist
//! - Indexed queries through a model return the same records

use std::sync::Arc;

use plugdb::{
    Db, DbError, DocServer, DocStoreAdapter, DocStoreConfig, Document, IndexSpec, Model,
    TableServer, TableStoreAdapter, TableStoreConfig,
};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn databases() -> Vec<Db> {
    vec![
        Db::new(Arc::new(DocStoreAdapter::new(
            &DocServer::new(),
            DocStoreConfig::default(),
        ))),
        Db::new(Arc::new(TableStoreAdapter::new(
            &TableServer::new(),
            TableStoreConfig::default(),
        ))),
    ]
}

fn doc(v: Value) -> Document {
    v.as_object().cloned().unwrap()
}

async fn people(db: &Db) -> Model {
    let model = Model::new("people");
    db.register(&model).await.unwrap();
    model
}

// =============================================================================
// Registration Tests
// =============================================================================

#[tokio::test]
async fn test_unregistered_model_fails() {
    let model = Model::new("people");

    assert!(matches!(model.query(), Err(DbError::NotRegistered(_))));
    assert!(matches!(
        model.find(Value::Null).await,
        Err(DbError::NotRegistered(_))
    ));
    assert!(matches!(
        model
            .create_index("age", &IndexSpec::new().field("age", 1))
            .await,
        Err(DbError::NotRegistered(_))
    ));
}

#[tokio::test]
async fn test_models_are_independent() {
    for db in databases() {
        let a = people(&db).await;
        let b = Model::new("pets");
        db.register(&b).await.unwrap();

        a.record(doc(json!({"name": "ann"}))).unwrap().save().await.unwrap();

        assert_eq!(a.count(Value::Null).await.unwrap(), 1);
        assert_eq!(b.count(Value::Null).await.unwrap(), 0);
    }
}

// =============================================================================
// Record Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_record_lifecycle() {
    for db in databases() {
        let model = people(&db).await;

        let mut ann = model
            .record(doc(json!({"name": "ann", "visits": 1, "tags": ["new"]})))
            .unwrap();
        assert!(ann.id().is_none());
        ann.save().await.unwrap();
        let id = ann.id().unwrap().to_string();

        ann.increment("visits", 2).unwrap();
        ann.push("tags", "regular").unwrap();
        ann.set("address.city", "Oslo");
        ann.save().await.unwrap();

        let mut stored = model.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(
            Value::Object(stored.data().clone()),
            json!({
                "name": "ann",
                "visits": 3,
                "tags": ["new", "regular"],
                "address": {"city": "Oslo"}
            })
        );

        stored.unset("tags").decrement("visits", 1).unwrap();
        stored.save().await.unwrap();

        ann.refresh().await.unwrap();
        assert_eq!(ann.get("visits"), Some(&json!(2)));
        assert_eq!(ann.get("tags"), None);
        assert!(!ann.is_dirty());

        ann.remove().await.unwrap();
        assert!(matches!(ann.refresh().await, Err(DbError::NotFound(_))));
        assert!(model.find_by_id(&id).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_replace_drops_untracked_fields() {
    for db in databases() {
        let model = people(&db).await;

        let mut record = model
            .record(doc(json!({"name": "bob", "age": 40})))
            .unwrap();
        record.save().await.unwrap();

        let mut fresh = model.find_by_id(record.id().unwrap()).await.unwrap().unwrap();
        fresh.unset("age");
        fresh.set_all(doc(json!({"name": "robert", "nick": "rob"})));
        fresh.replace().await.unwrap();

        record.refresh().await.unwrap();
        assert_eq!(
            Value::Object(record.data().clone()),
            json!({"name": "robert", "nick": "rob"})
        );
    }
}

// =============================================================================
// Query Tests
// =============================================================================

#[tokio::test]
async fn test_model_queries_with_index() {
    for db in databases() {
        let model = people(&db).await;
        for (name, age, city) in [
            ("ann", 30, "oslo"),
            ("bob", 40, "rome"),
            ("cat", 30, "rome"),
            ("dan", 50, "oslo"),
        ] {
            model
                .record(doc(json!({"name": name, "age": age, "city": city})))
                .unwrap()
                .save()
                .await
                .unwrap();
        }

        let filter = json!({"age": 30, "city": "rome"});
        let before = model.find(filter.clone()).await.unwrap();

        let spec = IndexSpec::new().field("age", -1).field("city", -1);
        model.create_index("age_city", &spec).await.unwrap();
        let after = model.find(filter).await.unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id(), after[0].id());
        assert_eq!(after[0].get("name"), Some(&json!("cat")));

        let older = model.query().unwrap().gte("age", 40).sort("name", "asc").unwrap();
        let names: Vec<Value> = older
            .find()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.object["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("bob"), json!("dan")]);

        assert_eq!(model.sum("age", json!({"city": "oslo"})).await.unwrap(), 80.0);
        assert_eq!(model.remove(json!({"city": "oslo"})).await.unwrap(), 2);
        assert_eq!(model.count(Value::Null).await.unwrap(), 2);
    }
}
