//! Table store adapter
//!
//! Records cross the boundary with their identity swapped: the logical `_id`
//! is stored as the native primary key `id`, and a caller field named `id`
//! is stored as `_id`.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use super::compiler::{compile, native_path, row_path};
use super::engine::{Selection, Source, Table, TableConnection, TableServer, PRIMARY_KEY};
use crate::adapter::{partial_update, Adapter, AdapterFuture, Provisioner, SharedConnection};
use crate::config::TableStoreConfig;
use crate::document::Document;
use crate::error::{DbError, DbResult};
use crate::identity::{inbound, outbound, swap_keys, FetchedRecord, LOGICAL_ID};
use crate::index::{IndexRegistry, IndexSpec};
use crate::observability::{log_event, Event};
use crate::query::Query;

const BACKEND: &str = "tablestore";

/// Adapter over a [`TableServer`]
pub struct TableStoreAdapter {
    config: TableStoreConfig,
    connection: SharedConnection<TableConnection>,
    provisioner: Provisioner,
    registry: IndexRegistry,
}

impl TableStoreAdapter {
    /// Create the adapter and start connecting
    pub fn new(server: &TableServer, config: TableStoreConfig) -> Self {
        let connect = server.connect(config.address(), config.db.clone());
        let connection = SharedConnection::spawn(BACKEND, config.connect_timeout, async move {
            connect.await.map_err(DbError::from)
        });

        Self {
            config,
            connection,
            provisioner: Provisioner::new(),
            registry: IndexRegistry::new(),
        }
    }

    pub fn config(&self) -> &TableStoreConfig {
        &self.config
    }

    /// Indexes known to the query compiler
    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// The shared connection
    pub async fn raw_connection(&self) -> DbResult<Arc<TableConnection>> {
        self.connection.get().await
    }

    /// Native table handle, once the table is provisioned
    pub async fn raw_table(&self, collection: &str) -> DbResult<Table> {
        self.provisioner.wait(collection).await?;
        let conn = self.connection.get().await?;
        Ok(conn.table(collection))
    }

    /// Native selection for a compiled query
    pub async fn raw_cursor(&self, collection: &str, query: &Query) -> DbResult<Selection> {
        let table = self.raw_table(collection).await?;
        let compiled = compile(query, collection, &self.registry);

        log_event(
            Event::QueryCompiled,
            &[
                ("backend", BACKEND),
                ("collection", collection),
                ("index", compiled.index().unwrap_or("")),
                ("ops", &query.describe()),
                ("stages", &compiled.stages.len().to_string()),
            ],
        );

        let selection = match compiled.source {
            Source::Table => table.select(),
            Source::GetAll { index, keys } => table.get_all(keys, index),
        };
        Ok(compiled
            .stages
            .into_iter()
            .fold(selection, |selection, stage| selection.stage(stage)))
    }

    async fn ensure(&self, collection: &str) -> DbResult<()> {
        let connection = self.connection.clone();
        let name = collection.to_string();
        self.provisioner
            .ensure(collection, move || async move {
                let conn = connection.get().await?;
                match conn.table_create(&name).await {
                    Ok(()) => {
                        log_event(Event::CollectionReady, &[("backend", BACKEND), ("collection", &name)]);
                        Ok(())
                    }
                    Err(e) if e.is_already_exists() => {
                        log_event(
                            Event::CollectionCreateRaced,
                            &[("backend", BACKEND), ("collection", &name)],
                        );
                        Ok(())
                    }
                    Err(e) => {
                        log_event(
                            Event::CollectionFailed,
                            &[("backend", BACKEND), ("collection", &name), ("error", &e.to_string())],
                        );
                        Err(e.into())
                    }
                }
            })
            .await
    }

    async fn index(&self, collection: &str, requested: &str, spec: &IndexSpec) -> DbResult<()> {
        if spec.is_empty() {
            return Err(DbError::invalid_argument("index spec names no fields"));
        }
        let table = self.raw_table(collection).await?;
        let name = spec.name();
        let fields: Vec<String> = spec
            .sorted_paths()
            .iter()
            .map(|path| native_path(path).join("."))
            .collect();

        match table.index_create(&name, fields).await {
            Ok(()) => log_event(
                Event::IndexCreated,
                &[
                    ("backend", BACKEND),
                    ("collection", collection),
                    ("index", &name),
                    ("requested", requested),
                ],
            ),
            Err(e) if e.is_already_exists() => log_event(
                Event::IndexExists,
                &[("backend", BACKEND), ("collection", collection), ("index", &name)],
            ),
            Err(e) => return Err(e.into()),
        }
        table.index_wait(&name).await?;

        self.registry.register(collection, spec);
        Ok(())
    }

    async fn store(&self, collection: &str, object: Document) -> DbResult<String> {
        let table = self.raw_table(collection).await?;
        let row = outbound(PRIMARY_KEY, &object);
        let given = row.get(PRIMARY_KEY).cloned();

        let result = table.insert(row).await?;
        match (result.generated_keys.into_iter().next(), given) {
            (Some(key), _) => Ok(key),
            (None, Some(Value::String(key))) => Ok(key),
            (None, Some(other)) => Ok(other.to_string()),
            (None, None) => Err(DbError::backend("insert returned no key")),
        }
    }

    async fn fetch_all(&self, collection: &str, query: &Query) -> DbResult<Vec<FetchedRecord>> {
        let rows = self.raw_cursor(collection, query).await?.run().await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| inbound(PRIMARY_KEY, row))
            .collect())
    }

    async fn fetch_one(&self, collection: &str, query: &Query) -> DbResult<Option<FetchedRecord>> {
        let row = self
            .raw_cursor(collection, query)
            .await?
            .limit(1)
            .first()
            .await?;
        Ok(row.and_then(|row| inbound(PRIMARY_KEY, row)))
    }

    async fn fetch_by_id(&self, collection: &str, id: &str) -> DbResult<Option<FetchedRecord>> {
        let row = self.raw_table(collection).await?.get(id).await?;
        Ok(row.and_then(|row| inbound(PRIMARY_KEY, row)))
    }

    async fn replace(&self, collection: &str, id: &str, object: Document) -> DbResult<()> {
        let mut row = outbound(PRIMARY_KEY, &object);
        row.remove(PRIMARY_KEY);

        let replaced = self.raw_table(collection).await?.get_replace(id, row).await?;
        if replaced == 0 {
            return Err(DbError::not_found(format!("{} in {}", id, collection)));
        }
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        object: Document,
        updated_paths: &BTreeSet<String>,
    ) -> DbResult<()> {
        let (set, unset) = partial_update(&object, updated_paths);
        let mut patch = swap_keys(PRIMARY_KEY, LOGICAL_ID, &set);
        patch.remove(PRIMARY_KEY);
        let remove: Vec<String> = unset
            .iter()
            .filter_map(|key| native_path(key).into_iter().next())
            .filter(|key| key != PRIMARY_KEY)
            .collect();

        let matched = self
            .raw_table(collection)
            .await?
            .get_update(id, patch, &remove)
            .await?;
        if matched == 0 {
            return Err(DbError::not_found(format!("{} in {}", id, collection)));
        }
        Ok(())
    }
}

impl Adapter for TableStoreAdapter {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn ensure_collection<'a>(&'a self, collection: &'a str) -> AdapterFuture<'a, ()> {
        Box::pin(self.ensure(collection))
    }

    fn create_index<'a>(
        &'a self,
        collection: &'a str,
        name: &'a str,
        spec: &'a IndexSpec,
    ) -> AdapterFuture<'a, ()> {
        Box::pin(self.index(collection, name, spec))
    }

    fn insert<'a>(&'a self, collection: &'a str, object: Document) -> AdapterFuture<'a, String> {
        Box::pin(self.store(collection, object))
    }

    fn find_by_id<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
    ) -> AdapterFuture<'a, Option<FetchedRecord>> {
        Box::pin(self.fetch_by_id(collection, id))
    }

    fn find<'a>(
        &'a self,
        collection: &'a str,
        query: &'a Query,
    ) -> AdapterFuture<'a, Vec<FetchedRecord>> {
        Box::pin(self.fetch_all(collection, query))
    }

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        query: &'a Query,
    ) -> AdapterFuture<'a, Option<FetchedRecord>> {
        Box::pin(self.fetch_one(collection, query))
    }

    fn count<'a>(&'a self, collection: &'a str, query: &'a Query) -> AdapterFuture<'a, u64> {
        Box::pin(async move { Ok(self.raw_cursor(collection, query).await?.count().await?) })
    }

    fn sum<'a>(
        &'a self,
        collection: &'a str,
        query: &'a Query,
        field: &'a str,
    ) -> AdapterFuture<'a, f64> {
        Box::pin(async move {
            let selection = self.raw_cursor(collection, query).await?;
            Ok(selection.sum(&row_path(field)).await?)
        })
    }

    fn remove_by_id<'a>(&'a self, collection: &'a str, id: &'a str) -> AdapterFuture<'a, ()> {
        Box::pin(async move {
            self.raw_table(collection).await?.get_delete(id).await?;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, collection: &'a str, query: &'a Query) -> AdapterFuture<'a, u64> {
        Box::pin(async move { Ok(self.raw_cursor(collection, query).await?.delete().await?) })
    }

    fn replace_by_id<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        object: Document,
    ) -> AdapterFuture<'a, ()> {
        Box::pin(self.replace(collection, id, object))
    }

    fn update_by_id<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        object: Document,
        updated_paths: &'a BTreeSet<String>,
    ) -> AdapterFuture<'a, ()> {
        Box::pin(self.update(collection, id, object, updated_paths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    async fn adapter() -> (TableServer, TableStoreAdapter) {
        let server = TableServer::new();
        let adapter = TableStoreAdapter::new(&server, TableStoreConfig::default());
        adapter.ensure_collection("things").await.unwrap();
        (server, adapter)
    }

    #[tokio::test]
    async fn test_user_id_field_survives_round_trip() {
        let (_server, adapter) = adapter().await;
        let id = adapter
            .insert("things", doc(json!({"id": "mine", "a": 1})))
            .await
            .unwrap();

        let raw = adapter.raw_table("things").await.unwrap().get(&id).await.unwrap().unwrap();
        assert_eq!(raw["_id"], "mine");
        assert_eq!(raw["id"], json!(id));

        let fetched = adapter.find_by_id("things", &id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(Value::Object(fetched.object), json!({"id": "mine", "a": 1}));
    }

    #[tokio::test]
    async fn test_index_registered_under_derived_name() {
        let (_server, adapter) = adapter().await;
        let spec = IndexSpec::new().field("b", -1).field("a", -1);
        adapter.create_index("things", "wow", &spec).await.unwrap();
        adapter.create_index("things", "wow", &spec).await.unwrap();

        assert!(adapter.registry().contains("things", "a+b"));
        let names = adapter
            .raw_table("things")
            .await
            .unwrap()
            .index_list()
            .await
            .unwrap();
        assert_eq!(names, vec!["a+b"]);
    }

    #[tokio::test]
    async fn test_raw_cursor_uses_index_source() {
        let (_server, adapter) = adapter().await;
        adapter
            .create_index("things", "a", &IndexSpec::new().field("a", 1))
            .await
            .unwrap();

        let query = Query::new().with(crate::query::QueryOperation::Equals {
            field: "a".into(),
            value: json!(1).into(),
        });
        let selection = adapter.raw_cursor("things", &query).await.unwrap();
        assert!(matches!(selection.source(), Source::GetAll { .. }));
    }

    #[tokio::test]
    async fn test_update_partial() {
        let (_server, adapter) = adapter().await;
        let id = adapter
            .insert("things", doc(json!({"a": 1, "b": 2, "c": 3})))
            .await
            .unwrap();

        let paths: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        adapter
            .update_by_id("things", &id, doc(json!({"a": 5, "c": 9})), &paths)
            .await
            .unwrap();

        let fetched = adapter.find_by_id("things", &id).await.unwrap().unwrap();
        assert_eq!(Value::Object(fetched.object), json!({"a": 5, "c": 3}));
    }
}
