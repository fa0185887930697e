//! Document store adapter

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};

use super::compiler::{by_field, compile};
use super::engine::{DocClient, DocCollection, DocCursor, DocServer, Stage, ID_KEY};
use super::errors::DocStoreError;
use crate::adapter::{partial_update, Adapter, AdapterFuture, Provisioner, SharedConnection};
use crate::config::DocStoreConfig;
use crate::document::Document;
use crate::error::{DbError, DbResult};
use crate::identity::{inbound, outbound, FetchedRecord};
use crate::index::IndexSpec;
use crate::observability::{log_event, Event};
use crate::query::Query;

const BACKEND: &str = "docstore";

/// Adapter over a [`DocServer`]
pub struct DocStoreAdapter {
    config: DocStoreConfig,
    connection: SharedConnection<DocClient>,
    provisioner: Provisioner,
}

impl DocStoreAdapter {
    /// Create the adapter and start connecting
    pub fn new(server: &DocServer, config: DocStoreConfig) -> Self {
        let connect = server.connect(config.db_name.clone());
        let connection = SharedConnection::spawn(BACKEND, config.connect_timeout, async move {
            connect.await.map_err(DbError::from)
        });

        Self {
            config,
            connection,
            provisioner: Provisioner::new(),
        }
    }

    pub fn config(&self) -> &DocStoreConfig {
        &self.config
    }

    /// The shared client connection
    pub async fn raw_connection(&self) -> DbResult<Arc<DocClient>> {
        self.connection.get().await
    }

    /// Native collection handle, once the collection is provisioned
    pub async fn raw_collection(&self, collection: &str) -> DbResult<DocCollection> {
        self.provisioner.wait(collection).await?;
        let client = self.connection.get().await?;
        Ok(client.collection(collection))
    }

    /// Native cursor for a compiled query
    pub async fn raw_cursor(&self, collection: &str, query: &Query) -> DbResult<DocCursor> {
        let handle = self.raw_collection(collection).await?;
        let stages = compile(query);

        log_event(
            Event::QueryCompiled,
            &[
                ("backend", BACKEND),
                ("collection", collection),
                ("ops", &query.describe()),
                ("stages", &stages.len().to_string()),
            ],
        );

        Ok(stages
            .into_iter()
            .fold(handle.aggregate(), |cursor, stage| cursor.stage(stage)))
    }

    async fn ensure(&self, collection: &str) -> DbResult<()> {
        let connection = self.connection.clone();
        let name = collection.to_string();
        self.provisioner
            .ensure(collection, move || async move {
                let client = connection.get().await?;
                match client.create_collection(&name).await {
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

    async fn index(&self, collection: &str, name: &str, spec: &IndexSpec) -> DbResult<()> {
        let handle = self.raw_collection(collection).await?;
        let keys: Document = spec
            .fields()
            .iter()
            .map(|(path, direction)| (path.clone(), json!(direction)))
            .collect();

        match handle.create_index(name, keys).await {
            Ok(()) => {
                log_event(
                    Event::IndexCreated,
                    &[("backend", BACKEND), ("collection", collection), ("index", name)],
                );
                Ok(())
            }
            Err(DocStoreError::IndexExists(_)) => {
                log_event(
                    Event::IndexExists,
                    &[("backend", BACKEND), ("collection", collection), ("index", name)],
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_all(&self, collection: &str, query: &Query) -> DbResult<Vec<FetchedRecord>> {
        let docs = self.raw_cursor(collection, query).await?.to_vec().await?;
        Ok(docs
            .into_iter()
            .filter_map(|doc| inbound(ID_KEY, doc))
            .collect())
    }

    async fn fetch_one(&self, collection: &str, query: &Query) -> DbResult<Option<FetchedRecord>> {
        let doc = self
            .raw_cursor(collection, query)
            .await?
            .stage(Stage::Limit(1))
            .first()
            .await?;
        Ok(doc.and_then(|doc| inbound(ID_KEY, doc)))
    }

    async fn fetch_by_id(&self, collection: &str, id: &str) -> DbResult<Option<FetchedRecord>> {
        let doc = self
            .raw_collection(collection)
            .await?
            .find(by_field(ID_KEY, id))
            .first()
            .await?;
        Ok(doc.and_then(|doc| inbound(ID_KEY, doc)))
    }

    async fn replace(&self, collection: &str, id: &str, object: Document) -> DbResult<()> {
        let mut replacement = outbound(ID_KEY, &object);
        replacement.remove(ID_KEY);

        let matched = self
            .raw_collection(collection)
            .await?
            .replace_one(&by_field(ID_KEY, id), replacement)
            .await?;
        if matched == 0 {
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
        let object = outbound(ID_KEY, &object);
        let (mut set, unset) = partial_update(&object, updated_paths);
        set.remove(ID_KEY);

        let unset: Document = unset
            .into_iter()
            .filter(|key| key != ID_KEY)
            .map(|key| (key, Value::String(String::new())))
            .collect();

        let mut update = Document::new();
        if !set.is_empty() {
            update.insert("$set".into(), Value::Object(set));
        }
        if !unset.is_empty() {
            update.insert("$unset".into(), Value::Object(unset));
        }

        let handle = self.raw_collection(collection).await?;
        let filter = by_field(ID_KEY, id);
        let matched = if update.is_empty() {
            handle.find(filter).count().await?
        } else {
            handle.update_one(&filter, &update).await?
        };
        if matched == 0 {
            return Err(DbError::not_found(format!("{} in {}", id, collection)));
        }
        Ok(())
    }
}

impl Adapter for DocStoreAdapter {
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
        Box::pin(async move {
            let handle = self.raw_collection(collection).await?;
            Ok(handle.insert_one(outbound(ID_KEY, &object)).await?)
        })
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
        Box::pin(async move { Ok(self.raw_cursor(collection, query).await?.sum(field).await?) })
    }

    fn remove_by_id<'a>(&'a self, collection: &'a str, id: &'a str) -> AdapterFuture<'a, ()> {
        Box::pin(async move {
            let handle = self.raw_collection(collection).await?;
            handle.delete_one(&by_field(ID_KEY, id)).await?;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, collection: &'a str, query: &'a Query) -> AdapterFuture<'a, u64> {
        Box::pin(async move { Ok(self.raw_cursor(collection, query).await?.delete_many().await?) })
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
