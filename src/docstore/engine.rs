//! In-process document store engine
//!
//! A [`DocServer`] holds databases of collections of JSON documents keyed by
//! `_id`. Clients reach it through a [`DocClient`] obtained from
//! [`DocServer::connect`]; every client call fails with `ServerUnavailable`
//! while the server is offline.
//!
//! Reads go through a [`DocCursor`]: an ordered pipeline of `Match`, `Sort`,
//! `Skip` and `Limit` stages executed in order.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use super::errors::{DocStoreError, DocStoreResult};
use super::eval::{compare_values, matches, resolve};
use crate::document::{get_path, remove_path, set_path, Document};

/// Native identity key
pub const ID_KEY: &str = "_id";

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// =============================================================================
// Server
// =============================================================================

struct ServerState {
    online: AtomicBool,
    connect_latency_ms: AtomicU64,
    id_counter: AtomicU64,
    databases: RwLock<HashMap<String, Arc<Database>>>,
}

/// Handle to an in-process document store server
#[derive(Clone)]
pub struct DocServer {
    state: Arc<ServerState>,
}

impl Default for DocServer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocServer {
    /// Start an empty, online server
    pub fn new() -> Self {
        let seed = uuid::Uuid::new_v4().as_u128() as u64 >> 16;
        Self {
            state: Arc::new(ServerState {
                online: AtomicBool::new(true),
                connect_latency_ms: AtomicU64::new(0),
                id_counter: AtomicU64::new(seed),
                databases: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Take the server offline (or back online)
    pub fn set_online(&self, online: bool) {
        self.state.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.state.online.load(Ordering::SeqCst)
    }

    /// Delay applied to every new connection
    pub fn set_connect_latency(&self, latency: Duration) {
        self.state
            .connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of collection create requests received by a database
    pub fn create_requests(&self, db_name: &str) -> usize {
        read(&self.state.databases)
            .get(db_name)
            .map(|db| db.create_requests.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Connect to a database, creating it on first use
    pub fn connect(
        &self,
        db_name: impl Into<String>,
    ) -> impl Future<Output = DocStoreResult<DocClient>> + Send + 'static {
        let server = self.clone();
        let db_name = db_name.into();
        async move {
            let latency = server.state.connect_latency_ms.load(Ordering::SeqCst);
            if latency > 0 {
                tokio::time::sleep(Duration::from_millis(latency)).await;
            }
            server.check_online()?;

            let db = write(&server.state.databases)
                .entry(db_name.clone())
                .or_insert_with(|| Arc::new(Database::default()))
                .clone();
            Ok(DocClient {
                server,
                db_name,
                db,
            })
        }
    }

    fn check_online(&self) -> DocStoreResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(DocStoreError::ServerUnavailable(
                "connection refused".to_string(),
            ))
        }
    }

    /// ObjectId-like id: 8 hex digits of seconds, 16 of counter
    fn next_id(&self) -> String {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let counter = self.state.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("{:08x}{:016x}", secs as u32, counter)
    }
}

#[derive(Default)]
struct Database {
    collections: RwLock<HashMap<String, Arc<RwLock<CollectionData>>>>,
    create_requests: AtomicUsize,
}

#[derive(Default)]
struct CollectionData {
    docs: Vec<Document>,
    indexes: BTreeMap<String, Document>,
}

impl CollectionData {
    fn position(&self, id: &str) -> Option<usize> {
        self.docs
            .iter()
            .position(|d| d.get(ID_KEY).and_then(Value::as_str) == Some(id))
    }
}

// =============================================================================
// Client
// =============================================================================

/// Connection to one database
#[derive(Clone)]
pub struct DocClient {
    server: DocServer,
    db_name: String,
    db: Arc<Database>,
}

impl DocClient {
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Create a collection; fails with `CollectionExists` if present
    pub async fn create_collection(&self, name: &str) -> DocStoreResult<()> {
        self.server.check_online()?;
        self.db.create_requests.fetch_add(1, Ordering::SeqCst);

        let mut collections = write(&self.db.collections);
        if collections.contains_key(name) {
            return Err(DocStoreError::CollectionExists(format!(
                "{}.{}",
                self.db_name, name
            )));
        }
        collections.insert(name.to_string(), Arc::default());
        Ok(())
    }

    /// Collection names, sorted
    pub async fn list_collections(&self) -> DocStoreResult<Vec<String>> {
        self.server.check_online()?;
        let mut names: Vec<String> = read(&self.db.collections).keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Handle to a collection; existence is checked per operation
    pub fn collection(&self, name: &str) -> DocCollection {
        DocCollection {
            client: self.clone(),
            name: name.to_string(),
        }
    }
}

// =============================================================================
// Collection
// =============================================================================

/// Handle to one collection
#[derive(Clone)]
pub struct DocCollection {
    client: DocClient,
    name: String,
}

impl DocCollection {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn data(&self) -> DocStoreResult<Arc<RwLock<CollectionData>>> {
        self.client.server.check_online()?;
        read(&self.client.db.collections)
            .get(&self.name)
            .cloned()
            .ok_or_else(|| {
                DocStoreError::NamespaceNotFound(format!("{}.{}", self.client.db_name, self.name))
            })
    }

    /// Insert a document, generating `_id` when absent
    pub async fn insert_one(&self, mut doc: Document) -> DocStoreResult<String> {
        let data = self.data()?;
        let mut data = write(&data);

        let id = match doc.get(ID_KEY) {
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => self.client.server.next_id(),
        };
        if data.position(&id).is_some() {
            return Err(DocStoreError::DuplicateKey(format!("_id: {}", id)));
        }

        doc.insert(ID_KEY.to_string(), Value::String(id.clone()));
        data.docs.push(doc);
        Ok(id)
    }

    /// Start a read pipeline with an initial filter
    pub fn find(&self, filter: Document) -> DocCursor {
        DocCursor::new(self.clone()).match_stage(filter)
    }

    /// Pipeline over every document
    pub fn aggregate(&self) -> DocCursor {
        DocCursor::new(self.clone())
    }

    /// Replace the first matching document, keeping its `_id`.
    ///
    /// Returns the number of matched documents.
    pub async fn replace_one(&self, filter: &Document, mut replacement: Document) -> DocStoreResult<u64> {
        let data = self.data()?;
        let mut data = write(&data);

        let Some(pos) = first_match(&data.docs, filter)? else {
            return Ok(0);
        };
        if let Some(id) = data.docs[pos].get(ID_KEY).cloned() {
            replacement.insert(ID_KEY.to_string(), id);
        }
        data.docs[pos] = replacement;
        Ok(1)
    }

    /// Apply `{$set: {...}, $unset: {...}}` to the first matching document.
    ///
    /// Returns the number of matched documents.
    pub async fn update_one(&self, filter: &Document, update: &Document) -> DocStoreResult<u64> {
        for key in update.keys() {
            if key != "$set" && key != "$unset" {
                return Err(DocStoreError::BadQuery(format!(
                    "unsupported update operator: {}",
                    key
                )));
            }
        }

        let data = self.data()?;
        let mut data = write(&data);
        let Some(pos) = first_match(&data.docs, filter)? else {
            return Ok(0);
        };

        let doc = &mut data.docs[pos];
        if let Some(Value::Object(set)) = update.get("$set") {
            for (path, value) in set {
                if path == ID_KEY {
                    return Err(DocStoreError::BadQuery("_id is immutable".into()));
                }
                set_path(doc, path, value.clone());
            }
        }
        if let Some(Value::Object(unset)) = update.get("$unset") {
            for path in unset.keys() {
                if path != ID_KEY {
                    remove_path(doc, path);
                }
            }
        }
        Ok(1)
    }

    /// Delete the first matching document, returning the deleted count
    pub async fn delete_one(&self, filter: &Document) -> DocStoreResult<u64> {
        let data = self.data()?;
        let mut data = write(&data);
        match first_match(&data.docs, filter)? {
            Some(pos) => {
                data.docs.remove(pos);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    /// Create a named index over `keys` (`{field: 1 | -1}`)
    pub async fn create_index(&self, name: &str, keys: Document) -> DocStoreResult<()> {
        let data = self.data()?;
        let mut data = write(&data);
        if data.indexes.contains_key(name) {
            return Err(DocStoreError::IndexExists(name.to_string()));
        }
        data.indexes.insert(name.to_string(), keys);
        Ok(())
    }

    /// Index names and their key documents
    pub async fn list_indexes(&self) -> DocStoreResult<Vec<Document>> {
        let data = self.data()?;
        let data = read(&data);
        Ok(data
            .indexes
            .iter()
            .map(|(name, keys)| {
                let mut info = Document::new();
                info.insert("name".into(), json!(name));
                info.insert("key".into(), Value::Object(keys.clone()));
                info
            })
            .collect())
    }

    fn snapshot(&self) -> DocStoreResult<Vec<Document>> {
        let data = self.data()?;
        let docs = read(&data).docs.clone();
        Ok(docs)
    }

    fn delete_ids(&self, ids: &[String]) -> DocStoreResult<u64> {
        let data = self.data()?;
        let mut data = write(&data);
        let before = data.docs.len();
        data.docs.retain(|d| {
            !d.get(ID_KEY)
                .and_then(Value::as_str)
                .map_or(false, |id| ids.iter().any(|x| x == id))
        });
        Ok((before - data.docs.len()) as u64)
    }
}

fn first_match(docs: &[Document], filter: &Document) -> DocStoreResult<Option<usize>> {
    for (pos, doc) in docs.iter().enumerate() {
        if matches(doc, filter)? {
            return Ok(Some(pos));
        }
    }
    Ok(None)
}

// =============================================================================
// Cursor
// =============================================================================

/// Pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Document),
    Sort { field: String, descending: bool },
    Skip(u64),
    Limit(u64),
}

/// Lazily executed read pipeline
#[derive(Clone)]
pub struct DocCursor {
    collection: DocCollection,
    stages: Vec<Stage>,
}

impl DocCursor {
    fn new(collection: DocCollection) -> Self {
        Self {
            collection,
            stages: Vec::new(),
        }
    }

    /// Append a stage
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append a `Match` stage; an empty filter is dropped
    pub fn match_stage(self, filter: Document) -> Self {
        if filter.is_empty() {
            self
        } else {
            self.stage(Stage::Match(filter))
        }
    }

    pub fn sort(self, field: impl Into<String>, descending: bool) -> Self {
        self.stage(Stage::Sort {
            field: field.into(),
            descending,
        })
    }

    pub fn skip(self, count: u64) -> Self {
        self.stage(Stage::Skip(count))
    }

    pub fn limit(self, count: u64) -> Self {
        self.stage(Stage::Limit(count))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn collection(&self) -> &DocCollection {
        &self.collection
    }

    fn execute(&self) -> DocStoreResult<Vec<Document>> {
        let mut docs = self.collection.snapshot()?;

        for stage in &self.stages {
            match stage {
                Stage::Match(filter) => {
                    let mut kept = Vec::with_capacity(docs.len());
                    for doc in docs {
                        if matches(&doc, filter)? {
                            kept.push(doc);
                        }
                    }
                    docs = kept;
                }
                Stage::Sort { field, descending } => {
                    docs.sort_by(|a, b| {
                        let ord = compare_values(get_path(a, field), get_path(b, field));
                        if *descending {
                            ord.reverse()
                        } else {
                            ord
                        }
                    });
                }
                Stage::Skip(n) => {
                    let n = (*n as usize).min(docs.len());
                    docs.drain(..n);
                }
                Stage::Limit(n) => docs.truncate(*n as usize),
            }
        }
        Ok(docs)
    }

    /// Run the pipeline and collect every document
    pub async fn to_vec(&self) -> DocStoreResult<Vec<Document>> {
        self.execute()
    }

    /// First document of the pipeline output
    pub async fn first(&self) -> DocStoreResult<Option<Document>> {
        Ok(self.execute()?.into_iter().next())
    }

    pub async fn count(&self) -> DocStoreResult<u64> {
        Ok(self.execute()?.len() as u64)
    }

    /// Sum of the numeric values at `field`; other values are ignored
    pub async fn sum(&self, field: &str) -> DocStoreResult<f64> {
        let docs = self.execute()?;
        Ok(docs
            .iter()
            .flat_map(|doc| resolve(doc, field))
            .filter_map(Value::as_f64)
            .sum())
    }

    /// Delete every document the pipeline yields
    pub async fn delete_many(&self) -> DocStoreResult<u64> {
        let ids: Vec<String> = self
            .execute()?
            .iter()
            .filter_map(|d| d.get(ID_KEY).and_then(Value::as_str).map(String::from))
            .collect();
        self.collection.delete_ids(&ids)
    }
}

impl std::fmt::Debug for DocCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocCursor")
            .field("collection", &self.collection.name)
            .field("stages", &self.stages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    async fn collection_with(values: &[i64]) -> DocCollection {
        let server = DocServer::new();
        let client = server.connect("test").await.unwrap();
        client.create_collection("c").await.unwrap();
        let c = client.collection("c");
        for v in values {
            c.insert_one(doc(json!({"a": v}))).await.unwrap();
        }
        c
    }

    #[tokio::test]
    async fn test_insert_generates_hex_id() {
        let c = collection_with(&[]).await;
        let id = c.insert_one(doc(json!({"a": 1}))).await.unwrap();
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|ch| ch.is_ascii_hexdigit()));

        let fetched = c.find(doc(json!({"_id": id}))).first().await.unwrap().unwrap();
        assert_eq!(fetched["a"], 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let c = collection_with(&[]).await;
        c.insert_one(doc(json!({"_id": "x"}))).await.unwrap();
        let err = c.insert_one(doc(json!({"_id": "x"}))).await.unwrap_err();
        assert_eq!(err.code(), 11000);
    }

    #[tokio::test]
    async fn test_pipeline_runs_in_order() {
        let c = collection_with(&[2, 4, 1, 5, 3]).await;
        let docs = c.aggregate().sort("a", false).skip(1).to_vec().await.unwrap();
        let values: Vec<i64> = docs.iter().map(|d| d["a"].as_i64().unwrap()).collect();
        assert_eq!(values, vec![2, 3, 4, 5]);

        // Limit before sort keeps the first two in natural order
        let docs = c.aggregate().limit(2).sort("a", true).to_vec().await.unwrap();
        let values: Vec<i64> = docs.iter().map(|d| d["a"].as_i64().unwrap()).collect();
        assert_eq!(values, vec![4, 2]);
    }

    #[tokio::test]
    async fn test_count_sum_delete() {
        let c = collection_with(&[1, 2, 3]).await;
        let cursor = c.find(doc(json!({"a": {"$gte": 2}})));
        assert_eq!(cursor.count().await.unwrap(), 2);
        assert_eq!(cursor.sum("a").await.unwrap(), 5.0);
        assert_eq!(cursor.delete_many().await.unwrap(), 2);
        assert_eq!(c.aggregate().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_set_unset() {
        let c = collection_with(&[]).await;
        let id = c.insert_one(doc(json!({"a": 1, "b": 2}))).await.unwrap();
        let filter = doc(json!({"_id": id}));

        let matched = c
            .update_one(&filter, &doc(json!({"$set": {"c.d": 3}, "$unset": {"b": ""}})))
            .await
            .unwrap();
        assert_eq!(matched, 1);

        let stored = c.find(filter).first().await.unwrap().unwrap();
        assert_eq!(Value::Object(stored), json!({"_id": id, "a": 1, "c": {"d": 3}}));
    }

    #[tokio::test]
    async fn test_create_collection_twice() {
        let server = DocServer::new();
        let client = server.connect("db").await.unwrap();
        client.create_collection("c").await.unwrap();
        let err = client.create_collection("c").await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(server.create_requests("db"), 2);
    }

    #[tokio::test]
    async fn test_offline_server() {
        let server = DocServer::new();
        let client = server.connect("db").await.unwrap();
        server.set_online(false);
        assert!(matches!(
            client.create_collection("c").await,
            Err(DocStoreError::ServerUnavailable(_))
        ));
        assert!(server.connect("db").await.is_err());
    }
}
