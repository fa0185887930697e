//! In-process table store engine
//!
//! A [`TableServer`] holds databases of tables of JSON rows keyed by `id`.
//! Tables carry secondary composite indexes over dotted field paths; a row
//! whose indexed fields are missing or not scalar is left out of the index.
//!
//! Reads go through a [`Selection`]: a source (the whole table or a
//! `get_all` index lookup) followed by `Filter`, `OrderBy`, `Skip` and
//! `Limit` stages executed in order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{TableStoreError, TableStoreResult};
use super::term::{compare_values, truthy, type_name, EvalError, Term};
use crate::document::{get_path, Document};
use crate::index::{CompositeKey, IndexKey, IndexTree};

/// Native primary key
pub const PRIMARY_KEY: &str = "id";

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
    databases: RwLock<HashMap<String, Arc<Database>>>,
}

/// Handle to an in-process table store server
#[derive(Clone)]
pub struct TableServer {
    state: Arc<ServerState>,
}

impl Default for TableServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TableServer {
    /// Start an empty, online server
    pub fn new() -> Self {
        Self {
            state: Arc::new(ServerState {
                online: AtomicBool::new(true),
                connect_latency_ms: AtomicU64::new(0),
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

    /// Number of table create requests received by a database
    pub fn create_requests(&self, db: &str) -> usize {
        read(&self.state.databases)
            .get(db)
            .map(|db| db.create_requests.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Open a connection using `db` as the default database
    pub fn connect(
        &self,
        address: impl Into<String>,
        db: impl Into<String>,
    ) -> impl Future<Output = TableStoreResult<TableConnection>> + Send + 'static {
        let server = self.clone();
        let address = address.into();
        let db_name = db.into();
        async move {
            let latency = server.state.connect_latency_ms.load(Ordering::SeqCst);
            if latency > 0 {
                tokio::time::sleep(Duration::from_millis(latency)).await;
            }
            if !server.is_online() {
                return Err(TableStoreError::Connection(address));
            }

            let db = write(&server.state.databases)
                .entry(db_name.clone())
                .or_insert_with(|| Arc::new(Database::default()))
                .clone();
            Ok(TableConnection {
                server,
                address,
                db_name,
                db,
            })
        }
    }
}

#[derive(Default)]
struct Database {
    tables: RwLock<HashMap<String, Arc<RwLock<TableData>>>>,
    create_requests: AtomicUsize,
}

struct SecondaryIndex {
    fields: Vec<String>,
    tree: IndexTree,
}

impl SecondaryIndex {
    fn key_for(&self, row: &Document) -> Option<CompositeKey> {
        let values: Option<Vec<&Value>> = self.fields.iter().map(|f| get_path(row, f)).collect();
        IndexKey::composite(values?)
    }

    /// Values the index orders rows by; a missing field reads as null
    fn order_values(&self, row: &Document) -> Vec<Value> {
        self.fields
            .iter()
            .map(|f| get_path(row, f).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

#[derive(Default)]
struct TableData {
    rows: BTreeMap<u64, Document>,
    keys: HashMap<String, u64>,
    next_seq: u64,
    indexes: BTreeMap<String, SecondaryIndex>,
}

impl TableData {
    fn index_row(&mut self, pk: &str, row: &Document) {
        for index in self.indexes.values_mut() {
            if let Some(key) = index.key_for(row) {
                index.tree.insert(key, pk.to_string());
            }
        }
    }

    fn unindex_row(&mut self, pk: &str, row: &Document) {
        for index in self.indexes.values_mut() {
            if let Some(key) = index.key_for(row) {
                index.tree.remove(&key, pk);
            }
        }
    }

    fn insert(&mut self, pk: String, row: Document) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index_row(&pk, &row);
        self.keys.insert(pk, seq);
        self.rows.insert(seq, row);
    }

    fn remove(&mut self, pk: &str) -> bool {
        let Some(seq) = self.keys.remove(pk) else {
            return false;
        };
        if let Some(row) = self.rows.remove(&seq) {
            self.unindex_row(pk, &row);
        }
        true
    }

    /// Swap the stored row for `pk`, keeping its position
    fn put(&mut self, pk: &str, row: Document) -> bool {
        let Some(&seq) = self.keys.get(pk) else {
            return false;
        };
        if let Some(old) = self.rows.remove(&seq) {
            self.unindex_row(pk, &old);
        }
        self.index_row(pk, &row);
        self.rows.insert(seq, row);
        true
    }

    fn get(&self, pk: &str) -> Option<&Document> {
        self.keys.get(pk).and_then(|seq| self.rows.get(seq))
    }
}

fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Connection with a default database
#[derive(Clone)]
pub struct TableConnection {
    server: TableServer,
    address: String,
    db_name: String,
    db: Arc<Database>,
}

impl TableConnection {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    fn check_open(&self) -> TableStoreResult<()> {
        if self.server.is_online() {
            Ok(())
        } else {
            Err(TableStoreError::Connection(self.address.clone()))
        }
    }

    /// Create a table; fails with `TableExists` if present
    pub async fn table_create(&self, name: &str) -> TableStoreResult<()> {
        self.check_open()?;
        self.db.create_requests.fetch_add(1, Ordering::SeqCst);

        let mut tables = write(&self.db.tables);
        if tables.contains_key(name) {
            return Err(TableStoreError::TableExists(format!("{}.{}", self.db_name, name)));
        }
        tables.insert(name.to_string(), Arc::default());
        Ok(())
    }

    /// Table names, sorted
    pub async fn table_list(&self) -> TableStoreResult<Vec<String>> {
        self.check_open()?;
        let mut names: Vec<String> = read(&self.db.tables).keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Handle to a table; existence is checked per operation
    pub fn table(&self, name: &str) -> Table {
        Table {
            conn: self.clone(),
            name: name.to_string(),
        }
    }
}

// =============================================================================
// Table
// =============================================================================

/// Result of an insert
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertResult {
    pub inserted: u64,
    /// Keys generated for rows inserted without an `id`
    pub generated_keys: Vec<String>,
}

/// Handle to one table
#[derive(Clone)]
pub struct Table {
    conn: TableConnection,
    name: String,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn data(&self) -> TableStoreResult<Arc<RwLock<TableData>>> {
        self.conn.check_open()?;
        read(&self.conn.db.tables)
            .get(&self.name)
            .cloned()
            .ok_or_else(|| TableStoreError::TableNotFound(format!("{}.{}", self.conn.db_name, self.name)))
    }

    /// Insert a row, generating a UUID `id` when absent
    pub async fn insert(&self, mut row: Document) -> TableStoreResult<InsertResult> {
        let data = self.data()?;
        let mut data = write(&data);
        let mut result = InsertResult::default();

        let pk = match row.get(PRIMARY_KEY) {
            Some(existing) => key_string(existing),
            None => {
                let generated = uuid::Uuid::new_v4().to_string();
                row.insert(PRIMARY_KEY.to_string(), Value::String(generated.clone()));
                result.generated_keys.push(generated.clone());
                generated
            }
        };
        if data.keys.contains_key(&pk) {
            return Err(TableStoreError::DuplicateKey(pk));
        }

        data.insert(pk, row);
        result.inserted = 1;
        Ok(result)
    }

    /// Row by primary key
    pub async fn get(&self, key: &str) -> TableStoreResult<Option<Document>> {
        let data = self.data()?;
        let data = read(&data);
        Ok(data.get(key).cloned())
    }

    /// Delete a row by primary key, returning the deleted count
    pub async fn get_delete(&self, key: &str) -> TableStoreResult<u64> {
        let data = self.data()?;
        let removed = write(&data).remove(key);
        Ok(u64::from(removed))
    }

    /// Replace a row by primary key, keeping the key.
    ///
    /// Returns the replaced count.
    pub async fn get_replace(&self, key: &str, mut row: Document) -> TableStoreResult<u64> {
        let data = self.data()?;
        let mut data = write(&data);
        let Some(pk_value) = data.get(key).and_then(|r| r.get(PRIMARY_KEY)).cloned() else {
            return Ok(0);
        };
        row.insert(PRIMARY_KEY.to_string(), pk_value);
        Ok(u64::from(data.put(key, row)))
    }

    /// Merge top-level `patch` keys into a row and drop the `remove` keys.
    ///
    /// The primary key is never changed. Returns the matched count.
    pub async fn get_update(
        &self,
        key: &str,
        patch: Document,
        remove: &[String],
    ) -> TableStoreResult<u64> {
        let data = self.data()?;
        let mut data = write(&data);
        let Some(mut row) = data.get(key).cloned() else {
            return Ok(0);
        };

        for field in remove {
            if field != PRIMARY_KEY {
                row.remove(field);
            }
        }
        for (field, value) in patch {
            if field != PRIMARY_KEY {
                row.insert(field, value);
            }
        }
        Ok(u64::from(data.put(key, row)))
    }

    /// Create a secondary index over `fields`, building it from current rows
    pub async fn index_create(&self, name: &str, fields: Vec<String>) -> TableStoreResult<()> {
        let data = self.data()?;
        let mut data = write(&data);
        if data.indexes.contains_key(name) {
            return Err(TableStoreError::IndexExists {
                table: self.name.clone(),
                index: name.to_string(),
            });
        }

        let mut index = SecondaryIndex {
            fields,
            tree: IndexTree::new(),
        };
        for (pk, seq) in &data.keys {
            if let Some(row) = data.rows.get(seq) {
                if let Some(key) = index.key_for(row) {
                    index.tree.insert(key, pk.clone());
                }
            }
        }
        data.indexes.insert(name.to_string(), index);
        Ok(())
    }

    /// Wait until an index is ready; indexes are built synchronously
    pub async fn index_wait(&self, name: &str) -> TableStoreResult<()> {
        let data = self.data()?;
        let data = read(&data);
        if data.indexes.contains_key(name) {
            Ok(())
        } else {
            Err(TableStoreError::IndexNotFound {
                table: self.name.clone(),
                index: name.to_string(),
            })
        }
    }

    /// Index names, sorted
    pub async fn index_list(&self) -> TableStoreResult<Vec<String>> {
        let data = self.data()?;
        let names = read(&data).indexes.keys().cloned().collect();
        Ok(names)
    }

    /// Selection over every row
    pub fn select(&self) -> Selection {
        Selection {
            table: self.clone(),
            source: Source::Table,
            stages: Vec::new(),
        }
    }

    /// Selection of rows whose `index` key equals one of `keys`
    pub fn get_all(&self, keys: Vec<Vec<Value>>, index: impl Into<String>) -> Selection {
        Selection {
            table: self.clone(),
            source: Source::GetAll {
                index: index.into(),
                keys,
            },
            stages: Vec::new(),
        }
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Where a selection draws rows from
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table,
    GetAll { index: String, keys: Vec<Vec<Value>> },
}

/// What an `OrderBy` stage sorts on
#[derive(Debug, Clone, PartialEq)]
pub enum OrderKey {
    /// Order of the indexed fields, using the same total order as `Field`
    Index(String),
    /// Value of a term per row
    Field(Term),
}

/// Selection stage
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionStage {
    Filter(Term),
    OrderBy { key: OrderKey, descending: bool },
    Skip(u64),
    Limit(u64),
}

/// Lazily executed table read
#[derive(Clone)]
pub struct Selection {
    table: Table,
    source: Source,
    stages: Vec<SelectionStage>,
}

impl Selection {
    /// Append a stage
    pub fn stage(mut self, stage: SelectionStage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Keep rows for which `predicate` is truthy.
    ///
    /// A missing field makes the predicate false rather than an error.
    pub fn filter(self, predicate: Term) -> Self {
        self.stage(SelectionStage::Filter(predicate))
    }

    pub fn order_by(self, term: Term, descending: bool) -> Self {
        self.stage(SelectionStage::OrderBy {
            key: OrderKey::Field(term),
            descending,
        })
    }

    pub fn order_by_index(self, index: impl Into<String>, descending: bool) -> Self {
        self.stage(SelectionStage::OrderBy {
            key: OrderKey::Index(index.into()),
            descending,
        })
    }

    pub fn skip(self, count: u64) -> Self {
        self.stage(SelectionStage::Skip(count))
    }

    pub fn limit(self, count: u64) -> Self {
        self.stage(SelectionStage::Limit(count))
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn stages(&self) -> &[SelectionStage] {
        &self.stages
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    fn index<'a>(&self, data: &'a TableData, name: &str) -> TableStoreResult<&'a SecondaryIndex> {
        data.indexes
            .get(name)
            .ok_or_else(|| TableStoreError::IndexNotFound {
                table: self.table.name.clone(),
                index: name.to_string(),
            })
    }

    fn execute(&self) -> TableStoreResult<Vec<Document>> {
        let data = self.table.data()?;
        let data = read(&data);

        let mut rows: Vec<Document> = match &self.source {
            Source::Table => data.rows.values().cloned().collect(),
            Source::GetAll { index, keys } => {
                let index = self.index(&data, index)?;
                let mut seqs: BTreeSet<u64> = BTreeSet::new();
                for key in keys {
                    let Some(key) = IndexKey::composite(key.iter()) else {
                        continue;
                    };
                    for pk in index.tree.lookup_eq(&key) {
                        seqs.extend(data.keys.get(&pk).copied());
                    }
                }
                seqs.iter().filter_map(|seq| data.rows.get(seq)).cloned().collect()
            }
        };

        for stage in &self.stages {
            match stage {
                SelectionStage::Filter(predicate) => {
                    let mut kept = Vec::with_capacity(rows.len());
                    for row in rows {
                        let value = Value::Object(row);
                        let keep = match predicate.eval(&value) {
                            Ok(v) => truthy(&v),
                            Err(EvalError::NonExistence(_)) => false,
                            Err(e) => return Err(e.into()),
                        };
                        if keep {
                            if let Value::Object(row) = value {
                                kept.push(row);
                            }
                        }
                    }
                    rows = kept;
                }
                SelectionStage::OrderBy {
                    key: OrderKey::Field(term),
                    descending,
                } => {
                    let mut keyed = Vec::with_capacity(rows.len());
                    for row in rows {
                        let key = match term.eval(&Value::Object(row.clone())) {
                            Ok(v) => v,
                            Err(EvalError::NonExistence(_)) => Value::Null,
                            Err(e) => return Err(e.into()),
                        };
                        keyed.push((key, row));
                    }
                    keyed.sort_by(|(a, _), (b, _)| {
                        let ord = compare_values(a, b);
                        if *descending {
                            ord.reverse()
                        } else {
                            ord
                        }
                    });
                    rows = keyed.into_iter().map(|(_, row)| row).collect();
                }
                SelectionStage::OrderBy {
                    key: OrderKey::Index(name),
                    descending,
                } => {
                    let index = self.index(&data, name)?;
                    let mut keyed: Vec<(Vec<Value>, Document)> = rows
                        .into_iter()
                        .map(|row| (index.order_values(&row), row))
                        .collect();
                    keyed.sort_by(|(a, _), (b, _)| {
                        let ord = a
                            .iter()
                            .zip(b)
                            .map(|(x, y)| compare_values(x, y))
                            .find(|o| *o != std::cmp::Ordering::Equal)
                            .unwrap_or(std::cmp::Ordering::Equal);
                        if *descending {
                            ord.reverse()
                        } else {
                            ord
                        }
                    });
                    rows = keyed.into_iter().map(|(_, row)| row).collect();
                }
                SelectionStage::Skip(n) => {
                    let n = (*n as usize).min(rows.len());
                    rows.drain(..n);
                }
                SelectionStage::Limit(n) => rows.truncate(*n as usize),
            }
        }
        Ok(rows)
    }

    /// Run and collect every row
    pub async fn run(&self) -> TableStoreResult<Vec<Document>> {
        self.execute()
    }

    /// First row of the output
    pub async fn first(&self) -> TableStoreResult<Option<Document>> {
        Ok(self.execute()?.into_iter().next())
    }

    pub async fn count(&self) -> TableStoreResult<u64> {
        Ok(self.execute()?.len() as u64)
    }

    /// Sum `term` over the output.
    ///
    /// Rows where the term refers to a missing field are skipped; any other
    /// non-number is an error.
    pub async fn sum(&self, term: &Term) -> TableStoreResult<f64> {
        let mut total = 0.0;
        for row in self.execute()? {
            match term.eval(&Value::Object(row)) {
                Ok(Value::Number(n)) => total += n.as_f64().unwrap_or(0.0),
                Ok(other) => {
                    return Err(TableStoreError::Query(format!(
                        "Expected type NUMBER but found {}",
                        type_name(&other)
                    )))
                }
                Err(EvalError::NonExistence(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    /// Delete every row of the output, returning the deleted count
    pub async fn delete(&self) -> TableStoreResult<u64> {
        let keys: Vec<String> = self
            .execute()?
            .iter()
            .filter_map(|row| row.get(PRIMARY_KEY).map(key_string))
            .collect();

        let data = self.table.data()?;
        let mut data = write(&data);
        let mut deleted = 0;
        for key in keys {
            if data.remove(&key) {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("table", &self.table.name)
            .field("source", &self.source)
            .field("stages", &self.stages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    async fn table_with(rows: Vec<Value>) -> (TableServer, Table) {
        let server = TableServer::new();
        let conn = server.connect("localhost:28015", "test").await.unwrap();
        conn.table_create("t").await.unwrap();
        let table = conn.table("t");
        for row in rows {
            table.insert(doc(row)).await.unwrap();
        }
        (server, table)
    }

    #[tokio::test]
    async fn test_insert_generates_uuid() {
        let (_server, table) = table_with(vec![]).await;
        let result = table.insert(doc(json!({"a": 1}))).await.unwrap();
        assert_eq!(result.inserted, 1);
        let key = &result.generated_keys[0];
        assert!(uuid::Uuid::parse_str(key).is_ok());

        let row = table.get(key).await.unwrap().unwrap();
        assert_eq!(row["id"], json!(key));
    }

    #[tokio::test]
    async fn test_filter_missing_field_is_false() {
        let (_server, table) = table_with(vec![json!({"a": 1}), json!({"b": 1})]).await;
        let count = table
            .select()
            .filter(Term::Row.bracket("a").eq(Term::datum(1)))
            .count()
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_order_skip_limit() {
        let rows = [2, 4, 1, 5, 3].iter().map(|a| json!({"a": a})).collect();
        let (_server, table) = table_with(rows).await;

        let out = table
            .select()
            .order_by(Term::Row.bracket("a"), false)
            .skip(1)
            .limit(3)
            .run()
            .await
            .unwrap();
        let values: Vec<i64> = out.iter().map(|r| r["a"].as_i64().unwrap()).collect();
        assert_eq!(values, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_index_get_all_and_order() {
        let rows = vec![
            json!({"a": 1, "b": 2}),
            json!({"a": 1, "b": 3}),
            json!({"a": 1}),
            json!({"a": 2, "b": 2}),
        ];
        let (_server, table) = table_with(rows).await;
        table
            .index_create("a+b", vec!["a".into(), "b".into()])
            .await
            .unwrap();

        let hits = table
            .get_all(vec![vec![json!(1), json!(2)]], "a+b")
            .run()
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["b"], 2);

        table.index_create("b", vec!["b".into()]).await.unwrap();
        let ordered = table.select().order_by_index("b", true).run().await.unwrap();
        let bs: Vec<Value> = ordered.iter().map(|r| r.get("b").cloned().unwrap_or(Value::Null)).collect();
        assert_eq!(bs, vec![json!(3), json!(2), json!(2), Value::Null]);
    }

    #[tokio::test]
    async fn test_index_order_matches_field_order() {
        let rows = vec![
            json!({"a": 2}),
            json!({"a": true}),
            json!({"a": {"x": 1}}),
            json!({"b": 1}),
            json!({"a": "s"}),
            json!({"a": [1]}),
        ];
        let (_server, table) = table_with(rows).await;
        table.index_create("a", vec!["a".into()]).await.unwrap();

        for descending in [false, true] {
            let by_field = table
                .select()
                .order_by(Term::Row.bracket("a").default(Value::Null), descending)
                .run()
                .await
                .unwrap();
            let by_index = table
                .select()
                .order_by_index("a", descending)
                .run()
                .await
                .unwrap();
            assert_eq!(by_field, by_index);
        }

        let ascending = table.select().order_by_index("a", false).run().await.unwrap();
        let values: Vec<Value> = ascending
            .iter()
            .map(|r| r.get("a").cloned().unwrap_or(Value::Null))
            .collect();
        assert_eq!(
            values,
            vec![json!([1]), json!(true), Value::Null, json!(2), json!({"x": 1}), json!("s")]
        );
    }

    #[tokio::test]
    async fn test_index_tracks_updates() {
        let (_server, table) = table_with(vec![]).await;
        table.index_create("a", vec!["a".into()]).await.unwrap();
        let key = table.insert(doc(json!({"a": 1}))).await.unwrap().generated_keys[0].clone();

        table.get_update(&key, doc(json!({"a": 2})), &[]).await.unwrap();
        assert_eq!(table.get_all(vec![vec![json!(1)]], "a").count().await.unwrap(), 0);
        assert_eq!(table.get_all(vec![vec![json!(2)]], "a").count().await.unwrap(), 1);

        table.get_delete(&key).await.unwrap();
        assert_eq!(table.get_all(vec![vec![json!(2)]], "a").count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_index_and_table() {
        let (server, table) = table_with(vec![]).await;
        table.index_create("a", vec!["a".into()]).await.unwrap();
        let err = table.index_create("a", vec!["a".into()]).await.unwrap_err();
        assert!(err.is_already_exists());

        let conn = server.connect("localhost:28015", "test").await.unwrap();
        assert!(conn.table_create("t").await.unwrap_err().is_already_exists());
        assert_eq!(server.create_requests("test"), 2);
    }

    #[tokio::test]
    async fn test_sum_rules() {
        let (_server, table) = table_with(vec![json!({"n": 2}), json!({"n": 3.5}), json!({})]).await;
        let total = table.select().sum(&Term::Row.bracket("n")).await.unwrap();
        assert_eq!(total, 5.5);

        table.insert(doc(json!({"n": "x"}))).await.unwrap();
        assert!(table.select().sum(&Term::Row.bracket("n")).await.is_err());
    }

    #[tokio::test]
    async fn test_offline() {
        let (server, table) = table_with(vec![]).await;
        server.set_online(false);
        assert!(matches!(
            table.select().run().await,
            Err(TableStoreError::Connection(_))
        ));
    }
}
