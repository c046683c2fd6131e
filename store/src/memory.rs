use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use serde_json::{Number, Value};
use thiserror::Error;

use crate::{
    document::{compare_values, Direction, Document, DocumentStore, Query},
    local::LocalStorage,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryStoreError {
    #[error("store is unavailable")]
    Unavailable,
    #[error("query needs an index that does not exist")]
    MissingIndex,
    #[error("field `{0}` is not numeric")]
    NotNumeric(String),
}

type Collections = HashMap<String, BTreeMap<String, Document>>;

/// In-process [`DocumentStore`]. Clones share the same data.
///
/// Failure injection: [`MemoryDocumentStore::set_offline`] fails every call and
/// [`MemoryDocumentStore::set_max_query_complexity`] fails queries that would need a
/// composite index.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    collections: Arc<Mutex<Collections>>,
    next_id: Arc<AtomicU64>,
    offline: Arc<AtomicBool>,
    max_query_complexity: Arc<AtomicUsize>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self {
            collections: Arc::default(),
            next_id: Arc::default(),
            offline: Arc::default(),
            max_query_complexity: Arc::new(AtomicUsize::new(usize::MAX)),
        }
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    pub fn set_max_query_complexity(&self, max: usize) {
        self.max_query_complexity.store(max, AtomicOrdering::SeqCst);
    }

    /// Inserts or replaces a whole document.
    pub fn insert(&self, collection: &str, id: &str, doc: Document) {
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
    }

    pub fn count(&self, collection: &str) -> usize {
        self.lock().get(collection).map_or(0, BTreeMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> Result<(), MemoryStoreError> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(MemoryStoreError::Unavailable);
        }
        Ok(())
    }
}

impl DocumentStore for MemoryDocumentStore {
    type Error = MemoryStoreError;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, Self::Error> {
        self.check_online()?;
        Ok(self
            .lock()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn set_merge(&self, collection: &str, id: &str, fields: Document) -> Result<(), Self::Error> {
        self.check_online()?;
        let mut collections = self.lock();
        let doc = collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        doc.extend(fields);
        Ok(())
    }

    async fn increment(&self, collection: &str, id: &str, field: &str, by: i64) -> Result<(), Self::Error> {
        self.check_online()?;
        let mut collections = self.lock();
        let doc = collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        let current = match doc.get(field) {
            None | Some(Value::Null) => 0,
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| MemoryStoreError::NotNumeric(field.to_string()))?,
            Some(_) => return Err(MemoryStoreError::NotNumeric(field.to_string())),
        };
        doc.insert(
            field.to_string(),
            Value::Number(Number::from(current.saturating_add(by))),
        );
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Document) -> Result<String, Self::Error> {
        self.check_online()?;
        let id = format!("{:020}", self.next_id.fetch_add(1, AtomicOrdering::SeqCst));
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Document)>, Self::Error> {
        self.check_online()?;
        if query.complexity() > self.max_query_complexity.load(AtomicOrdering::SeqCst) {
            return Err(MemoryStoreError::MissingIndex);
        }

        let collections = self.lock();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<(String, Document)> = docs
            .iter()
            .filter(|(_, doc)| query.filters.iter().all(|f| f.matches(doc)))
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect();

        if let Some((field, direction)) = &query.order_by {
            hits.retain(|(_, doc)| doc.contains_key(field));
            hits.sort_by(|(_, a), (_, b)| {
                let ord = match (a.get(field), b.get(field)) {
                    (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                };
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }

        Ok(hits)
    }
}

/// In-process [`LocalStorage`]. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryLocalStorage {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryLocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> Result<(), MemoryStoreError> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(MemoryStoreError::Unavailable);
        }
        Ok(())
    }
}

impl LocalStorage for MemoryLocalStorage {
    type Error = MemoryStoreError;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        self.check_online()?;
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), Self::Error> {
        self.check_online()?;
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<(), Self::Error> {
        self.check_online()?;
        let mut entries = self.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, Self::Error> {
        self.check_online()?;
        Ok(self.lock().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn increment_creates_and_accumulates() {
        let store = MemoryDocumentStore::new();
        store.increment("videos", "v1", "views", 1).await.unwrap();
        store.increment("videos", "v1", "views", 2).await.unwrap();

        let video = store.get("videos", "v1").await.unwrap().unwrap();
        assert_eq!(video["views"], json!(3));
    }

    #[tokio::test]
    async fn increment_rejects_non_numeric_fields() {
        let store = MemoryDocumentStore::new();
        store.insert("videos", "v1", doc(json!({ "views": "many" })));
        assert_eq!(
            store.increment("videos", "v1", "views", 1).await,
            Err(MemoryStoreError::NotNumeric("views".into()))
        );
    }

    #[tokio::test]
    async fn set_merge_keeps_other_fields() {
        let store = MemoryDocumentStore::new();
        store.insert("videos", "v1", doc(json!({ "userId": "a", "views": 1 })));
        store
            .set_merge("videos", "v1", doc(json!({ "lastViewedAt": "now" })))
            .await
            .unwrap();

        let video = store.get("videos", "v1").await.unwrap().unwrap();
        assert_eq!(video["userId"], json!("a"));
        assert_eq!(video["lastViewedAt"], json!("now"));
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = MemoryDocumentStore::new();
        for (id, owner, created) in [("a", "x", 3), ("b", "y", 1), ("c", "x", 2), ("d", "x", 5)] {
            store.insert(
                "videos",
                id,
                doc(json!({ "userId": owner, "createdAt": created })),
            );
        }

        let q = Query::new()
            .eq("userId", "x")
            .order_by("createdAt", Direction::Descending)
            .limit(2);
        let ids: Vec<_> = store
            .query("videos", &q)
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["d", "a"]);
    }

    #[tokio::test]
    async fn complex_queries_fail_without_index() {
        let store = MemoryDocumentStore::new();
        store.set_max_query_complexity(1);

        let q = Query::new()
            .eq("isPublic", true)
            .order_by("createdAt", Direction::Descending);
        assert_eq!(
            store.query("videos", &q).await,
            Err(MemoryStoreError::MissingIndex)
        );

        let simple = Query::new().order_by("createdAt", Direction::Descending);
        assert!(store.query("videos", &simple).await.is_ok());
    }

    #[tokio::test]
    async fn offline_store_fails_everything() {
        let store = MemoryDocumentStore::new();
        store.set_offline(true);
        assert_eq!(
            store.get("videos", "v1").await,
            Err(MemoryStoreError::Unavailable)
        );

        let local = MemoryLocalStorage::new();
        local.set_offline(true);
        assert_eq!(local.get("k").await, Err(MemoryStoreError::Unavailable));
    }

    #[tokio::test]
    async fn local_storage_round_trip_and_remove() {
        let local = MemoryLocalStorage::new();
        local.set("a", "1".into()).await.unwrap();
        local.set("b", "2".into()).await.unwrap();
        assert_eq!(local.get("a").await.unwrap().as_deref(), Some("1"));

        local.remove(&["a".to_string()]).await.unwrap();
        assert_eq!(local.get_all_keys().await.unwrap(), vec!["b".to_string()]);
    }
}
