//! In-memory document store
//!
//! Same contract as the persistent backends: per-document versions, atomic
//! batches (applied to a staged copy that is swapped in only on success) and
//! optimistic preconditions. Carries fault injection hooks so tests can make
//! a commit fail part-way or force version conflicts.

use super::{
    BatchWrite, Collection, Document, DocumentStore, Fields, Query, StoreError, StoreResult,
    WriteBatch, merge_fields,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

type CollectionMap = HashMap<String, BTreeMap<String, Document>>;

#[derive(Debug, Default)]
struct Faults {
    /// Fail the next commit after this many writes were applied
    fail_commit_after: Option<usize>,
    /// Commits to let through before `fail_commit_after` applies
    commits_before_fault: usize,
    /// Versioned updates to reject with `Conflict`
    conflicts_remaining: u32,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<CollectionMap>,
    faults: Mutex<Faults>,
    unavailable: AtomicBool,
    yield_between_ops: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail after `applied` of its writes went through.
    /// Nothing from that batch becomes visible.
    pub fn fail_next_commit_after(&self, applied: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.commits_before_fault = 0;
            faults.fail_commit_after = Some(applied);
        }
    }

    /// Let `commits` batches through, then fail the one after before any
    /// of its writes apply
    pub fn fail_commit_after_batches(&self, commits: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.commits_before_fault = commits;
            faults.fail_commit_after = Some(0);
        }
    }

    /// Reject the next `count` versioned updates with `Conflict`
    pub fn inject_conflicts(&self, count: u32) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.conflicts_remaining = count;
        }
    }

    /// Simulate transport loss for every call
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Yield to the scheduler inside reads so concurrent tasks interleave
    /// between a read and the write that follows it
    pub fn yield_between_ops(&self, enabled: bool) {
        self.yield_between_ops.store(enabled, Ordering::SeqCst);
    }

    /// Total number of documents across every collection
    pub async fn total_documents(&self) -> usize {
        self.collections.read().await.values().map(BTreeMap::len).sum()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    async fn maybe_yield(&self) {
        if self.yield_between_ops.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }

    fn take_conflict(&self) -> bool {
        match self.faults.lock() {
            Ok(mut faults) if faults.conflicts_remaining > 0 => {
                faults.conflicts_remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn take_commit_fault(&self) -> Option<usize> {
        let mut faults = self.faults.lock().ok()?;
        faults.fail_commit_after?;
        if faults.commits_before_fault > 0 {
            faults.commits_before_fault -= 1;
            return None;
        }
        faults.fail_commit_after.take()
    }
}

fn apply_update(
    collections: &mut CollectionMap,
    collection: &Collection,
    id: &str,
    fields: &Fields,
    expected_version: Option<u64>,
) -> StoreResult<Document> {
    let doc = collections
        .get_mut(&collection.path())
        .and_then(|docs| docs.get_mut(id))
        .ok_or_else(|| StoreError::not_found(collection, id))?;

    if let Some(expected) = expected_version {
        if doc.version != expected {
            return Err(StoreError::conflict(collection, id));
        }
    }

    merge_fields(&mut doc.data, fields);
    doc.version += 1;
    doc.updated_at = Utc::now();
    Ok(doc.clone())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &Collection, id: &str, fields: Fields) -> StoreResult<Document> {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.path()).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::conflict(collection, id));
        }

        let now = Utc::now();
        let doc = Document {
            id: id.to_string(),
            data: fields,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        docs.insert(id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn get(&self, collection: &Collection, id: &str) -> StoreResult<Option<Document>> {
        self.check_available()?;
        let doc = self
            .collections
            .read()
            .await
            .get(&collection.path())
            .and_then(|docs| docs.get(id))
            .cloned();
        self.maybe_yield().await;
        Ok(doc)
    }

    async fn list(&self, collection: &Collection, query: &Query) -> StoreResult<Vec<Document>> {
        self.check_available()?;
        let collections = self.collections.read().await;
        let mut docs: Vec<Document> = collections
            .get(&collection.path())
            .map(|docs| docs.values().filter(|doc| query.matches(doc)).cloned().collect())
            .unwrap_or_default();
        drop(collections);

        docs.sort_by(|a, b| query.orderby.compare(a, b));
        if let Some(limit) = query.limit {
            docs.truncate(limit as usize);
        }
        Ok(docs)
    }

    async fn update(
        &self,
        collection: &Collection,
        id: &str,
        fields: Fields,
        expected_version: Option<u64>,
    ) -> StoreResult<Document> {
        self.check_available()?;
        if expected_version.is_some() && self.take_conflict() {
            return Err(StoreError::conflict(collection, id));
        }
        let mut collections = self.collections.write().await;
        apply_update(&mut collections, collection, id, &fields, expected_version)
    }

    async fn delete(&self, collection: &Collection, id: &str) -> StoreResult<()> {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        if let Some(docs) = collections.get_mut(&collection.path()) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn count(&self, collection: &Collection, query: &Query) -> StoreResult<u64> {
        self.check_available()?;
        let collections = self.collections.read().await;
        let count = collections
            .get(&collection.path())
            .map(|docs| docs.values().filter(|doc| query.matches(doc)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn commit(&self, batch: &WriteBatch) -> StoreResult<()> {
        self.check_available()?;
        let fail_after = self.take_commit_fault();
        let mut collections = self.collections.write().await;
        let mut staged = collections.clone();

        for (applied, write) in batch.writes().iter().enumerate() {
            if fail_after == Some(applied) {
                return Err(StoreError::Unavailable(format!(
                    "commit interrupted after {} of {} writes",
                    applied,
                    batch.len()
                )));
            }
            match write {
                BatchWrite::Update { collection, id, fields } => {
                    apply_update(&mut staged, collection, id, fields, None)?;
                }
                BatchWrite::Delete { collection, id } => {
                    if let Some(docs) = staged.get_mut(&collection.path()) {
                        docs.remove(id);
                    }
                }
            }
        }

        *collections = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let store = MemoryStore::new();
        let created = store
            .insert(&Collection::Clients, "c1", fields(json!({"name": "Acme"})))
            .await
            .unwrap();
        assert_eq!(created.version, 1);
        assert_eq!(created.created_at, created.updated_at);

        let updated = store
            .update(&Collection::Clients, "c1", fields(json!({"industry": "Retail"})), None)
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.get_str("name"), Some("Acme"));
        assert!(updated.updated_at >= created.updated_at);

        store.delete(&Collection::Clients, "c1").await.unwrap();
        store.delete(&Collection::Clients, "c1").await.unwrap();
        assert!(store.get(&Collection::Clients, "c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update(&Collection::Clients, "nope", Fields::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_version_precondition() {
        let store = MemoryStore::new();
        store
            .insert(&Collection::Surveys, "s1", fields(json!({"responseCount": 0})))
            .await
            .unwrap();

        let err = store
            .update(&Collection::Surveys, "s1", fields(json!({"responseCount": 1})), Some(7))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        store
            .update(&Collection::Surveys, "s1", fields(json!({"responseCount": 1})), Some(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_nothing_visible() {
        let store = MemoryStore::new();
        for id in ["k1", "k2", "k3"] {
            store.insert(&Collection::Campaigns, id, Fields::new()).await.unwrap();
        }

        let mut batch = WriteBatch::new();
        batch
            .delete(Collection::Campaigns, "k1")
            .delete(Collection::Campaigns, "k2")
            .delete(Collection::Campaigns, "k3");

        store.fail_next_commit_after(2);
        assert!(store.commit(&batch).await.is_err());
        assert_eq!(store.total_documents().await, 3);

        store.commit(&batch).await.unwrap();
        assert_eq!(store.total_documents().await, 0);
    }

    #[tokio::test]
    async fn test_commit_update_of_missing_doc_aborts_batch() {
        let store = MemoryStore::new();
        store.insert(&Collection::Surveys, "s1", Fields::new()).await.unwrap();

        let mut batch = WriteBatch::new();
        batch
            .delete(Collection::Surveys, "s1")
            .update(Collection::Surveys, "ghost", fields(json!({"name": "x"})));

        let err = store.commit(&batch).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(store.get(&Collection::Surveys, "s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_subcollections_are_isolated() {
        let store = MemoryStore::new();
        store.insert(&Collection::responses("s1"), "r1", Fields::new()).await.unwrap();
        store.insert(&Collection::responses("s2"), "r1", Fields::new()).await.unwrap();

        assert_eq!(store.count(&Collection::responses("s1"), &Query::all()).await.unwrap(), 1);
        store.delete(&Collection::responses("s1"), "r1").await.unwrap();
        assert_eq!(store.count(&Collection::responses("s2"), &Query::all()).await.unwrap(), 1);
    }
}
