//! Front door to a [`DocumentStore`] backend
//!
//! Generates ids, applies the per-call timeout and offers an optimistic
//! read-modify-write loop on single documents.

use super::resilience::{RetryConfig, RetryPolicy};
use super::{Collection, Document, DocumentStore, Fields, Query, StoreError, StoreResult, WriteBatch, strip_reserved};
use crate::error::{Error, Result};
use log::debug;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of [`EntityStore::modify`]
#[derive(Debug, Clone, PartialEq)]
pub enum Modified {
    /// The write landed on the version it was computed from
    Applied(Document),
    /// Every attempt lost the race to another writer
    Exhausted { attempts: u32 },
}

#[derive(Clone)]
pub struct EntityStore {
    backend: Arc<dyn DocumentStore>,
    call_timeout: Duration,
    backoff: RetryPolicy,
}

impl EntityStore {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self {
            backend,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            backoff: RetryPolicy::default(),
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Backoff used between optimistic write attempts
    pub fn with_backoff(mut self, config: RetryConfig) -> Self {
        self.backoff = RetryPolicy::new(config);
        self
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn backend(&self) -> &Arc<dyn DocumentStore> {
        &self.backend
    }

    async fn guarded<T, F>(&self, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.call_timeout))?
    }

    /// Insert under a freshly generated id
    pub async fn create(&self, collection: &Collection, fields: Fields) -> StoreResult<Document> {
        let id = uuid::Uuid::new_v4().to_string();
        self.create_with_id(collection, &id, fields).await
    }

    pub async fn create_with_id(&self, collection: &Collection, id: &str, mut fields: Fields) -> StoreResult<Document> {
        strip_reserved(&mut fields);
        let doc = self.guarded(self.backend.insert(collection, id, fields)).await?;
        debug!("Created {} '{}'", collection, doc.id);
        Ok(doc)
    }

    pub async fn get(&self, collection: &Collection, id: &str) -> StoreResult<Option<Document>> {
        self.guarded(self.backend.get(collection, id)).await
    }

    pub async fn list(&self, collection: &Collection, query: &Query) -> StoreResult<Vec<Document>> {
        self.guarded(self.backend.list(collection, query)).await
    }

    pub async fn list_ids(&self, collection: &Collection, query: &Query) -> StoreResult<Vec<String>> {
        self.guarded(self.backend.list_ids(collection, query)).await
    }

    /// Last-writer-wins partial merge
    pub async fn update(&self, collection: &Collection, id: &str, mut fields: Fields) -> StoreResult<Document> {
        strip_reserved(&mut fields);
        self.guarded(self.backend.update(collection, id, fields, None)).await
    }

    pub async fn delete(&self, collection: &Collection, id: &str) -> StoreResult<()> {
        self.guarded(self.backend.delete(collection, id)).await
    }

    pub async fn count(&self, collection: &Collection, query: &Query) -> StoreResult<u64> {
        self.guarded(self.backend.count(collection, query)).await
    }

    pub async fn commit(&self, batch: &WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.guarded(self.backend.commit(batch)).await
    }

    /// Optimistic read-modify-write. `change` computes the patch from the
    /// current document; the write only lands if nobody else wrote in
    /// between, otherwise the document is re-read and `change` runs again.
    pub async fn modify<F>(
        &self,
        collection: &Collection,
        id: &str,
        max_attempts: u32,
        mut change: F,
    ) -> StoreResult<Modified>
    where
        F: FnMut(&Document) -> Fields + Send,
    {
        let max_attempts = max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let current = self
                .get(collection, id)
                .await?
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            let patch = change(&current);

            let write = self.backend.update(collection, id, patch, Some(current.version));
            match self.guarded(write).await {
                Ok(doc) => return Ok(Modified::Applied(doc)),
                Err(StoreError::Conflict { .. }) => {
                    debug!(
                        "Version conflict on {} '{}' (attempt {}/{})",
                        collection, id, attempt, max_attempts
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.backoff.calculate_delay(attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Modified::Exhausted {
            attempts: max_attempts,
        })
    }
}

/// Decode a stored document into its entity type
pub fn decode<T: DeserializeOwned>(collection: &Collection, doc: &Document) -> Result<T> {
    serde_json::from_value(doc.to_json()).map_err(|source| Error::Decode {
        collection: collection.path(),
        id: doc.id.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().unwrap().clone()
    }

    fn memory() -> (Arc<MemoryStore>, EntityStore) {
        let backend = Arc::new(MemoryStore::new());
        let store = EntityStore::new(backend.clone()).with_backoff(RetryConfig::disabled());
        (backend, store)
    }

    #[tokio::test]
    async fn test_create_generates_id_and_strips_reserved_fields() {
        let (_, store) = memory();
        let doc = store
            .create(
                &Collection::Clients,
                fields(json!({"id": "forged", "createdAt": "1999-01-01T00:00:00Z", "name": "Acme"})),
            )
            .await
            .unwrap();

        assert_ne!(doc.id, "forged");
        assert!(uuid::Uuid::parse_str(&doc.id).is_ok());
        assert!(!doc.data.contains_key("createdAt"));
        assert_eq!(doc.get_str("name"), Some("Acme"));
    }

    #[tokio::test]
    async fn test_modify_retries_on_conflict() {
        let (backend, store) = memory();
        let doc = store
            .create(&Collection::Surveys, fields(json!({"responseCount": 2})))
            .await
            .unwrap();

        backend.inject_conflicts(2);
        let outcome = store
            .modify(&Collection::Surveys, &doc.id, 5, |current| {
                let n = current.get("responseCount").and_then(|v| v.as_u64()).unwrap_or(0);
                fields(json!({"responseCount": n + 1}))
            })
            .await
            .unwrap();

        match outcome {
            Modified::Applied(doc) => assert_eq!(doc.get("responseCount"), Some(&json!(3))),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_modify_reports_exhaustion() {
        let (backend, store) = memory();
        let doc = store.create(&Collection::Surveys, Fields::new()).await.unwrap();

        backend.inject_conflicts(10);
        let outcome = store
            .modify(&Collection::Surveys, &doc.id, 3, |_| Fields::new())
            .await
            .unwrap();
        assert_eq!(outcome, Modified::Exhausted { attempts: 3 });
    }

    #[tokio::test]
    async fn test_modify_missing_document_is_not_found() {
        let (_, store) = memory();
        let err = store
            .modify(&Collection::Surveys, "ghost", 3, |_| Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    struct Stalled;

    #[async_trait]
    impl DocumentStore for Stalled {
        async fn insert(&self, _c: &Collection, _id: &str, _f: Fields) -> StoreResult<Document> {
            std::future::pending().await
        }
        async fn get(&self, _c: &Collection, _id: &str) -> StoreResult<Option<Document>> {
            std::future::pending().await
        }
        async fn list(&self, _c: &Collection, _q: &Query) -> StoreResult<Vec<Document>> {
            std::future::pending().await
        }
        async fn update(&self, _c: &Collection, _id: &str, _f: Fields, _v: Option<u64>) -> StoreResult<Document> {
            std::future::pending().await
        }
        async fn delete(&self, _c: &Collection, _id: &str) -> StoreResult<()> {
            std::future::pending().await
        }
        async fn count(&self, _c: &Collection, _q: &Query) -> StoreResult<u64> {
            std::future::pending().await
        }
        async fn commit(&self, _b: &WriteBatch) -> StoreResult<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_backend_times_out() {
        let store = EntityStore::new(Arc::new(Stalled)).with_call_timeout(Duration::from_millis(20));
        let err = store.get(&Collection::Clients, "c1").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_decode_reports_collection_and_id() {
        #[derive(serde::Deserialize, Debug)]
        #[allow(dead_code)]
        struct NeedsName {
            name: String,
        }

        let (_, store) = memory();
        let doc = store.create(&Collection::Clients, Fields::new()).await.unwrap();
        let err = decode::<NeedsName>(&Collection::Clients, &doc).unwrap_err();
        assert!(matches!(err, Error::Decode { ref collection, .. } if collection == "clients"));
    }
}
