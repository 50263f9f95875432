//! Entity Store
//!
//! Raw document CRUD per collection. Backends implement [`DocumentStore`];
//! the rest of the crate talks to them through [`EntityStore`], which adds
//! id generation, the per-call timeout, timestamp normalization and typed
//! decoding. A backend never reaches into collections other than the one it
//! was asked about, except inside an explicit [`WriteBatch`].

pub mod batch;
pub mod entity_store;
pub mod envelope;
pub mod memory;
pub mod query;
pub mod resilience;
pub mod rest;
pub mod sqlite;

pub use batch::{BatchWrite, WriteBatch};
pub use entity_store::EntityStore;
pub use envelope::Envelope;
pub use memory::MemoryStore;
pub use query::{Filter, FilterValue, OrderBy, OrderByClause, Query};
pub use resilience::{RetryConfig, RetryPolicy, RetryableError};
pub use rest::RestStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Top-level field map of a document
pub type Fields = Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("{collection} '{id}' does not exist")]
    NotFound { collection: String, id: String },

    /// Version precondition failed: another write landed first
    #[error("{collection} '{id}' was modified concurrently")]
    Conflict { collection: String, id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

impl StoreError {
    pub fn not_found(collection: &Collection, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.path(),
            id: id.to_string(),
        }
    }

    pub fn conflict(collection: &Collection, id: &str) -> Self {
        StoreError::Conflict {
            collection: collection.path(),
            id: id.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Serialization(error.to_string())
    }
}

/// Collection addressed by the store. Responses live in a sub-collection
/// scoped to their survey.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Collection {
    Clients,
    Brands,
    Campaigns,
    Surveys,
    Responses { survey_id: String },
    RewardPrograms,
    RedemptionItems,
    Consumers,
}

impl Collection {
    pub fn responses(survey_id: impl Into<String>) -> Self {
        Collection::Responses {
            survey_id: survey_id.into(),
        }
    }

    /// Collection name without any parent scope
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Clients => "clients",
            Collection::Brands => "brands",
            Collection::Campaigns => "campaigns",
            Collection::Surveys => "surveys",
            Collection::Responses { .. } => "responses",
            Collection::RewardPrograms => "rewardPrograms",
            Collection::RedemptionItems => "redemptionItems",
            Collection::Consumers => "consumers",
        }
    }

    /// Full slash-separated path, e.g. `surveys/s1/responses`
    pub fn path(&self) -> String {
        match self {
            Collection::Responses { survey_id } => format!("surveys/{}/responses", survey_id),
            other => other.name().to_string(),
        }
    }

    /// Singular key used by REST envelopes (`{"client": {...}}`)
    pub fn entity_key(&self) -> &'static str {
        match self {
            Collection::Clients => "client",
            Collection::Brands => "brand",
            Collection::Campaigns => "campaign",
            Collection::Surveys => "survey",
            Collection::Responses { .. } => "response",
            Collection::RewardPrograms => "rewardProgram",
            Collection::RedemptionItems => "redemptionItem",
            Collection::Consumers => "consumer",
        }
    }

    /// Name shown when a reference to this collection does not resolve
    pub fn placeholder_name(&self) -> &'static str {
        match self {
            Collection::Clients => "Unknown Client",
            Collection::Brands => "Unknown Brand",
            Collection::Campaigns => "Unknown Campaign",
            Collection::Surveys => "Unknown Survey",
            Collection::Responses { .. } => "Unknown Response",
            Collection::RewardPrograms => "Unknown Reward Program",
            Collection::RedemptionItems => "Unknown Redemption Item",
            Collection::Consumers => "Unknown Consumer",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// A stored document as returned by a backend
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Fields,
    /// Monotonic per-document version used for optimistic preconditions
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// Flatten into the JSON shape callers see: fields plus `id`, and the
    /// timestamps as ISO-8601 strings.
    pub fn to_json(&self) -> Value {
        let mut map = self.data.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert(
            "createdAt".to_string(),
            Value::String(self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        map.insert(
            "updatedAt".to_string(),
            Value::String(self.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        Value::Object(map)
    }
}

/// Merge `patch` into `target` at the top level. Explicit nulls are kept as
/// nulls so that "clear this reference" survives a round trip.
pub fn merge_fields(target: &mut Fields, patch: &Fields) {
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
}

/// Strip fields the store owns so callers cannot overwrite them
pub(crate) fn strip_reserved(fields: &mut Fields) {
    for key in ["id", "createdAt", "updatedAt"] {
        fields.remove(key);
    }
}

/// Contract every persistence backend satisfies
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document; the store stamps `created_at = updated_at = now`
    async fn insert(&self, collection: &Collection, id: &str, fields: Fields) -> StoreResult<Document>;

    async fn get(&self, collection: &Collection, id: &str) -> StoreResult<Option<Document>>;

    /// Matching documents in query order; empty when nothing matches
    async fn list(&self, collection: &Collection, query: &Query) -> StoreResult<Vec<Document>>;

    /// Partial merge; fails with `NotFound` when absent and with `Conflict`
    /// when `expected_version` is given and no longer current. Always bumps
    /// `updated_at` and the version.
    async fn update(
        &self,
        collection: &Collection,
        id: &str,
        fields: Fields,
        expected_version: Option<u64>,
    ) -> StoreResult<Document>;

    /// Idempotent: deleting an absent id is not an error
    async fn delete(&self, collection: &Collection, id: &str) -> StoreResult<()>;

    /// Count-only query; never materializes document bodies
    async fn count(&self, collection: &Collection, query: &Query) -> StoreResult<u64>;

    /// Commit all writes atomically: either every write lands or none does
    async fn commit(&self, batch: &WriteBatch) -> StoreResult<()>;

    /// Ids only, for staging cascades
    async fn list_ids(&self, collection: &Collection, query: &Query) -> StoreResult<Vec<String>> {
        Ok(self
            .list(collection, query)
            .await?
            .into_iter()
            .map(|doc| doc.id)
            .collect())
    }
}
