//! Caller-facing error taxonomy
//!
//! Store-level failures (`StoreError`) are wrapped here together with the
//! operation that was attempted and the collection/id it touched.

use crate::store::{Collection, StoreError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Entity id does not exist for a get/update or a child operation
    #[error("{collection} '{id}' not found")]
    NotFound { collection: String, id: String },

    /// Foreign key that does not resolve. Only surfaced by strict lookups;
    /// display-name resolution degrades to a placeholder instead.
    #[error("dangling reference: {collection} '{id}' does not exist")]
    DanglingReference { collection: String, id: String },

    /// Atomic multi-document commit did not succeed; nothing from the
    /// failed batch is visible and the whole operation must be retried.
    #[error("cascade '{operation}' on {collection} '{id}' failed: {source}")]
    CascadeFailed {
        operation: &'static str,
        collection: String,
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("update of {field} on {collection} '{id}' still conflicting after {attempts} attempts")]
    ConcurrentUpdateExceeded {
        collection: String,
        id: String,
        field: String,
        attempts: u32,
    },

    #[error("store unavailable during {operation} on {collection}{}: {source}", fmt_id(.id))]
    StoreUnavailable {
        operation: &'static str,
        collection: String,
        id: Option<String>,
        #[source]
        source: StoreError,
    },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("stored {collection} '{id}' could not be decoded: {source}")]
    Decode {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

fn fmt_id(id: &Option<String>) -> String {
    id.as_ref().map(|id| format!(" '{}'", id)).unwrap_or_default()
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::ValidationFailed(message.into())
    }

    pub fn not_found(collection: &Collection, id: impl Into<String>) -> Self {
        Error::NotFound {
            collection: collection.path(),
            id: id.into(),
        }
    }

    /// Wrap a raw store error with the attempted operation's context
    pub fn from_store(
        operation: &'static str,
        collection: &Collection,
        id: Option<&str>,
        source: StoreError,
    ) -> Self {
        match source {
            StoreError::NotFound { collection, id } => Error::NotFound { collection, id },
            source => Error::StoreUnavailable {
                operation,
                collection: collection.path(),
                id: id.map(str::to_string),
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Attaches operation context to store results
pub trait StoreResultExt<T> {
    fn in_op(self, operation: &'static str, collection: &Collection, id: Option<&str>) -> Result<T>;
}

impl<T> StoreResultExt<T> for std::result::Result<T, StoreError> {
    fn in_op(self, operation: &'static str, collection: &Collection, id: Option<&str>) -> Result<T> {
        self.map_err(|source| Error::from_store(operation, collection, id, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err = Error::from_store(
            "update",
            &Collection::Clients,
            Some("c1"),
            StoreError::NotFound {
                collection: "clients".to_string(),
                id: "c1".to_string(),
            },
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_timeout_maps_to_store_unavailable_with_context() {
        let err = Error::from_store(
            "get",
            &Collection::Surveys,
            Some("s1"),
            StoreError::Timeout(Duration::from_secs(10)),
        );
        match &err {
            Error::StoreUnavailable { operation, collection, id, .. } => {
                assert_eq!(*operation, "get");
                assert_eq!(collection, "surveys");
                assert_eq!(id.as_deref(), Some("s1"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("surveys 's1'"));
    }
}
