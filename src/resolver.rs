//! Reference Resolver
//!
//! Turns foreign keys into the display names cached on the referencing
//! document. Only write paths call in here; reads return whatever name was
//! cached at the referencing entity's last write.

use crate::error::{Result, StoreResultExt};
use crate::store::{Collection, EntityStore};
use log::{debug, warn};

#[derive(Clone)]
pub struct ReferenceResolver {
    store: EntityStore,
}

impl ReferenceResolver {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    /// Name of the referenced entity, or the collection's placeholder when
    /// the reference dangles. Transport failures still propagate.
    pub async fn resolve_display_name(&self, collection: &Collection, id: &str) -> Result<String> {
        if id.trim().is_empty() {
            return Ok(collection.placeholder_name().to_string());
        }

        let doc = self.store.get(collection, id).await.in_op("resolve", collection, Some(id))?;
        match doc.as_ref().and_then(|doc| doc.get_str("name")) {
            Some(name) => {
                debug!("Resolved {} '{}' -> {}", collection, id, name);
                Ok(name.to_string())
            }
            None => {
                warn!(
                    "Dangling reference to {} '{}', using '{}'",
                    collection,
                    id,
                    collection.placeholder_name()
                );
                Ok(collection.placeholder_name().to_string())
            }
        }
    }

    pub async fn resolve_optional(&self, collection: &Collection, id: Option<&str>) -> Result<Option<String>> {
        match id {
            Some(id) => self.resolve_display_name(collection, id).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    async fn setup() -> (Arc<MemoryStore>, EntityStore, ReferenceResolver) {
        let backend = Arc::new(MemoryStore::new());
        let store = EntityStore::new(backend.clone());
        let resolver = ReferenceResolver::new(store.clone());
        (backend, store, resolver)
    }

    #[tokio::test]
    async fn test_resolves_current_name() {
        let (_, store, resolver) = setup().await;
        store
            .create_with_id(&Collection::Clients, "c1", json!({"name": "Acme"}).as_object().unwrap().clone())
            .await
            .unwrap();

        assert_eq!(resolver.resolve_display_name(&Collection::Clients, "c1").await.unwrap(), "Acme");
    }

    #[tokio::test]
    async fn test_dangling_reference_degrades_to_placeholder() {
        let (_, _, resolver) = setup().await;
        assert_eq!(
            resolver.resolve_display_name(&Collection::Clients, "ghost").await.unwrap(),
            "Unknown Client"
        );
        assert_eq!(
            resolver.resolve_optional(&Collection::RewardPrograms, Some("")).await.unwrap(),
            Some("Unknown Reward Program".to_string())
        );
        assert!(resolver.resolve_optional(&Collection::Brands, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_masked() {
        let (backend, _, resolver) = setup().await;
        backend.set_unavailable(true);
        let err = resolver.resolve_display_name(&Collection::Clients, "c1").await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }));
    }
}
