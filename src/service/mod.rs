//! Query Façade
//!
//! Typed add/get/list/update/delete operations over the entity graph. Write
//! paths validate first, resolve denormalized names through the
//! [`ReferenceResolver`] and route fan-out deletes through the
//! [`CascadeCoordinator`]. List operations always return a deterministic
//! order: name ascending, or `createdAt` descending for recency views.

mod campaigns;
mod clients;
mod reports;
mod rewards;
mod surveys;
pub mod validation;

pub use surveys::SurveyFilter;

use crate::aggregation::{AggregationService, DEFAULT_COUNTER_MAX_ATTEMPTS};
use crate::cascade::{CascadeCoordinator, DEFAULT_MAX_BATCH_WRITES};
use crate::error::{Result, StoreResultExt};
use crate::resolver::ReferenceResolver;
use crate::store::entity_store::{DEFAULT_CALL_TIMEOUT, decode};
use crate::store::{Collection, DocumentStore, EntityStore, Fields, Query, RetryConfig};
use log::info;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Tunables for the layers under the façade
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub call_timeout: Duration,
    pub max_batch_writes: usize,
    pub counter_max_attempts: u32,
    /// Backoff between optimistic write attempts
    pub backoff: RetryConfig,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_batch_writes: DEFAULT_MAX_BATCH_WRITES,
            counter_max_attempts: DEFAULT_COUNTER_MAX_ATTEMPTS,
            backoff: RetryConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct InsightsService {
    store: EntityStore,
    resolver: ReferenceResolver,
    cascade: CascadeCoordinator,
    aggregation: AggregationService,
    counter_max_attempts: u32,
}

impl InsightsService {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self::with_options(backend, ServiceOptions::default())
    }

    pub fn with_options(backend: Arc<dyn DocumentStore>, options: ServiceOptions) -> Self {
        let store = EntityStore::new(backend)
            .with_call_timeout(options.call_timeout)
            .with_backoff(options.backoff);

        Self {
            resolver: ReferenceResolver::new(store.clone()),
            cascade: CascadeCoordinator::new(store.clone()).with_max_batch_writes(options.max_batch_writes),
            aggregation: AggregationService::new(store.clone())
                .with_counter_max_attempts(options.counter_max_attempts),
            counter_max_attempts: options.counter_max_attempts.max(1),
            store,
        }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn resolver(&self) -> &ReferenceResolver {
        &self.resolver
    }

    pub fn aggregation(&self) -> &AggregationService {
        &self.aggregation
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        collection: &Collection,
        id: &str,
    ) -> Result<Option<T>> {
        match self.store.get(collection, id).await.in_op(operation, collection, Some(id))? {
            Some(doc) => decode(collection, &doc).map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_required<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        collection: &Collection,
        id: &str,
    ) -> Result<T> {
        self.fetch(operation, collection, id)
            .await?
            .ok_or_else(|| crate::error::Error::not_found(collection, id))
    }

    async fn fetch_list<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        collection: &Collection,
        query: &Query,
    ) -> Result<Vec<T>> {
        self.store
            .list(collection, query)
            .await
            .in_op(operation, collection, None)?
            .iter()
            .map(|doc| decode(collection, doc))
            .collect()
    }

    async fn create_entity(&self, operation: &'static str, collection: &Collection, fields: Fields) -> Result<String> {
        let doc = self
            .store
            .create(collection, fields)
            .await
            .in_op(operation, collection, None)?;
        info!("{}: created {} '{}'", operation, collection, doc.id);
        Ok(doc.id)
    }

    async fn update_entity(
        &self,
        operation: &'static str,
        collection: &Collection,
        id: &str,
        fields: Fields,
    ) -> Result<()> {
        self.store
            .update(collection, id, fields)
            .await
            .in_op(operation, collection, Some(id))?;
        info!("{}: updated {} '{}'", operation, collection, id);
        Ok(())
    }

    async fn delete_entity(&self, operation: &'static str, collection: &Collection, id: &str) -> Result<()> {
        self.store
            .delete(collection, id)
            .await
            .in_op(operation, collection, Some(id))?;
        info!("{}: deleted {} '{}'", operation, collection, id);
        Ok(())
    }
}

/// Name-ordered query, optionally narrowed to one parent id
fn by_parent(field: &str, parent_id: Option<&str>) -> Query {
    match parent_id {
        Some(id) => Query::by_name().where_eq(field, id),
        None => Query::by_name(),
    }
}
