//! Cascade Coordinator
//!
//! Deletes that fan out to dependents are staged into a [`WriteBatch`] and
//! committed as one atomic unit. Staging only reads; nothing is written
//! until the final commit, so a failed lookup simply drops the batch.
//!
//! Writes are staged children first (responses, then surveys, then
//! campaigns, then the parent). When a cascade is larger than the store's
//! batch limit it is committed in chunks in that order; a failure between
//! chunks can leave a smaller but orphan-free graph, and re-running the
//! delete completes it.
//!
//! Each survey and its responses form one unit that chunking keeps in a
//! single commit, so a surviving survey still has every response its
//! `responseCount` counts. A survey with more responses than the limit is
//! the exception: its response deletes span several chunks and an
//! interrupted cascade can leave it with fewer responses than counted.

use crate::error::{Error, Result, StoreResultExt};
use crate::store::{Collection, EntityStore, Fields, Filter, Query, StoreError, WriteBatch};
use log::{debug, info, warn};
use serde_json::Value;

pub const DEFAULT_MAX_BATCH_WRITES: usize = 500;

/// What a committed cascade touched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    pub deleted: usize,
    pub updated: usize,
    pub chunks: usize,
}

#[derive(Clone)]
pub struct CascadeCoordinator {
    store: EntityStore,
    max_batch_writes: usize,
}

impl CascadeCoordinator {
    pub fn new(store: EntityStore) -> Self {
        Self {
            store,
            max_batch_writes: DEFAULT_MAX_BATCH_WRITES,
        }
    }

    pub fn with_max_batch_writes(mut self, max_batch_writes: usize) -> Self {
        self.max_batch_writes = max_batch_writes.max(1);
        self
    }

    /// Client, its campaigns (with their surveys and responses) and its brands
    pub async fn delete_client(&self, client_id: &str) -> Result<CascadeSummary> {
        let mut batch = WriteBatch::new();
        self.stage_client_children(&mut batch, client_id).await?;
        self.stage_root(&mut batch, Collection::Clients, client_id).await?;
        self.commit("delete_client", &Collection::Clients, client_id, batch).await
    }

    /// Campaign and its surveys (with their responses)
    pub async fn delete_campaign(&self, campaign_id: &str) -> Result<CascadeSummary> {
        let mut batch = WriteBatch::new();
        self.stage_campaign_children(&mut batch, campaign_id).await?;
        self.stage_root(&mut batch, Collection::Campaigns, campaign_id).await?;
        self.commit("delete_campaign", &Collection::Campaigns, campaign_id, batch).await
    }

    /// Survey and every document in its responses sub-collection
    pub async fn delete_survey(&self, survey_id: &str) -> Result<CascadeSummary> {
        let mut batch = WriteBatch::new();
        self.stage_survey_children(&mut batch, survey_id).await?;
        self.stage_root(&mut batch, Collection::Surveys, survey_id).await?;
        self.commit("delete_survey", &Collection::Surveys, survey_id, batch).await
    }

    /// Non-cascading: referencing surveys and redemption items survive with
    /// the reference cleared
    pub async fn delete_reward_program(&self, program_id: &str) -> Result<CascadeSummary> {
        let mut batch = WriteBatch::new();

        for survey_id in self
            .ids_where(&Collection::Surveys, Filter::eq("rewardProgramId", program_id))
            .await?
        {
            batch.update(
                Collection::Surveys,
                survey_id,
                cleared(&["rewardProgramId", "rewardProgramName"]),
            );
        }
        for item_id in self
            .ids_where(&Collection::RedemptionItems, Filter::eq("rewardProgramId", program_id))
            .await?
        {
            batch.update(Collection::RedemptionItems, item_id, cleared(&["rewardProgramId"]));
        }
        self.stage_root(&mut batch, Collection::RewardPrograms, program_id).await?;

        self.commit("delete_reward_program", &Collection::RewardPrograms, program_id, batch)
            .await
    }

    /// Removes the brand from every campaign's `brandIds`. Refused while a
    /// survey still targets the brand, since survey brands are immutable.
    pub async fn delete_brand(&self, brand_id: &str) -> Result<CascadeSummary> {
        let referencing = self
            .store
            .count(&Collection::Surveys, &Query::new().where_eq("brandId", brand_id))
            .await
            .in_op("delete_brand", &Collection::Surveys, Some(brand_id))?;
        if referencing > 0 {
            return Err(Error::validation(format!(
                "brand '{}' is still used by {} survey(s)",
                brand_id, referencing
            )));
        }

        let campaigns = self
            .store
            .list(
                &Collection::Campaigns,
                &Query::new().filter(Filter::array_contains("brandIds", brand_id)),
            )
            .await
            .in_op("delete_brand", &Collection::Campaigns, None)?;

        let mut batch = WriteBatch::new();
        for campaign in campaigns {
            let remaining: Vec<Value> = campaign
                .get("brandIds")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter(|id| id.as_str() != Some(brand_id)).cloned().collect())
                .unwrap_or_default();
            let mut fields = Fields::new();
            fields.insert("brandIds".to_string(), Value::Array(remaining));
            batch.update(Collection::Campaigns, campaign.id, fields);
        }
        self.stage_root(&mut batch, Collection::Brands, brand_id).await?;

        self.commit("delete_brand", &Collection::Brands, brand_id, batch).await
    }

    /// Deleting an absent root is a no-op, so it is only staged when present
    async fn stage_root(&self, batch: &mut WriteBatch, collection: Collection, id: &str) -> Result<()> {
        let exists = self
            .store
            .get(&collection, id)
            .await
            .in_op("stage_delete", &collection, Some(id))?
            .is_some();
        if exists {
            batch.delete(collection, id);
        }
        Ok(())
    }

    async fn stage_client_children(&self, batch: &mut WriteBatch, client_id: &str) -> Result<()> {
        for campaign_id in self
            .ids_where(&Collection::Campaigns, Filter::eq("clientId", client_id))
            .await?
        {
            self.stage_campaign_children(batch, &campaign_id).await?;
            batch.delete(Collection::Campaigns, campaign_id);
        }
        for brand_id in self
            .ids_where(&Collection::Brands, Filter::eq("clientId", client_id))
            .await?
        {
            batch.delete(Collection::Brands, brand_id);
        }
        debug!("Staged delete of client '{}' children ({} writes)", client_id, batch.len());
        Ok(())
    }

    async fn stage_campaign_children(&self, batch: &mut WriteBatch, campaign_id: &str) -> Result<()> {
        for survey_id in self
            .ids_where(&Collection::Surveys, Filter::eq("campaignId", campaign_id))
            .await?
        {
            self.stage_survey_children(batch, &survey_id).await?;
            batch.delete(Collection::Surveys, survey_id).end_unit();
        }
        Ok(())
    }

    async fn stage_survey_children(&self, batch: &mut WriteBatch, survey_id: &str) -> Result<()> {
        let responses = Collection::responses(survey_id);
        for response_id in self
            .store
            .list_ids(&responses, &Query::all())
            .await
            .in_op("stage_delete", &responses, None)?
        {
            batch.delete(responses.clone(), response_id);
        }
        Ok(())
    }

    async fn ids_where(&self, collection: &Collection, filter: Filter) -> Result<Vec<String>> {
        self.store
            .list_ids(collection, &Query::new().filter(filter))
            .await
            .in_op("stage_delete", collection, None)
    }

    async fn commit(
        &self,
        operation: &'static str,
        collection: &Collection,
        id: &str,
        batch: WriteBatch,
    ) -> Result<CascadeSummary> {
        if batch.is_empty() {
            debug!("{} on {} '{}': nothing to write", operation, collection, id);
            return Ok(CascadeSummary::default());
        }
        let deleted =batch.writes().iter().filter(|w| w.operation_type() == "delete").count();
        let updated = batch.len() - deleted;

        let chunks = batch.into_chunks(self.max_batch_writes);
        if chunks.len() > 1 {
            warn!(
                "{} on {} '{}' needs {} writes, committing in {} chunks",
                operation,
                collection,
                id,
                deleted + updated,
                chunks.len()
            );
        }

        let total_chunks = chunks.len();
        for (index, chunk) in chunks.iter().enumerate() {
            self.store
                .commit(chunk)
                .await
                .map_err(|source| cascade_failed(operation, collection, id, source))?;
            debug!("{}: committed chunk {}/{}", operation, index + 1, total_chunks);
        }

        info!(
            "{} on {} '{}' committed: {} deleted, {} updated",
            operation, collection, id, deleted, updated
        );
        Ok(CascadeSummary {
            deleted,
            updated,
            chunks: total_chunks,
        })
    }
}

fn cleared(fields: &[&str]) -> Fields {
    fields
        .iter()
        .map(|field| (field.to_string(), Value::Null))
        .collect()
}

fn cascade_failed(operation: &'static str, collection: &Collection, id: &str, source: StoreError) -> Error {
    Error::CascadeFailed {
        operation,
        collection: collection.path(),
        id: id.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn fields(value: Value) -> Fields {
        value.as_object().unwrap().clone()
    }

    async fn seed(store: &EntityStore, collection: Collection, id: &str, value: Value) {
        store.create_with_id(&collection, id, fields(value)).await.unwrap();
    }

    async fn graph() -> (Arc<MemoryStore>, EntityStore) {
        let backend = Arc::new(MemoryStore::new());
        let store = EntityStore::new(backend.clone());
        seed(&store, Collection::Clients, "c1", json!({"name": "Acme"})).await;
        seed(&store, Collection::Brands, "b1", json!({"name": "Fizz", "clientId": "c1"})).await;
        seed(&store, Collection::Campaigns, "k1", json!({"name": "Launch", "clientId": "c1", "brandIds": ["b1"]})).await;
        seed(&store, Collection::Surveys, "s1", json!({"name": "Feedback", "campaignId": "k1"})).await;
        seed(&store, Collection::responses("s1"), "r1", json!({"answers": {}})).await;
        seed(&store, Collection::Clients, "c2", json!({"name": "Other"})).await;
        (backend, store)
    }

    #[tokio::test]
    async fn test_delete_client_stages_children_first() {
        let (backend, store) = graph().await;
        let coordinator = CascadeCoordinator::new(store);

        let summary = coordinator.delete_client("c1").await.unwrap();
        assert_eq!(summary.deleted, 5);
        assert_eq!(summary.chunks, 1);
        assert_eq!(backend.total_documents().await, 1);
    }

    #[tokio::test]
    async fn test_small_batch_limit_commits_in_chunks() {
        let (backend, store) = graph().await;
        let coordinator = CascadeCoordinator::new(store).with_max_batch_writes(2);

        let summary = coordinator.delete_client("c1").await.unwrap();
        assert_eq!(summary.chunks, 3);
        assert_eq!(backend.total_documents().await, 1);
    }

    #[tokio::test]
    async fn test_failed_commit_surfaces_cascade_failed() {
        let (backend, store) = graph().await;
        let coordinator = CascadeCoordinator::new(store);

        backend.fail_next_commit_after(3);
        let err = coordinator.delete_client("c1").await.unwrap_err();
        assert!(matches!(err, Error::CascadeFailed { operation: "delete_client", .. }));
        assert_eq!(backend.total_documents().await, 6);
    }

    #[tokio::test]
    async fn test_delete_of_absent_root_is_empty() {
        let (backend, store) = graph().await;
        let coordinator = CascadeCoordinator::new(store);

        let summary = coordinator.delete_campaign("missing").await.unwrap();
        assert_eq!(summary, CascadeSummary { deleted: 0, updated: 0, chunks: 0 });
        assert_eq!(backend.total_documents().await, 6);
    }

    #[tokio::test]
    async fn test_delete_brand_refused_while_surveys_use_it() {
        let (_, store) = graph().await;
        seed(&store, Collection::Surveys, "s2", json!({"name": "Brand pulse", "campaignId": "k1", "brandId": "b1"})).await;
        let coordinator = CascadeCoordinator::new(store);

        let err = coordinator.delete_brand("b1").await.unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_delete_brand_detaches_from_campaigns() {
        let (_, store) = graph().await;
        let coordinator = CascadeCoordinator::new(store.clone());

        let summary = coordinator.delete_brand("b1").await.unwrap();
        assert_eq!(summary, CascadeSummary { deleted: 1, updated: 1, chunks: 1 });

        let campaign = store.get(&Collection::Campaigns, "k1").await.unwrap().unwrap();
        assert_eq!(campaign.get("brandIds"), Some(&json!([])));
    }
}
