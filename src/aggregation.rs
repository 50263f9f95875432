//! Aggregation Service: count-only queries, transactional counters and
//! the KPI rollup.

use crate::error::{Error, Result, StoreResultExt};
use crate::models::KpiData;
use crate::store::entity_store::Modified;
use crate::store::{Collection, EntityStore, FilterValue, Query};
use log::{debug, info};
use serde_json::Value;

pub const DEFAULT_COUNTER_MAX_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct AggregationService {
    store: EntityStore,
    counter_max_attempts: u32,
}

impl AggregationService {
    pub fn new(store: EntityStore) -> Self {
        Self {
            store,
            counter_max_attempts: DEFAULT_COUNTER_MAX_ATTEMPTS,
        }
    }

    pub fn with_counter_max_attempts(mut self, attempts: u32) -> Self {
        self.counter_max_attempts = attempts.max(1);
        self
    }

    pub async fn count(&self, collection: &Collection, query: &Query) -> Result<u64> {
        self.store
            .count(collection, query)
            .await
            .in_op("count", collection, None)
    }

    pub async fn count_where(
        &self,
        collection: &Collection,
        field: &str,
        value: impl Into<FilterValue>,
    ) -> Result<u64> {
        self.count(collection, &Query::new().where_eq(field, value)).await
    }

    /// Atomically add one to a numeric field (absent counts as 0) and
    /// return the new value. Conflicting writers cause a re-read and retry
    /// up to the attempt budget.
    pub async fn increment_counter(&self, collection: &Collection, id: &str, field: &str) -> Result<u64> {
        let outcome = self
            .store
            .modify(collection, id, self.counter_max_attempts, |doc| {
                let mut patch = crate::store::Fields::new();
                patch.insert(field.to_string(), Value::from(counter_value(doc.get(field)) + 1));
                patch
            })
            .await
            .in_op("increment_counter", collection, Some(id))?;

        match outcome {
            Modified::Applied(doc) => {
                let value = counter_value(doc.get(field));
                debug!("{} on {} '{}' is now {}", field, collection, id, value);
                Ok(value)
            }
            Modified::Exhausted { attempts } => Err(Error::ConcurrentUpdateExceeded {
                collection: collection.path(),
                id: id.to_string(),
                field: field.to_string(),
                attempts,
            }),
        }
    }

    /// Sum of `responseCount` over every survey. Scans all surveys.
    pub async fn total_respondents(&self) -> Result<u64> {
        let surveys = self
            .store
            .list(&Collection::Surveys, &Query::all())
            .await
            .in_op("total_respondents", &Collection::Surveys, None)?;
        Ok(surveys
            .iter()
            .map(|survey| counter_value(survey.get("responseCount")))
            .sum())
    }

    /// The four rollups run concurrently
    pub async fn kpi_data(&self) -> Result<KpiData> {
        let all = Query::all();
        let (total_clients, total_campaigns, total_surveys, total_respondents) = futures::try_join!(
            self.count(&Collection::Clients, &all),
            self.count(&Collection::Campaigns, &all),
            self.count(&Collection::Surveys, &all),
            self.total_respondents(),
        )?;

        let kpi = KpiData {
            total_clients,
            total_campaigns,
            total_surveys,
            total_respondents,
        };
        info!("KPI rollup: {:?}", kpi);
        Ok(kpi)
    }
}

fn counter_value(value: Option<&Value>) -> u64 {
    value.and_then(Value::as_u64).unwrap_or(0)
}
