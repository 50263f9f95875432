use super::validation::{
    ensure_unchanged, require_name, require_optional_name, validate_date_range, validate_unique_ids,
};
use super::{InsightsService, by_parent};
use crate::cascade::CascadeSummary;
use crate::error::{Error, Result};
use crate::models::{
    Brand, Campaign, CampaignPatch, CampaignWithBrands, NewCampaign, Survey, to_fields,
};
use crate::store::{Collection, Query};
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::HashMap;

impl InsightsService {
    /// Creates the campaign with `clientName` resolved now. An unknown
    /// client does not block the write; the placeholder name is cached.
    pub async fn add_campaign(&self, campaign: NewCampaign) -> Result<String> {
        require_name("campaign", &campaign.name)?;
        require_name("campaign client", &campaign.client_id)?;
        validate_unique_ids("brandIds", &campaign.brand_ids)?;
        validate_date_range(campaign.start_date, campaign.end_date)?;

        let (client_name, ()) = futures::try_join!(
            self.resolver.resolve_display_name(&Collection::Clients, &campaign.client_id),
            self.check_brands_belong_to(&campaign.client_id, &campaign.brand_ids),
        )?;

        let mut fields = to_fields(&campaign)?;
        fields.insert("clientName".to_string(), Value::String(client_name));
        self.create_entity("add_campaign", &Collection::Campaigns, fields).await
    }

    pub async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        self.fetch("get_campaign", &Collection::Campaigns, id).await
    }

    pub async fn list_campaigns(&self, client_id: Option<&str>) -> Result<Vec<Campaign>> {
        self.fetch_list("list_campaigns", &Collection::Campaigns, &by_parent("clientId", client_id))
            .await
    }

    /// Campaigns with their cached client name and current brand names
    pub async fn list_campaigns_with_brands(&self, client_id: Option<&str>) -> Result<Vec<CampaignWithBrands>> {
        let (campaigns, brands) = futures::try_join!(
            self.list_campaigns(client_id),
            self.list_brands(client_id),
        )?;
        let names: HashMap<String, String> = brands.into_iter().map(|b| (b.id, b.name)).collect();

        Ok(campaigns
            .into_iter()
            .map(|campaign| {
                let brand_names = campaign
                    .brand_ids
                    .iter()
                    .map(|id| {
                        names
                            .get(id)
                            .cloned()
                            .unwrap_or_else(|| Collection::Brands.placeholder_name().to_string())
                    })
                    .collect();
                CampaignWithBrands { campaign, brand_names }
            })
            .collect())
    }

    /// `clientId` may be sent only with its stored value; doing so
    /// refreshes the cached client name.
    pub async fn update_campaign(&self, id: &str, patch: CampaignPatch) -> Result<()> {
        let current: Campaign = self
            .fetch_required("update_campaign", &Collection::Campaigns, id)
            .await?;

        ensure_unchanged("clientId", Some(&current.client_id), patch.client_id.as_deref())?;
        require_optional_name("campaign", patch.name.as_deref())?;
        validate_date_range(
            patch.start_date.or(current.start_date),
            patch.end_date.or(current.end_date),
        )?;
        if let Some(brand_ids) = &patch.brand_ids {
            validate_unique_ids("brandIds", brand_ids)?;
            futures::try_join!(
                self.check_brands_belong_to(&current.client_id, brand_ids),
                self.check_survey_brands_kept(id, brand_ids),
            )?;
        }

        let mut fields = to_fields(&patch)?;
        if patch.client_id.is_some() {
            let client_name = self
                .resolver
                .resolve_display_name(&Collection::Clients, &current.client_id)
                .await?;
            fields.insert("clientName".to_string(), Value::String(client_name));
        }
        self.update_entity("update_campaign", &Collection::Campaigns, id, fields)
            .await
    }

    /// Removes the campaign, its surveys and their responses
    pub async fn delete_campaign(&self, id: &str) -> Result<CascadeSummary> {
        self.cascade.delete_campaign(id).await
    }

    pub async fn campaign_survey_count(&self, campaign_id: &str) -> Result<u64> {
        self.aggregation
            .count_where(&Collection::Surveys, "campaignId", campaign_id)
            .await
    }

    /// Survey brands are immutable, so a campaign cannot drop a brand that
    /// one of its surveys still targets
    async fn check_survey_brands_kept(&self, campaign_id: &str, brand_ids: &[String]) -> Result<()> {
        let surveys: Vec<Survey> = self
            .fetch_list(
                "check_survey_brands",
                &Collection::Surveys,
                &Query::new().where_eq("campaignId", campaign_id),
            )
            .await?;

        let stranded: Vec<&str> = surveys
            .iter()
            .filter(|survey| {
                survey
                    .brand_id
                    .as_ref()
                    .is_some_and(|brand| !brand_ids.contains(brand))
            })
            .map(|survey| survey.id.as_str())
            .collect();
        if stranded.is_empty() {
            return Ok(());
        }
        Err(Error::validation(format!(
            "campaign '{}' still has surveys on the removed brands: {}",
            campaign_id,
            stranded.join(", ")
        )))
    }

    /// Every listed brand must exist and belong to the campaign's client
    async fn check_brands_belong_to(&self, client_id: &str, brand_ids: &[String]) -> Result<()> {
        let brands: Vec<Option<Brand>> = try_join_all(
            brand_ids
                .iter()
                .map(|id| self.fetch::<Brand>("check_brand", &Collection::Brands, id)),
        )
        .await?;

        for (id, brand) in brand_ids.iter().zip(brands) {
            match brand {
                None => return Err(Error::validation(format!("brand '{}' does not exist", id))),
                Some(brand) if brand.client_id != client_id => {
                    return Err(Error::validation(format!(
                        "brand '{}' belongs to client '{}', not '{}'",
                        id, brand.client_id, client_id
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
