use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Active,
    Inactive,
    Completed,
    Planning,
    Paused,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub client_id: String,
    /// Client name as it was when this campaign was last written
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub brand_ids: Vec<String>,
    #[serde(default)]
    pub status: CampaignStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
    pub name: String,
    pub client_id: String,
    #[serde(default)]
    pub brand_ids: Vec<String>,
    #[serde(default)]
    pub status: CampaignStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

impl NewCampaign {
    pub fn new(name: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    pub fn with_brands<I, S>(mut self, brand_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.brand_ids = brand_ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial campaign update. `client_id` is accepted only when it repeats
/// the stored value, which refreshes the cached client name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CampaignStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_campaign_roundtrips_dates_and_status() {
        let campaign: Campaign = serde_json::from_value(json!({
            "id": "k1",
            "name": "Launch",
            "clientId": "c1",
            "clientName": "Acme",
            "brandIds": ["b1"],
            "status": "planning",
            "startDate": "2024-06-01",
            "createdAt": "2024-05-01T12:00:00.000Z",
            "updatedAt": "2024-05-01T12:00:00.000Z"
        }))
        .unwrap();

        assert_eq!(campaign.status, CampaignStatus::Planning);
        assert_eq!(campaign.start_date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert!(campaign.end_date.is_none());
        assert_eq!(serde_json::to_value(&campaign).unwrap()["brandIds"], json!(["b1"]));
    }
}
