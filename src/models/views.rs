//! Display-ready read shapes assembled by the service layer

use super::{Campaign, Survey, SurveyStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiData {
    pub total_clients: u64,
    pub total_campaigns: u64,
    pub total_surveys: u64,
    pub total_respondents: u64,
}

/// Campaign with its cached client name and the names of its brands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignWithBrands {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub brand_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveySummary {
    pub id: String,
    pub name: String,
    pub campaign_id: String,
    pub campaign_name: String,
    pub brand_name: Option<String>,
    pub reward_program_name: Option<String>,
    pub status: SurveyStatus,
    pub response_count: u64,
    pub question_count: usize,
}

impl From<&Survey> for SurveySummary {
    fn from(survey: &Survey) -> Self {
        Self {
            id: survey.id.clone(),
            name: survey.name.clone(),
            campaign_id: survey.campaign_id.clone(),
            campaign_name: survey.campaign_name.clone(),
            brand_name: survey.brand_name.clone(),
            reward_program_name: survey.reward_program_name.clone(),
            status: survey.status,
            response_count: survey.response_count,
            question_count: survey.questions.len(),
        }
    }
}
