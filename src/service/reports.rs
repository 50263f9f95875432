use super::InsightsService;
use super::surveys::SurveyFilter;
use crate::error::{Error, Result};
use crate::models::{
    Campaign, CampaignPerformance, KpiData, ReportPayload, ResponseBreakdown, Survey,
    SurveySummaryReport,
};
use crate::store::Collection;
use serde_json::Value;
use std::collections::BTreeMap;

impl InsightsService {
    /// Totals for the dashboard: clients, campaigns, surveys and respondents
    pub async fn get_kpi_data(&self) -> Result<KpiData> {
        self.aggregation.kpi_data().await
    }

    pub async fn survey_summary_report(&self, survey_id: &str) -> Result<ReportPayload> {
        let survey: Survey = self
            .fetch_required("survey_summary_report", &Collection::Surveys, survey_id)
            .await?;
        Ok(ReportPayload::SurveySummary(SurveySummaryReport {
            survey_id: survey.id,
            survey_name: survey.name,
            campaign_name: survey.campaign_name,
            response_count: survey.response_count,
            question_count: survey.questions.len(),
        }))
    }

    pub async fn campaign_performance_report(&self, campaign_id: &str) -> Result<ReportPayload> {
        let filter = SurveyFilter::Campaign(campaign_id.to_string());
        let (campaign, surveys) = futures::try_join!(
            self.fetch_required::<Campaign>("campaign_performance_report", &Collection::Campaigns, campaign_id),
            self.list_surveys(Some(&filter)),
        )?;

        Ok(ReportPayload::CampaignPerformance(CampaignPerformance {
            campaign_id: campaign.id,
            campaign_name: campaign.name,
            client_name: campaign.client_name,
            survey_count: surveys.len() as u64,
            response_count: surveys.iter().map(|s| s.response_count).sum(),
        }))
    }

    /// Distribution of answers to one question. Array answers (ranking,
    /// multi-select) count once per element.
    pub async fn response_breakdown_report(&self, survey_id: &str, question_id: &str) -> Result<ReportPayload> {
        let survey: Survey = self
            .fetch_required("response_breakdown_report", &Collection::Surveys, survey_id)
            .await?;
        let question = survey
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| Error::NotFound {
                collection: format!("surveys/{}/questions", survey_id),
                id: question_id.to_string(),
            })?;

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut total = 0;
        for response in self.list_responses(survey_id).await? {
            let Some(answer) = response.answers.get(question_id).filter(|a| !a.is_null()) else {
                continue;
            };
            total += 1;
            match answer {
                Value::Array(items) => {
                    for item in items {
                        *counts.entry(answer_key(item)).or_default() += 1;
                    }
                }
                other => *counts.entry(answer_key(other)).or_default() += 1,
            }
        }

        Ok(ReportPayload::ResponseBreakdown(ResponseBreakdown {
            survey_id: survey_id.to_string(),
            question_id: question_id.to_string(),
            question_text: question.text.clone(),
            total,
            counts,
        }))
    }
}

fn answer_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
