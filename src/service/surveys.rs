use super::InsightsService;
use super::validation::{
    ensure_unchanged, require_name, require_optional_name, validate_question, validate_questions,
};
use crate::cascade::CascadeSummary;
use crate::error::{Error, Result, StoreResultExt};
use crate::models::{
    Campaign, NewResponse, NewSurvey, Question, Survey, SurveyPatch, SurveyResponse, SurveySummary,
    to_fields,
};
use crate::store::entity_store::Modified;
use crate::store::{Collection, Fields, OrderBy, Query};
use crate::timestamps;
use chrono::Utc;
use log::info;
use serde_json::Value;

/// Single-parent filter for survey listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurveyFilter {
    Campaign(String),
    Brand(String),
}

impl SurveyFilter {
    fn narrow(base: Query, filter: Option<&SurveyFilter>) -> Query {
        match filter {
            Some(SurveyFilter::Campaign(id)) => base.where_eq("campaignId", id),
            Some(SurveyFilter::Brand(id)) => base.where_eq("brandId", id),
            None => base,
        }
    }
}

fn question_id(value: &Value) -> Option<&str> {
    value.get("id").and_then(Value::as_str)
}

fn questions_field(questions: Vec<Value>) -> Fields {
    let mut fields = Fields::new();
    fields.insert("questions".to_string(), Value::Array(questions));
    fields
}

/// A survey's brand must be one of its campaign's brands
fn check_brand_in_campaign(campaign: &Campaign, brand_id: &str) -> Result<()> {
    if campaign.brand_ids.iter().any(|id| id == brand_id) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "brand '{}' is not one of campaign '{}' brands",
            brand_id, campaign.id
        )))
    }
}

impl InsightsService {
    /// Creates the survey with campaign, brand and reward program names
    /// resolved now. The brand must belong to the campaign when the
    /// campaign exists; a dangling campaign only yields a placeholder name.
    pub async fn add_survey(&self, survey: NewSurvey) -> Result<String> {
        require_name("survey", &survey.name)?;
        require_name("survey campaign", &survey.campaign_id)?;
        validate_questions(&survey.questions)?;

        let (campaign, brand_name, reward_program_name) = futures::try_join!(
            self.fetch::<Campaign>("add_survey", &Collection::Campaigns, &survey.campaign_id),
            self.resolver
                .resolve_optional(&Collection::Brands, survey.brand_id.as_deref()),
            self.resolver
                .resolve_optional(&Collection::RewardPrograms, survey.reward_program_id.as_deref()),
        )?;

        if let (Some(campaign), Some(brand_id)) = (&campaign, &survey.brand_id) {
            check_brand_in_campaign(campaign, brand_id)?;
        }
        let campaign_name = campaign
            .map(|c| c.name)
            .unwrap_or_else(|| Collection::Campaigns.placeholder_name().to_string());

        let mut fields = to_fields(&survey)?;
        fields.insert("campaignName".to_string(), Value::String(campaign_name));
        if let Some(name) = brand_name {
            fields.insert("brandName".to_string(), Value::String(name));
        }
        if let Some(name) = reward_program_name {
            fields.insert("rewardProgramName".to_string(), Value::String(name));
        }
        fields.insert("responseCount".to_string(), Value::from(0u64));

        self.create_entity("add_survey", &Collection::Surveys, fields).await
    }

    pub async fn get_survey(&self, id: &str) -> Result<Option<Survey>> {
        self.fetch("get_survey", &Collection::Surveys, id).await
    }

    pub async fn list_surveys(&self, filter: Option<&SurveyFilter>) -> Result<Vec<Survey>> {
        let query = SurveyFilter::narrow(Query::by_name(), filter);
        self.fetch_list("list_surveys", &Collection::Surveys, &query).await
    }

    /// The `limit` most recently created surveys, newest first
    pub async fn list_recent_surveys(&self, filter: Option<&SurveyFilter>, limit: u32) -> Result<Vec<SurveySummary>> {
        let query = SurveyFilter::narrow(Query::newest_first().limit(limit), filter);
        let surveys: Vec<Survey> = self
            .fetch_list("list_recent_surveys", &Collection::Surveys, &query)
            .await?;
        Ok(surveys.iter().map(SurveySummary::from).collect())
    }

    /// Surveys with their cached names, response count and question count
    pub async fn list_survey_summaries(&self, filter: Option<&SurveyFilter>) -> Result<Vec<SurveySummary>> {
        Ok(self
            .list_surveys(filter)
            .await?
            .iter()
            .map(SurveySummary::from)
            .collect())
    }

    /// Partial update. Sending `campaignId`/`brandId` (with their stored
    /// values) or `rewardProgramId` re-resolves the matching cached name.
    pub async fn update_survey(&self, id: &str, patch: SurveyPatch) -> Result<()> {
        let current: Survey = self.fetch_required("update_survey", &Collection::Surveys, id).await?;

        ensure_unchanged("campaignId", Some(&current.campaign_id), patch.campaign_id.as_deref())?;
        ensure_unchanged("brandId", current.brand_id.as_deref(), patch.brand_id.as_deref())?;
        require_optional_name("survey", patch.name.as_deref())?;
        if let Some(questions) = &patch.questions {
            validate_questions(questions)?;
        }

        let mut fields = to_fields(&patch)?;
        if patch.campaign_id.is_some() {
            let campaign_name = self
                .resolver
                .resolve_display_name(&Collection::Campaigns, &current.campaign_id)
                .await?;
            fields.insert("campaignName".to_string(), Value::String(campaign_name));
        }
        if let Some(brand_id) = &patch.brand_id {
            let brand_name = self.resolver.resolve_display_name(&Collection::Brands, brand_id).await?;
            fields.insert("brandName".to_string(), Value::String(brand_name));
        }
        match &patch.reward_program_id {
            Some(Some(program_id)) => {
                let name = self
                    .resolver
                    .resolve_display_name(&Collection::RewardPrograms, program_id)
                    .await?;
                fields.insert("rewardProgramName".to_string(), Value::String(name));
            }
            Some(None) => {
                fields.insert("rewardProgramName".to_string(), Value::Null);
            }
            None => {}
        }

        self.update_entity("update_survey", &Collection::Surveys, id, fields).await
    }

    /// Removes the survey and its responses sub-collection
    pub async fn delete_survey(&self, id: &str) -> Result<CascadeSummary> {
        self.cascade.delete_survey(id).await
    }

    pub async fn add_question_to_survey(&self, survey_id: &str, question: Question) -> Result<()> {
        validate_question(&question)?;
        let current: Survey = self
            .fetch_required("add_question", &Collection::Surveys, survey_id)
            .await?;
        if current.questions.iter().any(|q| q.id == question.id) {
            return Err(Error::validation(format!(
                "survey '{}' already has question '{}'",
                survey_id, question.id
            )));
        }

        let value = serde_json::to_value(&question)
            .map_err(|e| Error::validation(format!("question could not be serialized: {}", e)))?;
        self.modify_questions("add_question", survey_id, |mut questions| {
            if !questions.iter().any(|q| question_id(q) == Some(question.id.as_str())) {
                questions.push(value.clone());
            }
            questions
        })
        .await
    }

    /// Replaces the question with the same id, keeping its position
    pub async fn update_question_in_survey(&self, survey_id: &str, question: Question) -> Result<()> {
        validate_question(&question)?;
        let current: Survey = self
            .fetch_required("update_question", &Collection::Surveys, survey_id)
            .await?;
        if !current.questions.iter().any(|q| q.id == question.id) {
            return Err(Error::NotFound {
                collection: format!("surveys/{}/questions", survey_id),
                id: question.id,
            });
        }

        let value = serde_json::to_value(&question)
            .map_err(|e| Error::validation(format!("question could not be serialized: {}", e)))?;
        self.modify_questions("update_question", survey_id, |questions| {
            questions
                .into_iter()
                .map(|q| {
                    if question_id(&q) == Some(question.id.as_str()) {
                        value.clone()
                    } else {
                        q
                    }
                })
                .collect()
        })
        .await
    }

    /// Removing a question that is not there is a no-op
    pub async fn remove_question_from_survey(&self, survey_id: &str, question_id_to_remove: &str) -> Result<()> {
        let current: Survey = self
            .fetch_required("remove_question", &Collection::Surveys, survey_id)
            .await?;
        if !current.questions.iter().any(|q| q.id == question_id_to_remove) {
            return Ok(());
        }

        self.modify_questions("remove_question", survey_id, |questions| {
            questions
                .into_iter()
                .filter(|q| question_id(q) != Some(question_id_to_remove))
                .collect()
        })
        .await
    }

    /// Read-modify-write of the questions array under version checks so
    /// concurrent question edits are not lost
    async fn modify_questions<F>(&self, operation: &'static str, survey_id: &str, mut change: F) -> Result<()>
    where
        F: FnMut(Vec<Value>) -> Vec<Value> + Send,
    {
        let outcome = self
            .store
            .modify(&Collection::Surveys, survey_id, self.counter_max_attempts, |doc| {
                let questions = doc
                    .get("questions")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                questions_field(change(questions))
            })
            .await
            .in_op(operation, &Collection::Surveys, Some(survey_id))?;

        match outcome {
            Modified::Applied(_) => {
                info!("{}: updated questions of survey '{}'", operation, survey_id);
                Ok(())
            }
            Modified::Exhausted { attempts } => Err(Error::ConcurrentUpdateExceeded {
                collection: Collection::Surveys.path(),
                id: survey_id.to_string(),
                field: "questions".to_string(),
                attempts,
            }),
        }
    }

    /// Stores the response under its survey and bumps `responseCount`.
    /// Every answer must be keyed by a question of the survey and every
    /// required question must be answered.
    pub async fn submit_response(&self, survey_id: &str, response: NewResponse) -> Result<String> {
        let survey: Survey = self
            .fetch_required("submit_response", &Collection::Surveys, survey_id)
            .await?;

        if let Some(unknown) = response
            .answers
            .keys()
            .find(|key| !survey.questions.iter().any(|q| &q.id == *key))
        {
            return Err(Error::validation(format!(
                "survey '{}' has no question '{}'",
                survey_id, unknown
            )));
        }
        if let Some(missing) = survey
            .questions
            .iter()
            .find(|q| q.required && response.answers.get(&q.id).is_none_or(Value::is_null))
        {
            return Err(Error::validation(format!(
                "required question '{}' was not answered",
                missing.id
            )));
        }

        let responses = Collection::responses(survey_id);
        let mut fields = to_fields(&response)?;
        fields.insert("surveyId".to_string(), Value::String(survey_id.to_string()));
        fields.insert(
            "submittedAt".to_string(),
            Value::String(timestamps::to_iso(&Utc::now())),
        );

        let id = self.create_entity("submit_response", &responses, fields).await?;
        self.aggregation
            .increment_counter(&Collection::Surveys, survey_id, "responseCount")
            .await?;
        Ok(id)
    }

    /// Most recent first
    pub async fn list_responses(&self, survey_id: &str) -> Result<Vec<SurveyResponse>> {
        let query = Query::new().orderby(OrderBy::desc("submittedAt"));
        self.fetch_list("list_responses", &Collection::responses(survey_id), &query)
            .await
    }

    pub async fn count_responses(&self, survey_id: &str) -> Result<u64> {
        self.aggregation
            .count(&Collection::responses(survey_id), &Query::all())
            .await
    }
}
