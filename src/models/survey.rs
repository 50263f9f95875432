use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurveyStatus {
    #[default]
    Draft,
    Active,
    #[serde(alias = "completed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    Rating,
    #[serde(alias = "text")]
    OpenEnded,
    Ranking,
}

impl QuestionType {
    /// Discrete-choice types need at least two options
    pub fn requires_options(&self) -> bool {
        matches!(self, QuestionType::MultipleChoice | QuestionType::Ranking)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub required: bool,
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>, kind: QuestionType) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            kind,
            options: Vec::new(),
            required: false,
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: String,
    pub name: String,
    pub campaign_id: String,
    #[serde(default)]
    pub campaign_name: String,
    #[serde(default)]
    pub brand_id: Option<String>,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub status: SurveyStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Number of documents in the responses sub-collection
    #[serde(default)]
    pub response_count: u64,
    #[serde(default)]
    pub reward_program_id: Option<String>,
    #[serde(default)]
    pub reward_program_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSurvey {
    pub name: String,
    pub campaign_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<String>,
    #[serde(default)]
    pub status: SurveyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_program_id: Option<String>,
}

impl NewSurvey {
    pub fn new(name: impl Into<String>, campaign_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            campaign_id: campaign_id.into(),
            ..Self::default()
        }
    }

    pub fn with_brand(mut self, brand_id: impl Into<String>) -> Self {
        self.brand_id = Some(brand_id.into());
        self
    }

    pub fn with_reward_program(mut self, reward_program_id: impl Into<String>) -> Self {
        self.reward_program_id = Some(reward_program_id.into());
        self
    }
}

/// Partial survey update. `campaign_id` and `brand_id` may only repeat the
/// stored values. `reward_program_id: Some(None)` detaches the program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SurveyStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<Question>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_program_id: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResponse {
    /// Answers keyed by question id
    pub answers: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respondent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponse {
    pub id: String,
    pub survey_id: String,
    #[serde(default)]
    pub answers: Map<String, Value>,
    #[serde(default)]
    pub respondent_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::to_fields;
    use serde_json::json;

    #[test]
    fn test_question_type_names() {
        assert_eq!(serde_json::to_value(QuestionType::MultipleChoice).unwrap(), json!("multiple-choice"));
        assert_eq!(serde_json::to_value(QuestionType::OpenEnded).unwrap(), json!("open-ended"));
        let text: QuestionType = serde_json::from_value(json!("text")).unwrap();
        assert_eq!(text, QuestionType::OpenEnded);
        assert!(QuestionType::Ranking.requires_options());
        assert!(!QuestionType::Rating.requires_options());
    }

    #[test]
    fn test_completed_is_an_alias_for_closed() {
        let status: SurveyStatus = serde_json::from_value(json!("completed")).unwrap();
        assert_eq!(status, SurveyStatus::Closed);
        assert_eq!(serde_json::to_value(status).unwrap(), json!("closed"));
    }

    #[test]
    fn test_detaching_reward_program_serializes_null() {
        let patch = SurveyPatch {
            reward_program_id: Some(None),
            ..SurveyPatch::default()
        };
        let fields = to_fields(&patch).unwrap();
        assert_eq!(fields.get("rewardProgramId"), Some(&Value::Null));
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_question_type_field_is_named_type() {
        let question = Question::new("q1", "Pick one", QuestionType::MultipleChoice).with_options(["A", "B"]);
        let value = serde_json::to_value(&question).unwrap();
        assert_eq!(value["type"], json!("multiple-choice"));
        assert_eq!(value["options"], json!(["A", "B"]));
    }
}
