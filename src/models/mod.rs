//! Entity types, write payloads and read views

pub mod campaign;
pub mod client;
pub mod report;
pub mod rewards;
pub mod survey;
pub mod views;

pub use campaign::{Campaign, CampaignPatch, CampaignStatus, NewCampaign};
pub use client::{Brand, BrandPatch, Client, ClientPatch, ClientStatus, NewBrand, NewClient};
pub use report::{CampaignPerformance, ReportPayload, ResponseBreakdown, SurveySummaryReport};
pub use rewards::{
    Consumer, ConsumerPatch, NewConsumer, NewRedemptionItem, NewRewardProgram, RedemptionItem,
    RedemptionItemPatch, RewardProgram, RewardProgramPatch,
};
pub use survey::{
    NewResponse, NewSurvey, Question, QuestionType, Survey, SurveyPatch, SurveyResponse, SurveyStatus,
};
pub use views::{CampaignWithBrands, KpiData, SurveySummary};

use crate::error::{Error, Result};
use crate::store::Fields;
use serde::Serialize;
use serde_json::Value;

/// Serialize a payload into top-level store fields. Absent optional fields
/// are skipped so a patch only touches what it names.
pub fn to_fields<T: Serialize>(payload: &T) -> Result<Fields> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::validation(format!("payload must be an object, got {}", other))),
        Err(e) => Err(Error::validation(format!("payload could not be serialized: {}", e))),
    }
}
