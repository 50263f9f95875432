//! Report payloads
//!
//! Each known report kind decodes into its own type at the boundary.
//! Anything unrecognized, or a known kind whose body does not fit, is kept
//! as [`ReportPayload::Raw`] and rendered as indented structured text.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write;

pub const SURVEY_SUMMARY: &str = "survey-summary";
pub const CAMPAIGN_PERFORMANCE: &str = "campaign-performance";
pub const RESPONSE_BREAKDOWN: &str = "response-breakdown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveySummaryReport {
    pub survey_id: String,
    pub survey_name: String,
    #[serde(default)]
    pub campaign_name: String,
    pub response_count: u64,
    #[serde(default)]
    pub question_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignPerformance {
    pub campaign_id: String,
    pub campaign_name: String,
    #[serde(default)]
    pub client_name: String,
    pub survey_count: u64,
    pub response_count: u64,
}

/// Answer distribution for one question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBreakdown {
    pub survey_id: String,
    pub question_id: String,
    #[serde(default)]
    pub question_text: String,
    pub total: u64,
    pub counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportPayload {
    SurveySummary(SurveySummaryReport),
    CampaignPerformance(CampaignPerformance),
    ResponseBreakdown(ResponseBreakdown),
    Raw { kind: String, value: Value },
}

impl ReportPayload {
    pub fn decode(kind: &str, value: Value) -> Self {
        let decoded = match kind {
            SURVEY_SUMMARY => serde_json::from_value(value.clone()).map(ReportPayload::SurveySummary),
            CAMPAIGN_PERFORMANCE => {
                serde_json::from_value(value.clone()).map(ReportPayload::CampaignPerformance)
            }
            RESPONSE_BREAKDOWN => {
                serde_json::from_value(value.clone()).map(ReportPayload::ResponseBreakdown)
            }
            _ => {
                return ReportPayload::Raw {
                    kind: kind.to_string(),
                    value,
                };
            }
        };

        decoded.unwrap_or_else(|e| {
            debug!("Report '{}' did not match its schema, keeping raw: {}", kind, e);
            ReportPayload::Raw {
                kind: kind.to_string(),
                value,
            }
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            ReportPayload::SurveySummary(_) => SURVEY_SUMMARY,
            ReportPayload::CampaignPerformance(_) => CAMPAIGN_PERFORMANCE,
            ReportPayload::ResponseBreakdown(_) => RESPONSE_BREAKDOWN,
            ReportPayload::Raw { kind, .. } => kind,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        match self {
            ReportPayload::SurveySummary(r) => {
                let _ = writeln!(out, "Survey: {} ({})", r.survey_name, r.survey_id);
                let _ = writeln!(out, "Campaign: {}", r.campaign_name);
                let _ = writeln!(out, "Questions: {}", r.question_count);
                let _ = writeln!(out, "Responses: {}", r.response_count);
            }
            ReportPayload::CampaignPerformance(r) => {
                let _ = writeln!(out, "Campaign: {} ({})", r.campaign_name, r.campaign_id);
                let _ = writeln!(out, "Client: {}", r.client_name);
                let _ = writeln!(out, "Surveys: {}", r.survey_count);
                let _ = writeln!(out, "Responses: {}", r.response_count);
            }
            ReportPayload::ResponseBreakdown(r) => {
                let _ = writeln!(out, "Question: {} ({})", r.question_text, r.question_id);
                for (answer, count) in &r.counts {
                    let _ = writeln!(out, "  {}: {}", answer, count);
                }
                let _ = writeln!(out, "Total: {}", r.total);
            }
            ReportPayload::Raw { kind, value } => {
                let _ = writeln!(out, "[{}]", kind);
                render_value(value, 0, &mut out);
            }
        }
        out
    }
}

fn render_value(value: &Value, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if child.is_object() || child.is_array() {
                    let _ = writeln!(out, "{}{}:", pad, key);
                    render_value(child, indent + 1, out);
                } else {
                    let _ = writeln!(out, "{}{}: {}", pad, key, scalar(child));
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                if item.is_object() || item.is_array() {
                    let _ = writeln!(out, "{}-", pad);
                    render_value(item, indent + 1, out);
                } else {
                    let _ = writeln!(out, "{}- {}", pad, scalar(item));
                }
            }
        }
        other => {
            let _ = writeln!(out, "{}{}", pad, scalar(other));
        }
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_kind_decodes_to_variant() {
        let payload = ReportPayload::decode(
            CAMPAIGN_PERFORMANCE,
            json!({"campaignId": "k1", "campaignName": "Launch", "surveyCount": 2, "responseCount": 40}),
        );
        match &payload {
            ReportPayload::CampaignPerformance(r) => {
                assert_eq!(r.survey_count, 2);
                assert_eq!(r.client_name, "");
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert!(payload.render().contains("Responses: 40"));
    }

    #[test]
    fn test_mismatched_body_falls_back_to_raw() {
        let payload = ReportPayload::decode(SURVEY_SUMMARY, json!({"surveyId": 5}));
        assert!(matches!(payload, ReportPayload::Raw { .. }));
        assert_eq!(payload.kind(), SURVEY_SUMMARY);
    }

    #[test]
    fn test_unknown_kind_renders_structured_text() {
        let payload = ReportPayload::decode(
            "sentiment",
            json!({"overall": "positive", "scores": [0.5, 0.9], "detail": {"q1": 3}}),
        );
        let text = payload.render();
        assert!(text.starts_with("[sentiment]\n"));
        assert!(text.contains("overall: positive\n"));
        assert!(text.contains("scores:\n  - 0.5\n  - 0.9\n"));
        assert!(text.contains("detail:\n  q1: 3\n"));
    }
}
