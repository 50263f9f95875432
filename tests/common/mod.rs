#![allow(dead_code)]

use insights_admin::models::{NewBrand, NewCampaign, NewClient, NewSurvey, Question, QuestionType};
use insights_admin::store::{MemoryStore, RetryConfig};
use insights_admin::{InsightsService, ServiceOptions};
use std::sync::Arc;
use std::time::Duration;

/// Backoff short enough that conflict retries do not slow the suite down
pub fn fast_backoff() -> RetryConfig {
    RetryConfig {
        max_attempts: 1,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: true,
    }
}

pub fn memory_service() -> (Arc<MemoryStore>, InsightsService) {
    memory_service_with(ServiceOptions::default())
}

pub fn memory_service_with(options: ServiceOptions) -> (Arc<MemoryStore>, InsightsService) {
    let store = Arc::new(MemoryStore::new());
    let options = ServiceOptions {
        backoff: fast_backoff(),
        ..options
    };
    let service = InsightsService::with_options(store.clone(), options);
    (store, service)
}

pub fn rating(id: &str) -> Question {
    Question::new(id, format!("How would you rate {}?", id), QuestionType::Rating)
}

pub fn choice(id: &str, options: &[&str]) -> Question {
    Question::new(id, format!("Pick for {}", id), QuestionType::MultipleChoice).with_options(options.iter().copied())
}

/// Ids of a client graph built through the service
pub struct Graph {
    pub client: String,
    pub brand: String,
    pub campaigns: Vec<String>,
    pub surveys: Vec<String>,
}

/// One client with one brand, `campaigns` campaigns and `surveys_per`
/// surveys under each campaign
pub async fn seed_client(
    service: &InsightsService,
    name: &str,
    campaigns: usize,
    surveys_per: usize,
) -> anyhow::Result<Graph> {
    let client = service.add_client(NewClient::named(name)).await?;
    let brand = service
        .add_brand(NewBrand {
            name: format!("{} Brand", name),
            client_id: client.clone(),
            description: None,
        })
        .await?;

    let mut graph = Graph {
        client: client.clone(),
        brand: brand.clone(),
        campaigns: Vec::new(),
        surveys: Vec::new(),
    };
    for c in 0..campaigns {
        let campaign = service
            .add_campaign(NewCampaign::new(format!("{} Campaign {}", name, c), &client).with_brands([brand.as_str()]))
            .await?;
        for s in 0..surveys_per {
            let mut survey = NewSurvey::new(format!("{} Survey {}-{}", name, c, s), &campaign).with_brand(&brand);
            survey.questions = vec![rating("q1")];
            graph.surveys.push(service.add_survey(survey).await?);
        }
        graph.campaigns.push(campaign);
    }
    Ok(graph)
}
