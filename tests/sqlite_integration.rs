//! The service layer running on the SQLite backend

mod common;

use common::{fast_backoff, rating};
use insights_admin::models::{
    ClientPatch, ClientStatus, NewBrand, NewCampaign, NewClient, NewRedemptionItem, NewResponse,
    NewRewardProgram, NewSurvey,
};
use insights_admin::store::{Collection, SqliteStore};
use insights_admin::{InsightsService, ServiceOptions};
use serde_json::json;
use std::sync::Arc;

async fn sqlite_service(counter_max_attempts: u32) -> anyhow::Result<InsightsService> {
    let store = SqliteStore::connect_memory().await?;
    Ok(InsightsService::with_options(
        Arc::new(store),
        ServiceOptions {
            counter_max_attempts,
            backoff: fast_backoff(),
            ..ServiceOptions::default()
        },
    ))
}

fn one_answer(score: i64) -> NewResponse {
    let mut answers = serde_json::Map::new();
    answers.insert("q1".to_string(), json!(score));
    NewResponse {
        answers,
        respondent_id: None,
    }
}

/// Create, denormalize, respond and cascade on SQLite
#[tokio::test]
async fn test_full_lifecycle_on_sqlite() -> anyhow::Result<()> {
    let service = sqlite_service(5).await?;

    let client = service.add_client(NewClient::named("Acme")).await?;
    let brand = service
        .add_brand(NewBrand {
            name: "Fizz".to_string(),
            client_id: client.clone(),
            description: None,
        })
        .await?;
    let campaign = service
        .add_campaign(NewCampaign::new("Launch", &client).with_brands([brand.as_str()]))
        .await?;
    let mut survey = NewSurvey::new("Feedback", &campaign).with_brand(&brand);
    survey.questions = vec![rating("q1")];
    let survey = service.add_survey(survey).await?;

    let stored = service.get_survey(&survey).await?.unwrap();
    assert_eq!(stored.campaign_name, "Launch");
    assert_eq!(stored.brand_name.as_deref(), Some("Fizz"));

    service.submit_response(&survey, one_answer(4)).await?;
    service.submit_response(&survey, one_answer(2)).await?;
    assert_eq!(service.get_survey(&survey).await?.unwrap().response_count, 2);
    assert_eq!(service.get_kpi_data().await?.total_respondents, 2);

    let summary = service.delete_client(&client).await?;
    assert_eq!(summary.deleted, 6);
    assert!(service.get_client(&client).await?.is_none());
    assert!(service.get_campaign(&campaign).await?.is_none());
    assert!(service.get_survey(&survey).await?.is_none());
    assert_eq!(service.count_responses(&survey).await?, 0);

    // Second delete is a no-op
    assert_eq!(service.delete_client(&client).await?.deleted, 0);
    Ok(())
}

/// Renames only reach campaigns written afterwards
#[tokio::test]
async fn test_staleness_window_on_sqlite() -> anyhow::Result<()> {
    let service = sqlite_service(5).await?;
    let client = service.add_client(NewClient::named("Acme")).await?;
    let old = service.add_campaign(NewCampaign::new("Old", &client)).await?;

    service.update_client(&client, ClientPatch::rename("Acme Corp")).await?;
    let new = service.add_campaign(NewCampaign::new("New", &client)).await?;

    assert_eq!(service.get_campaign(&old).await?.unwrap().client_name, "Acme");
    assert_eq!(service.get_campaign(&new).await?.unwrap().client_name, "Acme Corp");

    let listed = service.list_campaigns(Some(&client)).await?;
    let names: Vec<&str> = listed.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["New", "Old"]);
    Ok(())
}

/// Status filter and name ordering come from SQL
#[tokio::test]
async fn test_client_listing_on_sqlite() -> anyhow::Result<()> {
    let service = sqlite_service(5).await?;
    service.add_client(NewClient::named("Zeta")).await?;
    service.add_client(NewClient::named("Alpha")).await?;
    service
        .add_client(NewClient {
            status: ClientStatus::Archived,
            ..NewClient::named("Mid")
        })
        .await?;

    let all: Vec<String> = service.list_clients(None).await?.into_iter().map(|c| c.name).collect();
    assert_eq!(all, vec!["Alpha", "Mid", "Zeta"]);

    let archived = service.list_clients(Some(ClientStatus::Archived)).await?;
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].name, "Mid");
    Ok(())
}

/// Concurrent increments through a pooled file database lose nothing
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_on_sqlite() -> anyhow::Result<()> {
    const TASKS: u32 = 16;
    let dir = tempfile::tempdir()?;
    let store = SqliteStore::connect(&dir.path().join("insights.db")).await?;
    let service = InsightsService::with_options(
        Arc::new(store),
        ServiceOptions {
            counter_max_attempts: TASKS,
            backoff: fast_backoff(),
            ..ServiceOptions::default()
        },
    );
    let client = service.add_client(NewClient::named("Acme")).await?;
    let campaign = service.add_campaign(NewCampaign::new("Launch", &client)).await?;
    let survey = service.add_survey(NewSurvey::new("Feedback", &campaign)).await?;

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let service = service.clone();
            let survey = survey.clone();
            tokio::spawn(async move {
                service
                    .aggregation()
                    .increment_counter(&Collection::Surveys, &survey, "responseCount")
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await??;
    }

    assert_eq!(service.get_survey(&survey).await?.unwrap().response_count, u64::from(TASKS));
    Ok(())
}

/// Reward program delete nulls references in one transaction
#[tokio::test]
async fn test_reward_program_delete_on_sqlite() -> anyhow::Result<()> {
    let service = sqlite_service(5).await?;
    let program = service.add_reward_program(NewRewardProgram::named("Points")).await?;
    let client = service.add_client(NewClient::named("Acme")).await?;
    let campaign = service.add_campaign(NewCampaign::new("Launch", &client)).await?;
    let survey = service
        .add_survey(NewSurvey::new("Feedback", &campaign).with_reward_program(&program))
        .await?;
    let item = service
        .add_redemption_item(NewRedemptionItem {
            name: "Mug".to_string(),
            points_cost: 50,
            stock: None,
            reward_program_id: Some(program.clone()),
        })
        .await?;

    let summary = service.delete_reward_program(&program).await?;
    assert_eq!((summary.deleted, summary.updated), (1, 2));

    let survey = service.get_survey(&survey).await?.unwrap();
    assert_eq!(survey.reward_program_id, None);
    assert_eq!(survey.reward_program_name, None);
    assert_eq!(service.get_redemption_item(&item).await?.unwrap().reward_program_id, None);
    assert!(service.get_reward_program(&program).await?.is_none());
    Ok(())
}
