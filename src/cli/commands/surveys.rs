//! Survey, question and response commands

use super::parse_serde_enum;
use crate::cli::output::{
    or_dash, print_created, print_deleted, print_empty, print_heading, print_json, print_table,
    print_updated,
};
use crate::cli::prompts::confirm_delete;
use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use insights_admin::InsightsService;
use insights_admin::models::{
    NewResponse, NewSurvey, Question, QuestionType, SurveyPatch, SurveyStatus,
};
use insights_admin::service::SurveyFilter;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct SurveyCommands {
    #[command(subcommand)]
    pub command: SurveySubcommands,
}

#[derive(Subcommand)]
pub enum SurveySubcommands {
    /// Add a survey to a campaign
    Add {
        campaign_id: String,
        name: String,
        /// One of the campaign's brands
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        reward_program: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_serde_enum::<SurveyStatus>)]
        status: Option<SurveyStatus>,
        /// JSON file holding an array of questions
        #[arg(long)]
        questions: Option<PathBuf>,
    },
    /// List surveys with cached names and response counts
    List {
        #[arg(long, conflicts_with = "brand")]
        campaign: Option<String>,
        #[arg(long)]
        brand: Option<String>,
        /// Show only the N newest surveys
        #[arg(long, value_name = "N")]
        recent: Option<u32>,
    },
    /// Show one survey
    Get { id: String },
    /// Change survey fields or its reward program
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_parser = parse_serde_enum::<SurveyStatus>)]
        status: Option<SurveyStatus>,
        #[arg(long, conflicts_with = "detach_reward_program")]
        reward_program: Option<String>,
        #[arg(long)]
        detach_reward_program: bool,
    },
    /// Delete a survey and its responses
    Delete {
        id: String,
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args)]
pub struct QuestionCommands {
    #[command(subcommand)]
    pub command: QuestionSubcommands,
}

#[derive(Subcommand)]
pub enum QuestionSubcommands {
    /// Append a question, or replace the one with the same id
    Set {
        survey_id: String,
        question_id: String,
        text: String,
        /// multiple-choice, rating, open-ended or ranking
        #[arg(long = "type", value_parser = parse_serde_enum::<QuestionType>)]
        kind: QuestionType,
        /// Answer option (repeatable)
        #[arg(long = "option")]
        options: Vec<String>,
        #[arg(long)]
        required: bool,
    },
    /// Remove a question
    Remove { survey_id: String, question_id: String },
}

#[derive(Args)]
pub struct ResponseCommands {
    #[command(subcommand)]
    pub command: ResponseSubcommands,
}

#[derive(Subcommand)]
pub enum ResponseSubcommands {
    /// Submit a response; answers are QUESTION=VALUE, VALUE parsed as JSON when possible
    Submit {
        survey_id: String,
        #[arg(long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, Value)>,
        #[arg(long)]
        respondent: Option<String>,
    },
    /// List responses, newest first
    List { survey_id: String },
    /// Count responses in the sub-collection
    Count { survey_id: String },
}

/// `q1=5` becomes `("q1", 5)`; `q2=Red` becomes `("q2", "Red")`
pub fn parse_answer(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected QUESTION=VALUE, got '{}'", raw))?;
    if key.trim().is_empty() {
        return Err(format!("missing question id in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

fn load_questions(path: &Path) -> Result<Vec<Question>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read questions file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse questions file: {:?}", path))
}

pub async fn handle_survey_command(service: &InsightsService, cmd: SurveyCommands, json: bool) -> Result<()> {
    match cmd.command {
        SurveySubcommands::Add {
            campaign_id,
            name,
            brand,
            reward_program,
            description,
            status,
            questions,
        } => {
            let questions = match questions {
                Some(path) => load_questions(&path)?,
                None => Vec::new(),
            };
            let survey = NewSurvey {
                brand_id: brand,
                reward_program_id: reward_program,
                description,
                status: status.unwrap_or_default(),
                questions,
                ..NewSurvey::new(name, campaign_id)
            };
            let id = service.add_survey(survey).await?;
            print_created("survey", &id);
            Ok(())
        }
        SurveySubcommands::List { campaign, brand, recent } => {
            let filter = match (campaign, brand) {
                (Some(id), _) => Some(SurveyFilter::Campaign(id)),
                (None, Some(id)) => Some(SurveyFilter::Brand(id)),
                (None, None) => None,
            };
            let summaries = match recent {
                Some(limit) => service.list_recent_surveys(filter.as_ref(), limit).await?,
                None => service.list_survey_summaries(filter.as_ref()).await?,
            };
            if json {
                return print_json(&summaries);
            }
            if summaries.is_empty() {
                print_empty("surveys");
                return Ok(());
            }
            print_heading(if recent.is_some() { "Recent surveys" } else { "Surveys" });
            let rows: Vec<Vec<String>> = summaries
                .iter()
                .map(|s| {
                    vec![
                        s.id.clone(),
                        s.name.clone(),
                        s.campaign_name.clone(),
                        or_dash(s.brand_name.as_deref()),
                        s.question_count.to_string(),
                        s.response_count.to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "Name", "Campaign", "Brand", "Questions", "Responses"], &rows);
            Ok(())
        }
        SurveySubcommands::Get { id } => match service.get_survey(&id).await? {
            Some(survey) => print_json(&survey),
            None => bail!("Survey '{}' not found", id),
        },
        SurveySubcommands::Update {
            id,
            name,
            status,
            reward_program,
            detach_reward_program,
        } => {
            let reward_program_id = if detach_reward_program {
                Some(None)
            } else {
                reward_program.map(Some)
            };
            let patch = SurveyPatch {
                name,
                status,
                reward_program_id,
                ..SurveyPatch::default()
            };
            service.update_survey(&id, patch).await?;
            print_updated("survey", &id);
            Ok(())
        }
        SurveySubcommands::Delete { id, force } => {
            if !confirm_delete(&format!("survey '{}'", id), force)? {
                println!("Operation cancelled.");
                return Ok(());
            }
            let summary = service.delete_survey(&id).await?;
            print_deleted("survey", &id, Some(&summary));
            Ok(())
        }
    }
}

pub async fn handle_question_command(service: &InsightsService, cmd: QuestionCommands) -> Result<()> {
    match cmd.command {
        QuestionSubcommands::Set {
            survey_id,
            question_id,
            text,
            kind,
            options,
            required,
        } => {
            let Some(survey) = service.get_survey(&survey_id).await? else {
                bail!("Survey '{}' not found", survey_id);
            };
            let question = Question {
                required,
                ..Question::new(question_id.clone(), text, kind).with_options(options)
            };
            if survey.questions.iter().any(|q| q.id == question_id) {
                service.update_question_in_survey(&survey_id, question).await?;
            } else {
                service.add_question_to_survey(&survey_id, question).await?;
            }
            print_updated("survey", &survey_id);
            Ok(())
        }
        QuestionSubcommands::Remove { survey_id, question_id } => {
            service.remove_question_from_survey(&survey_id, &question_id).await?;
            print_updated("survey", &survey_id);
            Ok(())
        }
    }
}

pub async fn handle_response_command(service: &InsightsService, cmd: ResponseCommands, json: bool) -> Result<()> {
    match cmd.command {
        ResponseSubcommands::Submit {
            survey_id,
            answers,
            respondent,
        } => {
            let answers: Map<String, Value> = answers.into_iter().collect();
            let id = service
                .submit_response(
                    &survey_id,
                    NewResponse {
                        answers,
                        respondent_id: respondent,
                    },
                )
                .await?;
            print_created("response", &id);
            Ok(())
        }
        ResponseSubcommands::List { survey_id } => {
            let responses = service.list_responses(&survey_id).await?;
            if json {
                return print_json(&responses);
            }
            if responses.is_empty() {
                print_empty("responses");
                return Ok(());
            }
            print_heading(&format!("Responses to {}", survey_id));
            let rows: Vec<Vec<String>> = responses
                .iter()
                .map(|r| {
                    vec![
                        r.id.clone(),
                        r.submitted_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                        or_dash(r.respondent_id.as_deref()),
                        r.answers.len().to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "Submitted", "Respondent", "Answers"], &rows);
            Ok(())
        }
        ResponseSubcommands::Count { survey_id } => {
            let count = service.count_responses(&survey_id).await?;
            if json {
                return print_json(&count);
            }
            println!("{}", count);
            Ok(())
        }
    }
}
