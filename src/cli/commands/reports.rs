use crate::cli::output::{print_heading, print_json};
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::*;
use insights_admin::InsightsService;
use insights_admin::models::ReportPayload;

#[derive(Args)]
pub struct ReportCommands {
    #[command(subcommand)]
    pub command: ReportSubcommands,
}

#[derive(Subcommand)]
pub enum ReportSubcommands {
    /// Question and response totals of one survey
    Survey { survey_id: String },
    /// Survey and response totals of one campaign
    Campaign { campaign_id: String },
    /// Answer distribution for one question
    Breakdown { survey_id: String, question_id: String },
}

pub async fn kpi_command(service: &InsightsService, json: bool) -> Result<()> {
    let kpi = service.get_kpi_data().await?;
    if json {
        return print_json(&kpi);
    }
    print_heading("Dashboard");
    println!("  {:<14} {}", "Clients", kpi.total_clients.to_string().cyan());
    println!("  {:<14} {}", "Campaigns", kpi.total_campaigns.to_string().cyan());
    println!("  {:<14} {}", "Surveys", kpi.total_surveys.to_string().cyan());
    println!("  {:<14} {}", "Respondents", kpi.total_respondents.to_string().cyan());
    println!();
    Ok(())
}

pub async fn handle_report_command(service: &InsightsService, cmd: ReportCommands, json: bool) -> Result<()> {
    let report: ReportPayload = match cmd.command {
        ReportSubcommands::Survey { survey_id } => service.survey_summary_report(&survey_id).await?,
        ReportSubcommands::Campaign { campaign_id } => {
            service.campaign_performance_report(&campaign_id).await?
        }
        ReportSubcommands::Breakdown {
            survey_id,
            question_id,
        } => service.response_breakdown_report(&survey_id, &question_id).await?,
    };

    if json {
        return print_json(&report);
    }
    print_heading(report.kind());
    for line in report.render().lines() {
        println!("  {}", line);
    }
    println!();
    Ok(())
}
