pub mod app;
pub mod commands;
pub mod output;
pub mod prompts;

pub use app::{Cli, Commands};

use anyhow::Result;
use insights_admin::InsightsService;
use insights_admin::config::Config;

/// Route a parsed command to its handler
pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Config(cmd) => commands::config::handle_config_command(cmd, config, cli.config).await,
        command => {
            let service = config.build_service().await?;
            run_service_command(&service, command, json).await
        }
    }
}

async fn run_service_command(service: &InsightsService, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Clients(cmd) => commands::clients::handle_client_command(service, cmd, json).await,
        Commands::Brands(cmd) => commands::clients::handle_brand_command(service, cmd, json).await,
        Commands::Campaigns(cmd) => commands::campaigns::handle_campaign_command(service, cmd, json).await,
        Commands::Surveys(cmd) => commands::surveys::handle_survey_command(service, cmd, json).await,
        Commands::Questions(cmd) => commands::surveys::handle_question_command(service, cmd).await,
        Commands::Responses(cmd) => commands::surveys::handle_response_command(service, cmd, json).await,
        Commands::Rewards(cmd) => commands::rewards::handle_reward_command(service, cmd, json).await,
        Commands::Kpi => commands::reports::kpi_command(service, json).await,
        Commands::Reports(cmd) => commands::reports::handle_report_command(service, cmd, json).await,
        Commands::Config(_) => Ok(()),
    }
}
