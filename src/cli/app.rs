use super::commands::campaigns::CampaignCommands;
use super::commands::clients::{BrandCommands, ClientCommands};
use super::commands::config::ConfigCommands;
use super::commands::reports::ReportCommands;
use super::commands::rewards::RewardCommands;
use super::commands::surveys::{QuestionCommands, ResponseCommands, SurveyCommands};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "insights-admin")]
#[command(about = "Administer clients, campaigns, surveys and rewards of the insights platform")]
#[command(version)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Client accounts
    Clients(ClientCommands),
    /// Brands owned by clients
    Brands(BrandCommands),
    /// Campaigns and their brands
    Campaigns(CampaignCommands),
    /// Surveys attached to campaigns
    Surveys(SurveyCommands),
    /// Questions of a survey
    Questions(QuestionCommands),
    /// Survey responses
    Responses(ResponseCommands),
    /// Reward programs, redemption items and consumers
    Rewards(RewardCommands),
    /// Dashboard totals
    Kpi,
    /// Survey and campaign reports
    Reports(ReportCommands),
    /// Show or initialize the configuration
    Config(ConfigCommands),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["insights-admin", "kpi", "--json", "--config", "/tmp/c.toml"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Kpi));
    }
}
