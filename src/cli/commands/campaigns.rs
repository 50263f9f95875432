use super::parse_serde_enum;
use crate::cli::output::{
    print_created, print_deleted, print_empty, print_heading, print_json, print_table, print_updated,
};
use crate::cli::prompts::confirm_delete;
use anyhow::{Result, bail};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use insights_admin::InsightsService;
use insights_admin::models::{CampaignPatch, CampaignStatus, NewCampaign};

#[derive(Args)]
pub struct CampaignCommands {
    #[command(subcommand)]
    pub command: CampaignSubcommands,
}

#[derive(Subcommand)]
pub enum CampaignSubcommands {
    /// Add a campaign for a client
    Add {
        client_id: String,
        name: String,
        /// Brand of the same client (repeatable)
        #[arg(long = "brand")]
        brands: Vec<String>,
        #[arg(long, value_parser = parse_serde_enum::<CampaignStatus>)]
        status: Option<CampaignStatus>,
        #[arg(long)]
        description: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        start: Option<NaiveDate>,
        /// YYYY-MM-DD
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// List campaigns with client and brand names
    List {
        #[arg(long)]
        client: Option<String>,
    },
    /// Show one campaign
    Get { id: String },
    /// Change campaign fields; `--refresh-client` re-caches the client name
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "brand")]
        brands: Option<Vec<String>>,
        #[arg(long, value_parser = parse_serde_enum::<CampaignStatus>)]
        status: Option<CampaignStatus>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        refresh_client: bool,
    },
    /// Delete a campaign with its surveys and responses
    Delete {
        id: String,
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn handle_campaign_command(service: &InsightsService, cmd: CampaignCommands, json: bool) -> Result<()> {
    match cmd.command {
        CampaignSubcommands::Add {
            client_id,
            name,
            brands,
            status,
            description,
            start,
            end,
        } => {
            let campaign = NewCampaign {
                status: status.unwrap_or_default(),
                description,
                start_date: start,
                end_date: end,
                ..NewCampaign::new(name, client_id).with_brands(brands)
            };
            let id = service.add_campaign(campaign).await?;
            print_created("campaign", &id);
            Ok(())
        }
        CampaignSubcommands::List { client } => {
            let campaigns = service.list_campaigns_with_brands(client.as_deref()).await?;
            if json {
                return print_json(&campaigns);
            }
            if campaigns.is_empty() {
                print_empty("campaigns");
                return Ok(());
            }
            print_heading("Campaigns");
            let rows: Vec<Vec<String>> = campaigns
                .iter()
                .map(|c| {
                    vec![
                        c.campaign.id.clone(),
                        c.campaign.name.clone(),
                        c.campaign.client_name.clone(),
                        c.brand_names.join(", "),
                    ]
                })
                .collect();
            print_table(&["ID", "Name", "Client", "Brands"], &rows);
            Ok(())
        }
        CampaignSubcommands::Get { id } => match service.get_campaign(&id).await? {
            Some(campaign) => print_json(&campaign),
            None => bail!("Campaign '{}' not found", id),
        },
        CampaignSubcommands::Update {
            id,
            name,
            brands,
            status,
            start,
            end,
            refresh_client,
        } => {
            let client_id = if refresh_client {
                match service.get_campaign(&id).await? {
                    Some(current) => Some(current.client_id),
                    None => bail!("Campaign '{}' not found", id),
                }
            } else {
                None
            };
            let patch = CampaignPatch {
                name,
                client_id,
                brand_ids: brands,
                status,
                start_date: start,
                end_date: end,
                ..CampaignPatch::default()
            };
            service.update_campaign(&id, patch).await?;
            print_updated("campaign", &id);
            Ok(())
        }
        CampaignSubcommands::Delete { id, force } => {
            if !confirm_delete(&format!("campaign '{}'", id), force)? {
                println!("Operation cancelled.");
                return Ok(());
            }
            let summary = service.delete_campaign(&id).await?;
            print_deleted("campaign", &id, Some(&summary));
            Ok(())
        }
    }
}
