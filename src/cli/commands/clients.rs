//! Client and brand commands

use super::parse_serde_enum;
use crate::cli::output::{
    or_dash, print_created, print_deleted, print_empty, print_heading, print_json, print_table,
    print_updated,
};
use crate::cli::prompts::confirm_delete;
use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use insights_admin::InsightsService;
use insights_admin::models::{BrandPatch, ClientPatch, ClientStatus, NewBrand, NewClient};
use log::info;

#[derive(Args)]
pub struct ClientCommands {
    #[command(subcommand)]
    pub command: ClientSubcommands,
}

#[derive(Subcommand)]
pub enum ClientSubcommands {
    /// Add a client
    Add {
        name: String,
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        contact_name: Option<String>,
        #[arg(long)]
        contact_email: Option<String>,
        #[arg(long)]
        contact_phone: Option<String>,
        /// Active, Inactive, Pending or Archived
        #[arg(long, value_parser = parse_serde_enum::<ClientStatus>)]
        status: Option<ClientStatus>,
    },
    /// List clients by name
    List {
        #[arg(long, value_parser = parse_serde_enum::<ClientStatus>)]
        status: Option<ClientStatus>,
    },
    /// Show one client
    Get { id: String },
    /// Change client fields; renames reach cached names on next write
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        contact_email: Option<String>,
        #[arg(long, value_parser = parse_serde_enum::<ClientStatus>)]
        status: Option<ClientStatus>,
    },
    /// Delete a client with its brands, campaigns, surveys and responses
    Delete {
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args)]
pub struct BrandCommands {
    #[command(subcommand)]
    pub command: BrandSubcommands,
}

#[derive(Subcommand)]
pub enum BrandSubcommands {
    /// Add a brand to a client
    Add {
        client_id: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List brands, optionally of one client
    List {
        #[arg(long)]
        client: Option<String>,
    },
    /// Rename or describe a brand
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a brand that no survey uses
    Delete {
        id: String,
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn handle_client_command(service: &InsightsService, cmd: ClientCommands, json: bool) -> Result<()> {
    match cmd.command {
        ClientSubcommands::Add {
            name,
            industry,
            contact_name,
            contact_email,
            contact_phone,
            status,
        } => {
            let client = NewClient {
                industry,
                contact_name,
                contact_email,
                contact_phone,
                status: status.unwrap_or_default(),
                ..NewClient::named(name)
            };
            let id = service.add_client(client).await?;
            print_created("client", &id);
            Ok(())
        }
        ClientSubcommands::List { status } => {
            let clients = service.list_clients(status).await?;
            if json {
                return print_json(&clients);
            }
            if clients.is_empty() {
                print_empty("clients");
                return Ok(());
            }
            print_heading("Clients");
            let rows: Vec<Vec<String>> = clients
                .iter()
                .map(|c| {
                    vec![
                        c.id.clone(),
                        c.name.clone(),
                        or_dash(c.industry.as_deref()),
                        c.status.to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "Name", "Industry", "Status"], &rows);
            Ok(())
        }
        ClientSubcommands::Get { id } => match service.get_client(&id).await? {
            Some(client) => print_json(&client),
            None => bail!("Client '{}' not found", id),
        },
        ClientSubcommands::Update {
            id,
            name,
            industry,
            contact_email,
            status,
        } => {
            let patch = ClientPatch {
                name,
                industry,
                contact_email,
                status,
                ..ClientPatch::default()
            };
            service.update_client(&id, patch).await?;
            print_updated("client", &id);
            Ok(())
        }
        ClientSubcommands::Delete { id, force } => {
            if !confirm_delete(&format!("client '{}'", id), force)? {
                println!("Operation cancelled.");
                return Ok(());
            }
            info!("Deleting client {}", id);
            let summary = service.delete_client(&id).await?;
            print_deleted("client", &id, Some(&summary));
            Ok(())
        }
    }
}

pub async fn handle_brand_command(service: &InsightsService, cmd: BrandCommands, json: bool) -> Result<()> {
    match cmd.command {
        BrandSubcommands::Add {
            client_id,
            name,
            description,
        } => {
            let id = service
                .add_brand(NewBrand {
                    name,
                    client_id,
                    description,
                })
                .await?;
            print_created("brand", &id);
            Ok(())
        }
        BrandSubcommands::List { client } => {
            let brands = service.list_brands(client.as_deref()).await?;
            if json {
                return print_json(&brands);
            }
            if brands.is_empty() {
                print_empty("brands");
                return Ok(());
            }
            print_heading("Brands");
            let rows: Vec<Vec<String>> = brands
                .iter()
                .map(|b| vec![b.id.clone(), b.name.clone(), b.client_id.clone()])
                .collect();
            print_table(&["ID", "Name", "Client"], &rows);
            Ok(())
        }
        BrandSubcommands::Update { id, name, description } => {
            service.update_brand(&id, BrandPatch { name, description }).await?;
            print_updated("brand", &id);
            Ok(())
        }
        BrandSubcommands::Delete { id, force } => {
            if !confirm_delete(&format!("brand '{}'", id), force)? {
                println!("Operation cancelled.");
                return Ok(());
            }
            let summary = service.delete_brand(&id).await?;
            print_deleted("brand", &id, Some(&summary));
            Ok(())
        }
    }
}
