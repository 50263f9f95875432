use crate::cli::output::{
    print_created, print_deleted, print_empty, print_heading, print_json, print_table,
};
use crate::cli::prompts::confirm_delete;
use anyhow::Result;
use clap::{Args, Subcommand};
use insights_admin::InsightsService;
use insights_admin::models::{NewConsumer, NewRedemptionItem, NewRewardProgram};

#[derive(Args)]
pub struct RewardCommands {
    #[command(subcommand)]
    pub command: RewardSubcommands,
}

#[derive(Subcommand)]
pub enum RewardSubcommands {
    /// Add a reward program
    Add {
        name: String,
        #[arg(long, default_value_t = 0)]
        points_per_response: u32,
        #[arg(long)]
        description: Option<String>,
    },
    /// List reward programs
    List,
    /// Delete a program; surveys and items keep existing without it
    Delete {
        id: String,
        #[arg(short, long)]
        force: bool,
    },
    /// Add a redemption item
    AddItem {
        name: String,
        #[arg(long)]
        points_cost: u32,
        #[arg(long)]
        stock: Option<u32>,
        #[arg(long)]
        program: Option<String>,
    },
    /// List redemption items, optionally of one program
    Items {
        #[arg(long)]
        program: Option<String>,
    },
    /// Add a consumer profile
    AddConsumer {
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// List consumer profiles
    Consumers,
}

pub async fn handle_reward_command(service: &InsightsService, cmd: RewardCommands, json: bool) -> Result<()> {
    match cmd.command {
        RewardSubcommands::Add {
            name,
            points_per_response,
            description,
        } => {
            let program = NewRewardProgram {
                points_per_response,
                description,
                ..NewRewardProgram::named(name)
            };
            let id = service.add_reward_program(program).await?;
            print_created("reward program", &id);
            Ok(())
        }
        RewardSubcommands::List => {
            let programs = service.list_reward_programs().await?;
            if json {
                return print_json(&programs);
            }
            if programs.is_empty() {
                print_empty("reward programs");
                return Ok(());
            }
            print_heading("Reward programs");
            let rows: Vec<Vec<String>> = programs
                .iter()
                .map(|p| {
                    vec![
                        p.id.clone(),
                        p.name.clone(),
                        p.points_per_response.to_string(),
                        if p.active { "yes" } else { "no" }.to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "Name", "Points/response", "Active"], &rows);
            Ok(())
        }
        RewardSubcommands::Delete { id, force } => {
            if !confirm_delete(&format!("reward program '{}'", id), force)? {
                println!("Operation cancelled.");
                return Ok(());
            }
            let summary = service.delete_reward_program(&id).await?;
            print_deleted("reward program", &id, Some(&summary));
            Ok(())
        }
        RewardSubcommands::AddItem {
            name,
            points_cost,
            stock,
            program,
        } => {
            let item = NewRedemptionItem {
                name,
                points_cost,
                stock,
                reward_program_id: program,
            };
            let id = service.add_redemption_item(item).await?;
            print_created("redemption item", &id);
            Ok(())
        }
        RewardSubcommands::Items { program } => {
            let items = service.list_redemption_items(program.as_deref()).await?;
            if json {
                return print_json(&items);
            }
            if items.is_empty() {
                print_empty("redemption items");
                return Ok(());
            }
            print_heading("Redemption items");
            let rows: Vec<Vec<String>> = items
                .iter()
                .map(|i| {
                    vec![
                        i.id.clone(),
                        i.name.clone(),
                        i.points_cost.to_string(),
                        i.reward_program_id.clone().unwrap_or_else(|| "-".to_string()),
                    ]
                })
                .collect();
            print_table(&["ID", "Name", "Cost", "Program"], &rows);
            Ok(())
        }
        RewardSubcommands::AddConsumer { name, email } => {
            let consumer = NewConsumer {
                name,
                email,
                ..NewConsumer::default()
            };
            let id = service.add_consumer(consumer).await?;
            print_created("consumer", &id);
            Ok(())
        }
        RewardSubcommands::Consumers => {
            let consumers = service.list_consumers().await?;
            if json {
                return print_json(&consumers);
            }
            if consumers.is_empty() {
                print_empty("consumers");
                return Ok(());
            }
            print_heading("Consumers");
            let rows: Vec<Vec<String>> = consumers
                .iter()
                .map(|c| {
                    vec![
                        c.id.clone(),
                        c.name.clone(),
                        c.email.clone().unwrap_or_else(|| "-".to_string()),
                        c.points_balance.to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "Name", "Email", "Points"], &rows);
            Ok(())
        }
    }
}
