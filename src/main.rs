use anyhow::Result;
use clap::Parser;
use colored::*;
use insights_admin::config::Config;
use log::{error, info};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!("{:#}", err);
        eprintln!("{} {:#}", "✗".bright_red().bold(), err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logger to file (truncate on each run)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("insights-admin.log")?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    info!("Starting insights-admin");

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    cli::dispatch(cli, config).await
}
