use anyhow::{Result, bail};
use clap::{Args, Subcommand, ValueEnum};
use colored::*;
use insights_admin::config::{Backend, Config};
use std::path::PathBuf;

#[derive(Args)]
pub struct ConfigCommands {
    #[command(subcommand)]
    pub command: ConfigSubcommands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum BackendArg {
    Sqlite,
    Memory,
    Rest,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Sqlite => Backend::Sqlite,
            BackendArg::Memory => Backend::Memory,
            BackendArg::Rest => Backend::Rest,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigSubcommands {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Write a config file
    Init {
        #[arg(long, value_enum, default_value = "sqlite")]
        backend: BackendArg,
        #[arg(long)]
        sqlite_path: Option<PathBuf>,
        #[arg(long)]
        api_url: Option<String>,
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn handle_config_command(cmd: ConfigCommands, config: Config, path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => Config::get_config_path()?,
    };

    match cmd.command {
        ConfigSubcommands::Show => {
            println!("{}", format!("# {}", path.display()).dimmed());
            print!("{}", config.to_toml()?);
            Ok(())
        }
        ConfigSubcommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigSubcommands::Init {
            backend,
            sqlite_path,
            api_url,
            force,
        } => {
            if path.exists() && !force {
                bail!("Config file {:?} already exists, use --force to overwrite", path);
            }
            let backend = Backend::from(backend);
            if backend == Backend::Rest && api_url.is_none() {
                bail!("--api-url is required for the rest backend");
            }

            let mut fresh = Config::default();
            fresh.store.backend = backend;
            fresh.store.sqlite_path = sqlite_path;
            fresh.store.api_base_url = api_url;
            fresh.save_to(&path)?;

            println!("{} Wrote {}", "✓".bright_green().bold(), path.display().to_string().bright_green());
            Ok(())
        }
    }
}
