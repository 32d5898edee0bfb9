//! reqindex - Wiki requirement-document indexing tool
//!
//! Fetches requirement documents from a wiki, parses their metadata and
//! section structure, and publishes searchable records to a search index.

use anyhow::Result;
use reqindex::cli::{
    add_configured, cache_clear, cache_status, list_configured, process_all_configured,
    process_one_page, process_one_space, remove_configured, CacheCommand, Cli, Commands,
    PagesCommand,
};
use reqindex::config::{AppConfig, ProcessingSettings};
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config_file = Path::new(&cli.config_file);

    // Execute command
    match cli.command {
        Commands::Page(args) => {
            let config = AppConfig::from_env()?;
            process_one_page(&config, &args.id, cli.dry_run, cli.force).await?;
        }

        Commands::Space(args) => {
            let config = AppConfig::from_env()?;
            process_one_space(&config, &args.key, cli.dry_run, cli.force).await?;
        }

        Commands::All => {
            let config = AppConfig::from_env()?;
            process_all_configured(&config, config_file, cli.dry_run, cli.force).await?;
        }

        Commands::Pages { command } => match command {
            PagesCommand::List => list_configured(config_file)?,
            PagesCommand::Add(args) => {
                add_configured(config_file, &args.id, args.name.as_deref())?
            }
            PagesCommand::Remove(args) => remove_configured(config_file, &args.id)?,
        },

        Commands::Cache { command } => {
            let processing = ProcessingSettings::from_env();
            match command {
                CacheCommand::Status => cache_status(&processing)?,
                CacheCommand::Clear => cache_clear(&processing)?,
            }
        }
    }

    Ok(())
}
