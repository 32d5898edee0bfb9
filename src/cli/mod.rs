//! CLI interface using clap
//!
//! Provides the command-line interface for reqindex

mod commands;

pub use commands::*;

use clap::{Parser, Subcommand};

/// reqindex - Wiki requirement-document ingestion and search indexing
#[derive(Parser, Debug)]
#[command(name = "reqindex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Process content but skip search index submission
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Path to the page configuration file
    #[arg(
        long,
        global = true,
        env = "PAGE_CONFIG_FILE",
        default_value = crate::config::DEFAULT_PAGE_CONFIG
    )]
    pub config_file: String,

    /// Reprocess pages regardless of cache state
    #[arg(short, long, global = true)]
    pub force: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a single page by id
    Page(PageArgs),

    /// Process every page in a space
    Space(SpaceArgs),

    /// Process all pages enabled in the configuration file
    All,

    /// Manage the page configuration file
    Pages {
        #[command(subcommand)]
        command: PagesCommand,
    },

    /// Inspect or clear the fingerprint cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

/// Arguments for the page command
#[derive(Parser, Debug)]
pub struct PageArgs {
    /// Page id to process
    pub id: String,
}

/// Arguments for the space command
#[derive(Parser, Debug)]
pub struct SpaceArgs {
    /// Space key to process
    pub key: String,
}

/// Page configuration operations
#[derive(Subcommand, Debug)]
pub enum PagesCommand {
    /// List configured pages and spaces
    List,

    /// Add a page to the configuration
    Add(AddPageArgs),

    /// Remove a page from the configuration
    Remove(RemovePageArgs),
}

/// Arguments for pages add
#[derive(Parser, Debug)]
pub struct AddPageArgs {
    /// Page id to add
    pub id: String,

    /// Display name for the page
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Arguments for pages remove
#[derive(Parser, Debug)]
pub struct RemovePageArgs {
    /// Page id to remove
    pub id: String,
}

/// Cache operations
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show cache statistics and entries
    Status,

    /// Drop all cache entries
    Clear,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_command_parsing() {
        let cli = Cli::parse_from(["reqindex", "page", "12345", "--force"]);
        assert!(cli.force);
        match cli.command {
            Commands::Page(args) => assert_eq!(args.id, "12345"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_dry_run_flag() {
        let cli = Cli::parse_from(["reqindex", "--dry-run", "space", "REQ"]);
        assert!(cli.dry_run);
        assert!(matches!(cli.command, Commands::Space(_)));
    }

    #[test]
    fn test_config_file_override() {
        let cli = Cli::parse_from(["reqindex", "--config-file", "alt.json", "all"]);
        assert_eq!(cli.config_file, "alt.json");
        assert!(matches!(cli.command, Commands::All));
    }

    #[test]
    fn test_pages_subcommands() {
        let cli = Cli::parse_from(["reqindex", "pages", "add", "42", "--name", "Payments FBRD"]);
        match cli.command {
            Commands::Pages {
                command: PagesCommand::Add(args),
            } => {
                assert_eq!(args.id, "42");
                assert_eq!(args.name.as_deref(), Some("Payments FBRD"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cache_subcommands() {
        let cli = Cli::parse_from(["reqindex", "cache", "status"]);
        assert!(matches!(
            cli.command,
            Commands::Cache {
                command: CacheCommand::Status
            }
        ));
    }
}
