//! CLI interface module
//!
//! Operator commands that talk to the configured store directly.

pub mod commands;

use std::fmt;

use crate::cli::{Commands, ConfigCommands, LinkCommands};
use crate::config::get_config;
use crate::errors::DeeplinkError;
use crate::storage::StorageFactory;
use commands::{add_link, config_generate, run_sweep, show_link};

#[derive(Debug)]
pub enum CliError {
    StorageError(String),
    /// 链接不存在
    NotFound(String),
    ParseError(String),
    CommandError(String),
}

impl CliError {
    /// Format as simple output
    pub fn format_simple(&self) -> String {
        match self {
            CliError::StorageError(msg) => format!("Storage error: {}", msg),
            CliError::NotFound(code) => format!("Link not found: {}", code),
            CliError::ParseError(msg) => format!("Parse error: {}", msg),
            CliError::CommandError(msg) => format!("Command error: {}", msg),
        }
    }

    /// Format as colored output
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        match self {
            CliError::StorageError(msg) => {
                format!("{} {}", "Storage error:".red().bold(), msg.white())
            }
            CliError::NotFound(code) => {
                format!("{} {}", "Link not found:".yellow().bold(), code.cyan())
            }
            CliError::ParseError(msg) => {
                format!("{} {}", "Parse error:".yellow().bold(), msg.white())
            }
            CliError::CommandError(msg) => {
                format!("{} {}", "Command error:".red().bold(), msg.white())
            }
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for CliError {}

impl From<DeeplinkError> for CliError {
    fn from(err: DeeplinkError) -> Self {
        match err {
            DeeplinkError::NotFound(msg) => CliError::NotFound(msg),
            DeeplinkError::Validation(msg) => CliError::ParseError(msg),
            other => CliError::StorageError(other.to_string()),
        }
    }
}

/// Run a CLI command from clap-parsed input
///
/// `Commands::Serve` is dispatched by `main` and never reaches here.
pub async fn run_cli_command(cmd: Commands) -> Result<(), CliError> {
    // Generate 不需要连接存储
    if let Commands::Config {
        action: ConfigCommands::Generate { output_path, force },
    } = cmd
    {
        return config_generate(output_path, force).await;
    }

    let config = get_config();
    let stores = StorageFactory::create(&config).await?;

    match cmd {
        Commands::Link { action } => match action {
            LinkCommands::Add(args) => add_link(stores.links.as_ref(), args).await,
            LinkCommands::Show { code } => show_link(stores.links.as_ref(), &code).await,
        },
        Commands::Sweep => run_sweep(&config, stores).await,
        Commands::Serve => Err(CliError::CommandError(
            "serve is handled by the server mode".to_string(),
        )),
        Commands::Config { .. } => unreachable!("handled above"),
    }
}
