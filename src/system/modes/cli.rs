//! CLI mode
//!
//! Delegates to the command implementations in `interfaces::cli`.

use crate::cli::Commands;
use crate::interfaces::cli::{CliError, run_cli_command};
use crate::system::lifetime;

/// Run CLI mode
pub async fn run_cli(command: Commands) -> Result<(), CliError> {
    lifetime::startup::install_crypto_provider()
        .map_err(|e| CliError::CommandError(e.to_string()))?;
    run_cli_command(command).await
}
