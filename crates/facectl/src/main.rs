#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use anyhow::{Context, Result};
use dotenvy::dotenv;

use facecore::core::{config, init_logger, logging};
use facecore::create_pool;

mod cli;
mod commands;

use cli::Cli;

/// Entry point of the operator CLI
///
/// Loads `.env`, initializes logging, opens (and migrates) the database and
/// dispatches the subcommand.
///
/// # Errors
/// Returns an error if initialization fails or the subcommand is rejected by the store.
fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Load environment variables from .env if present
    let _ = dotenv();

    init_logger(&config::LOG_FILE_PATH, logging::level_for_verbosity(cli.verbose))?;

    let database_path = cli.database.clone().unwrap_or_else(|| config::DATABASE_PATH.clone());
    log::debug!("Using database {}", database_path);

    let pool = create_pool(&database_path).with_context(|| format!("open database {}", database_path))?;

    let mut stdout = std::io::stdout().lock();
    commands::execute(&pool, &cli.command, &mut stdout)
}
