//! `dagflow db` command implementation.

use crate::error::CliError;
use crate::store::SCHEMA_SQL;
use colored::Colorize;
use std::path::PathBuf;

/// Execute the `dagflow db init` command: create the five tables against
/// the given (or configured) database URL.
pub async fn run_init(database_url: &str) -> Result<(), CliError> {
    println!("{} Initializing sqlite database...", "→".green());
    println!("  URL: {}", database_url);

    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::Executor;
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
    pool.execute(SCHEMA_SQL).await?;
    pool.close().await;

    println!("{} Database tables initialized successfully!", "✓".green());
    Ok(())
}

/// Execute the `dagflow db schema` command.
pub fn run_schema(output: Option<PathBuf>) -> Result<(), CliError> {
    match output {
        Some(path) => {
            std::fs::write(&path, SCHEMA_SQL)?;
            println!("{} Schema written to: {}", "✓".green(), path.display());
        }
        None => println!("{}", SCHEMA_SQL),
    }
    Ok(())
}
