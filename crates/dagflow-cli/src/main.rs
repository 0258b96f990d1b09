//! dagflow CLI - submit goals, resume clarifications, run/stop DAGs, stream
//! events, and inspect the store (§6 External Interfaces).

mod cli;
mod commands;
mod config;
mod context;
mod error;
mod llm;
mod output;
mod store;
mod utils;

use clap::Parser;
use cli::{Cli, Commands, DbCommands, ShowCommands};
use config::CliConfig;
use context::CliContext;
pub use error::CliError;
use output::{format_result, OutputFormat};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    } else {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_command(cli))
}

async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::load(cli.config.clone())?;
    let format = cli.output_format.unwrap_or_default();

    match cli.command {
        Commands::Plan { goal, agent, provider, model, temperature, max_tokens, cron, timezone } => {
            let ctx = CliContext::new(config).await?;
            let value =
                commands::plan::run(&ctx, goal, agent, provider, model, temperature, max_tokens, cron, timezone)
                    .await?;
            print_value(&value, format)?;
        }

        Commands::Resume { dag_id, answer } => {
            let ctx = CliContext::new(config).await?;
            let value = commands::resume::run(&ctx, dag_id, answer).await?;
            print_value(&value, format)?;
        }

        Commands::Run { dag_id, execution_id, skip_events } => {
            let ctx = CliContext::new(config).await?;
            let value = commands::run::run(&ctx, dag_id, execution_id, skip_events).await?;
            print_value(&value, format)?;
        }

        Commands::Stop { dag, execution } => {
            let ctx = CliContext::new(config).await?;
            let value = commands::stop::run(&ctx, dag, execution).await?;
            print_value(&value, format)?;
        }

        Commands::Events { execution_id } => {
            let ctx = CliContext::new(config).await?;
            commands::events::run(&ctx, execution_id).await?;
        }

        Commands::Show { what } => {
            let ctx = CliContext::new(config).await?;
            let value = match what {
                ShowCommands::Dags => commands::show::run_dags(&ctx).await?,
                ShowCommands::Dag { dag_id } => commands::show::run_dag(&ctx, dag_id).await?,
                ShowCommands::Executions { dag_id } => commands::show::run_executions(&ctx, dag_id).await?,
                ShowCommands::Execution { execution_id } => {
                    commands::show::run_execution(&ctx, execution_id).await?
                }
            };
            print_value(&value, format)?;
        }

        Commands::Db { action } => match action {
            DbCommands::Init { database_url } => {
                let url = database_url.unwrap_or(config.database_url);
                commands::db::run_init(&url).await?;
            }
            DbCommands::Schema { output } => {
                commands::db::run_schema(output)?;
            }
        },
    }

    Ok(())
}

fn print_value(value: &serde_json::Value, format: OutputFormat) -> Result<(), CliError> {
    println!("{}", format_result(value, format)?);
    Ok(())
}
