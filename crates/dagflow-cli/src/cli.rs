//! CLI command definitions using clap.

use crate::output::OutputFormat;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dagflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Global output format (text, json, table)
    #[arg(long = "output-format", global = true)]
    pub output_format: Option<OutputFormat>,

    /// Configuration file path
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a goal and plan it into a DAG (§4.1).
    Plan {
        /// The goal text to decompose.
        goal: String,

        /// Target agent name (its active prompt-template version is used).
        #[arg(short, long)]
        agent: String,

        /// LLM provider override.
        #[arg(long)]
        provider: Option<String>,

        /// LLM model override.
        #[arg(long)]
        model: Option<String>,

        /// Sampling temperature.
        #[arg(long, default_value_t = 0.2)]
        temperature: f32,

        /// Max tokens for the planning call.
        #[arg(long, default_value_t = 4096)]
        max_tokens: u32,

        /// Optional cron schedule to attach to the resulting DAG.
        #[arg(long)]
        cron: Option<String>,

        /// IANA timezone for the cron schedule.
        #[arg(long, default_value = "UTC")]
        timezone: String,
    },

    /// Resume a `pending` (clarification-needed) DAG with a user answer.
    Resume {
        /// DAG id.
        dag_id: String,
        /// The user's answer to the planner's clarifying question.
        answer: String,
    },

    /// Run (or resume) a planned DAG to completion.
    Run {
        /// DAG id to execute.
        dag_id: String,
        /// Resume an existing suspended/partial execution instead of starting fresh.
        #[arg(long)]
        execution_id: Option<String>,
        /// Skip emitting bus events for this run.
        #[arg(long)]
        skip_events: bool,
    },

    /// Request a cooperative stop for a DAG or a specific execution.
    Stop {
        /// DAG id (mutually exclusive with --execution).
        #[arg(long)]
        dag: Option<String>,
        /// Execution id (mutually exclusive with --dag).
        #[arg(long)]
        execution: Option<String>,
    },

    /// Stream events for a running execution.
    Events {
        /// Execution id to subscribe to.
        execution_id: String,
    },

    /// Inspect stored DAGs, executions, and sub-steps.
    Show {
        #[command(subcommand)]
        what: ShowCommands,
    },

    /// Database management commands.
    Db {
        #[command(subcommand)]
        action: DbCommands,
    },
}

#[derive(Subcommand)]
pub enum ShowCommands {
    /// List stored DAGs.
    Dags,
    /// Show a single DAG.
    Dag { dag_id: String },
    /// List executions, optionally filtered by DAG id.
    Executions {
        #[arg(long)]
        dag_id: Option<String>,
    },
    /// Show an execution and its sub-steps.
    Execution { execution_id: String },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Create the five persistence tables if they don't already exist.
    Init {
        /// Database connection URL; defaults to the configured one.
        #[arg(short = 'u', long)]
        database_url: Option<String>,
    },

    /// Print the schema SQL instead of executing it.
    Schema {
        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DatabaseType {
    Sqlite,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn plan_command_parses_with_required_agent_flag() {
        let parsed =
            Cli::try_parse_from(["dagflow", "plan", "summarize the inbox", "--agent", "assistant"]);
        assert!(parsed.is_ok(), "plan should parse with --agent");
    }

    #[test]
    fn stop_accepts_either_dag_or_execution() {
        let parsed = Cli::try_parse_from(["dagflow", "stop", "--execution", "exec_1"]);
        assert!(parsed.is_ok());
    }

    #[test]
    fn db_init_parses_without_explicit_url() {
        let parsed = Cli::try_parse_from(["dagflow", "db", "init"]);
        assert!(parsed.is_ok());
    }
}
