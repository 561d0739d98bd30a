use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod backend;
mod commands;
mod config;

#[derive(Debug, Parser)]
#[command(name = "aispec", version, about = "Load AISpec assistants and run their workflows")]
struct Cli {
    /// Path to the CLI configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the skills, workflows, and steps of an assistant document.
    Inspect {
        document: PathBuf,
        /// Print a JSON summary instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Print the system prompt a workflow runs with.
    Prompt { document: PathBuf, workflow: String },
    /// Run a workflow to completion and print the final context.
    Run {
        document: PathBuf,
        workflow: String,
        /// Initial context entry as KEY=VALUE (repeatable).
        #[arg(long = "input", short = 'i', value_name = "KEY=VALUE")]
        inputs: Vec<String>,
        /// Initial context as a JSON object.
        #[arg(long)]
        input_json: Option<String>,
        /// Answer model calls from a JSON file mapping prompts to results instead of calling a backend.
        #[arg(long)]
        responses: Option<PathBuf>,
        /// Also print the invocation history.
        #[arg(long)]
        history: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { document, json } => commands::inspect(&document, json),
        Command::Prompt { document, workflow } => commands::prompt(&document, &workflow),
        Command::Run {
            document,
            workflow,
            inputs,
            input_json,
            responses,
            history,
        } => {
            let config_path = cli.config.unwrap_or_else(config::default_config_path);
            let cli_config = config::load_config_from_path(&config_path)?;
            commands::run(
                &cli_config,
                commands::RunOptions {
                    document: &document,
                    workflow_id: &workflow,
                    inputs: &inputs,
                    input_json: input_json.as_deref(),
                    responses: responses.as_deref(),
                    show_history: history,
                },
            )
            .await
        }
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
