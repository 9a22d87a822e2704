// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recall - an on-device generative AI assistant with memory.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod chat;
mod doctor;
mod models;
mod services;

use clap::{Parser, Subcommand};
use colored::Colorize;
use recall_config::RecallConfig;
use recall_core::RecallError;
use recall_memory::MemoryContent;

use crate::services::Services;

/// Recall - an on-device generative AI assistant with memory.
#[derive(Parser, Debug)]
#[command(name = "recall", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chat with the assistant.
    Chat,
    /// List, download, or delete models.
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },
    /// Store a note the assistant can recall later.
    Remember {
        /// The note text.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Diagnose the local environment.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Print the effective configuration.
    Config,
}

#[derive(Subcommand, Debug)]
enum ModelsAction {
    /// Show every catalog model and its status.
    List,
    /// Download a model's weights and runtime library.
    Download { id: String },
    /// Remove a downloaded model.
    Delete { id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match recall_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            recall_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.agent.log_level);

    let code = match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {}", "error".red(), e.user_message());
            1
        }
    };
    std::process::exit(code);
}

async fn run(command: Option<Commands>, config: RecallConfig) -> Result<i32, RecallError> {
    let Some(command) = command else {
        println!("recall: use --help for available commands");
        return Ok(0);
    };
    if let Commands::Config = command {
        print!("{}", render_config(&config)?);
        return Ok(0);
    }

    let services = Services::open(config).await?;
    let result = dispatch(command, &services).await;
    services.shutdown().await;
    result
}

async fn dispatch(command: Commands, services: &Services) -> Result<i32, RecallError> {
    match command {
        Commands::Chat => chat::run_chat(services).await?,
        Commands::Models { action } => match action {
            ModelsAction::List => models::list_models(services),
            ModelsAction::Download { id } => models::download_model(services, &id).await?,
            ModelsAction::Delete { id } => models::delete_model(services, &id).await?,
        },
        Commands::Remember { text } => {
            let record = services
                .writer()
                .remember(MemoryContent::Text {
                    content: text.join(" "),
                })
                .await?;
            let note = if record.embedding.is_some() {
                "remembered"
            } else {
                "remembered (not yet searchable)"
            };
            println!("{} #{}", note.green(), record.id);
        }
        Commands::Doctor { plain } => {
            if doctor::run_doctor(services, plain).await > 0 {
                return Ok(1);
            }
        }
        Commands::Config => print!("{}", render_config(&services.config)?),
    }
    Ok(0)
}

fn render_config(config: &RecallConfig) -> Result<String, RecallError> {
    toml::to_string_pretty(config).map_err(|e| RecallError::Config(e.to_string()))
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("recall={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
