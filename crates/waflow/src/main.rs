// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Waflow - task orchestration for WhatsApp outreach and conversation summaries.
//!
//! This is the binary entry point. `serve` runs ingress, the scheduler, and
//! the worker pools in one process; the other subcommands are operator tools
//! that work directly against the state database.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod conversations;
mod dead_letters;
mod serve;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use waflow_config::WaflowConfig;

/// Waflow - task orchestration for WhatsApp outreach and conversation summaries.
#[derive(Parser, Debug)]
#[command(name = "waflow", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this TOML file instead of the default search path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run ingress, the periodic scheduler, and the worker pools.
    Serve,
    /// Show queue depths and whether a running instance answers on its health endpoint.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Queue a one-off message to a contact, outside any outreach cycle.
    Send {
        /// Recipient phone number.
        contact: String,
        /// Message text.
        text: String,
    },
    /// Manage conversations.
    Conversations {
        #[command(subcommand)]
        action: ConversationCommands,
    },
    /// Inspect and replay dead-lettered tasks.
    DeadLetters {
        #[command(subcommand)]
        action: DeadLetterCommands,
    },
    /// Configuration tools.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConversationCommands {
    /// Close a conversation; the client's next message opens a new one.
    Close {
        /// Id of the conversation.
        conversation_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum DeadLetterCommands {
    /// List dead letters, newest first.
    List {
        /// Maximum number of entries to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Put a dead-lettered task back on its queue with a fresh attempt budget.
    Replay {
        /// Id of the dead-lettered task.
        task_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validate configuration and check that every secret `serve` needs is present.
    Check,
}

fn load_config(path: Option<&PathBuf>) -> WaflowConfig {
    let loaded = match path {
        Some(path) => waflow_config::load_and_validate_path(path),
        None => waflow_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            waflow_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { json }) => status::run_status(&config, json).await,
        Some(Commands::Send { contact, text }) => {
            conversations::run_send(&config, &contact, &text).await
        }
        Some(Commands::Conversations {
            action: ConversationCommands::Close { conversation_id },
        }) => conversations::run_close(&config, &conversation_id).await,
        Some(Commands::DeadLetters { action }) => match action {
            DeadLetterCommands::List { limit, json } => {
                dead_letters::run_list(&config, limit, json).await
            }
            DeadLetterCommands::Replay { task_id } => {
                dead_letters::run_replay(&config, &task_id).await
            }
        },
        Some(Commands::Config {
            action: ConfigCommands::Check,
        }) => check::run_check(&config),
        None => {
            println!("waflow: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
