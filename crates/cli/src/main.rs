//! Mnemo CLI — the main entry point.
//!
//! Commands:
//! - `init`        Write a default config file
//! - `chat`        Interactive or single-message chat with memory
//! - `memory`      List, show, or delete stored facts
//! - `thread`      Inspect or delete a thread's tracked context
//! - `components`  Show learned prompt components
//! - `allocate`    Preview the token split for a query
//! - `config`      Show, validate, or locate the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "mnemo",
    about = "Mnemo — adaptive context & memory for LLM conversations",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Use this config file instead of ~/.mnemo/config.toml
    #[arg(long, global = true, env = "MNEMO_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Chat with memory and adaptive prompts
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Conversation thread to continue
        #[arg(short, long, default_value = "cli")]
        thread: String,

        /// Print the full turn outcome as JSON (single-message mode)
        #[arg(long)]
        json: bool,
    },

    /// Manage stored memory facts
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Inspect or delete a conversation thread
    Thread {
        #[command(subcommand)]
        action: ThreadAction,
    },

    /// Show prompt components and their learned weights
    Components {
        /// Only show this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Preview how a token budget is split for a query
    Allocate {
        query: String,

        /// Total budget; defaults to engine.total_tokens
        #[arg(short, long)]
        total: Option<usize>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// List facts, optionally filtered
    List {
        /// Only facts carrying this tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Only facts recorded by this agent
        #[arg(short, long)]
        agent: Option<String>,

        #[arg(long)]
        json: bool,
    },
    /// Show one fact
    Show { id: String },
    /// Delete one fact
    Delete { id: String },
}

#[derive(Subcommand)]
enum ThreadAction {
    /// Show a thread's tracked context
    Show { id: String },
    /// Delete a thread's context and facts scoped to it
    Delete { id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init { force } => commands::config_cmd::init(config_path, force).await?,
        Commands::Chat {
            message,
            thread,
            json,
        } => commands::chat::run(config_path, &thread, message, json).await?,
        Commands::Memory { action } => match action {
            MemoryAction::List { tags, agent, json } => {
                commands::memory::list(config_path, tags, agent, json).await?
            }
            MemoryAction::Show { id } => commands::memory::show(config_path, &id).await?,
            MemoryAction::Delete { id } => commands::memory::delete(config_path, &id).await?,
        },
        Commands::Thread { action } => match action {
            ThreadAction::Show { id } => commands::thread::show(config_path, &id).await?,
            ThreadAction::Delete { id } => commands::thread::delete(config_path, &id).await?,
        },
        Commands::Components { category } => {
            commands::components::run(config_path, category.as_deref()).await?
        }
        Commands::Allocate { query, total } => {
            commands::allocate::run(config_path, &query, total).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
        },
    }

    Ok(())
}
