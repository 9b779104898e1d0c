//! Switchyard CLI — the main entry point.
//!
//! Commands:
//! - `init`     — Write a default config file
//! - `run`      — Post a message and execute the run
//! - `route`    — Show how the router scores every model for a message
//! - `plan`     — Show the step graph a mode would execute
//! - `models`   — List the model catalog
//! - `memory`   — Manage a session's memory items
//! - `inspect`  — Show a stored run with its steps and artifacts

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use switchyard_config::AppConfig;
use switchyard_core::{Constraints, MemoryItemType, RouterPreferences, RunMode};
use tracing_subscriber::EnvFilter;

mod app;
mod commands;

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "Switchyard — multi-model LLM runs with full step traces",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.switchyard/config.toml)
    #[arg(short, long, global = true, env = "SWITCHYARD_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Post a message and execute the resulting run
    Run {
        message: String,

        /// auto, compare or chain
        #[arg(short, long, default_value = "auto")]
        mode: RunMode,

        /// Continue an existing session instead of starting a new one
        #[arg(short, long)]
        session: Option<String>,

        #[command(flatten)]
        routing: RoutingArgs,
    },

    /// Score every catalog model for a message
    Route {
        message: String,

        #[command(flatten)]
        routing: RoutingArgs,
    },

    /// Print the step graph a run would execute
    Plan {
        message: String,

        #[arg(short, long, default_value = "auto")]
        mode: RunMode,

        #[command(flatten)]
        routing: RoutingArgs,
    },

    /// List the model catalog
    Models,

    /// Manage session memory
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },

    /// Show a stored run with its steps and artifacts
    Inspect { run_id: String },
}

#[derive(Subcommand)]
enum MemoryCommands {
    /// Add a memory item to a session
    Add {
        session: String,
        key: String,
        /// JSON object, e.g. '{"engine": "postgres"}'
        value: String,
        /// fact, preference, decision or artifact_ref
        #[arg(short = 't', long = "type", default_value = "fact")]
        item_type: MemoryItemType,
        #[arg(long)]
        confidence: Option<f64>,
    },

    /// List a session's memory items
    List { session: String },

    /// Stop a memory item from reaching the context pack
    Disable { id: String },

    /// Delete a memory item
    Delete { id: String },
}

/// Knobs shared by every command that routes.
#[derive(Args, Clone, Debug)]
struct RoutingArgs {
    /// Model id to use (repeat for compare/chain, at most 4)
    #[arg(long = "model")]
    models: Vec<String>,

    /// 0 = cheapest/fastest, 100 = best quality
    #[arg(long, default_value_t = 50.0)]
    quality_bias: f64,

    /// Hard cost cap in USD
    #[arg(long)]
    max_cost: Option<f64>,

    /// Hard latency cap in milliseconds
    #[arg(long)]
    max_latency: Option<u64>,
}

impl RoutingArgs {
    fn preferences(&self) -> RouterPreferences {
        RouterPreferences {
            quality_bias: self.quality_bias,
            cost_cap_enabled: self.max_cost.is_some(),
            max_cost_usd: self.max_cost,
            latency_cap_enabled: self.max_latency.is_some(),
            max_latency_ms: self.max_latency,
        }
    }

    /// Explicit caps from the command line, folded with the preference caps.
    fn constraints(&self) -> Constraints {
        Constraints::default().merged_with(&self.preferences())
    }

    fn selected_models(&self) -> Option<Vec<String>> {
        (!self.models.is_empty()).then(|| self.models.clone())
    }
}

fn init_tracing(config: &AppConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.log.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.log.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path.unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = config_path(cli.config);

    if let Commands::Init { force } = cli.command {
        return commands::init::run(&path, force);
    }

    let config = AppConfig::load_with_env(&path)?;
    init_tracing(&config, cli.verbose);
    let app = app::App::from_config(config).await?;
    let json = cli.json;

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Run {
            message,
            mode,
            session,
            routing,
        } => commands::run::run(&app, &message, mode, session, &routing, json).await?,
        Commands::Route { message, routing } => {
            commands::route::run(&app, &message, &routing, json)?
        }
        Commands::Plan {
            message,
            mode,
            routing,
        } => commands::plan::run(&app, &message, mode, &routing, json)?,
        Commands::Models => commands::models::run(&app, json)?,
        Commands::Memory { command } => match command {
            MemoryCommands::Add {
                session,
                key,
                value,
                item_type,
                confidence,
            } => {
                commands::memory::add(&app, &session, key, &value, item_type, confidence, json)
                    .await?
            }
            MemoryCommands::List { session } => commands::memory::list(&app, &session, json).await?,
            MemoryCommands::Disable { id } => commands::memory::disable(&app, &id, json).await?,
            MemoryCommands::Delete { id } => commands::memory::delete(&app, &id).await?,
        },
        Commands::Inspect { run_id } => commands::inspect::run(&app, &run_id, json).await?,
    }

    Ok(())
}
