//! Scorch CLI
//!
//! Host harness around scorch-core. Each invocation seeds an in-process
//! replica, drives one facade operation against it, and prints the JSON
//! response a host endpoint would return.
//!
//! ## Usage
//!
//! ```bash
//! # Full destruction of two users and a conversation
//! scorch destroy --users alice,bob --conversations c1
//!
//! # Include the status snapshot taken after the run
//! scorch destroy --users alice --status
//!
//! # Tombstone only the collection roots
//! scorch quick-reset --users alice
//!
//! # Show the effective configuration
//! scorch --config purge.json config
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use scorch_core::{
    CollectionRoot, ErrorResponse, MemoryGraphStore, Orchestrator, PurgeConfig,
};
use tracing::debug;

/// Scorch - destructive purge orchestration
#[derive(Parser)]
#[command(name = "scorch")]
#[command(version = "0.1.0")]
#[command(about = "Scorch - destructive purge orchestration for replicated graph stores")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON configuration file (defaults apply to missing fields)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed a local replica and run a full emergency destruction
    Destroy {
        #[command(flatten)]
        seed: SeedArgs,

        /// Also print the status snapshot taken after the run
        #[arg(long)]
        status: bool,
    },

    /// Seed a local replica and tombstone only the collection roots
    QuickReset {
        #[command(flatten)]
        seed: SeedArgs,
    },

    /// Print the effective configuration
    Config,
}

/// Data written to the local replica before the operation runs
#[derive(Args)]
struct SeedArgs {
    /// User ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    users: Vec<String>,

    /// Conversation ids; every seeded user participates
    #[arg(long, value_delimiter = ',')]
    conversations: Vec<String>,

    /// Friendship ids
    #[arg(long, value_delimiter = ',')]
    friendships: Vec<String>,

    /// Standalone message ids
    #[arg(long, value_delimiter = ',')]
    messages: Vec<String>,
}

impl SeedArgs {
    fn seed(&self, store: &MemoryGraphStore) {
        for id in &self.users {
            store.seed_user(id);
        }
        let participants: Vec<&str> = self.users.iter().map(String::as_str).collect();
        for id in &self.conversations {
            store.seed_conversation(id, &participants);
        }
        for id in &self.friendships {
            store.seed(
                &CollectionRoot::Friendships.child(id),
                serde_json::json!({ "id": id }),
            );
        }
        for id in &self.messages {
            store.seed(
                &CollectionRoot::Messages.child(id),
                serde_json::json!({ "id": id }),
            );
        }
        debug!(
            users = self.users.len(),
            conversations = self.conversations.len(),
            friendships = self.friendships.len(),
            messages = self.messages.len(),
            "Seeded local replica"
        );
    }
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<PurgeConfig> {
    match path {
        Some(path) => PurgeConfig::from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(PurgeConfig::default()),
    }
}

fn orchestrator(config: PurgeConfig, seed: &SeedArgs) -> Result<Orchestrator> {
    let store = MemoryGraphStore::new();
    seed.seed(&store);
    Ok(Orchestrator::new(Arc::new(store), config)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Destroy { seed, status } => {
            let orch = orchestrator(config, &seed)?;
            let report = match orch.emergency_destruction().await {
                Ok(report) => report,
                Err(err) => {
                    println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(&err))?);
                    anyhow::bail!(err);
                }
            };

            if status {
                let body = serde_json::json!({
                    "report": report,
                    "status": orch.get_status(),
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }

            if let Some(error) = report.error {
                anyhow::bail!("Emergency destruction failed: {}", error);
            }
        }

        Commands::QuickReset { seed } => {
            let orch = orchestrator(config, &seed)?;
            let report = orch.quick_reset();
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success {
                anyhow::bail!("Quick reset could not tombstone every root");
            }
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
