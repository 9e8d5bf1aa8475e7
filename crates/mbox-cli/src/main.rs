//! mbox - game server instance manager CLI

use clap::{Parser, Subcommand};
use mbox_cli::commands;
use mbox_cli::selector::{select_instance, SelectionContext};
use mbox_config::GlobalConfig;
use mbox_core::InstanceManager;
use mbox_provider::create_default_provider;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "mbox")]
#[command(author, version, about = "Minecraft server instance manager", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override configured provider (docker or podman)
    #[arg(long, global = true, value_parser = ["docker", "podman"])]
    provider: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and start a new server instance
    Create {
        /// Instance name
        name: String,
        /// Server version tag (e.g. 1.20.1)
        #[arg(long = "version", value_name = "VERSION")]
        server_version: String,
        /// Memory limit (e.g. 4G); defaults to the configured value
        #[arg(long, short)]
        memory: Option<String>,
    },

    /// List instances
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one instance
    Status {
        /// Instance name (interactive selection if not specified)
        name: Option<String>,
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an instance
    Start {
        /// Instance name (interactive selection if not specified)
        name: Option<String>,
    },

    /// Stop an instance
    Stop {
        /// Instance name (interactive selection if not specified)
        name: Option<String>,
    },

    /// Remove an instance
    Rm {
        /// Instance name (interactive selection if not specified)
        name: Option<String>,
        /// Also delete the instance's world data
        #[arg(long)]
        purge: bool,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Run a console command in a running instance
    Exec {
        /// Instance name
        name: String,
        /// Console command line
        #[arg(trailing_var_arg = true, required = true)]
        cmd: Vec<String>,
    },

    /// List online players
    Players {
        /// Instance name (interactive selection if not specified)
        name: Option<String>,
    },

    /// Show or change server.properties
    Properties {
        /// Instance name (interactive selection if not specified)
        name: Option<String>,
        /// Set a property (repeatable), e.g. --set max-players=10
        #[arg(long, value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Show or edit global configuration
    Config {
        /// Open config in editor
        #[arg(short, long)]
        edit: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Handle config command separately (doesn't need provider)
    if let Commands::Config { edit } = &cli.command {
        commands::config(*edit).await?;
        return Ok(());
    }

    let mut config = GlobalConfig::load()?;
    if let Some(provider) = cli.provider {
        config.runtime.provider = provider;
    }

    let provider = create_default_provider(&config.runtime).await?;
    let manager = InstanceManager::new(Arc::from(provider), config.instances).await?;

    match cli.command {
        Commands::Create {
            name,
            server_version,
            memory,
        } => {
            commands::create(&manager, &name, &server_version, memory.as_deref()).await?;
        }
        Commands::List { json } => {
            commands::list(&manager, json).await?;
        }
        Commands::Status { name, json } => {
            let name = pick(&manager, name, SelectionContext::Any, "Select instance:").await?;
            commands::status(&manager, &name, json).await?;
        }
        Commands::Start { name } => {
            let name =
                pick(&manager, name, SelectionContext::Startable, "Select instance to start:")
                    .await?;
            commands::start(&manager, &name).await?;
        }
        Commands::Stop { name } => {
            let name =
                pick(&manager, name, SelectionContext::Running, "Select instance to stop:").await?;
            commands::stop(&manager, &name).await?;
        }
        Commands::Rm { name, purge, yes } => {
            let name = pick(&manager, name, SelectionContext::Any, "Select instance to remove:")
                .await?;
            commands::remove(&manager, &name, purge, yes).await?;
        }
        Commands::Exec { name, cmd } => {
            commands::exec(&manager, &name, cmd).await?;
        }
        Commands::Players { name } => {
            let name = pick(&manager, name, SelectionContext::Running, "Select instance:").await?;
            commands::players(&manager, &name).await?;
        }
        Commands::Properties { name, set } => {
            let name = pick(&manager, name, SelectionContext::Any, "Select instance:").await?;
            commands::properties(&manager, &name, &set).await?;
        }
        Commands::Config { .. } => unreachable!(), // Handled above
    }

    Ok(())
}

/// Use the given name, or let the user pick one from the live list
async fn pick(
    manager: &InstanceManager,
    name: Option<String>,
    context: SelectionContext,
    prompt: &str,
) -> anyhow::Result<String> {
    match name {
        Some(name) => Ok(name),
        None => {
            let servers = manager.list_instances().await?;
            select_instance(&servers, context, prompt)
        }
    }
}
