//! Arbor CLI entry point

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use config::{ArborConfig, CONFIG_FILE};

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Hierarchical visibility for spatial models trees", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to <root>/arbor.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scene document, overriding the config file
    #[arg(short, long)]
    scene: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the visibility server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Do not reload the scene when it changes on disk
        #[arg(long)]
        no_watch: bool,
    },
    /// Print the models tree with the visibility of each node
    Tree {
        /// Include elements below each category
        #[arg(short, long)]
        elements: bool,
    },
    /// Print the visibility status of one node, e.g. `model:0x10` or `category:0x20@0x10`
    Status { node: String },
    /// Show or hide one node
    Toggle {
        node: String,

        #[arg(value_enum)]
        state: Switch,

        /// Write the resulting view back into the scene document
        #[arg(long)]
        save: bool,
    },
    /// Show version
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("arbor={}", log_level)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.clone().unwrap_or_else(|| cli.root.join(CONFIG_FILE));
    let mut config = ArborConfig::load(&config_path)?;
    if let Some(scene) = cli.scene {
        config.scene.path = scene;
    }

    tracing::debug!("Arbor v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Repository root: {}", cli.root.display());

    match cli.command {
        Commands::Serve { port, host, no_watch } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if no_watch {
                config.scene.watch = false;
            }
            commands::serve(cli.root, config).await
        }
        Commands::Tree { elements } => commands::tree(cli.root, config, elements).await,
        Commands::Status { node } => commands::status(cli.root, config, &node).await,
        Commands::Toggle { node, state, save } => {
            commands::toggle(cli.root, config, &node, state == Switch::On, save).await
        }
        Commands::Version => {
            println!("Arbor v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
