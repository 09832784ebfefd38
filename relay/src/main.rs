//! Relay CLI - run goals through the agent coordination layer.
//!
//! # Usage
//!
//! ```bash
//! # Run a goal with the default reference workers
//! relay run --goal "Optimize PTY-BOG for fuel efficiency"
//!
//! # Use a configuration file and machine-readable output
//! relay run --goal "..." --config relay.toml --format json
//!
//! # Show or write the effective configuration
//! relay config show
//! relay config init relay.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use relay::commands::{self, output::OutputFormat, RunOptions};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay - actor-style agent coordination", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (human, json)
    #[arg(long, global = true, default_value = "human")]
    format: OutputFormatArg,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a goal through the configured agents
    Run {
        /// Goal text
        #[arg(short, long)]
        goal: String,

        /// Configuration file (default: ./relay.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Milliseconds to wait for the workflow to complete
        #[arg(long, default_value = "5000")]
        wait_ms: u64,

        /// Number of routed messages to show
        #[arg(long, default_value = "50")]
        history: usize,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Configuration file (default: ./relay.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write the default configuration
    Init {
        /// Destination path
        #[arg(default_value = relay::config::DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format);

    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            goal,
            config,
            wait_ms,
            history,
        } => {
            commands::run_goal(
                RunOptions {
                    goal,
                    config,
                    wait: Duration::from_millis(wait_ms),
                    history,
                },
                format,
            )
            .await
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show { config } => commands::show_config(config, format),
            ConfigCommands::Init { path, force } => commands::init_config(path, force),
        },
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("relay=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("relay=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
