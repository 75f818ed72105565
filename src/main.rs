use anyhow::Result;
use btcfx::core::log::init_logging;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Run the HTTP API (default)
    Serve {
        /// Address to listen on, overriding the configuration
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },
    /// Convert an amount between two currencies
    Convert {
        from: String,
        to: String,
        #[arg(allow_negative_numbers = true)]
        quantity: f64,
    },
    /// Show the cross rate between two currencies
    Rate { from: String, to: String },
    /// List currencies currently tradable against BTC
    Currencies,
}

impl From<Commands> for btcfx::AppCommand {
    fn from(cmd: Commands) -> btcfx::AppCommand {
        match cmd {
            Commands::Serve { listen } => btcfx::AppCommand::Serve { listen },
            Commands::Convert { from, to, quantity } => {
                btcfx::AppCommand::Convert { from, to, quantity }
            }
            Commands::Rate { from, to } => btcfx::AppCommand::Rate { from, to },
            Commands::Currencies => btcfx::AppCommand::Currencies,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let command = cli.command.unwrap_or(Commands::Serve { listen: None });
    let result = match command {
        Commands::Setup => setup(),
        cmd => btcfx::run_command(cmd.into(), cli.config_path.as_deref()).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = btcfx::core::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = serde_yaml::to_string(&btcfx::core::config::AppConfig::default())
        .context("Failed to serialize default configuration")?;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
