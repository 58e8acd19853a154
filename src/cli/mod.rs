pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use envboot::config::AppConfig;

#[derive(Parser)]
#[command(name = "envboot")]
#[command(version)]
#[command(about = "Make sure the required CLI tools are installed")]
#[command(long_about = "Detects the two tools your application needs, runs the bundled installers for whichever are missing, and verifies the result.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the config file (default: <config dir>/envboot/config.yaml)
    #[arg(short, long, global = true, env = "ENVBOOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check for the tools and install whichever are missing
    Start {
        /// Print every event as a JSON line instead of styled text
        #[arg(long)]
        json: bool,
    },

    /// Report whether each tool is installed, without installing anything
    Probe,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Print the default config file location
    Path,
}

impl Cli {
    pub async fn execute(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Start { json } => {
                let config = AppConfig::load(self.config.as_deref())?;
                commands::start::execute(&config, json).await
            }
            Commands::Probe => {
                let config = AppConfig::load(self.config.as_deref())?;
                commands::probe::execute(&config).await
            }
            Commands::Config { command } => match command {
                ConfigCommands::Show => {
                    let config = AppConfig::load(self.config.as_deref())?;
                    commands::config::show(&config)
                }
                ConfigCommands::Path => commands::config::path(),
            },
        }
    }
}
