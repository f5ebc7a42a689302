//! Command-line argument parsing for razorx.
//!
//! Flags override the config file and the environment.

use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

/// Voice and text questions in, SQL results out.
#[derive(Parser, Debug)]
#[command(name = "razorx")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", env = "RAZORX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short = 'H', long, value_name = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// SQLite database file to query
    #[arg(short = 'd', long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// LLM provider for both stages (openai, ollama, mock)
    #[arg(long, value_name = "PROVIDER")]
    pub llm: Option<String>,

    /// Refuse statements that modify the database
    #[arg(long)]
    pub read_only: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies flags on top of an already loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = &self.database {
            config.database.path = path.clone();
        }
        if let Some(provider) = &self.llm {
            config.generation.provider = provider.clone();
            config.refinement.provider = provider.clone();
        }
        if self.read_only {
            config.database.read_only = true;
        }
        if self.log_json {
            config.server.json_logs = true;
        }
    }
}
