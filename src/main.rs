//! razorx - natural-language questions to SQL results over HTTP.

use razorx::cli::Cli;
use razorx::config::Config;
use razorx::error::Result;
use razorx::logging::init_logging;
use razorx::pipeline::Pipeline;
use razorx::server::{AppState, HttpServer};
use razorx::transcribe::WhisperCommandTranscriber;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            init_logging(cli.log_json);
            error!("{}: {}", e.category(), e);
            std::process::exit(1);
        }
    };

    init_logging(config.server.json_logs);

    if let Err(e) = run(config).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

/// Defaults, then file, then environment, then flags.
fn load_config(cli: &Cli) -> Result<Config> {
    let config_path = cli.config_path();
    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env_overrides();
    cli.apply_to(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run(config: Config) -> Result<()> {
    info!(
        database = %config.database.path.display(),
        upload_dir = %config.server.upload_dir.display(),
        "Starting razorx"
    );

    let pipeline = Pipeline::from_config(&config)?;
    let transcriber = WhisperCommandTranscriber::from_config(&config.transcription);
    let state = AppState::new(
        Arc::new(pipeline),
        Arc::new(transcriber),
        config.server.upload_dir.clone(),
    );

    let server = HttpServer::bind(&config.server, state).await?;
    server.run().await
}
