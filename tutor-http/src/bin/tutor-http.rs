use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tutor_core::config::{SecretConfig, TutorConfig};
use tutor_http::server::{ServerConfig, start_server};

/// Tutor HTTP API Server
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host address to bind to
    #[arg(short = 'H', long, env = "TUTOR_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "TUTOR_PORT", default_value_t = 8000)]
    port: u16,

    /// Pipeline configuration file (JSON)
    #[arg(short, long, env = "TUTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Provider secrets file (JSON)
    #[arg(short, long, env = "TUTOR_SECRET")]
    secret: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace), overridden by RUST_LOG
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let tutor_config = match &cli.config {
        Some(path) => TutorConfig::from_file(path)?,
        None => TutorConfig::default(),
    };
    let secret_config = match &cli.secret {
        Some(path) => SecretConfig::from_file(path)?,
        None => SecretConfig::default(),
    };

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        tutor_config,
        secret_config,
    };
    start_server(config).await
}
