use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tutor_cli::api_client::{ApiClient, ApiError};
use tutor_cli::chat::{ChatInput, format_reply, parse_input};
use tutor_core::config::{SecretConfig, TutorConfig};
use tutor_http::ServerConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(
        long,
        short = 'u',
        default_value = "http://127.0.0.1:8000",
        env = "TUTOR_API_URL",
        global = true
    )]
    api_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and print the answer
    Ask {
        /// Question text
        question: String,
    },

    /// Interactive question loop (type `exit` to leave)
    Chat,

    /// Show server status
    Status,

    /// Show the most recent logged exchanges
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Run the tutor HTTP server in this process
    Serve(ServeArgs),
}

#[derive(Parser)]
struct ServeArgs {
    /// Pipeline configuration file (JSON)
    #[arg(short, long, env = "TUTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Provider secrets file (JSON)
    #[arg(short, long, env = "TUTOR_SECRET")]
    secret: Option<PathBuf>,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8000)]
    port: u16,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Server(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

async fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Commands::Ask { question } => {
            let client = ApiClient::new(&cli.api_url)?;
            let started = Instant::now();
            let result = client.ask(question).await;
            let line = format_reply(&result, started.elapsed());
            match result {
                Ok(_) => {
                    println!("{}", line);
                    Ok(())
                }
                Err(e) => {
                    eprintln!("{}", line);
                    Err(e.into())
                }
            }
        }
        Commands::Chat => chat(&ApiClient::new(&cli.api_url)?).await,
        Commands::Status => {
            let status = ApiClient::new(&cli.api_url)?.status().await?;
            output_json(&status)
        }
        Commands::History { limit } => {
            let history = ApiClient::new(&cli.api_url)?.history(*limit).await?;
            output_json(&history)
        }
        Commands::Serve(args) => serve(args).await,
    }
}

async fn chat(client: &ApiClient) -> Result<(), CliError> {
    println!("Connected to {} (type `exit` to quit)", client.base_url());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let question = match parse_input(&line) {
            ChatInput::Skip => continue,
            ChatInput::Exit => break,
            ChatInput::Question(q) => q,
        };

        let started = Instant::now();
        let result = client.ask(question).await;
        let reply = format_reply(&result, started.elapsed());
        if result.is_ok() {
            println!("{}", reply);
        } else {
            eprintln!("{}", reply);
        }
    }
    Ok(())
}

async fn serve(args: &ServeArgs) -> Result<(), CliError> {
    let tutor_config = match &args.config {
        Some(path) => TutorConfig::from_file(path).map_err(|e| CliError::Server(e.to_string()))?,
        None => TutorConfig::default(),
    };
    let secret_config = match &args.secret {
        Some(path) => SecretConfig::from_file(path).map_err(|e| CliError::Server(e.to_string()))?,
        None => SecretConfig::default(),
    };

    tutor_http::start_server(ServerConfig {
        host: args.host.clone(),
        port: args.port,
        tutor_config,
        secret_config,
    })
    .await
    .map_err(|e| CliError::Server(e.to_string()))
}

fn output_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    if let Err(e) = run(&cli).await {
        // `ask` has already printed its timed error line
        let reported = matches!(cli.command, Commands::Ask { .. }) && matches!(e, CliError::Api(_));
        if !reported {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}
