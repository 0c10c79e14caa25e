//! Teamforge CLI
//!
//! Chat with an AI agent team that builds software projects.

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use teamforge::api::ApiClient;
use teamforge::app::App;
use teamforge::{config, Transport};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Teamforge - watch and steer an AI agent team building your project
#[derive(Parser, Debug)]
#[command(name = "teamforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// WebSocket base URL of the generation server
    #[arg(long)]
    server: Option<String>,

    /// REST base URL of the generation server
    #[arg(long)]
    api: Option<String>,

    /// Auth token
    #[arg(long)]
    token: Option<String>,

    /// Config file (default: <config dir>/teamforge/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Client id for the chat socket (default: random)
    #[arg(long)]
    client_id: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Requirement to send right away
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut config = config::load(cli.config.as_deref())?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(api) = cli.api {
        config.api_url = api;
    }
    if cli.token.is_some() {
        config = config.with_auth_token(cli.token);
    }

    let client_id = cli
        .client_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!("Starting Teamforge as client {}", client_id);
    info!("Server: {}", config.server_url);

    let transport = Transport::new(config.clone());
    let (handle, events) = transport.connect(&client_id, config.auth_token.clone())?;
    let api = ApiClient::new(&config)?;

    let (input_tx, input_rx) = mpsc::channel::<String>(32);
    let (output_tx, mut output_rx) = mpsc::unbounded_channel::<String>();

    // Spawn blocking thread to read from stdin
    let stdin_tx = input_tx;
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if stdin_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    });

    // Spawn task to write to stdout
    tokio::spawn(async move {
        while let Some(text) = output_rx.recv().await {
            if let Err(e) = writeln!(io::stdout(), "{}", text) {
                error!("Error writing stdout: {}", e);
                break;
            }
            let _ = io::stdout().flush();
        }
    });

    let initial_prompt = Some(cli.prompt.join(" "));
    let app = App::new(&config, handle.clone(), api, output_tx).with_initial_prompt(initial_prompt);
    app.run(events, input_rx).await?;

    handle.shutdown();
    Ok(())
}
