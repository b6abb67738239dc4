//! `donkey-ctl` - command-line control surface for a running engine.
//!
//! Thin `reqwest` wrapper over the REST management API; every subcommand
//! maps onto exactly one request.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::process::ExitCode;

/// Command-line interface for the donkey engine's REST management API.
#[derive(Parser)]
#[command(name = "donkey-ctl", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Base URL of the engine's REST API.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reports a deployed channel's lifecycle state and statistics.
    Status { channel_id: String },
    /// Starts a deployed channel.
    Start { channel_id: String },
    /// Stops a deployed channel's source connector.
    Stop { channel_id: String },
    /// Pauses a deployed channel's message intake.
    Pause { channel_id: String },
    /// Resumes a paused channel's message intake.
    Resume { channel_id: String },
    /// Halts a deployed channel immediately, bypassing the normal drain.
    Halt { channel_id: String },
    /// Deploys a channel from a JSON config file.
    Deploy {
        #[arg(long)]
        config: std::path::PathBuf,
    },
    /// Undeploys a channel, dropping its storage tables.
    Undeploy { channel_id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let client = reqwest::Client::new();

    let result = match args.command {
        Command::Status { channel_id } => {
            get(&client, &args.server, &format!("/channels/{channel_id}/status")).await
        }
        Command::Start { channel_id } => {
            post(&client, &args.server, &format!("/channels/{channel_id}/_start")).await
        }
        Command::Stop { channel_id } => {
            post(&client, &args.server, &format!("/channels/{channel_id}/_stop")).await
        }
        Command::Pause { channel_id } => {
            post(&client, &args.server, &format!("/channels/{channel_id}/_pause")).await
        }
        Command::Resume { channel_id } => {
            post(&client, &args.server, &format!("/channels/{channel_id}/_resume")).await
        }
        Command::Halt { channel_id } => {
            post(&client, &args.server, &format!("/channels/{channel_id}/_halt")).await
        }
        Command::Undeploy { channel_id } => {
            post(&client, &args.server, &format!("/channels/{channel_id}/_undeploy")).await
        }
        Command::Deploy { config } => deploy(&client, &args.server, &config).await,
    };

    match result {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body).unwrap_or(body.to_string()));
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn get(client: &reqwest::Client, server: &str, path: &str) -> Result<Value, String> {
    let response = client
        .get(format!("{server}{path}"))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    parse_response(response).await
}

async fn post(client: &reqwest::Client, server: &str, path: &str) -> Result<Value, String> {
    let response = client
        .post(format!("{server}{path}"))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    parse_response(response).await
}

async fn deploy(client: &reqwest::Client, server: &str, config_path: &std::path::Path) -> Result<Value, String> {
    let body = std::fs::read_to_string(config_path).map_err(|e| format!("reading {}: {e}", config_path.display()))?;
    let config: Value = serde_json::from_str(&body).map_err(|e| format!("parsing {}: {e}", config_path.display()))?;
    let response = client
        .post(format!("{server}/channels"))
        .json(&config)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    parse_response(response).await
}

async fn parse_response(response: reqwest::Response) -> Result<Value, String> {
    let status = response.status();
    let body: Value = response.json().await.map_err(|e| e.to_string())?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(body.get("error").and_then(Value::as_str).unwrap_or("request failed").to_string())
    }
}
