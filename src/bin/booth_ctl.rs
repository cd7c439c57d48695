//! booth-ctl: command-line client for a running rap-booth-rs service.
//!
//! Talks to the loopback control API with short timeouts so a dead service
//! fails fast instead of hanging the shell.

use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "booth-ctl", about = "Control a running rap-booth-rs service")]
struct Cli {
    /// Control API port of the running service
    #[arg(short, long, default_value_t = 8768)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate and perform a rap about a topic
    Rap { topic: String },
    /// Stop the current performance
    Stop,
    /// Show service state, current line, and lyrics
    Status,
    /// Set the beat volume (0.0 to 1.0)
    Volume { level: f32 },
}

#[derive(Serialize)]
struct PerformRequest<'a> {
    topic: &'a str,
}

#[derive(Serialize)]
struct VolumeRequest {
    volume: f32,
}

#[derive(Deserialize)]
struct SimpleResponse {
    status: String,
    #[serde(default)]
    volume: Option<f32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    state: String,
    current_line: String,
    lyrics: Vec<String>,
    volume: f32,
    #[serde(default)]
    last_error: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let base = format!("http://127.0.0.1:{}", cli.port);

    let client = Client::builder()
        .connect_timeout(Duration::from_millis(300))
        .timeout(Duration::from_secs(5))
        .build()?;

    match cli.command {
        Command::Rap { topic } => {
            let resp: SimpleResponse = client
                .post(format!("{base}/perform"))
                .json(&PerformRequest { topic: &topic })
                .send()
                .await?
                .json()
                .await?;
            report(&resp);
        }
        Command::Stop => {
            let resp: SimpleResponse = client
                .post(format!("{base}/stop"))
                .send()
                .await?
                .json()
                .await?;
            report(&resp);
        }
        Command::Volume { level } => {
            let resp: SimpleResponse = client
                .post(format!("{base}/volume"))
                .json(&VolumeRequest { volume: level })
                .send()
                .await?
                .json()
                .await?;
            match resp.volume {
                Some(v) => println!("volume: {v}"),
                None => report(&resp),
            }
        }
        Command::Status => {
            let status: StatusResponse = client
                .get(format!("{base}/status"))
                .send()
                .await?
                .json()
                .await?;
            println!("state: {} (volume {})", status.state, status.volume);
            if !status.current_line.is_empty() {
                println!("now speaking: {}", status.current_line);
            }
            if let Some(err) = &status.last_error {
                println!("last error: {err}");
            }
            if !status.lyrics.is_empty() {
                println!("lyrics:");
                for line in &status.lyrics {
                    println!("  {line}");
                }
            }
        }
    }

    Ok(())
}

fn report(resp: &SimpleResponse) {
    match &resp.error {
        Some(err) => println!("error: {err}"),
        None => println!("{}", resp.status),
    }
}
