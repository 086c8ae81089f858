//! JediChat client - line-based terminal client
//!
//! Every line typed on stdin is sent as one chat line; every line the
//! server broadcasts is printed to stdout.
//!
//! # Usage
//!
//! ```text
//! jedi Obi                      # connect to 127.0.0.1:31337 as "Obi"
//! jedi Ani --host chat.local    # another server
//! JEDI_PORT=4000 jedi Yoda      # another port
//! ```
//!
//! Type `/quit` (or send end of input) to leave.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use jedi::client::{DEFAULT_HOST, DEFAULT_PORT};
use jedi::{ChatClient, ClientConfig};
use jedid::console::spawn_stdin_reader;

/// JediChat client
#[derive(Parser, Debug)]
#[command(name = "jedi", version, about)]
struct Args {
    /// Display name shown to other users
    name: String,

    /// Server host
    #[arg(long, env = "JEDI_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(long, env = "JEDI_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

fn main() -> Result<()> {
    let args = Args::parse();
    run_client(args)
}

#[tokio::main]
async fn run_client(args: Args) -> Result<()> {
    // Logs go to stderr so chat output stays clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("jedi=warn".parse()?)
                .add_directive("jedi_protocol=warn".parse()?),
        )
        .init();

    let config = ClientConfig {
        host: args.host,
        port: args.port,
        ..Default::default()
    };

    let client = ChatClient::connect(&config, args.name)
        .await
        .with_context(|| format!("Could not join chat at {}", config.address()))?;
    let (mut receiver, mut sender) = client.into_split();

    let printer = async move {
        loop {
            match receiver.next_line().await {
                Ok(Some(line)) => println!("{line}"),
                Ok(None) => {
                    info!("Server closed the connection");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Connection lost");
                    break;
                }
            }
        }
    };
    tokio::pin!(printer);

    let mut input = spawn_stdin_reader();

    loop {
        tokio::select! {
            _ = &mut printer => {
                eprintln!("Disconnected from server");
                return Ok(());
            }

            line = input.recv() => match line {
                Some(line) if line.trim() == "/quit" => break,
                Some(line) => sender.send_text(line).await.context("Failed to send message")?,
                None => {
                    debug!("End of input");
                    break;
                }
            },
        }
    }

    sender.disconnect().await.context("Failed to disconnect cleanly")?;
    Ok(())
}
