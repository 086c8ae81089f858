//! JediChat server - multi-client TCP chat relay
//!
//! Starts listening right away and reads operator commands from stdin.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (31337)
//! jedid
//!
//! # Listen on a specific port
//! jedid 4000
//!
//! # Only accept local connections
//! JEDI_BIND=127.0.0.1 jedid
//!
//! # Enable debug logging
//! RUST_LOG=jedid=debug jedid
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: stop the listener, close every session, exit

use std::net::IpAddr;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use jedid::config::{resolve_port, ServerConfig};
use jedid::console::{run_console, spawn_stdin_reader, ConsoleExit};
use jedid::display::LogDisplay;
use jedid::server::ChatServer;

/// JediChat server - relays every chat line to every connected client
#[derive(Parser, Debug)]
#[command(name = "jedid", version, about)]
struct Args {
    /// Port to listen on (invalid values fall back to 31337)
    #[arg(allow_hyphen_values = true)]
    port: Option<String>,

    /// Address to bind the listener on
    #[arg(long, env = "JEDI_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_console: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    run_server(args)
}

/// Runs the server (async entry point).
#[tokio::main]
async fn run_server(args: Args) -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("jedid=info".parse()?)
                .add_directive("jedi_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "JediChat server starting"
    );

    let port = resolve_port(args.port.as_deref());
    let config = ServerConfig::default()
        .with_bind_addr(args.bind)
        .with_port(port);

    let server = Arc::new(ChatServer::new(config, Arc::new(LogDisplay)));
    server
        .start(port)
        .await
        .context("Failed to start chat server")?;

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    if args.no_console {
        cancel_token.cancelled().await;
    } else {
        let console = tokio::spawn(run_console(
            Arc::clone(&server),
            spawn_stdin_reader(),
            tokio::io::stdout(),
        ));

        tokio::select! {
            _ = cancel_token.cancelled() => {}
            exit = console => match exit {
                Ok(ConsoleExit::Quit) => info!("Operator quit"),
                Ok(ConsoleExit::InputClosed) => {
                    info!("Console input closed, running until signal");
                    cancel_token.cancelled().await;
                }
                Err(e) => {
                    error!(error = %e, "Console task failed");
                    cancel_token.cancelled().await;
                }
            },
        }
    }

    server.stop().await;

    info!("JediChat server stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
