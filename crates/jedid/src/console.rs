//! Operator console.
//!
//! Reads one command per line and drives the [`ChatServer`] command surface:
//!
//! | Command           | Effect                                  |
//! |-------------------|-----------------------------------------|
//! | `start [port]`    | Start listening (default: config port)  |
//! | `stop`            | Stop listening and close every session  |
//! | `kick <index>`    | Close the session at roster position    |
//! | `disconnect-all`  | Close every session, keep listening     |
//! | `list`            | Show the roster                         |
//! | `help`            | Show this table                         |
//! | `quit`            | Leave the console                       |
//!
//! Input lines arrive over a channel so the blocking stdin read lives on
//! its own thread and never holds up runtime shutdown.

use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::roster::RosterError;
use crate::server::{ChatServer, ServerError};

const HELP: &str = "\
Commands:
  start [port]     start listening
  stop             stop listening and close every session
  kick <index>     close the session at roster position <index>
  disconnect-all   close every session, keep listening
  list             show connected sessions
  help             show this help
  quit             shut the server down";

/// A parsed operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Start(Option<u16>),
    Stop,
    Kick(usize),
    DisconnectAll,
    List,
    Help,
    Quit,
}

impl FromStr for OperatorCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Err(ConsoleError::Empty);
        };
        let argument = words.next();

        let parsed = match command.to_ascii_lowercase().as_str() {
            "start" => match argument {
                None => Self::Start(None),
                Some(raw) => Self::Start(Some(raw.parse().map_err(|_| {
                    ConsoleError::InvalidArgument {
                        command: "start",
                        value: raw.to_string(),
                    }
                })?)),
            },
            "stop" => Self::Stop,
            "kick" => {
                let raw = argument.ok_or(ConsoleError::MissingArgument {
                    command: "kick",
                    argument: "index",
                })?;
                Self::Kick(raw.parse().map_err(|_| ConsoleError::InvalidArgument {
                    command: "kick",
                    value: raw.to_string(),
                })?)
            }
            "disconnect-all" | "disconnect" => Self::DisconnectAll,
            "list" | "ls" => Self::List,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(ConsoleError::UnknownCommand(other.to_string())),
        };

        Ok(parsed)
    }
}

/// What the console did with one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Text for the operator.
    Text(String),

    /// The operator asked to quit.
    Quit,
}

/// Why the console loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The operator typed `quit`.
    Quit,

    /// The input channel closed (stdin hit EOF).
    InputClosed,
}

/// Runs one command against the server.
///
/// # Errors
///
/// Returns `ConsoleError` when the server rejects the command; the server
/// state is unchanged in that case.
pub async fn execute(server: &ChatServer, command: OperatorCommand) -> Result<Reply, ConsoleError> {
    let text = match command {
        OperatorCommand::Start(port) => {
            let addr = server.start(port.unwrap_or(server.config().port)).await?;
            format!("Listening on {addr}")
        }
        OperatorCommand::Stop => match server.stop().await {
            Some(summary) => format!("Stopped ({} sessions closed)", summary.sessions_closed),
            None => "Not listening".to_string(),
        },
        OperatorCommand::Kick(index) => {
            let info = server.kick(index)?;
            format!("Kicked [{index}] {} (session {})", info.name, info.id)
        }
        OperatorCommand::DisconnectAll => {
            let count = server.disconnect_all();
            format!("Disconnected {count} sessions")
        }
        OperatorCommand::List => render_roster(server),
        OperatorCommand::Help => HELP.to_string(),
        OperatorCommand::Quit => return Ok(Reply::Quit),
    };

    Ok(Reply::Text(text))
}

fn render_roster(server: &ChatServer) -> String {
    let infos = server.roster().infos();
    let mut out = format!("Connections ({})", infos.len());
    for (index, info) in infos.iter().enumerate() {
        out.push_str(&format!(
            "\n  [{index}] {} (session {}, {}s)",
            info.name,
            info.id,
            info.connected_secs()
        ));
    }
    out
}

/// Reads commands from `lines` until `quit` or end of input.
///
/// Replies and errors are written to `out`, one block per command.
pub async fn run_console<W>(
    server: Arc<ChatServer>,
    mut lines: mpsc::UnboundedReceiver<String>,
    mut out: W,
) -> ConsoleExit
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        let reply = match line.parse::<OperatorCommand>() {
            Ok(command) => {
                debug!(?command, "Operator command");
                execute(&server, command).await
            }
            Err(ConsoleError::Empty) => continue,
            Err(e) => Err(e),
        };

        let text = match reply {
            Ok(Reply::Quit) => return ConsoleExit::Quit,
            Ok(Reply::Text(text)) => text,
            Err(e) => format!("Error: {e}"),
        };

        if let Err(e) = write_line(&mut out, &text).await {
            warn!(error = %e, "Failed to write console output");
        }
    }

    ConsoleExit::InputClosed
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}

/// Forwards stdin lines to a channel from a dedicated thread.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    rx
}

/// Errors surfaced to the operator.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0} (try 'help')")]
    UnknownCommand(String),

    #[error("'{command}' needs an {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("Invalid argument for '{command}': {value}")]
    InvalidArgument { command: &'static str, value: String },

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Roster(#[from] RosterError),
}
