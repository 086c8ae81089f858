//! TCP listener and operator command surface for the chat relay.
//!
//! The server:
//! - Listens on a TCP port for client connections
//! - Spawns a ConnectionHandler per client on a shared TaskTracker
//! - Exposes the operator commands: start, stop, kick, disconnect-all
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │◀──── operator: start / stop / kick / disconnect-all
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│   Broadcaster   │──▶ ChatDisplay
//! │   (per client)  │     │  (lane + Roster)│
//! └─────────────────┘     └───────┬─────────┘
//!                                 │ fan-out
//!                                 ▼
//!                         ┌─────────────────┐
//!                         │ Active sessions │
//!                         └─────────────────┘
//! ```
//!
//! # Shutdown ordering
//!
//! `stop` closes the roster first: the members are drained and later adds
//! are refused under one lock, so a registration that loses the race never
//! joins. Then the listener token (parent of every session token) is
//! cancelled and each drained session is closed.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the project's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors end the accept loop; they never take the process down

mod connection;

pub use connection::{ConnectionError, ConnectionHandler};

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use jedi_core::{SessionIdAllocator, SessionInfo};
use jedi_protocol::FrameCodec;

use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::display::ChatDisplay;
use crate::roster::{Roster, RosterError};
use crate::session::SessionHandle;

/// State that exists only while the listener is up.
struct RunningListener {
    local_addr: SocketAddr,

    /// Parent of every session token
    cancel_token: CancellationToken,

    /// Tracks per-session reader tasks
    tracker: TaskTracker,

    accept_task: JoinHandle<()>,
}

/// Result of a `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopSummary {
    /// Sessions that were in the roster when the listener stopped.
    pub sessions_closed: usize,

    /// False if some reader tasks outlived the grace period.
    pub readers_drained: bool,
}

/// The chat relay server.
pub struct ChatServer {
    config: ServerConfig,

    broadcaster: Arc<Broadcaster>,

    ids: Arc<SessionIdAllocator>,

    /// Serializes start/stop and holds the live listener, if any
    listener: tokio::sync::Mutex<Option<RunningListener>>,
}

impl ChatServer {
    /// Creates a server that is not yet listening.
    ///
    /// # Arguments
    ///
    /// * `config` - Bind address, timeouts, frame limit
    /// * `display` - Receives chat lines and roster changes
    pub fn new(config: ServerConfig, display: Arc<dyn ChatDisplay>) -> Self {
        let broadcaster = Broadcaster::new(Roster::new(), display, config.write_timeout);
        Self {
            config,
            broadcaster: Arc::new(broadcaster),
            ids: Arc::new(SessionIdAllocator::new()),
            listener: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn roster(&self) -> &Roster {
        self.broadcaster.roster()
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Address the listener is bound to, if listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().await.as_ref().map(|l| l.local_addr)
    }

    pub async fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .is_some_and(|l| !l.accept_task.is_finished())
    }

    /// Binds the listener and starts accepting connections.
    ///
    /// Port 0 binds an ephemeral port; the returned address has the real one.
    ///
    /// # Errors
    ///
    /// - `ServerError::AlreadyListening` if a listener is already running
    /// - `ServerError::Bind` if the port cannot be bound
    pub async fn start(&self, port: u16) -> Result<SocketAddr, ServerError> {
        let mut slot = self.listener.lock().await;

        if let Some(running) = slot.as_ref() {
            if !running.accept_task.is_finished() {
                return Err(ServerError::AlreadyListening {
                    addr: running.local_addr,
                });
            }
        }

        let addr = SocketAddr::new(self.config.bind_addr, port);
        let listener = TcpListener::bind(addr).await.map_err(|e| ServerError::Bind {
            addr,
            error: e.to_string(),
        })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr,
            error: e.to_string(),
        })?;

        self.roster().reopen();

        // A listener whose accept loop died keeps its sessions; the new
        // loop adopts its token and tracker so `stop` still covers them.
        let (cancel_token, tracker) = match slot.take() {
            Some(previous) => {
                warn!(addr = %previous.local_addr, "Replacing failed listener");
                (previous.cancel_token, previous.tracker)
            }
            None => (CancellationToken::new(), TaskTracker::new()),
        };

        let acceptor = Acceptor {
            listener,
            cancel_token: cancel_token.clone(),
            tracker: tracker.clone(),
            broadcaster: Arc::clone(&self.broadcaster),
            ids: Arc::clone(&self.ids),
            config: self.config.clone(),
        };
        let accept_task = tokio::spawn(acceptor.run());

        info!(addr = %local_addr, "Chat server listening");

        *slot = Some(RunningListener {
            local_addr,
            cancel_token,
            tracker,
            accept_task,
        });

        Ok(local_addr)
    }

    /// Stops listening and closes every session.
    ///
    /// Returns `None` if the server was not listening.
    pub async fn stop(&self) -> Option<StopSummary> {
        let mut slot = self.listener.lock().await;
        let Some(running) = slot.take() else {
            debug!("Stop requested while not listening");
            return None;
        };

        info!(addr = %running.local_addr, "Stopping chat server");

        let sessions = self.roster().close();

        // No more accepts, and every session token fires.
        running.cancel_token.cancel();
        if let Err(e) = running.accept_task.await {
            warn!(error = %e, "Accept loop task failed");
        }

        let write_timeout = self.config.write_timeout;
        join_all(sessions.iter().map(|s| s.close(write_timeout))).await;
        self.broadcaster.publish_roster();

        running.tracker.close();
        let readers_drained = timeout(self.config.shutdown_grace, running.tracker.wait())
            .await
            .is_ok();
        if !readers_drained {
            warn!(
                pending = running.tracker.len(),
                "Reader tasks still running after grace period"
            );
        }

        info!(sessions = sessions.len(), "Chat server stopped");

        Some(StopSummary {
            sessions_closed: sessions.len(),
            readers_drained,
        })
    }

    /// Removes the session at roster position `index` and closes it.
    ///
    /// The session's reader performs the teardown and announces the
    /// departure to the remaining clients.
    ///
    /// # Errors
    ///
    /// Returns `RosterError::IndexOutOfRange` if there is no such session.
    pub fn kick(&self, index: usize) -> Result<SessionInfo, RosterError> {
        let session = self.roster().remove_by_index(index)?;
        info!(
            session_id = %session.id(),
            name = %session.name(),
            index,
            "Kicking session"
        );
        session.request_close();
        self.broadcaster.publish_roster();
        Ok(session.info())
    }

    /// Closes every session without stopping the listener.
    ///
    /// Returns the number of sessions that were closed.
    pub fn disconnect_all(&self) -> usize {
        let sessions = self.roster().drain();
        for session in &sessions {
            session.request_close();
        }
        self.broadcaster.publish_roster();
        info!(sessions = sessions.len(), "Disconnected all sessions");
        sessions.len()
    }
}

/// Accept loop for one listener lifetime.
struct Acceptor {
    listener: TcpListener,
    cancel_token: CancellationToken,
    tracker: TaskTracker,
    broadcaster: Arc<Broadcaster>,
    ids: Arc<SessionIdAllocator>,
    config: ServerConfig,
}

impl Acceptor {
    async fn run(self) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("Accept loop stopping");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.handle_connection(stream, peer),
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection, listener stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Creates the session and spawns its reader task.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let id = self.ids.next();

        if let Err(e) = stream.set_nodelay(true) {
            debug!(session_id = %id, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let codec = FrameCodec::with_max_length(self.config.max_frame_len);
        let session = Arc::new(SessionHandle::new(
            id,
            writer,
            codec.clone(),
            self.cancel_token.child_token(),
        ));

        debug!(session_id = %id, peer = %peer, "Accepted connection");

        let handler = ConnectionHandler::new(
            reader,
            codec,
            session,
            Arc::clone(&self.broadcaster),
            self.config.registration_timeout,
        );
        self.tracker.spawn(handler.run());
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Already listening on {addr}")]
    AlreadyListening { addr: SocketAddr },
}
