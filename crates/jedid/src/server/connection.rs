//! Reader task for one client connection.
//!
//! Each accepted connection gets its own `ConnectionHandler` that:
//! - Waits for the registration frame and joins the roster
//! - Relays text frames through the broadcast engine
//! - Tears the session down exactly once, however the loop ended
//!
//! # Lifecycle
//!
//! ```text
//! accept ─▶ Connecting ──Register──▶ Active ──Text──▶ broadcast "<name>: <body>"
//!                │                     │
//!                │ bad first frame     │ Disconnect / EOF / decode error /
//!                │ timeout / shutdown  │ kick / stop
//!                ▼                     ▼
//!             Closing ──────────────▶ Closed   (departure notice if it was Active)
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the project's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Per-session errors end this session only and never reach the accept loop

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use jedi_protocol::{CodecError, Frame, FrameCodec, Message, VersionError};

use crate::broadcast::Broadcaster;
use crate::roster::RosterError;
use crate::session::SessionHandle;

/// Reader side of one session.
pub struct ConnectionHandler<R> {
    /// Framed read half of the connection
    reader: FramedRead<R, FrameCodec>,

    /// Shared session state (also held by the roster)
    session: Arc<SessionHandle>,

    broadcaster: Arc<Broadcaster>,

    registration_timeout: Duration,

    /// True once the session made it into the roster
    registered: bool,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a handler for a freshly accepted connection.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read half of the connection
    /// * `codec` - Frame codec for the read side
    /// * `session` - Handle created at accept time, in `Connecting` state
    /// * `broadcaster` - Shared broadcast engine (owns the roster)
    /// * `registration_timeout` - Deadline for the first frame
    pub fn new(
        reader: R,
        codec: FrameCodec,
        session: Arc<SessionHandle>,
        broadcaster: Arc<Broadcaster>,
        registration_timeout: Duration,
    ) -> Self {
        Self {
            reader: FramedRead::new(reader, codec),
            session,
            broadcaster,
            registration_timeout,
            registered: false,
        }
    }

    /// Runs the session until it ends, then tears it down.
    pub async fn run(mut self) {
        let session_id = self.session.id();
        debug!(session_id = %session_id, "New client connected");

        let result = match self.register().await {
            Ok(()) => {
                info!(
                    session_id = %session_id,
                    name = %self.session.name(),
                    "Client registered"
                );
                self.process_messages().await
            }
            Err(e) => {
                if !matches!(e, ConnectionError::Shutdown) {
                    warn!(session_id = %session_id, error = %e, "Registration failed");
                }
                Err(e)
            }
        };

        match &result {
            Ok(()) => debug!(session_id = %session_id, "Client sent disconnect"),
            Err(ConnectionError::Shutdown) => {
                debug!(session_id = %session_id, "Session closed by server")
            }
            Err(e) => debug!(session_id = %session_id, error = %e, "Connection closed"),
        }

        self.teardown().await;
    }

    /// Reads the registration frame and joins the roster.
    async fn register(&mut self) -> Result<(), ConnectionError> {
        let frame = match timeout(self.registration_timeout, self.next_frame()).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::RegistrationTimeout),
        };

        frame.protocol_version.ensure_compatible()?;

        let name = match frame.message {
            Message::Register { name } => name,
            other => return Err(ConnectionError::UnexpectedMessage(other.kind())),
        };
        self.session.set_name(name);

        match self.broadcaster.roster().add(Arc::clone(&self.session)) {
            Ok(_) => {}
            Err(RosterError::SessionClosing(_)) => return Err(ConnectionError::Shutdown),
            Err(e) => return Err(e.into()),
        }
        self.registered = true;
        self.broadcaster.publish_roster();

        let notice = format!("{} has connected", self.session.name());
        self.broadcaster.broadcast(&notice).await;

        Ok(())
    }

    /// Relays frames until the client leaves or the session is closed.
    ///
    /// Returns `Ok(())` for a clean client-initiated disconnect.
    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        loop {
            let frame = self.next_frame().await?;

            match frame.message {
                Message::Text { body } => {
                    let line = format!("{}: {}", self.session.name(), body);
                    self.broadcaster.broadcast(&line).await;
                }
                Message::Disconnect => return Ok(()),
                other @ Message::Register { .. } => {
                    return Err(ConnectionError::UnexpectedMessage(other.kind()));
                }
            }
        }
    }

    /// Reads one frame, or fails as soon as the session is told to close.
    async fn next_frame(&mut self) -> Result<Frame, ConnectionError> {
        let shutdown = self.session.shutdown_token().clone();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => Err(ConnectionError::Shutdown),

            item = self.reader.next() => match item {
                Some(Ok(frame)) => Ok(frame),
                Some(Err(e)) => Err(ConnectionError::Decode(e)),
                None => Err(ConnectionError::Eof),
            },
        }
    }

    /// Leaves the roster, announces the departure, closes the connection.
    async fn teardown(self) {
        let Self {
            reader,
            session,
            broadcaster,
            registered,
            ..
        } = self;

        if broadcaster.roster().remove_by_id(session.id()).is_some() {
            broadcaster.publish_roster();
        }

        // Announced before the close: once this client sees EOF, the
        // others have been sent the notice.
        if registered {
            let notice = format!("{} has been disconnected", session.name());
            broadcaster.broadcast(&notice).await;
        }

        session.close(broadcaster.write_timeout()).await;
        drop(reader);

        info!(session_id = %session.id(), name = %session.name(), "Client disconnected");
    }
}

/// Reasons a session's reader loop ends.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("Unexpected {0} message")]
    UnexpectedMessage(&'static str),

    #[error("Decode error: {0}")]
    Decode(#[from] CodecError),

    #[error("Connection closed")]
    Eof,

    #[error("Session closed by server")]
    Shutdown,

    #[error("No registration received in time")]
    RegistrationTimeout,

    #[error("Roster error: {0}")]
    Roster(#[from] RosterError),
}
