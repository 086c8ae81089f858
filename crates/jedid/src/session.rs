//! Server-side state for one accepted connection.
//!
//! A [`SessionHandle`] is shared (via `Arc`) between the session's own reader
//! task, the roster, and any in-flight broadcast. It owns the write half of the
//! connection; the read half stays with the reader task.
//!
//! # Write serialization
//!
//! All outbound frames go through [`SessionHandle::send_text`], which holds the
//! writer mutex for the whole frame. Teardown takes the same mutex, so a frame
//! is never interleaved with another frame or with the shutdown.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::SinkExt;
use parking_lot::Mutex;
use tokio::io::AsyncWrite;
use tokio::time::timeout;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use jedi_core::{DomainResult, SessionId, SessionInfo, SessionState};
use jedi_protocol::{Frame, FrameCodec};

/// Boxed write half, so tests can substitute in-memory streams.
pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send + Sync>>;

/// Framed writer for one session.
pub type SessionWriter = FramedWrite<BoxedWriter, FrameCodec>;

/// Shared handle to a live session.
pub struct SessionHandle {
    id: SessionId,

    /// Set once, from the registration frame
    name: OnceLock<String>,

    state: Mutex<SessionState>,

    connected_at: DateTime<Utc>,

    /// Outbound half of the connection
    writer: tokio::sync::Mutex<SessionWriter>,

    /// Cancelled to force the reader to stop (kick, disconnect-all, stop)
    shutdown: CancellationToken,

    /// Guards against closing the connection twice
    closed: AtomicBool,
}

impl SessionHandle {
    /// Creates a handle in the `Connecting` state.
    ///
    /// # Arguments
    ///
    /// * `id` - Freshly allocated session id
    /// * `writer` - Write half of the connection
    /// * `codec` - Frame codec (carries the frame size limit)
    /// * `shutdown` - Token the reader task watches; usually a child of the
    ///   listener's token
    pub fn new<W>(id: SessionId, writer: W, codec: FrameCodec, shutdown: CancellationToken) -> Self
    where
        W: AsyncWrite + Send + Sync + 'static,
    {
        let boxed: BoxedWriter = Box::pin(writer);
        Self {
            id,
            name: OnceLock::new(),
            state: Mutex::new(SessionState::Connecting),
            connected_at: Utc::now(),
            writer: tokio::sync::Mutex::new(FramedWrite::new(boxed, codec)),
            shutdown,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Display name, or `""` before registration.
    pub fn name(&self) -> &str {
        self.name.get().map(String::as_str).unwrap_or("")
    }

    /// Records the display name. Returns false if one was already set.
    pub fn set_name(&self, name: impl Into<String>) -> bool {
        self.name.set(name.into()).is_ok()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Applies a lifecycle transition.
    ///
    /// Roster membership changes call this while holding the roster lock, so
    /// "in the roster" and "Active" change together.
    pub(crate) fn transition(&self, next: SessionState) -> DomainResult<SessionState> {
        let mut state = self.state.lock();
        let from = *state;
        let result = state.transition(next);
        if result.is_ok() {
            trace!(session_id = %self.id, %from, to = %next, "Session state changed");
        }
        result
    }

    /// Moves a Connecting or Active session to Closing.
    ///
    /// Returns true if this call performed the transition.
    pub(crate) fn begin_closing(&self) -> bool {
        self.transition(SessionState::Closing).is_ok()
    }

    /// Token the reader watches for forced shutdown.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Asks the reader task to stop. The reader performs the teardown.
    pub fn request_close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_close_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Sends one text frame to this client.
    ///
    /// The write timeout covers waiting for the writer lock as well as the
    /// write itself.
    ///
    /// # Errors
    ///
    /// - `SendError::NotConnected` if the session is not Active
    /// - `SendError::Write` if the socket write fails
    /// - `SendError::Timeout` if the write does not finish within `limit`
    pub async fn send_text(&self, text: &str, limit: Duration) -> Result<(), SendError> {
        if !self.state().is_active() {
            return Err(SendError::NotConnected);
        }

        let frame = Frame::text(text);
        let send = async {
            let mut writer = self.writer.lock().await;
            writer.send(frame).await
        };

        match timeout(limit, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SendError::Write(e.to_string())),
            Err(_) => Err(SendError::Timeout),
        }
    }

    /// Flushes and shuts down the write half, then marks the session Closed.
    ///
    /// Idempotent: only the first call does anything. Returns true for
    /// that call.
    pub async fn close(&self, limit: Duration) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.begin_closing();

        let shutdown = async {
            let mut writer = self.writer.lock().await;
            SinkExt::<Frame>::close(&mut *writer).await
        };

        match timeout(limit, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(session_id = %self.id, error = %e, "Error while closing connection");
            }
            Err(_) => {
                debug!(session_id = %self.id, "Timed out closing connection");
            }
        }

        // Wake the reader if nobody else did.
        self.shutdown.cancel();

        if let Err(e) = self.transition(SessionState::Closed) {
            debug!(session_id = %self.id, error = %e, "Unexpected state at close");
        }

        true
    }

    /// Snapshot for operator listings.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            name: self.name().to_string(),
            state: self.state(),
            connected_at: self.connected_at,
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Failure to deliver a frame to one session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("Session not connected")]
    NotConnected,

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Write timed out")]
    Timeout,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Arc;
    use tokio::io::DuplexStream;

    /// Builds a session backed by an in-memory pipe.
    ///
    /// Returns the handle and the far end of the pipe, which sees
    /// everything the server writes.
    pub(crate) fn pipe_session(id: u64, name: &str) -> (Arc<SessionHandle>, DuplexStream) {
        let (server_side, client_side) = tokio::io::duplex(64 * 1024);
        let session = SessionHandle::new(
            SessionId::new(id),
            server_side,
            FrameCodec::new(),
            CancellationToken::new(),
        );
        session.set_name(name);
        (Arc::new(session), client_side)
    }
}
