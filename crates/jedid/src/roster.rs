//! The roster: ordered set of Active sessions.
//!
//! A single `parking_lot::Mutex` guards the member list. Every operation,
//! including [`Roster::snapshot`], holds it only for the copy or the
//! mutation; fan-out iterates the snapshot after the lock is released.
//!
//! Membership and the `Active` state change together: `add` moves a session
//! Connecting → Active and the removals move it Active → Closing, all under
//! the lock. A session is therefore in the roster iff it is Active.
//!
//! [`Roster::close`] drains the members and refuses further adds in one
//! critical section, so a listener stop sees every member exactly once.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error};

use jedi_core::{SessionId, SessionInfo, SessionState};

use crate::session::SessionHandle;

#[derive(Default)]
struct Members {
    /// Insertion order, used for display and kick-by-index
    order: Vec<Arc<SessionHandle>>,

    /// Id index for O(1) duplicate checks
    ids: HashSet<SessionId>,

    /// Set by `close`; refuses adds until `reopen`
    closed: bool,
}

/// Cheap-to-clone handle to the shared roster.
#[derive(Clone, Default)]
pub struct Roster {
    inner: Arc<Mutex<Members>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a registered session and marks it Active.
    ///
    /// Returns the roster size after insertion.
    ///
    /// # Errors
    ///
    /// - `RosterError::DuplicateSession` if the id is already present
    /// - `RosterError::SessionClosing` if the roster is closed or the
    ///   session was told to close before it could be added
    /// - `RosterError::InvalidState` if the session is not Connecting
    pub fn add(&self, session: Arc<SessionHandle>) -> Result<usize, RosterError> {
        let id = session.id();
        let mut members = self.inner.lock();

        if members.ids.contains(&id) {
            error!(session_id = %id, "Duplicate session id in roster");
            return Err(RosterError::DuplicateSession(id));
        }

        if members.closed || session.is_close_requested() {
            return Err(RosterError::SessionClosing(id));
        }

        session
            .transition(SessionState::Active)
            .map_err(|_| RosterError::InvalidState {
                session_id: id,
                state: session.state(),
            })?;

        members.ids.insert(id);
        members.order.push(session);
        debug!(session_id = %id, size = members.order.len(), "Session added to roster");

        Ok(members.order.len())
    }

    /// Removes a session by id and marks it Closing.
    ///
    /// Absent ids are not an error: the reader's own teardown and an
    /// operator kick may both try to remove the same session.
    pub fn remove_by_id(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        let mut members = self.inner.lock();
        let position = members.order.iter().position(|s| s.id() == id)?;
        let session = members.order.remove(position);
        members.ids.remove(&id);
        session.begin_closing();
        debug!(session_id = %id, size = members.order.len(), "Session removed from roster");
        Some(session)
    }

    /// Removes the session at display position `index` and marks it Closing.
    ///
    /// # Errors
    ///
    /// Returns `RosterError::IndexOutOfRange` if `index >= len`; the roster
    /// is left unchanged.
    pub fn remove_by_index(&self, index: usize) -> Result<Arc<SessionHandle>, RosterError> {
        let mut members = self.inner.lock();
        let len = members.order.len();
        if index >= len {
            return Err(RosterError::IndexOutOfRange { index, len });
        }

        let session = members.order.remove(index);
        members.ids.remove(&session.id());
        session.begin_closing();
        debug!(session_id = %session.id(), index, "Session removed from roster by index");
        Ok(session)
    }

    /// Removes every session, marking each Closing.
    pub fn drain(&self) -> Vec<Arc<SessionHandle>> {
        let mut members = self.inner.lock();
        members.ids.clear();
        let drained: Vec<_> = members.order.drain(..).collect();
        for session in &drained {
            session.begin_closing();
        }
        drained
    }

    /// Drains every session and refuses adds until [`Roster::reopen`].
    pub fn close(&self) -> Vec<Arc<SessionHandle>> {
        let mut members = self.inner.lock();
        members.closed = true;
        members.ids.clear();
        let drained: Vec<_> = members.order.drain(..).collect();
        for session in &drained {
            session.begin_closing();
        }
        debug!(drained = drained.len(), "Roster closed");
        drained
    }

    /// Accepts adds again after a [`Roster::close`].
    pub fn reopen(&self) {
        self.inner.lock().closed = false;
    }

    /// Point-in-time copy of the members, in roster order.
    pub fn snapshot(&self) -> Vec<Arc<SessionHandle>> {
        self.inner.lock().order.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().order.is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.inner.lock().ids.contains(&id)
    }

    /// Display names in roster order.
    pub fn names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Operator view of every member.
    pub fn infos(&self) -> Vec<SessionInfo> {
        self.snapshot().iter().map(|s| s.info()).collect()
    }
}

/// Errors from roster operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    /// Invariant violation: ids are allocated uniquely.
    #[error("Session {0} is already in the roster")]
    DuplicateSession(SessionId),

    #[error("Session {0} is closing")]
    SessionClosing(SessionId),

    #[error("Session {session_id} cannot join the roster from state {state}")]
    InvalidState {
        session_id: SessionId,
        state: SessionState,
    },

    /// The operator referred to a position that no longer exists.
    #[error("No session at index {index} (roster size: {len})")]
    IndexOutOfRange { index: usize, len: usize },
}
