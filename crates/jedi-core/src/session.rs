//! Session identity and lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for a chat session.
///
/// Assigned at accept time and never reused for the lifetime of the
/// server process, even after the session is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a SessionId from a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Monotonic source of session ids.
///
/// Each call to [`next`](Self::next) returns `previous + 1`, starting at 1.
/// Safe to share between tasks.
#[derive(Debug, Default)]
pub struct SessionIdAllocator {
    last: AtomicU64,
}

impl SessionIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next id.
    pub fn next(&self) -> SessionId {
        SessionId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

// ============================================================================
// Lifecycle State
// ============================================================================

/// Lifecycle state of a session.
///
/// ```text
/// Connecting ──▶ Active ──▶ Closing ──▶ Closed
///      │                       ▲
///      └───────────────────────┘   (never registered)
/// ```
///
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepted, waiting for the registration frame.
    #[default]
    Connecting,

    /// Registered and present in the roster.
    Active,

    /// Leaving: removed from the roster, connection being torn down.
    Closing,

    /// Connection released.
    Closed,
}

impl SessionState {
    /// Returns true if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Active)
                | (Self::Connecting, Self::Closing)
                | (Self::Active, Self::Closing)
                | (Self::Closing, Self::Closed)
        )
    }

    /// Applies a transition, returning the new state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if the move is not allowed.
    pub fn transition(&mut self, next: SessionState) -> DomainResult<SessionState> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(next)
    }

    /// Returns true if the session may receive broadcasts.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns the display label for this state.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Read-only View
// ============================================================================

/// Point-in-time view of a rostered session, for operator listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub name: String,
    pub state: SessionState,
    pub connected_at: DateTime<Utc>,
}

impl SessionInfo {
    /// Seconds elapsed since the session was accepted.
    #[must_use]
    pub fn connected_secs(&self) -> i64 {
        (Utc::now() - self.connected_at).num_seconds().max(0)
    }
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} ({}, {}s)",
            self.id,
            self.name,
            self.state,
            self.connected_secs()
        )
    }
}
