//! JediChat Core - Shared types for the chat relay
//!
//! This crate provides the domain types shared between
//! the server (jedid) and the client (jedi).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod session;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use session::{SessionId, SessionIdAllocator, SessionInfo, SessionState};
