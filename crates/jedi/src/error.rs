//! Error types for the chat client.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use thiserror::Error;

use jedi_protocol::{CodecError, VersionError};

// ============================================================================
// Client Error Type
// ============================================================================

/// Chat client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the server.
    ///
    /// Usually the server is not running or is listening on another port.
    #[error("Failed to connect to {addr}: {error}")]
    Connect { addr: String, error: String },

    /// The connection attempt did not finish in time.
    #[error("Timed out connecting to {addr}")]
    ConnectTimeout { addr: String },

    /// The server speaks an incompatible protocol version.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// A frame could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error passthrough.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_display() {
        let error = ClientError::Connect {
            addr: "127.0.0.1:31337".to_string(),
            error: "Connection refused".to_string(),
        };
        let display = format!("{error}");
        assert!(display.contains("127.0.0.1:31337"));
        assert!(display.contains("Connection refused"));
    }

    #[test]
    fn test_codec_error_from_conversion() {
        let error: ClientError = CodecError::FrameTooLarge { max: 16 }.into();
        assert!(matches!(error, ClientError::Codec(_)));
        assert!(format!("{error}").contains("Protocol error"));
    }

    #[test]
    fn test_io_error_from_conversion() {
        let io_error = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        let error: ClientError = io_error.into();
        assert!(matches!(error, ClientError::Io(_)));
    }
}
