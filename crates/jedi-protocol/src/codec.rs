//! Newline-delimited JSON framing.
//!
//! Each frame is one JSON object followed by `\n`. JSON escapes newlines
//! inside strings, so a raw `\n` always marks a frame boundary. Framing is
//! delegated to [`LinesCodec`]; this module adds the JSON layer, a frame
//! size limit, and strict end-of-stream handling.
//!
//! Any decode error is final for the stream: callers must stop reading
//! and close the connection. There is no resynchronization.

use std::io;

use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::message::Frame;

/// Default maximum frame length in bytes, excluding the newline.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Encodes a frame as a single JSON line (without the trailing newline).
///
/// # Errors
///
/// Returns `CodecError::Malformed` if serialization fails.
pub fn encode_frame(frame: &Frame) -> Result<String, CodecError> {
    serde_json::to_string(frame).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Decodes one JSON line into a frame.
///
/// # Errors
///
/// Returns `CodecError::Malformed` for invalid JSON, a missing or unknown
/// `type` tag, or missing fields.
pub fn decode_frame(line: &str) -> Result<Frame, CodecError> {
    serde_json::from_str(line).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Tokio codec for [`Frame`]s.
///
/// Use with `FramedRead` / `FramedWrite` on either side of a connection.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    lines: LinesCodec,
    max_frame_len: usize,
}

impl FrameCodec {
    /// Creates a codec with the default [`MAX_FRAME_LEN`].
    pub fn new() -> Self {
        Self::with_max_length(MAX_FRAME_LEN)
    }

    /// Creates a codec that rejects frames longer than `max_frame_len`.
    pub fn with_max_length(max_frame_len: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_frame_len),
            max_frame_len,
        }
    }

    /// Returns the configured frame limit.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    fn map_lines_error(&self, err: LinesCodecError) -> CodecError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => CodecError::FrameTooLarge {
                max: self.max_frame_len,
            },
            LinesCodecError::Io(e) => CodecError::Io(e),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        match self.lines.decode(src) {
            Ok(Some(line)) => decode_frame(&line).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(self.map_lines_error(e)),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            // Bytes without a terminating newline: the peer went away mid-frame.
            None => Err(CodecError::Truncated { pending: src.len() }),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        let line = encode_frame(&frame)?;
        if line.len() > self.max_frame_len {
            return Err(CodecError::FrameTooLarge {
                max: self.max_frame_len,
            });
        }
        self.lines
            .encode(line, dst)
            .map_err(|e| self.map_lines_error(e))
    }
}

/// Errors produced while framing or parsing.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Frame too large (max: {max} bytes)")]
    FrameTooLarge { max: usize },

    #[error("Truncated frame: {pending} bytes before end of stream")]
    Truncated { pending: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
