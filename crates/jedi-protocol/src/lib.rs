//! JediChat Protocol - Wire protocol for chat relay communication
//!
//! This crate provides the frame types and the newline-delimited JSON
//! codec used in both directions between `jedi` clients and the `jedid`
//! server.

pub mod codec;
pub mod message;
pub mod version;

pub use codec::{decode_frame, encode_frame, CodecError, FrameCodec, MAX_FRAME_LEN};
pub use message::{Frame, Message};
pub use version::{ProtocolVersion, VersionError};
