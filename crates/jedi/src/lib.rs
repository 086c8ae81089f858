//! JediChat client library
//!
//! Connects to a `jedid` relay, registers a display name, sends chat lines
//! and receives every line the server broadcasts.
//!
//! ```rust,ignore
//! use jedi::{ChatClient, ClientConfig};
//!
//! let mut client = ChatClient::connect(&ClientConfig::default(), "Obi").await?;
//! client.send_text("hello there").await?;
//! while let Some(line) = client.next_line().await? {
//!     println!("{line}");
//! }
//! ```

pub mod client;
pub mod error;

// Re-export commonly used types
pub use client::{ChatClient, ChatReceiver, ChatSender, ClientConfig};
pub use error::{ClientError, Result};
