//! Chat client.
//!
//! This module provides the `ChatClient` which handles:
//! - Connecting to the relay over TCP and registering a display name
//! - Sending text lines and the disconnect frame
//! - Receiving broadcast lines from the server
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use jedi_protocol::{Frame, FrameCodec, Message};

// ============================================================================
// Configuration
// ============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_PORT: u16 = 31337;

/// Configuration for the chat client.
///
/// # Example
///
/// ```rust
/// use jedi::client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     port: 4000,
///     connect_timeout: Duration::from_secs(1),
///     ..Default::default()
/// };
/// assert_eq!(config.address(), "127.0.0.1:4000");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host name or IP address of the server.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Upper bound on establishing the TCP connection.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// `host:port` form used for connecting and in errors.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Chat Client
// ============================================================================

/// A registered connection to the chat relay.
///
/// # Connection Lifecycle
///
/// 1. `connect` opens the TCP stream and sends the `register` frame
/// 2. `send_text` / `next_line` exchange chat lines
/// 3. `disconnect` sends the `disconnect` frame and closes the stream
pub struct ChatClient {
    name: String,
    receiver: ChatReceiver,
    sender: ChatSender,
}

impl ChatClient {
    /// Connects using `config` and registers as `name`.
    ///
    /// # Errors
    ///
    /// - `ClientError::Connect` if the server cannot be reached
    /// - `ClientError::ConnectTimeout` if connecting takes too long
    /// - `ClientError::Codec` if the registration frame cannot be sent
    pub async fn connect(config: &ClientConfig, name: impl Into<String>) -> Result<Self> {
        let addr = config.address();
        debug!(addr = %addr, "Connecting to chat server");

        let stream = match timeout(config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ClientError::Connect {
                    addr,
                    error: e.to_string(),
                })
            }
            Err(_) => return Err(ClientError::ConnectTimeout { addr }),
        };

        Self::register(stream, name.into()).await
    }

    /// Connects to a known socket address and registers as `name`.
    pub async fn connect_addr(addr: SocketAddr, name: impl Into<String>) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClientError::Connect {
                addr: addr.to_string(),
                error: e.to_string(),
            })?;

        Self::register(stream, name.into()).await
    }

    async fn register(stream: TcpStream, name: String) -> Result<Self> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let mut sender = ChatSender {
            writer: FramedWrite::new(writer, FrameCodec::new()),
        };
        sender.send(Frame::register(name.clone())).await?;

        info!(name = %name, "Registered with chat server");

        Ok(Self {
            name,
            receiver: ChatReceiver {
                reader: FramedRead::new(reader, FrameCodec::new()),
            },
            sender,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends one chat line.
    pub async fn send_text(&mut self, body: impl Into<String>) -> Result<()> {
        self.sender.send_text(body).await
    }

    /// Waits for the next broadcast line.
    ///
    /// Returns `Ok(None)` once the server closes the connection.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        self.receiver.next_line().await
    }

    /// Sends the disconnect frame and closes the connection.
    pub async fn disconnect(self) -> Result<()> {
        self.sender.disconnect().await
    }

    /// Splits into halves that can be driven from separate tasks.
    pub fn into_split(self) -> (ChatReceiver, ChatSender) {
        (self.receiver, self.sender)
    }
}

/// Receiving half of a [`ChatClient`].
pub struct ChatReceiver {
    reader: FramedRead<OwnedReadHalf, FrameCodec>,
}

impl ChatReceiver {
    /// Waits for the next broadcast line.
    ///
    /// Frames other than text are ignored. Returns `Ok(None)` at end of
    /// stream.
    ///
    /// # Errors
    ///
    /// - `ClientError::Codec` for a malformed or truncated frame
    /// - `ClientError::Version` if the server's protocol is incompatible
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        while let Some(frame) = self.reader.next().await {
            let frame = frame?;
            frame.protocol_version.ensure_compatible()?;

            match frame.message {
                Message::Text { body } => return Ok(Some(body)),
                other => debug!(kind = other.kind(), "Ignoring non-text frame from server"),
            }
        }
        Ok(None)
    }
}

/// Sending half of a [`ChatClient`].
pub struct ChatSender {
    writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
}

impl ChatSender {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.writer.send(frame).await?;
        Ok(())
    }

    /// Sends one chat line.
    pub async fn send_text(&mut self, body: impl Into<String>) -> Result<()> {
        self.send(Frame::text(body)).await
    }

    /// Sends the disconnect frame and shuts down the write half.
    pub async fn disconnect(mut self) -> Result<()> {
        self.send(Frame::disconnect()).await?;
        SinkExt::<Frame>::close(&mut self.writer).await?;
        debug!("Disconnected from chat server");
        Ok(())
    }
}
