//! Transport abstraction traits.
//!
//! Implementations handle their protocol's control frames internally; the
//! session only ever sees envelope text going in and notifications going out.

use async_trait::async_trait;
use confab_protocol::Notification;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] confab_protocol::ProtocolError),
}

/// The inbound half of a connection.
#[async_trait]
pub trait EventSource: Send {
    /// Receive the next envelope as text.
    ///
    /// Returns `None` if the connection is closed cleanly.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;
}

/// The outbound half of a connection.
///
/// Only one task writes to a sink, so calls never interleave.
#[async_trait]
pub trait EventSink: Send {
    /// Encode and send one notification.
    async fn send(&mut self, notification: &Notification) -> Result<(), TransportError>;

    /// Close the connection gracefully. Closing twice is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;
}
