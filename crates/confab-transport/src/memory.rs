//! In-memory transport.
//!
//! [`pair`] returns the two halves a session runs against plus a
//! [`MemoryClient`] that plays the remote peer. Frames travel as encoded text,
//! so the codec is exercised exactly as on a real socket.

use async_trait::async_trait;
use confab_protocol::{codec, Notification, ProtocolError};
use tokio::sync::mpsc;

use crate::traits::{EventSink, EventSource, TransportError};

enum Inbound {
    Text(String),
    Fail(String),
}

/// Create a connected source, sink and client.
pub fn pair() -> (MemorySource, MemorySink, MemoryClient) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    (
        MemorySource { rx: inbound_rx },
        MemorySink {
            tx: Some(outbound_tx),
        },
        MemoryClient {
            tx: Some(inbound_tx),
            rx: outbound_rx,
        },
    )
}

/// Inbound half fed by a [`MemoryClient`].
pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl EventSource for MemorySource {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        match self.rx.recv().await {
            Some(Inbound::Text(text)) => Ok(Some(text)),
            Some(Inbound::Fail(reason)) => Err(TransportError::ReceiveFailed(reason)),
            None => Ok(None),
        }
    }
}

/// Outbound half read by a [`MemoryClient`].
pub struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl EventSink for MemorySink {
    async fn send(&mut self, notification: &Notification) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        let text = codec::encode(notification)?;
        tx.send(text)
            .map_err(|_| TransportError::SendFailed("client went away".into()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

/// The remote end of an in-memory connection.
pub struct MemoryClient {
    tx: Option<mpsc::UnboundedSender<Inbound>>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryClient {
    /// Send raw envelope text. Returns `false` once the client has closed or
    /// the source is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.push(Inbound::Text(text.into()))
    }

    /// Send a JSON envelope.
    pub fn send_json(&self, envelope: &serde_json::Value) -> bool {
        self.send_text(envelope.to_string())
    }

    /// Make the source's next read fail, as a dropped connection would.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.push(Inbound::Fail(reason.into()))
    }

    /// Close the inbound direction. The source reports a clean close once
    /// anything already sent has been read.
    pub fn close(&mut self) {
        self.tx = None;
    }

    fn push(&self, frame: Inbound) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.send(frame).is_ok())
    }

    /// Receive and decode the next notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a valid notification.
    pub async fn recv(&mut self) -> Result<Option<Notification>, ProtocolError> {
        match self.rx.recv().await {
            Some(text) => codec::decode_notification(&text).map(Some),
            None => Ok(None),
        }
    }

    /// Receive the next notification if one is already waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a valid notification.
    pub fn try_recv(&mut self) -> Result<Option<Notification>, ProtocolError> {
        match self.rx.try_recv() {
            Ok(text) => codec::decode_notification(&text).map(Some),
            Err(_) => Ok(None),
        }
    }
}
