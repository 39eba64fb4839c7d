//! WebSocket transport on top of axum's upgraded connections.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use confab_protocol::{codec, Notification};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::traits::{EventSink, EventSource, TransportError};

/// Split an upgraded socket into its inbound and outbound halves.
pub fn split(socket: WebSocket) -> (WsSource, WsSink) {
    let (sink, stream) = socket.split();
    (
        WsSource { stream },
        WsSink {
            sink,
            closed: false,
        },
    )
}

/// What a received WebSocket frame means to the session.
#[derive(Debug, PartialEq, Eq)]
enum Incoming {
    Envelope(String),
    Skip,
    Closed,
}

fn classify(message: Message) -> Incoming {
    match message {
        Message::Text(text) => Incoming::Envelope(text),
        // Binary frames are accepted when they carry UTF-8 JSON.
        Message::Binary(data) => match String::from_utf8(data) {
            Ok(text) => Incoming::Envelope(text),
            Err(e) => {
                warn!("Skipping non-UTF-8 binary frame: {}", e);
                Incoming::Skip
            }
        },
        // axum answers pings itself.
        Message::Ping(_) | Message::Pong(_) => Incoming::Skip,
        Message::Close(frame) => {
            debug!("Received close frame: {:?}", frame);
            Incoming::Closed
        }
    }
}

/// Inbound half of a WebSocket connection.
pub struct WsSource {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl EventSource for WsSource {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(message)) => match classify(message) {
                    Incoming::Envelope(text) => return Ok(Some(text)),
                    Incoming::Skip => continue,
                    Incoming::Closed => return Ok(None),
                },
                Some(Err(e)) => {
                    debug!("WebSocket error: {}", e);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}

/// Outbound half of a WebSocket connection.
pub struct WsSink {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

#[async_trait]
impl EventSink for WsSink {
    async fn send(&mut self, notification: &Notification) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        let text = codec::encode(notification)?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }

        self.sink
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(format!("Failed to close: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_frames_are_envelopes() {
        assert_eq!(
            classify(Message::Text(r#"{"type":"LeaveRoom"}"#.into())),
            Incoming::Envelope(r#"{"type":"LeaveRoom"}"#.into())
        );
    }

    #[test]
    fn test_binary_frames() {
        assert_eq!(
            classify(Message::Binary(br#"{"type":"LeaveRoom"}"#.to_vec())),
            Incoming::Envelope(r#"{"type":"LeaveRoom"}"#.into())
        );
        assert_eq!(classify(Message::Binary(vec![0xff, 0xfe])), Incoming::Skip);
    }

    #[test]
    fn test_control_frames() {
        assert_eq!(classify(Message::Ping(vec![1])), Incoming::Skip);
        assert_eq!(classify(Message::Pong(vec![1])), Incoming::Skip);
        assert_eq!(classify(Message::Close(None)), Incoming::Closed);
    }
}
