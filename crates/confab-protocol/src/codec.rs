//! Codec for decoding inbound envelopes and encoding notifications.
//!
//! One JSON document per text frame; no additional framing.

use thiserror::Error;

use crate::events::{Envelope, InboundEvent};
use crate::notifications::Notification;

/// Maximum accepted frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// The frame is not a valid envelope.
    #[error("Invalid JSON envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// A recognized event is missing a required field.
    #[error("{event} is missing required field `{field}`")]
    Malformed {
        event: &'static str,
        field: &'static str,
    },
}

impl ProtocolError {
    /// Whether the frame should be skipped rather than ending the session.
    #[must_use]
    pub fn is_malformed_event(&self) -> bool {
        matches!(self, ProtocolError::Malformed { .. })
    }
}

/// Decode one inbound frame.
///
/// Returns `Ok(None)` when the event type is not recognized.
///
/// # Errors
///
/// Returns an error if the frame is too large, is not a JSON envelope, or
/// lacks a field its event type requires.
pub fn decode(text: &str) -> Result<Option<InboundEvent>, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    let envelope: Envelope = serde_json::from_str(text)?;
    envelope.into_event()
}

/// Encode a notification.
///
/// # Errors
///
/// Returns an error if the encoded notification is too large.
pub fn encode(notification: &Notification) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(notification)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(text)
}

/// Decode a notification, as a client would.
///
/// # Errors
///
/// Returns an error if the text is not a known notification.
pub fn decode_notification(text: &str) -> Result<Notification, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}
