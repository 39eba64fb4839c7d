//! Inbound event types.
//!
//! Clients send a loosely typed envelope; it is narrowed into an
//! [`InboundEvent`] carrying only the fields each event kind requires.

use crate::codec::ProtocolError;
use crate::ParticipantId;
use serde::Deserialize;
use serde_json::Value;

/// Recognized inbound event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SendMessage,
    LeaveRoom,
    MarkMessageAsRead,
}

impl EventKind {
    /// The wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SendMessage => "SendMessage",
            EventKind::LeaveRoom => "LeaveRoom",
            EventKind::MarkMessageAsRead => "MarkMessageAsRead",
        }
    }

    /// Look up a kind by wire name. Unknown names yield `None`.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "SendMessage" => Some(EventKind::SendMessage),
            "LeaveRoom" => Some(EventKind::LeaveRoom),
            "MarkMessageAsRead" => Some(EventKind::MarkMessageAsRead),
            _ => None,
        }
    }
}

/// The raw inbound envelope as it appears on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    /// Event type name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message content; any JSON value.
    #[serde(default)]
    pub content: Option<Value>,
    /// Client-supplied message identifier.
    #[serde(rename = "messageID", default)]
    pub message_id: Option<String>,
    /// Author of the message being marked as read.
    #[serde(rename = "messageSender", default)]
    pub message_sender: Option<ParticipantId>,
    /// Participant marking the message as read.
    #[serde(rename = "messageReader", default)]
    pub message_reader: Option<ParticipantId>,
}

impl Envelope {
    /// Narrow the envelope into a typed event.
    ///
    /// Returns `Ok(None)` for unrecognized event types.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] when a field required by the
    /// event kind is missing.
    pub fn into_event(self) -> Result<Option<InboundEvent>, ProtocolError> {
        let Some(kind) = EventKind::from_wire(&self.kind) else {
            return Ok(None);
        };

        let event = match kind {
            EventKind::SendMessage => InboundEvent::SendMessage {
                message_id: require(kind, "messageID", self.message_id)?,
                content: render_content(require(kind, "content", self.content)?),
            },
            EventKind::LeaveRoom => InboundEvent::LeaveRoom,
            EventKind::MarkMessageAsRead => InboundEvent::MarkMessageAsRead {
                message_id: require(kind, "messageID", self.message_id)?,
                sender: require(kind, "messageSender", self.message_sender)?,
                reader: require(kind, "messageReader", self.message_reader)?,
            },
        };

        Ok(Some(event))
    }
}

fn require<T>(kind: EventKind, field: &'static str, value: Option<T>) -> Result<T, ProtocolError> {
    value.ok_or(ProtocolError::Malformed {
        event: kind.as_str(),
        field,
    })
}

/// Strings are taken verbatim; anything else is kept as compact JSON text.
fn render_content(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// A validated inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Post a message to the room.
    SendMessage {
        /// Client-supplied identifier, unique per room.
        message_id: String,
        /// Message text.
        content: String,
    },

    /// Leave the room.
    LeaveRoom,

    /// Record that `reader` has read `message_id`, authored by `sender`.
    MarkMessageAsRead {
        message_id: String,
        sender: ParticipantId,
        reader: ParticipantId,
    },
}

impl InboundEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::SendMessage { .. } => EventKind::SendMessage,
            InboundEvent::LeaveRoom => EventKind::LeaveRoom,
            InboundEvent::MarkMessageAsRead { .. } => EventKind::MarkMessageAsRead,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> Envelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_send_message() {
        let event = envelope(json!({"type": "SendMessage", "messageID": "m-1", "content": "hello"}))
            .into_event()
            .unwrap();
        assert_eq!(
            event,
            Some(InboundEvent::SendMessage {
                message_id: "m-1".into(),
                content: "hello".into(),
            })
        );
    }

    #[test]
    fn test_non_string_content_is_rendered() {
        let event = envelope(json!({"type": "SendMessage", "messageID": "m-1", "content": {"n": 1}}))
            .into_event()
            .unwrap();
        match event {
            Some(InboundEvent::SendMessage { content, .. }) => assert_eq!(content, r#"{"n":1}"#),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        let err = envelope(json!({"type": "SendMessage", "content": "x"}))
            .into_event()
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Malformed {
                event: "SendMessage",
                field: "messageID"
            }
        ));

        let err = envelope(json!({"type": "SendMessage", "messageID": "m", "content": null}))
            .into_event()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { field: "content", .. }));

        let err = envelope(json!({"type": "MarkMessageAsRead", "messageID": "m", "messageSender": 1}))
            .into_event()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { field: "messageReader", .. }));
    }

    #[test]
    fn test_leave_room_needs_nothing() {
        let event = envelope(json!({"type": "LeaveRoom"})).into_event().unwrap();
        assert_eq!(event, Some(InboundEvent::LeaveRoom));
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let event = envelope(json!({"type": "Typing", "messageID": "m"}))
            .into_event()
            .unwrap();
        assert_eq!(event, None);
    }

    #[test]
    fn test_event_kind_names() {
        for kind in [EventKind::SendMessage, EventKind::LeaveRoom, EventKind::MarkMessageAsRead] {
            assert_eq!(EventKind::from_wire(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_wire("sendmessage"), None);
    }
}
