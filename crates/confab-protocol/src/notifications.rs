//! Outbound notification types.
//!
//! Notifications are serialized as JSON objects tagged by `type`. Field names
//! follow the wire contract exactly (`messageID`, `chatRoom`, `sentAt`, ...).

use crate::{ParticipantId, RoomId, Timestamp};
use serde::{Deserialize, Serialize};

/// Error categories reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// The message could not be persisted.
    HistoryInsertFailed,
    /// The read receipt could not be persisted.
    ReadStatusInsertFailed,
    /// A notification could not be delivered to this recipient.
    DeliveryFailed,
    /// A departure notice could not be delivered to this recipient.
    DepartureDeliveryFailed,
}

impl ErrorKind {
    /// Human-readable reason sent alongside the kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::HistoryInsertFailed => "Failed to insert message into history",
            ErrorKind::ReadStatusInsertFailed => {
                "Failed to insert message into message read status"
            }
            ErrorKind::DeliveryFailed => "Failed to send message to receiver",
            ErrorKind::DepartureDeliveryFailed => "Failed to send to disconnected message",
        }
    }
}

/// Payload shared by both read-receipt notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadMark {
    #[serde(rename = "roomID")]
    pub room_id: RoomId,
    #[serde(rename = "messageID")]
    pub message_id: String,
    #[serde(rename = "readStatusID")]
    pub read_status_id: String,
    #[serde(rename = "readAt")]
    pub read_at: Timestamp,
}

/// Body of an `Error` notification.
///
/// Only the fields relevant to the failing operation are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(rename = "messageID", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(rename = "chatRoom", default, skip_serializing_if = "Option::is_none")]
    pub chat_room: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<ParticipantId>,
    #[serde(rename = "sentAt", default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<Timestamp>,
    #[serde(rename = "roomID", default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(rename = "messageSender", default, skip_serializing_if = "Option::is_none")]
    pub message_sender: Option<ParticipantId>,
    #[serde(rename = "messageReader", default, skip_serializing_if = "Option::is_none")]
    pub message_reader: Option<ParticipantId>,
    #[serde(rename = "readStatusID", default, skip_serializing_if = "Option::is_none")]
    pub read_status_id: Option<String>,
    #[serde(rename = "readAt", default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<Timestamp>,
}

impl ErrorNotice {
    /// Create a notice with only a kind and its description.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.description().to_string(),
            message_id: None,
            chat_room: None,
            sender: None,
            sent_at: None,
            room_id: None,
            message_sender: None,
            message_reader: None,
            read_status_id: None,
            read_at: None,
        }
    }

    /// Attach the identifiers of a chat message.
    #[must_use]
    pub fn with_message(
        mut self,
        message_id: impl Into<String>,
        chat_room: impl Into<RoomId>,
        sender: ParticipantId,
        sent_at: Timestamp,
    ) -> Self {
        self.message_id = Some(message_id.into());
        self.chat_room = Some(chat_room.into());
        self.sender = Some(sender);
        self.sent_at = Some(sent_at);
        self
    }

    /// Attach the identifiers of a read receipt.
    #[must_use]
    pub fn with_receipt(
        mut self,
        room_id: impl Into<RoomId>,
        message_id: impl Into<String>,
        read_status_id: impl Into<String>,
        read_at: Timestamp,
    ) -> Self {
        self.room_id = Some(room_id.into());
        self.message_id = Some(message_id.into());
        self.read_status_id = Some(read_status_id.into());
        self.read_at = Some(read_at);
        self
    }

    /// Attach the participants named by a read receipt.
    #[must_use]
    pub fn with_participants(mut self, sender: ParticipantId, reader: ParticipantId) -> Self {
        self.message_sender = Some(sender);
        self.message_reader = Some(reader);
        self
    }

    /// Attach only a room identifier.
    #[must_use]
    pub fn with_room(mut self, chat_room: impl Into<RoomId>) -> Self {
        self.chat_room = Some(chat_room.into());
        self
    }
}

/// A server-to-client notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    /// A message was persisted and is being fanned out.
    ReceivedMessage {
        #[serde(rename = "messageID")]
        message_id: String,
        content: String,
        #[serde(rename = "chatRoom")]
        chat_room: RoomId,
        sender: ParticipantId,
        #[serde(rename = "sentAt")]
        sent_at: Timestamp,
    },

    /// Sent to the author of a message that was just read.
    MarkedMessageToSender(ReadMark),

    /// Sent to the participant who just read a message.
    MarkedMessageFromReader(ReadMark),

    /// A participant left the room.
    LeftChat {
        message: String,
        #[serde(rename = "chatRoom")]
        chat_room: RoomId,
        /// Present when the departure was caused by a disconnect.
        #[serde(
            rename = "businessPartner",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        business_partner: Option<ParticipantId>,
    },

    /// Something failed; correlating identifiers are attached.
    Error(ErrorNotice),
}

impl Notification {
    /// Get the wire name of this notification.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Notification::ReceivedMessage { .. } => "ReceivedMessage",
            Notification::MarkedMessageToSender(_) => "MarkedMessageToSender",
            Notification::MarkedMessageFromReader(_) => "MarkedMessageFromReader",
            Notification::LeftChat { .. } => "LeftChat",
            Notification::Error(_) => "Error",
        }
    }

    /// Create a `LeftChat` for a voluntary departure.
    #[must_use]
    pub fn left(chat_room: impl Into<RoomId>, participant: ParticipantId) -> Self {
        Notification::LeftChat {
            message: format!("Participant {} left the chat", participant),
            chat_room: chat_room.into(),
            business_partner: None,
        }
    }

    /// Create a `LeftChat` for a departure caused by a disconnect.
    #[must_use]
    pub fn disconnected(chat_room: impl Into<RoomId>, participant: ParticipantId) -> Self {
        Notification::LeftChat {
            message: format!("Disconnected user {}", participant),
            chat_room: chat_room.into(),
            business_partner: Some(participant),
        }
    }

    /// The `Error` attempted back to a recipient this notification could not
    /// be delivered to. Errors themselves have no follow-up.
    #[must_use]
    pub fn delivery_failure_notice(&self) -> Option<Notification> {
        let notice = match self {
            Notification::ReceivedMessage {
                message_id,
                chat_room,
                sender,
                sent_at,
                ..
            } => ErrorNotice::new(ErrorKind::DeliveryFailed).with_message(
                message_id.clone(),
                chat_room.clone(),
                *sender,
                *sent_at,
            ),
            Notification::MarkedMessageToSender(mark)
            | Notification::MarkedMessageFromReader(mark) => {
                ErrorNotice::new(ErrorKind::DeliveryFailed).with_receipt(
                    mark.room_id.clone(),
                    mark.message_id.clone(),
                    mark.read_status_id.clone(),
                    mark.read_at,
                )
            }
            Notification::LeftChat { chat_room, .. } => {
                ErrorNotice::new(ErrorKind::DepartureDeliveryFailed).with_room(chat_room.clone())
            }
            Notification::Error(_) => return None,
        };
        Some(Notification::Error(notice))
    }
}

impl From<ErrorNotice> for Notification {
    fn from(notice: ErrorNotice) -> Self {
        Notification::Error(notice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn ts() -> Timestamp {
        "2024-05-01 12:00:00.000001".parse().unwrap()
    }

    #[test]
    fn test_received_message_wire_shape() {
        let n = Notification::ReceivedMessage {
            message_id: "m-1".into(),
            content: "hi".into(),
            chat_room: "room-a".into(),
            sender: 7,
            sent_at: ts(),
        };
        let value: Value = serde_json::to_value(&n).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "ReceivedMessage",
                "messageID": "m-1",
                "content": "hi",
                "chatRoom": "room-a",
                "sender": 7,
                "sentAt": "2024-05-01 12:00:00.000001"
            })
        );
    }

    #[test]
    fn test_read_mark_wire_shape() {
        let n = Notification::MarkedMessageFromReader(ReadMark {
            room_id: "room-a".into(),
            message_id: "m-1".into(),
            read_status_id: "r-1".into(),
            read_at: ts(),
        });
        let value: Value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["type"], "MarkedMessageFromReader");
        assert_eq!(value["roomID"], "room-a");
        assert_eq!(value["readStatusID"], "r-1");
        assert_eq!(value["readAt"], "2024-05-01 12:00:00.000001");
    }

    #[test]
    fn test_left_chat_business_partner_only_on_disconnect() {
        let voluntary = serde_json::to_value(Notification::left("room-a", 3)).unwrap();
        assert!(voluntary.get("businessPartner").is_none());
        assert_eq!(voluntary["chatRoom"], "room-a");

        let dropped = serde_json::to_value(Notification::disconnected("room-a", 3)).unwrap();
        assert_eq!(dropped["businessPartner"], 3);
        assert_eq!(dropped["message"], "Disconnected user 3");
    }

    #[test]
    fn test_error_omits_irrelevant_fields() {
        let n: Notification = ErrorNotice::new(ErrorKind::HistoryInsertFailed)
            .with_message("m-1", "room-a", 7, ts())
            .into();
        let value: Value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["type"], "Error");
        assert_eq!(value["kind"], "history-insert-failed");
        assert_eq!(value["message"], "Failed to insert message into history");
        assert_eq!(value["messageID"], "m-1");
        assert_eq!(value["sender"], 7);
        assert!(value.get("readStatusID").is_none());
        assert!(value.get("roomID").is_none());
    }

    #[test]
    fn test_delivery_failure_notice() {
        let n = Notification::ReceivedMessage {
            message_id: "m-1".into(),
            content: "hi".into(),
            chat_room: "room-a".into(),
            sender: 7,
            sent_at: ts(),
        };
        match n.delivery_failure_notice() {
            Some(Notification::Error(notice)) => {
                assert_eq!(notice.kind, ErrorKind::DeliveryFailed);
                assert_eq!(notice.message_id.as_deref(), Some("m-1"));
            }
            other => panic!("unexpected notice: {:?}", other),
        }

        match Notification::disconnected("room-a", 1).delivery_failure_notice() {
            Some(Notification::Error(notice)) => {
                assert_eq!(notice.kind, ErrorKind::DepartureDeliveryFailed)
            }
            other => panic!("unexpected notice: {:?}", other),
        }

        let error: Notification = ErrorNotice::new(ErrorKind::DeliveryFailed).into();
        assert!(error.delivery_failure_notice().is_none());
    }
}
