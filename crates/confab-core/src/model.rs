//! Durable records and the read models served over HTTP.
//!
//! Read models keep the column names of the underlying tables as their JSON
//! field names; nullable columns serialize as `null`.

use crate::{ParticipantId, RoomId};
use confab_protocol::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat message accepted from a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Client-supplied identifier.
    pub id: String,
    pub room: RoomId,
    pub sender: ParticipantId,
    pub content: String,
    /// Assigned on receipt, never by the client.
    pub sent_at: Timestamp,
}

impl Message {
    /// Create a message stamped with the current time.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        room: impl Into<RoomId>,
        sender: ParticipantId,
        content: impl Into<String>,
    ) -> Self {
        Self::with_sent_at(id, room, sender, content, Timestamp::now())
    }

    /// Create a message with an explicit timestamp.
    #[must_use]
    pub fn with_sent_at(
        id: impl Into<String>,
        room: impl Into<RoomId>,
        sender: ParticipantId,
        content: impl Into<String>,
        sent_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            room: room.into(),
            sender,
            content: content.into(),
            sent_at,
        }
    }
}

/// Attestation that `reader` has read `message_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    /// Server-generated, globally unique.
    pub id: String,
    pub message_id: String,
    pub reader: ParticipantId,
    pub read_at: Timestamp,
}

impl ReadReceipt {
    /// Create a receipt with a fresh identifier and the current time.
    #[must_use]
    pub fn new(message_id: impl Into<String>, reader: ParticipantId) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_id: message_id.into(),
            reader,
            read_at: Timestamp::now(),
        }
    }
}

/// One row of a room's history: a message with its read receipt, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HistoryEntry {
    #[serde(rename = "MessageID")]
    pub message_id: String,
    pub chat_room: RoomId,
    pub business_partner: ParticipantId,
    pub content: String,
    pub sent_at: Timestamp,
    #[serde(rename = "ReadStatusID")]
    pub read_status_id: Option<String>,
    pub read_at: Option<Timestamp>,
}

impl HistoryEntry {
    /// Join a message with an optional receipt.
    #[must_use]
    pub fn from_parts(message: &Message, receipt: Option<&ReadReceipt>) -> Self {
        Self {
            message_id: message.id.clone(),
            chat_room: message.room.clone(),
            business_partner: message.sender,
            content: message.content.clone(),
            sent_at: message.sent_at,
            read_status_id: receipt.map(|r| r.id.clone()),
            read_at: receipt.map(|r| r.read_at),
        }
    }
}

/// A participant's public profile with localized region names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Profile {
    pub business_partner: ParticipantId,
    pub business_partner_type: String,
    pub nick_name: String,
    pub profile_comment: Option<String>,
    pub preferable_local_sub_region: String,
    pub preferable_local_region: String,
    pub preferable_country: String,
    pub local_region_name: Option<String>,
    pub local_sub_region_name: Option<String>,
}

/// A document (typically an avatar image) attached to a participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PartnerDoc {
    pub business_partner: ParticipantId,
    pub doc_type: String,
    #[serde(rename = "DocVersionID")]
    pub doc_version_id: i32,
    #[serde(rename = "DocID")]
    pub doc_id: String,
    pub file_extension: String,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub doc_issuer_business_partner: Option<ParticipantId>,
}
