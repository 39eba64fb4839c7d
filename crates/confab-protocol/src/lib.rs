//! # confab-protocol
//!
//! Wire protocol definitions for the confab room gateway.
//!
//! Every WebSocket text frame carries exactly one JSON envelope. Clients send
//! `{type, content?, messageID?, messageSender?, messageReader?}` and the
//! server answers with `type`-tagged notifications.
//!
//! ## Inbound events
//!
//! - `SendMessage` - Post a message to the room
//! - `LeaveRoom` - Leave the room gracefully
//! - `MarkMessageAsRead` - Record a read receipt
//!
//! ## Outbound notifications
//!
//! - `ReceivedMessage` / `LeftChat`
//! - `MarkedMessageToSender` / `MarkedMessageFromReader`
//! - `Error`
//!
//! ## Example
//!
//! ```rust
//! use confab_protocol::{codec, InboundEvent};
//!
//! let raw = r#"{"type":"SendMessage","messageID":"m-1","content":"hi"}"#;
//! let event = codec::decode(raw).unwrap();
//! assert!(matches!(event, Some(InboundEvent::SendMessage { .. })));
//! ```

pub mod codec;
pub mod events;
pub mod notifications;
pub mod timestamp;

pub use codec::{decode, encode, ProtocolError};
pub use events::{Envelope, EventKind, InboundEvent};
pub use notifications::{ErrorKind, ErrorNotice, Notification, ReadMark};
pub use timestamp::Timestamp;

/// A room identifier. Opaque, created outside the gateway.
pub type RoomId = String;

/// A participant (business partner) identifier.
pub type ParticipantId = i64;
