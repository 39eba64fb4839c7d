//! # confab-core
//!
//! Live room membership and event dispatch for the confab gateway.
//!
//! This crate provides the building blocks a connection session drives:
//!
//! - **Registry** - Who is connected to which room right now
//! - **Member** - A session's handle to its serialized outbound queue
//! - **Dispatcher** - Persist-then-broadcast handling of inbound events
//! - **Store** - Persistence ports, plus an in-memory implementation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Session   │────▶│ Dispatcher  │────▶│    Store    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                   │
//!        ▼                   ▼
//!                     ┌─────────────┐
//!        join/leave──▶│  Registry   │──▶ member queues
//!                     └─────────────┘
//! ```

pub mod dispatcher;
pub mod member;
pub mod memory;
pub mod model;
pub mod registry;
pub mod store;

pub use confab_protocol::{ParticipantId, RoomId};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use member::{DeliveryError, MemberHandle, Outbound, SessionId};
pub use memory::MemoryStore;
pub use model::{HistoryEntry, Message, PartnerDoc, Profile, ReadReceipt};
pub use registry::{
    validate_room_id, Delivery, Membership, RegistryConfig, RegistryStats, RoomRegistry,
};
pub use store::{ConversationStore, MessageStore, StoreError, StoreResult};
