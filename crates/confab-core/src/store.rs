//! Persistence ports.
//!
//! The gateway depends on storage only through these traits. [`MessageStore`]
//! carries the durable side effects of dispatch; [`ConversationStore`] serves
//! the request/response endpoints around it.

use crate::model::{HistoryEntry, Message, PartnerDoc, Profile, ReadReceipt};
use crate::{ParticipantId, RoomId};
use async_trait::async_trait;
use std::error::Error as StdError;
use thiserror::Error;

/// Errors reported by a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("Store backend error: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),

    /// The store cannot serve requests.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Wrap a backend error.
    pub fn backend(err: impl StdError + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable writes performed during dispatch.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message. Must complete before the message is broadcast.
    async fn append_message(&self, message: &Message) -> StoreResult<()>;

    /// Persist a read receipt.
    async fn append_read_receipt(&self, receipt: &ReadReceipt) -> StoreResult<()>;
}

/// Reads and room bookkeeping behind the HTTP endpoints.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Return the room shared by `creator` and `partner`, creating it if
    /// neither ordering of the pair has one yet.
    async fn create_or_find_room(
        &self,
        creator: ParticipantId,
        partner: ParticipantId,
    ) -> StoreResult<RoomId>;

    /// A room's messages ordered by send time, each joined with its receipt.
    async fn fetch_history(&self, room: &str) -> StoreResult<Vec<HistoryEntry>>;

    /// Profile rows for a participant; empty when unknown.
    async fn fetch_profile(&self, participant: ParticipantId) -> StoreResult<Vec<Profile>>;

    /// Documents belonging to any of `participants`.
    async fn fetch_partner_docs(&self, participants: &[ParticipantId])
        -> StoreResult<Vec<PartnerDoc>>;
}
