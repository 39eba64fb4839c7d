//! In-process store.
//!
//! Backs the gateway when no database is configured, and serves as the test
//! double for dispatch. Appends can be made to fail on demand.

use crate::model::{HistoryEntry, Message, PartnerDoc, Profile, ReadReceipt};
use crate::store::{ConversationStore, MessageStore, StoreError, StoreResult};
use crate::{ParticipantId, RoomId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    /// Rooms keyed by the ordered participant pair.
    rooms: HashMap<(ParticipantId, ParticipantId), RoomId>,
    /// Messages keyed by ID; a repeated ID overwrites.
    messages: HashMap<String, Message>,
    receipts: Vec<ReadReceipt>,
    profiles: HashMap<ParticipantId, Profile>,
    docs: Vec<PartnerDoc>,
}

/// A [`MessageStore`] and [`ConversationStore`] held in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_messages: AtomicBool,
    fail_receipts: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // Every write leaves the tables consistent, so a poisoned lock is usable.
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make subsequent message appends fail (or succeed again).
    pub fn set_fail_messages(&self, fail: bool) {
        self.fail_messages.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent receipt appends fail (or succeed again).
    pub fn set_fail_receipts(&self, fail: bool) {
        self.fail_receipts.store(fail, Ordering::SeqCst);
    }

    /// All stored messages, in no particular order.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.tables().messages.values().cloned().collect()
    }

    /// All stored receipts, in append order.
    #[must_use]
    pub fn receipts(&self) -> Vec<ReadReceipt> {
        self.tables().receipts.clone()
    }

    /// Add or replace a participant's profile.
    pub fn insert_profile(&self, profile: Profile) {
        self.tables().profiles.insert(profile.business_partner, profile);
    }

    /// Add a participant document.
    pub fn insert_doc(&self, doc: PartnerDoc) {
        self.tables().docs.push(doc);
    }
}

fn pair_key(a: ParticipantId, b: ParticipantId) -> (ParticipantId, ParticipantId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append_message(&self, message: &Message) -> StoreResult<()> {
        if self.fail_messages.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("message appends disabled".into()));
        }

        let mut tables = self.tables();
        if tables
            .messages
            .insert(message.id.clone(), message.clone())
            .is_some()
        {
            debug!(message_id = %message.id, room = %message.room, "Overwrote message");
        }
        Ok(())
    }

    async fn append_read_receipt(&self, receipt: &ReadReceipt) -> StoreResult<()> {
        if self.fail_receipts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("receipt appends disabled".into()));
        }

        self.tables().receipts.push(receipt.clone());
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_or_find_room(
        &self,
        creator: ParticipantId,
        partner: ParticipantId,
    ) -> StoreResult<RoomId> {
        let mut tables = self.tables();
        let room = tables
            .rooms
            .entry(pair_key(creator, partner))
            .or_insert_with(|| Uuid::new_v4().to_string());
        Ok(room.clone())
    }

    async fn fetch_history(&self, room: &str) -> StoreResult<Vec<HistoryEntry>> {
        let tables = self.tables();

        let mut messages: Vec<&Message> = tables
            .messages
            .values()
            .filter(|m| m.room == room)
            .collect();
        messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id)));

        let mut history = Vec::with_capacity(messages.len());
        for message in messages {
            let mut receipts = tables
                .receipts
                .iter()
                .filter(|r| r.message_id == message.id)
                .peekable();

            if receipts.peek().is_none() {
                history.push(HistoryEntry::from_parts(message, None));
            }
            for receipt in receipts {
                history.push(HistoryEntry::from_parts(message, Some(receipt)));
            }
        }
        Ok(history)
    }

    async fn fetch_profile(&self, participant: ParticipantId) -> StoreResult<Vec<Profile>> {
        Ok(self
            .tables()
            .profiles
            .get(&participant)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn fetch_partner_docs(
        &self,
        participants: &[ParticipantId],
    ) -> StoreResult<Vec<PartnerDoc>> {
        Ok(self
            .tables()
            .docs
            .iter()
            .filter(|d| participants.contains(&d.business_partner))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_protocol::Timestamp;

    fn at(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_room_is_found_for_either_order() {
        let store = MemoryStore::new();
        let room = store.create_or_find_room(1, 2).await.unwrap();
        assert_eq!(store.create_or_find_room(2, 1).await.unwrap(), room);
        assert_ne!(store.create_or_find_room(1, 3).await.unwrap(), room);
    }

    #[tokio::test]
    async fn test_history_is_ordered_and_joined() {
        let store = MemoryStore::new();
        let late = Message::with_sent_at("m-2", "room", 1, "second", at("2024-01-01 00:00:02"));
        let early = Message::with_sent_at("m-1", "room", 2, "first", at("2024-01-01 00:00:01"));
        let other = Message::with_sent_at("m-3", "elsewhere", 1, "x", at("2024-01-01 00:00:00"));
        for m in [&late, &early, &other] {
            store.append_message(m).await.unwrap();
        }
        let receipt = ReadReceipt::new("m-1", 1);
        store.append_read_receipt(&receipt).await.unwrap();

        let history = store.fetch_history("room").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message_id, "m-1");
        assert_eq!(history[0].read_status_id.as_deref(), Some(receipt.id.as_str()));
        assert_eq!(history[1].message_id, "m-2");
        assert!(history[1].read_at.is_none());
    }

    #[tokio::test]
    async fn test_message_id_collision_overwrites() {
        let store = MemoryStore::new();
        store.append_message(&Message::new("m-1", "room", 1, "a")).await.unwrap();
        store.append_message(&Message::new("m-1", "room", 1, "b")).await.unwrap();

        let messages = store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "b");
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        store.set_fail_messages(true);
        assert!(store.append_message(&Message::new("m", "r", 1, "x")).await.is_err());
        assert!(store.append_read_receipt(&ReadReceipt::new("m", 1)).await.is_ok());

        store.set_fail_messages(false);
        store.set_fail_receipts(true);
        assert!(store.append_message(&Message::new("m", "r", 1, "x")).await.is_ok());
        assert!(store.append_read_receipt(&ReadReceipt::new("m", 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_profiles_and_docs() {
        let store = MemoryStore::new();
        store.insert_profile(Profile {
            business_partner: 1,
            nick_name: "ann".into(),
            ..Default::default()
        });
        store.insert_doc(PartnerDoc {
            business_partner: 1,
            doc_id: "d-1".into(),
            ..Default::default()
        });
        store.insert_doc(PartnerDoc {
            business_partner: 9,
            doc_id: "d-9".into(),
            ..Default::default()
        });

        assert_eq!(store.fetch_profile(1).await.unwrap()[0].nick_name, "ann");
        assert!(store.fetch_profile(2).await.unwrap().is_empty());

        let docs = store.fetch_partner_docs(&[1, 2]).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].doc_id, "d-1");
    }
}
