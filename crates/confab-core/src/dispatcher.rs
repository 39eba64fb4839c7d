//! Persist-then-broadcast handling of inbound events.
//!
//! The dispatcher holds no state of its own. For each event it performs the
//! durable write first and only then reads a membership snapshot to fan out,
//! so nothing is ever broadcast that was not persisted.

use crate::member::MemberHandle;
use crate::model::{Message, ReadReceipt};
use crate::registry::{Delivery, RoomRegistry};
use crate::store::MessageStore;
use crate::ParticipantId;
use confab_protocol::{ErrorKind, ErrorNotice, Notification, ReadMark};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The event was handled and fanned out.
    Delivered(Delivery),
    /// The durable write failed; only the originating session was told.
    PersistFailed(ErrorKind),
    /// The participant had no live entry to remove.
    NotPresent,
}

impl DispatchOutcome {
    /// The fan-out report, if one happened.
    #[must_use]
    pub fn delivery(&self) -> Option<Delivery> {
        match self {
            DispatchOutcome::Delivered(delivery) => Some(*delivery),
            _ => None,
        }
    }
}

/// Dispatches validated events against the registry and the store.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<RoomRegistry>,
    store: Arc<dyn MessageStore>,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(registry: Arc<RoomRegistry>, store: Arc<dyn MessageStore>) -> Self {
        Self { registry, store }
    }

    /// The registry this dispatcher fans out through.
    #[must_use]
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Persist a message from `origin` and broadcast it to the whole room,
    /// the sender included.
    pub async fn send_message(
        &self,
        room: &str,
        origin: &MemberHandle,
        message_id: String,
        content: String,
    ) -> DispatchOutcome {
        let message = Message::new(message_id, room, origin.participant(), content);

        if let Err(e) = self.store.append_message(&message).await {
            warn!(
                room = %room,
                participant = message.sender,
                message_id = %message.id,
                error = %e,
                "Failed to insert message into history"
            );
            let notice = ErrorNotice::new(ErrorKind::HistoryInsertFailed).with_message(
                message.id,
                room,
                message.sender,
                message.sent_at,
            );
            origin.deliver(room, Arc::new(notice.into()));
            return DispatchOutcome::PersistFailed(ErrorKind::HistoryInsertFailed);
        }

        debug!(room = %room, participant = message.sender, message_id = %message.id, "Message stored");

        let delivery = self.registry.broadcast_all(
            room,
            Notification::ReceivedMessage {
                message_id: message.id,
                content: message.content,
                chat_room: message.room,
                sender: message.sender,
                sent_at: message.sent_at,
            },
        );
        DispatchOutcome::Delivered(delivery)
    }

    /// Persist a read receipt and tell the message's sender and its reader.
    ///
    /// `sender` and `reader` are taken as given; they are not checked against
    /// message ownership or room membership. A member matching both only
    /// receives the sender's notification.
    pub async fn mark_read(
        &self,
        room: &str,
        origin: &MemberHandle,
        message_id: String,
        sender: ParticipantId,
        reader: ParticipantId,
    ) -> DispatchOutcome {
        let receipt = ReadReceipt::new(message_id, reader);

        if let Err(e) = self.store.append_read_receipt(&receipt).await {
            warn!(
                room = %room,
                participant = origin.participant(),
                message_id = %receipt.message_id,
                error = %e,
                "Failed to insert message into message read status"
            );
            let notice = ErrorNotice::new(ErrorKind::ReadStatusInsertFailed)
                .with_receipt(room, receipt.message_id, receipt.id, receipt.read_at)
                .with_participants(sender, reader);
            origin.deliver(room, Arc::new(notice.into()));
            return DispatchOutcome::PersistFailed(ErrorKind::ReadStatusInsertFailed);
        }

        let mark = ReadMark {
            room_id: room.to_string(),
            message_id: receipt.message_id,
            read_status_id: receipt.id,
            read_at: receipt.read_at,
        };
        let to_sender = Arc::new(Notification::MarkedMessageToSender(mark.clone()));
        let from_reader = Arc::new(Notification::MarkedMessageFromReader(mark));

        let mut delivery = Delivery::default();
        for (participant, handle) in &self.registry.snapshot(room) {
            let notification = if *participant == sender {
                &to_sender
            } else if *participant == reader {
                &from_reader
            } else {
                continue;
            };
            delivery.record(handle.deliver(room, Arc::clone(notification)));
        }

        debug!(room = %room, sender, reader, delivered = delivery.delivered, "Read receipt stored");
        DispatchOutcome::Delivered(delivery)
    }

    /// Remove `origin` from the room and tell the remaining members.
    ///
    /// Does nothing if `origin` no longer holds the participant's entry, so a
    /// repeated leave broadcasts nothing.
    pub fn leave_room(&self, room: &str, origin: &MemberHandle) -> DispatchOutcome {
        self.depart(room, origin, Notification::left(room, origin.participant()))
    }

    /// Like [`leave_room`](Self::leave_room), for a session whose transport
    /// went away. The notice names the departed participant.
    pub fn disconnect(&self, room: &str, origin: &MemberHandle) -> DispatchOutcome {
        self.depart(room, origin, Notification::disconnected(room, origin.participant()))
    }

    fn depart(&self, room: &str, origin: &MemberHandle, notice: Notification) -> DispatchOutcome {
        let participant = origin.participant();

        if self
            .registry
            .leave_session(room, participant, origin.session())
            .is_none()
        {
            debug!(room = %room, participant, session = %origin.session(), "Departure for absent member");
            return DispatchOutcome::NotPresent;
        }

        info!(room = %room, participant, session = %origin.session(), "Participant departed");
        DispatchOutcome::Delivered(self.registry.broadcast_all(room, notice))
    }
}
