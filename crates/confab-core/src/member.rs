//! Member handles.
//!
//! A member handle is the only way to reach a connected session: it wraps the
//! sending half of the session's bounded outbound queue. Handing a
//! notification to the queue never waits, so a stalled recipient cannot hold
//! up whoever is fanning out.

use crate::ParticipantId;
use confab_protocol::Notification;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, trace, warn};

/// A notification shared between every recipient of one fan-out.
pub type Outbound = Arc<Notification>;

/// Counter for process-unique session IDs.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate the next session ID.
    #[must_use]
    pub fn next() -> Self {
        Self(SESSION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess_{}", self.0)
    }
}

/// Why a notification could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The recipient is not draining its queue fast enough.
    #[error("outbound queue full")]
    Full,

    /// The recipient's writer has shut down.
    #[error("recipient disconnected")]
    Closed,
}

/// Handle to one session's outbound queue.
#[derive(Debug, Clone)]
pub struct MemberHandle {
    session: SessionId,
    participant: ParticipantId,
    sender: mpsc::Sender<Outbound>,
}

impl MemberHandle {
    /// Wrap an existing queue.
    #[must_use]
    pub fn new(
        session: SessionId,
        participant: ParticipantId,
        sender: mpsc::Sender<Outbound>,
    ) -> Self {
        Self {
            session,
            participant,
            sender,
        }
    }

    /// Create a fresh session queue of the given capacity.
    ///
    /// The receiver belongs to the session's writer.
    #[must_use]
    pub fn channel(participant: ParticipantId, capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(SessionId::next(), participant, sender), receiver)
    }

    /// The session behind this handle.
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// The participant behind this handle.
    #[must_use]
    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// Whether the session's writer has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Queue a notification without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is full or closed.
    pub fn try_deliver(&self, notification: Outbound) -> Result<(), DeliveryError> {
        self.sender.try_send(notification).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Queue a notification, handling failure for this recipient only.
    ///
    /// A failed delivery is logged and the notification's failure notice is
    /// attempted on the same queue; if that also fails it is logged and
    /// dropped. Returns `true` if the notification was queued.
    pub fn deliver(&self, room: &str, notification: Outbound) -> bool {
        let err = match self.try_deliver(Arc::clone(&notification)) {
            Ok(()) => {
                trace!(
                    room,
                    participant = self.participant,
                    session = %self.session,
                    kind = notification.type_name(),
                    "Queued notification"
                );
                return true;
            }
            Err(e) => e,
        };

        warn!(
            room,
            participant = self.participant,
            session = %self.session,
            kind = notification.type_name(),
            error = %err,
            "Delivery failed"
        );

        if let Some(notice) = notification.delivery_failure_notice() {
            if let Err(e) = self.try_deliver(Arc::new(notice)) {
                error!(
                    room,
                    participant = self.participant,
                    session = %self.session,
                    error = %e,
                    "Failed to send error response"
                );
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_protocol::Notification;

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::next();
        let b = SessionId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("sess_"));
    }

    #[tokio::test]
    async fn test_deliver_queues_in_order() {
        let (handle, mut rx) = MemberHandle::channel(1, 8);
        let room = "room";

        assert!(handle.deliver(room, Arc::new(Notification::left("room", 2))));
        assert!(handle.deliver(room, Arc::new(Notification::left("room", 3))));

        assert_eq!(*rx.recv().await.unwrap(), Notification::left("room", 2));
        assert_eq!(*rx.recv().await.unwrap(), Notification::left("room", 3));
    }

    #[test]
    fn test_closed_queue_is_a_delivery_failure() {
        let (handle, rx) = MemberHandle::channel(1, 8);
        drop(rx);

        assert!(handle.is_closed());
        assert_eq!(
            handle.try_deliver(Arc::new(Notification::left("room", 2))),
            Err(DeliveryError::Closed)
        );
        assert!(!handle.deliver("room", Arc::new(Notification::left("room", 2))));
    }

    #[test]
    fn test_full_queue_is_a_delivery_failure() {
        let (handle, mut rx) = MemberHandle::channel(1, 1);
        let room = "room";

        assert!(handle.deliver(room, Arc::new(Notification::left("room", 2))));
        // Queue is full; the failure notice cannot be queued either.
        assert!(!handle.deliver(room, Arc::new(Notification::left("room", 3))));

        assert_eq!(*rx.try_recv().unwrap(), Notification::left("room", 2));
        assert!(rx.try_recv().is_err());
    }
}
