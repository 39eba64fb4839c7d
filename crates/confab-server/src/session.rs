//! Connection sessions.
//!
//! A session owns one connection from acceptance to termination:
//!
//! ```text
//! Connecting ──▶ Joined ──▶ Active ──▶ Terminated
//!     │                                    ▲
//!     └── invalid room/participant ────────┘ (before any registry change)
//! ```
//!
//! Inbound events are read and dispatched one at a time. Every notification
//! for the session, whoever produced it, goes through its outbound queue to a
//! single writer task, so writes to the connection never interleave.

use crate::metrics::{self, ConnectionMetricsGuard};
use confab_core::{
    validate_room_id, Dispatcher, MemberHandle, Outbound, ParticipantId, RoomId, SessionId,
};
use confab_protocol::{codec, InboundEvent, ProtocolError};
use confab_transport::{EventSink, EventSource, TransportError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Why a connection was refused before joining.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The participant identifier is not an integer.
    #[error("Invalid business partner `{0}`")]
    InvalidParticipant(String),

    /// The room identifier is unusable.
    #[error("Invalid chat room: {0}")]
    InvalidRoom(&'static str),
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The client sent `LeaveRoom`.
    Left,
    /// The client closed the connection.
    Closed,
    /// Reading from the connection failed.
    TransportError(TransportError),
    /// The client sent something that is not an envelope.
    ProtocolError(ProtocolError),
    /// Nothing arrived within the idle timeout.
    IdleTimeout,
}

impl SessionEnd {
    /// Whether the session ended other than by an explicit leave.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        !matches!(self, SessionEnd::Left)
    }
}

/// A validated connection request, ready to run.
pub struct Session {
    room: RoomId,
    participant: ParticipantId,
    dispatcher: Dispatcher,
    idle_timeout: Option<Duration>,
}

impl Session {
    /// Validate the identifiers taken from the connection request.
    ///
    /// # Errors
    ///
    /// Returns an error if either identifier is invalid; nothing has been
    /// registered in that case.
    pub fn connect(
        room: &str,
        participant: &str,
        dispatcher: Dispatcher,
    ) -> Result<Self, SessionError> {
        let participant = participant
            .parse()
            .map_err(|_| SessionError::InvalidParticipant(participant.to_string()))?;
        validate_room_id(room).map_err(SessionError::InvalidRoom)?;

        Ok(Self {
            room: room.to_string(),
            participant,
            dispatcher,
            idle_timeout: None,
        })
    }

    /// Close the session if the client sends nothing for `timeout`.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// The room this session joins.
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// The participant this session speaks for.
    #[must_use]
    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// Run the session to completion.
    ///
    /// Registers in the room, serves inbound events until the connection
    /// ends, then deregisters. A session that did not end with `LeaveRoom`
    /// announces the departure to whoever is still in the room.
    pub async fn run<S, K>(self, mut source: S, sink: K) -> SessionEnd
    where
        S: EventSource,
        K: EventSink + 'static,
    {
        let _metrics_guard = ConnectionMetricsGuard::new();
        let registry = self.dispatcher.registry();

        // Joined
        let (handle, queue) = registry.open_queue(self.participant);
        let session = handle.session();
        if let Some(replaced) = registry.join(&self.room, handle.clone()) {
            info!(
                room = %self.room,
                participant = self.participant,
                session = %session,
                replaced = %replaced.session(),
                "Replaced earlier session"
            );
        }
        metrics::set_active_rooms(registry.stats().room_count);
        info!(room = %self.room, participant = self.participant, session = %session, "Session joined");

        let writer = tokio::spawn(write_loop(sink, queue, self.room.clone(), session));

        // Active
        let end = self.serve(&mut source, &handle).await;

        // Terminated
        if end.is_disconnect() {
            let outcome = self.dispatcher.disconnect(&self.room, &handle);
            if let Some(delivery) = outcome.delivery().filter(|d| d.failed > 0) {
                metrics::record_delivery_failures(delivery.failed);
            }
        }
        metrics::set_active_rooms(registry.stats().room_count);

        drop(handle);
        if let Err(e) = writer.await {
            error!(room = %self.room, session = %session, error = %e, "Writer task failed");
        }

        match &end {
            SessionEnd::TransportError(e) => warn!(
                room = %self.room,
                participant = self.participant,
                session = %session,
                error = %e,
                "Session terminated by transport error"
            ),
            SessionEnd::ProtocolError(e) => warn!(
                room = %self.room,
                participant = self.participant,
                session = %session,
                error = %e,
                "Session terminated by protocol error"
            ),
            _ => info!(
                room = %self.room,
                participant = self.participant,
                session = %session,
                end = ?end,
                "Session terminated"
            ),
        }
        end
    }

    async fn serve<S: EventSource>(&self, source: &mut S, handle: &MemberHandle) -> SessionEnd {
        loop {
            let next = match self.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, source.recv()).await {
                    Ok(next) => next,
                    Err(_) => return SessionEnd::IdleTimeout,
                },
                None => source.recv().await,
            };

            let text = match next {
                Ok(Some(text)) => text,
                Ok(None) => return SessionEnd::Closed,
                Err(e) => return SessionEnd::TransportError(e),
            };

            let event = match codec::decode(&text) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!(room = %self.room, participant = self.participant, "Ignoring unknown event type");
                    continue;
                }
                Err(e) if e.is_malformed_event() => {
                    warn!(room = %self.room, participant = self.participant, error = %e, "Skipping malformed event");
                    continue;
                }
                Err(e) => return SessionEnd::ProtocolError(e),
            };

            if let Some(end) = self.dispatch(event, handle).await {
                return end;
            }
        }
    }

    /// Hand one event to the dispatcher. Returns how the session ends, if
    /// the event ends it.
    async fn dispatch(&self, event: InboundEvent, handle: &MemberHandle) -> Option<SessionEnd> {
        let kind = event.kind();
        let started = Instant::now();

        let (outcome, end) = match event {
            InboundEvent::SendMessage {
                message_id,
                content,
            } => {
                let outcome = self
                    .dispatcher
                    .send_message(&self.room, handle, message_id, content)
                    .await;
                (outcome, None)
            }
            InboundEvent::MarkMessageAsRead {
                message_id,
                sender,
                reader,
            } => {
                let outcome = self
                    .dispatcher
                    .mark_read(&self.room, handle, message_id, sender, reader)
                    .await;
                (outcome, None)
            }
            InboundEvent::LeaveRoom => (
                self.dispatcher.leave_room(&self.room, handle),
                Some(SessionEnd::Left),
            ),
        };

        metrics::record_dispatch(kind, &outcome, started.elapsed());
        end
    }
}

/// Drain a session's queue onto its connection, one notification at a time.
///
/// A failed write is reported to the client once, if the connection still
/// takes it. The sink is closed when every handle to the queue is gone.
async fn write_loop<K: EventSink>(
    mut sink: K,
    mut queue: mpsc::Receiver<Outbound>,
    room: RoomId,
    session: SessionId,
) {
    while let Some(notification) = queue.recv().await {
        let Err(e) = sink.send(&notification).await else {
            continue;
        };

        warn!(
            room = %room,
            session = %session,
            kind = notification.type_name(),
            error = %e,
            "Failed to write notification"
        );
        metrics::record_delivery_failures(1);

        if let Some(notice) = notification.delivery_failure_notice() {
            if let Err(e) = sink.send(&notice).await {
                error!(room = %room, session = %session, error = %e, "Failed to send error response");
            }
        }
    }

    if let Err(e) = sink.close().await {
        debug!(room = %room, session = %session, error = %e, "Close failed");
    }
}
