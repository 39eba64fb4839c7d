//! # confab-transport
//!
//! Transport abstraction for confab sessions.
//!
//! A session reads raw envelopes from an [`EventSource`] and writes
//! notifications to an [`EventSink`]. The two halves are separate so the
//! inbound loop and the outbound writer can run as independent tasks.
//!
//! - **WebSocket** - axum WebSocket connections, split into halves
//! - **Memory** - channel-backed pairs for tests and embedding
//!
//! ```rust,ignore
//! use confab_transport::{EventSink, EventSource};
//!
//! async fn echo(mut source: impl EventSource, mut sink: impl EventSink) {
//!     while let Ok(Some(text)) = source.recv().await {
//!         // Decode and dispatch
//!     }
//!     let _ = sink.close().await;
//! }
//! ```

pub mod memory;
pub mod traits;
pub mod websocket;

pub use traits::{EventSink, EventSource, TransportError};
