//! `im-stream`: conversation event stream over Server-Sent Events.
//!
//! [`EventStreamConsumer::open`] returns a [`StreamHandle`] that yields
//! [`im_domain::StreamEvent`]s in order, reconnecting with exponential
//! backoff and `Last-Event-ID` resumption when the connection drops.
//! Failures the caller must act on arrive as `StreamEvent::Error` events
//! and as the final [`StreamOutcome`].

pub mod backoff;
pub mod consumer;
pub mod decode;
pub mod sse;
pub mod state;
pub mod target;

pub use backoff::Backoff;
pub use consumer::{EventStreamConsumer, StreamHandle};
pub use sse::{SseDecoder, SseFrame};
pub use state::{CloseReason, StreamOutcome, StreamState};
pub use target::StreamTarget;
