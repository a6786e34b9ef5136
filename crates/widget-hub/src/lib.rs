//! # widget-hub
//!
//! Pushes admin notifications to every connected websocket client.
//!
//! ```text
//!  client ──read loop──┐
//!  client ──read loop──┼──▶ mpsc (bounded) ──▶ HubWorker ──▶ broadcast ──▶ every client
//!  server ──publish────┘
//! ```
//!
//! The registry is private to [`Hub`]; connections enter through
//! [`Hub::register`] and leave through a failed write or the end of their
//! read loop.

mod error;
mod event;
mod hub;

pub use error::{HubError, Result};
pub use event::{ACTION_DELETE_USER, ACTION_LOGOUT, Envelope, HubEvent, Notice};
pub use hub::{
    BroadcastReport, ClientSink, ConnectionId, DEFAULT_EVENT_CAPACITY, DEFAULT_WRITE_TIMEOUT, Hub,
    HubWorker,
};
