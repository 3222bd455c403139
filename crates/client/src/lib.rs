//! `nw-client`: NATS client session over a pluggable transport.
//!
//! The [`Session`] is the boundary between application code and the wire
//! protocol.  It validates what the application asks for, forwards the
//! work to a protocol collaborator, and fans lifecycle events out to
//! registered listeners.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Application                                                 │
//! │    Session::connect(opts).await? ── publish / subscribe /    │
//! │                                     flush / close            │
//! └───────────────┬──────────────────────────────▲───────────────┘
//!                 │ commands                     │ close / error
//! ┌───────────────▼──────────────┐     ┌─────────┴──────────────┐
//! │  Protocol  (WsProtocol)      │────▶│  HandlerSink           │
//! │    sid allocation, PING/PONG │     │  (EventRegistry)       │
//! │    MSG routing               │     └────────────────────────┘
//! └───────────────┬──────────────┘
//! ┌───────────────▼──────────────┐
//! │  Transport (WsTransport)     │  is_closed() is authoritative
//! └──────────────────────────────┘
//! ```
//!
//! # Errors
//!
//! - An empty publish subject is reported to `error` listeners, never
//!   returned.
//! - `subscribe` on a closed session fails with [`NatsError::Closed`].
//! - A failed handshake fails `connect`; no session is produced.
//! - A panicking listener is isolated: the rest still run.

pub mod events;
pub mod options;
pub mod session;
pub mod traits;
pub mod types;
pub mod ws;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use events::{ClientEvent, EventKind, EventRegistry};
pub use options::{ConnectOptions, ConnectionOptions, SubscribeOptions};
pub use session::Session;
pub use traits::{Connector, HandlerSink, Protocol, Transport};
pub use types::{
    CloseListener, ErrorListener, FlushCallback, Msg, MsgCallback, NatsError, Subscription,
    SubscriptionRequest,
};
pub use ws::{WsConnector, WsProtocol, WsTransport};

pub use nw_protocol::DEFAULT_URL;
