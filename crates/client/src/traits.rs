//! Contracts between the session and the wire-level collaborators.
//!
//! The session never speaks the protocol itself.  A [`Connector`] performs
//! the handshake and hands back a [`Protocol`] handle; the handle owns the
//! [`Transport`], and reports wire-level events back through the
//! [`HandlerSink`] it was given at connect time.

use std::sync::Arc;

use async_trait::async_trait;

use crate::options::ConnectionOptions;
use crate::types::{FlushCallback, NatsError, Subscription, SubscriptionRequest};

/// Establishes a connection and completes the protocol handshake.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Resolves only once the server has accepted the client.  `handlers`
    /// receives every `error`/`close` event for the life of the connection.
    async fn connect(
        &self,
        options: &ConnectionOptions,
        handlers: Arc<dyn HandlerSink>,
    ) -> Result<Box<dyn Protocol>, NatsError>;
}

/// A connected protocol state machine.
pub trait Protocol: Send + Sync {
    /// Send a fully-rendered command, terminator included.
    fn send_command(&self, raw: String);

    /// Register interest in `request.subject` and return the handle.
    fn subscribe(&self, request: SubscriptionRequest) -> Result<Subscription, NatsError>;

    /// Run `on_complete` once the server has processed everything sent so far.
    fn flush(&self, on_complete: Option<FlushCallback>);

    fn close(&self);

    /// The transport carrying this protocol.  Same instance on every call.
    fn transport(&self) -> Arc<dyn Transport>;
}

/// The byte-stream underneath the protocol.
pub trait Transport: Send + Sync {
    /// Authoritative closed status.
    fn is_closed(&self) -> bool;
}

/// Receives wire-level events from the collaborators.
pub trait HandlerSink: Send + Sync {
    fn error_handler(&self, error: &NatsError);
    fn close_handler(&self);
}
