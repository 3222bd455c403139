//! Core types shared by the session and its collaborators: errors,
//! callbacks, messages, and subscription requests/handles.

use std::fmt;
use std::sync::Arc;

use crate::options::SubscribeOptions;

/// Errors surfaced by the client.
///
/// Listeners registered for [`EventKind::Error`](crate::events::EventKind)
/// receive these by reference; futures returned by the session fail with
/// them.
#[derive(thiserror::Error, Debug)]
pub enum NatsError {
    #[error("subject required")]
    SubjectRequired,
    #[error("closed")]
    Closed,
    #[error("websocket: {0}")]
    WebSocket(String),
    #[error("handshake: {0}")]
    Handshake(String),
    #[error("server: {0}")]
    Server(String),
    #[error("protocol: {0}")]
    Protocol(#[from] nw_protocol::ProtocolError),
}

impl NatsError {
    /// Stable short name for matching on the error without its payload.
    pub fn kind(&self) -> &'static str {
        match self {
            NatsError::SubjectRequired => "subject_required",
            NatsError::Closed => "closed",
            NatsError::WebSocket(_) => "websocket",
            NatsError::Handshake(_) => "handshake",
            NatsError::Server(_) => "server",
            NatsError::Protocol(_) => "protocol",
        }
    }
}

/// A message delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msg {
    pub subject: String,
    pub sid: u64,
    pub reply: Option<String>,
    pub data: String,
}

/// Invoked for every message delivered to a subscription.
pub type MsgCallback = Arc<dyn Fn(Msg) + Send + Sync>;

/// Listener for the `close` event.
pub type CloseListener = Arc<dyn Fn() + Send + Sync>;

/// Listener for the `error` event.
pub type ErrorListener = Arc<dyn Fn(&NatsError) + Send + Sync>;

/// Completion for a flush: runs once the server has acknowledged every
/// command sent before it.
pub type FlushCallback = Box<dyn FnOnce() + Send>;

/// What the session hands to the protocol collaborator on `subscribe`.
#[derive(Clone)]
pub struct SubscriptionRequest {
    pub subject: String,
    pub queue: Option<String>,
    pub max: Option<u64>,
    pub callback: MsgCallback,
}

impl SubscriptionRequest {
    /// Start from the caller's options, then set subject and callback.
    pub fn new(subject: impl Into<String>, callback: MsgCallback, options: SubscribeOptions) -> Self {
        let SubscribeOptions { queue, max } = options;
        Self {
            subject: subject.into(),
            queue,
            max,
            callback,
        }
    }
}

impl fmt::Debug for SubscriptionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRequest")
            .field("subject", &self.subject)
            .field("queue", &self.queue)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

/// Handle for a registered interest in a subject.
///
/// Created by the protocol collaborator; the session only passes it back
/// to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    sid: u64,
    subject: String,
    queue: Option<String>,
    max: Option<u64>,
}

impl Subscription {
    pub fn new(sid: u64, request: &SubscriptionRequest) -> Self {
        Self {
            sid,
            subject: request.subject.clone(),
            queue: request.queue.clone(),
            max: request.max,
        }
    }

    pub fn sid(&self) -> u64 {
        self.sid
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }

    pub fn max(&self) -> Option<u64> {
        self.max
    }
}
