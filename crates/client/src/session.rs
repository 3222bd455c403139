//! The application-facing session.

use std::future::{self, Future};
use std::sync::Arc;

use nw_protocol::ClientOp;

use crate::events::{ClientEvent, EventRegistry};
use crate::options::{ConnectOptions, ConnectionOptions, SubscribeOptions};
use crate::traits::{Connector, HandlerSink, Protocol, Transport};
use crate::types::{FlushCallback, Msg, NatsError, Subscription, SubscriptionRequest};
use crate::ws::WsConnector;

/// A connected client session.
///
/// There is no public constructor: [`Session::connect`] and
/// [`Session::connect_with`] return a session only after the handshake has
/// completed, so a session always holds both its protocol and its
/// transport.
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), nw_client::NatsError> {
/// use nw_client::{ClientEvent, ConnectOptions, Session, SubscribeOptions};
///
/// let nc = Session::connect(ConnectOptions::new().url("ws://localhost:8080")).await?;
/// nc.add_event_listener(ClientEvent::error(|e| eprintln!("nats error: {e}")));
///
/// let sub = nc
///     .subscribe("orders.created", |msg| println!("{}", msg.data), SubscribeOptions::default())
///     .await?;
/// nc.publish(sub.subject(), "{\"id\":42}");
/// nc.flush_and_wait().await?;
/// nc.close();
/// # Ok(())
/// # }
/// ```
pub struct Session {
    options: ConnectionOptions,
    protocol: Box<dyn Protocol>,
    transport: Arc<dyn Transport>,
    events: Arc<EventRegistry>,
}

impl Session {
    /// Connect over WebSocket.
    pub async fn connect(options: ConnectOptions) -> Result<Self, NatsError> {
        Self::connect_with(&WsConnector::new(), options).await
    }

    /// Connect through a caller-supplied [`Connector`].
    pub async fn connect_with<C>(connector: &C, options: ConnectOptions) -> Result<Self, NatsError>
    where
        C: Connector + ?Sized,
    {
        let options = options.resolve();
        let events = Arc::new(EventRegistry::new());
        let sink: Arc<dyn HandlerSink> = events.clone();

        tracing::info!(url = %options.url, "connecting");
        let protocol = match connector.connect(&options, sink).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(url = %options.url, error = %e, "connect failed");
                return Err(e);
            }
        };
        let transport = protocol.transport();
        tracing::info!(url = %options.url, "connected");

        Ok(Self {
            options,
            protocol,
            transport,
            events,
        })
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Publish `data` on `subject`.
    ///
    /// An empty subject is not returned as an error: it is reported to the
    /// `error` listeners and nothing is sent.
    pub fn publish(&self, subject: &str, data: &str) {
        if subject.is_empty() {
            self.error_handler(&NatsError::SubjectRequired);
            return;
        }
        tracing::trace!(subject, bytes = data.len(), "publish");
        let command = ClientOp::Pub {
            subject,
            payload: data,
        };
        self.protocol.send_command(command.to_string());
    }

    /// Subscribe to `subject`, invoking `callback` for every message.
    ///
    /// The request reaches the protocol before this returns, so it is
    /// ordered with respect to surrounding `publish`/`flush` calls; the
    /// returned future is already settled.  Fails with
    /// [`NatsError::Closed`] without sending anything if the session is
    /// closed.
    pub fn subscribe<F>(
        &self,
        subject: &str,
        callback: F,
        options: SubscribeOptions,
    ) -> impl Future<Output = Result<Subscription, NatsError>> + Send + 'static
    where
        F: Fn(Msg) + Send + Sync + 'static,
    {
        if self.is_closed() {
            tracing::debug!(subject, "subscribe on closed session");
            return future::ready(Err(NatsError::Closed));
        }
        let request = SubscriptionRequest::new(subject, Arc::new(callback), options);
        let result = self.protocol.subscribe(request);
        if let Ok(sub) = &result {
            tracing::debug!(sid = sub.sid(), subject = sub.subject(), "subscribed");
        }
        future::ready(result)
    }

    pub fn flush(&self, on_complete: Option<FlushCallback>) {
        self.protocol.flush(on_complete);
    }

    /// Flush and wait for the server's acknowledgement.
    ///
    /// Fails with [`NatsError::Closed`] if the connection goes away first.
    pub async fn flush_and_wait(&self) -> Result<(), NatsError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.flush(Some(Box::new(move || {
            let _ = tx.send(());
        })));
        rx.await.map_err(|_| NatsError::Closed)
    }

    /// Ask the protocol to close.  Closed status is read back from the
    /// transport by [`is_closed`](Self::is_closed).
    pub fn close(&self) {
        tracing::info!(url = %self.options.url, "closing");
        self.protocol.close();
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    pub fn add_event_listener(&self, event: ClientEvent) {
        self.events.add(event);
    }
}

impl HandlerSink for Session {
    fn error_handler(&self, error: &NatsError) {
        self.events.dispatch_error(error);
    }

    fn close_handler(&self) {
        self.events.dispatch_close();
    }
}
