//! WebSocket protocol collaborator.
//!
//! # Connection flow
//!
//! 1. Open the WebSocket.
//! 2. Wait for the server's `INFO`.
//! 3. Send `CONNECT {..}` + `PING`, wait for `PONG` (`-ERR` fails the connect).
//! 4. Spawn a writer task (outbound queue → binary frames) and a reader task
//!    (frames → [`Parser`] → message callbacks, `PONG` → flush completions,
//!    `PING` → `PONG`, `-ERR` → error handler).
//! 5. When the stream ends, or `close()` is called, the transport is marked
//!    closed and the close handler runs exactly once.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, StreamExt};
use nw_protocol::{ClientOp, ConnectInfo, Parser, ServerInfo, ServerOp};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::events::invoke_isolated;
use crate::options::ConnectionOptions;
use crate::traits::{Connector, HandlerSink, Protocol, Transport};
use crate::types::{FlushCallback, Msg, MsgCallback, NatsError, Subscription, SubscriptionRequest};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connects to a NATS server's WebSocket listener.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        options: &ConnectionOptions,
        handlers: Arc<dyn HandlerSink>,
    ) -> Result<Box<dyn Protocol>, NatsError> {
        let (ws, _response) = tokio_tungstenite::connect_async(options.url.as_str())
            .await
            .map_err(|e| NatsError::WebSocket(e.to_string()))?;
        let (mut sink, mut source) = ws.split();
        let mut parser = Parser::new();

        let handshake = tokio::time::timeout(
            options.handshake_timeout(),
            handshake(&mut sink, &mut source, &mut parser, options),
        )
        .await;
        let info = match handshake {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(NatsError::Handshake(format!(
                    "no response from server within {}ms",
                    options.handshake_timeout_ms
                )))
            }
        };

        tracing::info!(
            server_id = %info.server_id,
            version = %info.version,
            max_payload = info.max_payload,
            "server accepted connection"
        );
        apply_max_payload(&mut parser, &info);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let shared = Arc::new(Shared {
            outbound: outbound_tx,
            subs: Mutex::new(HashMap::new()),
            pending_flushes: Mutex::new(VecDeque::new()),
            next_sid: AtomicU64::new(1),
            transport: Arc::new(WsTransport::new(options.url.clone())),
            handlers,
            close_notified: AtomicBool::new(false),
        });

        tokio::spawn(write_loop(
            sink,
            outbound_rx,
            shared.transport.clone(),
            shutdown.clone(),
        ));
        tokio::spawn(read_loop(source, parser, shared.clone(), shutdown.clone()));

        Ok(Box::new(WsProtocol { shared, shutdown }))
    }
}

/// Steps 2–3 of the connection flow.  Returns the server's `INFO`.
async fn handshake(
    sink: &mut WsSink,
    source: &mut WsSource,
    parser: &mut Parser,
    options: &ConnectionOptions,
) -> Result<ServerInfo, NatsError> {
    let info = loop {
        match next_op(source, parser).await? {
            ServerOp::Info(info) => break *info,
            ServerOp::Err(msg) => return Err(NatsError::Handshake(msg)),
            other => tracing::debug!(op = ?other, "ignoring op before INFO"),
        }
    };

    let connect = ConnectInfo {
        verbose: options.verbose,
        pedantic: options.pedantic,
        name: options.name.clone(),
        ..Default::default()
    };
    let hello = format!("{}{}", ClientOp::Connect(&connect), ClientOp::Ping);
    sink.send(Message::Binary(hello.into_bytes()))
        .await
        .map_err(|e| NatsError::WebSocket(e.to_string()))?;

    loop {
        match next_op(source, parser).await? {
            ServerOp::Pong => return Ok(info),
            ServerOp::Err(msg) => return Err(NatsError::Handshake(msg)),
            ServerOp::Ping => {
                sink.send(Message::Binary(ClientOp::Pong.to_string().into_bytes()))
                    .await
                    .map_err(|e| NatsError::WebSocket(e.to_string()))?;
            }
            other => tracing::trace!(op = ?other, "ignoring op during handshake"),
        }
    }
}

/// Read frames until the parser yields one operation.
async fn next_op(source: &mut WsSource, parser: &mut Parser) -> Result<ServerOp, NatsError> {
    loop {
        if let Some(op) = parser.next_op()? {
            return Ok(op);
        }
        match source.next().await {
            Some(Ok(Message::Close(_))) | None => {
                return Err(NatsError::Handshake("connection closed during handshake".into()))
            }
            Some(Ok(msg)) => {
                if let Some(bytes) = frame_bytes(msg) {
                    parser.push(bytes);
                }
            }
            Some(Err(e)) => return Err(NatsError::WebSocket(e.to_string())),
        }
    }
}

/// Protocol bytes carried by a data frame; `None` for control frames.
/// Frames are not decoded here: a character may straddle two of them.
fn frame_bytes(msg: Message) -> Option<Vec<u8>> {
    match msg {
        Message::Text(text) => Some(text.into_bytes()),
        Message::Binary(bytes) => Some(bytes),
        _ => None,
    }
}

/// Cap the parser at the server's advertised `max_payload` (0 means unset).
fn apply_max_payload(parser: &mut Parser, info: &ServerInfo) {
    if info.max_payload > 0 {
        parser.set_max_payload(usize::try_from(info.max_payload).unwrap_or(usize::MAX));
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Closed flag for one WebSocket connection.
#[derive(Debug)]
pub struct WsTransport {
    url: String,
    closed: AtomicBool,
}

impl WsTransport {
    fn new(url: String) -> Self {
        Self {
            url,
            closed: AtomicBool::new(false),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns `true` if this call is the one that closed it.
    fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}

impl Transport for WsTransport {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Protocol
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Outbound {
    Command(String),
    Close,
}

/// State shared between the protocol handle and the reader task.
struct Shared {
    outbound: mpsc::UnboundedSender<Outbound>,
    subs: Mutex<HashMap<u64, MsgCallback>>,
    /// One entry per `PING` sent by `flush`, oldest first.
    pending_flushes: Mutex<VecDeque<Option<FlushCallback>>>,
    next_sid: AtomicU64,
    transport: Arc<WsTransport>,
    handlers: Arc<dyn HandlerSink>,
    close_notified: AtomicBool,
}

impl Shared {
    fn send(&self, raw: String) {
        if self.outbound.send(Outbound::Command(raw)).is_err() {
            tracing::warn!("writer gone, dropping command");
        }
    }

    fn handle(&self, op: ServerOp) {
        match op {
            ServerOp::Msg {
                subject,
                sid,
                reply,
                payload,
            } => {
                let callback = self.subs.lock().get(&sid).cloned();
                match callback {
                    Some(cb) => {
                        let msg = Msg {
                            subject,
                            sid,
                            reply,
                            data: payload,
                        };
                        invoke_isolated("message callback", || cb(msg));
                    }
                    None => tracing::debug!(sid, subject = %subject, "message for unknown sid"),
                }
            }
            ServerOp::Ping => self.send(ClientOp::Pong.to_string()),
            ServerOp::Pong => {
                let done = self.pending_flushes.lock().pop_front();
                match done {
                    Some(Some(cb)) => {
                        invoke_isolated("flush callback", cb);
                    }
                    Some(None) => {}
                    None => tracing::debug!("unsolicited PONG"),
                }
            }
            ServerOp::Info(info) => {
                tracing::debug!(server_id = %info.server_id, "server info updated");
            }
            ServerOp::Ok => tracing::trace!("+OK"),
            ServerOp::Err(msg) => {
                tracing::warn!(error = %msg, "server reported error");
                self.handlers.error_handler(&NatsError::Server(msg));
            }
        }
    }

    /// Decode and handle everything the parser has buffered.
    fn drain(&self, parser: &mut Parser) {
        loop {
            match parser.next_op() {
                Ok(Some(ServerOp::Info(info))) => {
                    apply_max_payload(parser, &info);
                    self.handle(ServerOp::Info(info));
                }
                Ok(Some(op)) => self.handle(op),
                Ok(None) => break,
                Err(e) => self.handlers.error_handler(&NatsError::from(e)),
            }
        }
    }

    /// Tear down after the reader stops.  Runs the close handler once.
    fn finish(&self) {
        // Closed is set under both locks; `flush` and `subscribe` read it
        // under the same ones.
        let (dropped_flushes, dropped_subs) = {
            let mut pending = self.pending_flushes.lock();
            let mut subs = self.subs.lock();
            self.transport.mark_closed();
            (std::mem::take(&mut *pending), std::mem::take(&mut *subs))
        };
        // Dropping the callbacks fails any `flush_and_wait` still waiting.
        drop(dropped_flushes);
        drop(dropped_subs);
        let _ = self.outbound.send(Outbound::Close);

        if !self.close_notified.swap(true, Ordering::SeqCst) {
            tracing::info!(url = %self.transport.url(), "connection closed");
            self.handlers.close_handler();
        }
    }
}

/// Handle returned by [`WsConnector`].
pub struct WsProtocol {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl Protocol for WsProtocol {
    fn send_command(&self, raw: String) {
        if self.shared.transport.is_closed() {
            tracing::debug!("connection closed, dropping command");
            return;
        }
        self.shared.send(raw);
    }

    fn subscribe(&self, request: SubscriptionRequest) -> Result<Subscription, NatsError> {
        let mut subs = self.shared.subs.lock();
        if self.shared.transport.is_closed() {
            return Err(NatsError::Closed);
        }
        let sid = self.shared.next_sid.fetch_add(1, Ordering::Relaxed);
        let command = ClientOp::Sub {
            subject: &request.subject,
            queue: request.queue.as_deref(),
            sid,
        }
        .to_string();

        subs.insert(sid, request.callback.clone());
        drop(subs);
        self.shared.send(command);
        Ok(Subscription::new(sid, &request))
    }

    fn flush(&self, on_complete: Option<FlushCallback>) {
        // Hold the queue while sending so PINGs and completions stay paired.
        let mut pending = self.shared.pending_flushes.lock();
        if self.shared.transport.is_closed() {
            drop(pending);
            tracing::debug!("connection closed, flush will not complete");
            return;
        }
        pending.push_back(on_complete);
        self.shared.send(ClientOp::Ping.to_string());
    }

    fn close(&self) {
        if self.shared.transport.mark_closed() {
            let _ = self.shared.outbound.send(Outbound::Close);
        }
        self.shutdown.cancel();
    }

    fn transport(&self) -> Arc<dyn Transport> {
        self.shared.transport.clone()
    }
}

impl Drop for WsProtocol {
    fn drop(&mut self) {
        self.close();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drains the outbound queue into the socket.  A failed write closes the
/// transport and stops the reader, which then runs the close sequence.
async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    transport: Arc<WsTransport>,
    shutdown: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Command(raw) => {
                tracing::trace!(bytes = raw.len(), "send");
                if let Err(e) = sink.send(Message::Binary(raw.into_bytes())).await {
                    tracing::warn!(error = %e, url = %transport.url(), "write failed, closing connection");
                    transport.mark_closed();
                    shutdown.cancel();
                    break;
                }
            }
            Outbound::Close => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                break;
            }
        }
    }
}

async fn read_loop(
    mut source: WsSource,
    mut parser: Parser,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) {
    // The handshake may have read past its final PONG.
    shared.drain(&mut parser);

    loop {
        let frame = tokio::select! {
            frame = source.next() => frame,
            _ = shutdown.cancelled() => break,
        };
        match frame {
            Some(Ok(Message::Close(_))) => {
                tracing::info!("server closed connection");
                break;
            }
            Some(Ok(msg)) => {
                if let Some(bytes) = frame_bytes(msg) {
                    parser.push(bytes);
                    shared.drain(&mut parser);
                }
            }
            Some(Err(e)) => {
                shared.handlers.error_handler(&NatsError::WebSocket(e.to_string()));
                break;
            }
            None => break,
        }
    }

    shared.finish();
}
