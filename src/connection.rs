//! Connection manager
//!
//! Owns the WebSocket transport lifecycle: dialing, the receive loop, the
//! outbound write path, and a reconnection supervisor with fixed backoff.
//! Inbound frames are decoded and dispatched to the [`MessageHandler`]
//! supplied at construction; outbound messages are submitted through the
//! fire-and-forget [`OutboundQueue`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::config::Config;
use crate::protocol::{self, Envelope, Inbound, Outbound};
use crate::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound messages buffered between the senders and the write path.
/// A full queue drops the newest message rather than blocking the caller.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Handler for decoded inbound messages, supplied at construction
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// React to one inbound message
    async fn handle(&self, message: Inbound);
}

/// Fire-and-forget send handle
///
/// `send` never blocks and never surfaces an error to the caller: while
/// disconnected the message is dropped with a log line, and a saturated
/// queue drops with a warning (bounded-buffer-with-drop backpressure).
#[derive(Clone)]
pub struct OutboundQueue {
    tx: mpsc::Sender<Outbound>,
    connected: Arc<AtomicBool>,
}

impl OutboundQueue {
    /// Submit a message for delivery, best-effort
    pub fn send(&self, message: Outbound) {
        if !self.connected.load(Ordering::SeqCst) {
            tracing::debug!(kind = message.kind(), "not connected, dropping message");
            return;
        }

        let kind = message.kind();
        if self.tx.try_send(message).is_err() {
            tracing::warn!(kind, "outbound queue saturated, dropping message");
        }
    }

    /// Whether the transport is currently open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Create the outbound queue and its receiving end
///
/// The receiver is handed to [`ConnectionManager::new`]; the queue can be
/// cloned freely by anything that sends.
#[must_use]
pub fn outbound_channel() -> (OutboundQueue, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    let queue = OutboundQueue {
        tx,
        connected: Arc::new(AtomicBool::new(false)),
    };
    (queue, rx)
}

/// Supervises the transport: connects, pumps, reconnects forever
pub struct ConnectionManager {
    url: String,
    client_id: String,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    connected: Arc<AtomicBool>,
    handler: Arc<dyn MessageHandler>,
    outbound_rx: mpsc::Receiver<Outbound>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl ConnectionManager {
    /// Create a manager wired to the given queue, handler, and shutdown signal
    #[must_use]
    pub fn new(
        config: &Config,
        queue: &OutboundQueue,
        outbound_rx: mpsc::Receiver<Outbound>,
        handler: Arc<dyn MessageHandler>,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            url: config.backend_url.clone(),
            client_id: config.client_id.clone(),
            reconnect_delay: config.session.reconnect_delay,
            connect_timeout: config.session.connect_timeout,
            connected: Arc::clone(&queue.connected),
            handler,
            outbound_rx,
            shutdown_rx,
        }
    }

    /// Run the reconnection supervisor until shutdown
    ///
    /// Retries forever at a fixed delay; there is no retry cap and no
    /// backoff growth. Returns only when the shutdown signal fires.
    pub async fn run(mut self) {
        loop {
            let url = self.url.clone();
            let connect_timeout = self.connect_timeout;

            let dialed = tokio::select! {
                _ = self.shutdown_rx.recv() => break,
                result = Self::dial(&url, connect_timeout) => result,
            };

            let mut ws = match dialed {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        delay = ?self.reconnect_delay,
                        "connect failed, retrying"
                    );
                    if self.backoff().await {
                        continue;
                    }
                    break;
                }
            };

            self.connected.store(true, Ordering::SeqCst);
            tracing::info!(url = %self.url, "connected to backend");

            if let Err(e) = self.announce(&mut ws).await {
                tracing::warn!(error = %e, "handshake send failed, reconnecting");
                self.connected.store(false, Ordering::SeqCst);
                self.drain_stale();
                if self.backoff().await {
                    continue;
                }
                break;
            }

            let shutdown = self.pump_connection(ws).await;
            self.connected.store(false, Ordering::SeqCst);
            self.drain_stale();

            if shutdown {
                break;
            }

            tracing::info!(delay = ?self.reconnect_delay, "connection lost, reconnecting");
            if !self.backoff().await {
                break;
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("connection manager stopped");
    }

    /// Open the transport, bounded by the connect timeout
    async fn dial(url: &str, connect_timeout: Duration) -> Result<WsStream> {
        let attempt = connect_async(url);
        let (stream, _response) = tokio::time::timeout(connect_timeout, attempt)
            .await
            .map_err(|_| {
                Error::Connect(format!("timed out after {}s", connect_timeout.as_secs()))
            })?
            .map_err(|e| Error::Connect(e.to_string()))?;
        Ok(stream)
    }

    /// Announce readiness on a freshly opened transport
    async fn announce(&self, ws: &mut WsStream) -> Result<()> {
        let text = Outbound::ConnectionReady {
            client_id: self.client_id.clone(),
            timestamp: protocol::timestamp(),
        }
        .encode()?;

        ws.send(Message::Text(text))
            .await
            .map_err(|e| Error::Send(e.to_string()))
    }

    /// Pump one connection until it drops; returns true on shutdown
    async fn pump_connection(&mut self, ws: WsStream) -> bool {
        let (mut tx, mut rx) = ws.split();
        let handler = Arc::clone(&self.handler);
        let outbound_rx = &mut self.outbound_rx;
        let shutdown_rx = &mut self.shutdown_rx;

        loop {
            tokio::select! {
                inbound = rx.next() => match inbound {
                    Some(Ok(Message::Text(text))) => dispatch(&handler, &text).await,
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::warn!("connection closed by backend");
                        return false;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "transport error");
                        return false;
                    }
                },
                outbound = outbound_rx.recv() => {
                    let Some(message) = outbound else { return false };
                    let kind = message.kind();
                    match message.encode() {
                        Ok(text) => {
                            if let Err(e) = tx.send(Message::Text(text)).await {
                                tracing::warn!(error = %e, kind, "send failed, marking disconnected");
                                return false;
                            }
                            tracing::trace!(kind, "sent message");
                        }
                        Err(e) => tracing::error!(error = %e, kind, "failed to encode message"),
                    }
                },
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested, closing connection");
                    let _ = tx.close().await;
                    return true;
                }
            }
        }
    }

    /// Sleep the fixed reconnect delay; returns false if shutdown fired first
    async fn backoff(&mut self) -> bool {
        tokio::select! {
            _ = self.shutdown_rx.recv() => false,
            () = tokio::time::sleep(self.reconnect_delay) => true,
        }
    }

    /// Drop messages queued against a connection that no longer exists
    fn drain_stale(&mut self) {
        while self.outbound_rx.try_recv().is_ok() {}
    }
}

/// Decode one text frame and hand it to the handler
///
/// Malformed frames and unrecognized types are logged and skipped; neither
/// terminates the receive loop.
async fn dispatch(handler: &Arc<dyn MessageHandler>, text: &str) {
    match Envelope::decode(text) {
        Ok(envelope) => match Inbound::from_envelope(&envelope) {
            Ok(Some(message)) => handler.handle(message).await,
            Ok(None) => {
                tracing::debug!(kind = %envelope.kind, "ignoring unrecognized message type");
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = %envelope.kind, "malformed payload, skipping");
            }
        },
        Err(e) => tracing::warn!(error = %e, "malformed frame, skipping"),
    }
}
