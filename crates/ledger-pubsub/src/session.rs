//! Shared session state: the socket write half and the correlation tables.
//!
//! Two background tasks run against a session. The reader owns the read half,
//! enforces the pong deadline and dispatches frames. The keepalive task pings
//! at a fixed period. Both talk to subscribers only through the tables and
//! the per-subscription queues.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::PubsubError;
use crate::request::{request_id, Frame, Request};
use crate::subscription::{Entry, Sink};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsWriter = SplitSink<WsStream, Message>;
pub(crate) type WsReader = SplitStream<WsStream>;

#[derive(Default)]
struct Tables {
    by_request: HashMap<u64, Arc<Entry>>,
    by_subscription: HashMap<u64, Arc<Entry>>,
    /// Unsubscribe method for requests cancelled before their ack arrived.
    cancelled: HashMap<u64, String>,
}

/// Sizes of the correlation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActiveSubscriptions {
    /// Every live subscription, acknowledged or not.
    pub by_request: usize,
    /// Subscriptions the server has acknowledged.
    pub by_subscription: usize,
}

pub(crate) struct Session {
    tables: RwLock<Tables>,
    writer: tokio::sync::Mutex<WsWriter>,
    write_wait: Duration,
    short_id: bool,
}

impl Session {
    pub(crate) fn new(writer: WsWriter, write_wait: Duration, short_id: bool) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            writer: tokio::sync::Mutex::new(writer),
            write_wait,
            short_id,
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub(crate) async fn send(&self, message: Message) -> Result<(), PubsubError> {
        let mut writer = self.writer.lock().await;
        timeout(self.write_wait, writer.send(message))
            .await
            .map_err(|_| PubsubError::WriteTimeout(self.write_wait))?
            .map_err(PubsubError::from)
    }

    pub(crate) async fn send_request(&self, request: &Request) -> Result<(), PubsubError> {
        debug!(request_id = request.id, method = %request.method, "writing request");
        self.send(Message::Text(request.encode()?)).await
    }

    pub(crate) async fn unsubscribe(&self, server_id: u64, method: &str) -> Result<(), PubsubError> {
        let request = Request::new(method, vec![json!(server_id)], Map::new(), request_id(self.short_id));
        self.send_request(&request).await
    }

    /// Close the write half.
    pub(crate) async fn shutdown(&self) -> Result<(), PubsubError> {
        let mut writer = self.writer.lock().await;
        timeout(self.write_wait, writer.close())
            .await
            .map_err(|_| PubsubError::WriteTimeout(self.write_wait))?
            .map_err(PubsubError::from)
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    /// Add a subscription under a fresh request id and build its request.
    pub(crate) fn register(
        &self,
        method: &str,
        unsubscribe_method: &str,
        params: Vec<Value>,
        conf: Map<String, Value>,
        sink: Arc<dyn Sink>,
    ) -> (Arc<Entry>, Request) {
        let mut tables = self.tables.write();
        let mut id = request_id(self.short_id);
        while tables.by_request.contains_key(&id) {
            id = request_id(self.short_id);
        }

        let entry = Arc::new(Entry {
            request_id: id,
            method: method.to_string(),
            unsubscribe_method: unsubscribe_method.to_string(),
            server_id: OnceLock::new(),
            sink,
        });
        tables.by_request.insert(id, Arc::clone(&entry));
        info!(
            request_id = id,
            method,
            count = tables.by_request.len(),
            "added subscription"
        );

        (entry, Request::new(method, params, conf, id))
    }

    /// Remove a subscription from both tables.
    pub(crate) fn remove(&self, request_id: u64) -> Option<Arc<Entry>> {
        let mut tables = self.tables.write();
        let entry = tables.by_request.remove(&request_id)?;
        if let Some(server_id) = entry.server_id.get() {
            tables.by_subscription.remove(server_id);
        }
        Some(entry)
    }

    /// Remove a subscription on the caller's request. Returns the server id
    /// to unsubscribe from if it is already known; otherwise the unsubscribe
    /// is sent once the ack arrives.
    pub(crate) fn cancel(&self, request_id: u64) -> Option<(u64, String)> {
        let mut tables = self.tables.write();
        let entry = tables.by_request.remove(&request_id)?;
        match entry.server_id.get() {
            Some(&server_id) => {
                tables.by_subscription.remove(&server_id);
                Some((server_id, entry.unsubscribe_method.clone()))
            }
            None => {
                debug!(request_id, "cancelled before acknowledgment");
                tables
                    .cancelled
                    .insert(request_id, entry.unsubscribe_method.clone());
                None
            }
        }
    }

    /// Send an unsubscribe without holding up the caller.
    fn spawn_unsubscribe(self: &Arc<Self>, server_id: u64, method: String) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = session.unsubscribe(server_id, &method).await {
                warn!(subscription_id = server_id, error = %err, "unable to send unsubscribe");
            }
        });
    }

    pub(crate) fn active(&self) -> ActiveSubscriptions {
        let tables = self.tables.read();
        ActiveSubscriptions {
            by_request: tables.by_request.len(),
            by_subscription: tables.by_subscription.len(),
        }
    }

    /// Tear down one subscription: report `err` to its consumer and, if the
    /// server knows about it, unsubscribe in the background.
    pub(crate) fn close_subscription(self: &Arc<Self>, request_id: u64, err: PubsubError) {
        let Some(entry) = self.remove(request_id) else {
            return;
        };
        entry.sink.fail(err);

        if let Some(&server_id) = entry.server_id.get() {
            self.spawn_unsubscribe(server_id, entry.unsubscribe_method.clone());
        }
    }

    /// Deliver `err` to every subscription and empty both tables.
    pub(crate) fn fail_all(&self, err: PubsubError) {
        let tables = std::mem::take(&mut *self.tables.write());
        if err.is_transport() {
            error!(
                error = %err,
                count = tables.by_request.len(),
                "session failed, closing all subscriptions"
            );
        } else {
            debug!(count = tables.by_request.len(), "closing all subscriptions");
        }
        for entry in tables.by_request.into_values() {
            entry.sink.fail(err.clone());
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    pub(crate) fn dispatch(self: &Arc<Self>, bytes: &[u8]) {
        let frame = match Frame::parse(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "dropping unparseable frame");
                return;
            }
        };

        match frame {
            Frame::Response { id, result } => self.handle_ack(id, result),
            Frame::Notification {
                subscription,
                result,
            } => self.handle_notification(subscription, result),
            Frame::Error { id, error } => {
                let known = id.is_some_and(|id| self.tables.read().by_request.contains_key(&id));
                match id {
                    Some(id) if known => {
                        warn!(request_id = id, code = error.code, message = %error.message, "subscription rejected");
                        self.close_subscription(
                            id,
                            PubsubError::Rpc {
                                code: error.code,
                                message: error.message,
                            },
                        );
                    }
                    _ => {
                        if let Some(id) = id {
                            self.tables.write().cancelled.remove(&id);
                        }
                        warn!(request_id = ?id, code = error.code, message = %error.message, "rpc error");
                    }
                }
            }
            Frame::Other => debug!("ignoring frame"),
        }
    }

    fn handle_ack(self: &Arc<Self>, request_id: u64, result: Value) {
        let Some(server_id) = result.as_u64() else {
            // Unsubscribe confirmations carry a bool.
            debug!(request_id, %result, "request acknowledged");
            return;
        };

        let mut tables = self.tables.write();
        let Some(entry) = tables.by_request.get(&request_id).cloned() else {
            if let Some(method) = tables.cancelled.remove(&request_id) {
                drop(tables);
                debug!(request_id, subscription_id = server_id, "acknowledged after cancel, unsubscribing");
                self.spawn_unsubscribe(server_id, method);
            } else {
                warn!(request_id, subscription_id = server_id, "no subscription for acknowledged request");
            }
            return;
        };
        if entry.server_id.set(server_id).is_err() {
            warn!(request_id, subscription_id = server_id, "duplicate acknowledgment");
            return;
        }
        tables.by_subscription.insert(server_id, entry);
        debug!(
            request_id,
            subscription_id = server_id,
            count = tables.by_subscription.len(),
            "registered subscription"
        );
    }

    fn handle_notification(self: &Arc<Self>, server_id: u64, result: Value) {
        let entry = self.tables.read().by_subscription.get(&server_id).cloned();
        let Some(entry) = entry else {
            warn!(subscription_id = server_id, "no subscription for notification");
            return;
        };

        if let Err(err) = entry.sink.deliver(result) {
            match &err {
                PubsubError::CapacityExceeded(_) => warn!(
                    request_id = entry.request_id,
                    subscription_id = server_id,
                    "closing subscription, consumer is not keeping up"
                ),
                PubsubError::Closed => debug!(
                    request_id = entry.request_id,
                    subscription_id = server_id,
                    "consumer dropped, closing subscription"
                ),
                other => warn!(
                    request_id = entry.request_id,
                    subscription_id = server_id,
                    error = %other,
                    "closing subscription"
                ),
            }
            self.close_subscription(entry.request_id, err);
        }
    }
}

/// Read frames until the transport fails or no pong arrives within
/// `pong_wait`. Either way every subscription gets the error.
pub(crate) async fn read_loop(session: Arc<Session>, mut reader: WsReader, pong_wait: Duration) {
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let message = match timeout_at(deadline, reader.next()).await {
            Err(_) => {
                session.fail_all(PubsubError::PongTimeout(pong_wait));
                return;
            }
            Ok(None) => {
                session.fail_all(PubsubError::ConnectionClosed);
                return;
            }
            Ok(Some(Err(err))) => {
                session.fail_all(err.into());
                return;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => session.dispatch(text.as_bytes()),
            Message::Binary(data) => session.dispatch(&data),
            Message::Pong(_) => deadline = Instant::now() + pong_wait,
            Message::Close(frame) => {
                debug!(?frame, "peer closed the connection");
                session.fail_all(PubsubError::ConnectionClosed);
                return;
            }
            Message::Ping(_) | Message::Frame(_) => {}
        }
    }
}

/// Ping every `period` until a write fails.
pub(crate) async fn keepalive(session: Arc<Session>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        if let Err(err) = session.send(Message::Ping(Vec::new())).await {
            debug!(error = %err, "keepalive stopped");
            return;
        }
    }
}
