use std::future::Future;
use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::PubsubError;
use crate::session::Session;

pub(crate) type Decoder<T> = Box<dyn Fn(Value) -> Result<T, PubsubError> + Send + Sync>;

/// Delivery end of a subscription as the session sees it, with the payload
/// type erased.
pub(crate) trait Sink: Send + Sync {
    /// Decode one notification and queue it without waiting.
    fn deliver(&self, result: Value) -> Result<(), PubsubError>;
    /// Report a terminal error to the consumer.
    fn fail(&self, err: PubsubError);
}

pub(crate) struct TypedSink<T> {
    decoder: Decoder<T>,
    results: mpsc::Sender<T>,
    errors: mpsc::Sender<PubsubError>,
}

impl<T> TypedSink<T> {
    pub(crate) fn new(
        decoder: Decoder<T>,
        results: mpsc::Sender<T>,
        errors: mpsc::Sender<PubsubError>,
    ) -> Self {
        Self {
            decoder,
            results,
            errors,
        }
    }
}

impl<T: Send> Sink for TypedSink<T> {
    fn deliver(&self, result: Value) -> Result<(), PubsubError> {
        let value = (self.decoder)(result)?;
        self.results.try_send(value).map_err(|err| match err {
            TrySendError::Full(_) => PubsubError::CapacityExceeded(self.results.max_capacity()),
            TrySendError::Closed(_) => PubsubError::Closed,
        })
    }

    fn fail(&self, err: PubsubError) {
        // A full error queue already holds a terminal error.
        let _ = self.errors.try_send(err);
    }
}

/// One registered subscription in the session tables.
pub(crate) struct Entry {
    pub(crate) request_id: u64,
    pub(crate) method: String,
    pub(crate) unsubscribe_method: String,
    /// Server subscription id, set once by the acknowledgment.
    pub(crate) server_id: OnceLock<u64>,
    pub(crate) sink: Arc<dyn Sink>,
}

/// Consumer handle for one server subscription.
///
/// Results arrive through a bounded queue. A consumer that lets the queue
/// fill up is disconnected with [`PubsubError::CapacityExceeded`].
pub struct Subscription<T> {
    session: Arc<Session>,
    entry: Arc<Entry>,
    results: mpsc::Receiver<T>,
    errors: mpsc::Receiver<PubsubError>,
    closed: bool,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        session: Arc<Session>,
        entry: Arc<Entry>,
        results: mpsc::Receiver<T>,
        errors: mpsc::Receiver<PubsubError>,
    ) -> Self {
        Self {
            session,
            entry,
            results,
            errors,
            closed: false,
        }
    }

    /// Id of the subscribe request.
    pub fn request_id(&self) -> u64 {
        self.entry.request_id
    }

    pub fn method(&self) -> &str {
        &self.entry.method
    }

    /// The server-assigned id, once the subscription is acknowledged.
    pub fn subscription_id(&self) -> Option<u64> {
        self.entry.server_id.get().copied()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wait for the next notification.
    pub async fn recv(&mut self) -> Result<T, PubsubError> {
        self.recv_until(std::future::pending::<()>()).await
    }

    /// Wait for the next notification or for `cancel` to complete.
    ///
    /// Cancellation wins over a pending error, and a pending error wins over
    /// queued results. Once an error has been returned the subscription is
    /// closed and every later call fails with [`PubsubError::Closed`].
    pub async fn recv_until<F: Future>(&mut self, cancel: F) -> Result<T, PubsubError> {
        if self.closed {
            return Err(PubsubError::Closed);
        }

        tokio::select! {
            biased;
            _ = cancel => Err(PubsubError::Cancelled),
            Some(err) = self.errors.recv() => {
                self.closed = true;
                Err(err)
            }
            Some(value) = self.results.recv() => Ok(value),
            else => {
                self.closed = true;
                Err(PubsubError::Closed)
            }
        }
    }

    /// Drop the subscription and tell the server to stop sending. Before the
    /// server has acknowledged, the unsubscribe goes out with the ack.
    pub async fn unsubscribe(&mut self) -> Result<(), PubsubError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some((server_id, method)) = self.session.cancel(self.entry.request_id) {
            self.session.unsubscribe(server_id, &method).await?;
        }
        Ok(())
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("method", &self.entry.method)
            .field("request_id", &self.entry.request_id)
            .field("subscription_id", &self.subscription_id())
            .field("closed", &self.closed)
            .finish()
    }
}
