use std::sync::Arc;

use futures_util::StreamExt;
use ledger_core::rpc::Commitment;
use ledger_core::PublicKey;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tracing::{debug, info};
use url::Url;

use crate::config::ClientConfig;
use crate::error::PubsubError;
use crate::notifications::{
    decode_json, AccountEncoding, AccountNotification, LogsFilter, LogsNotification,
};
use crate::session::{keepalive, read_loop, ActiveSubscriptions, Session};
use crate::subscription::{Subscription, TypedSink};

/// A persistent WebSocket session multiplexing many subscriptions.
///
/// The session does not reconnect. Once the transport fails every
/// subscription receives the error and a new client has to be connected.
pub struct PubsubClient {
    session: Arc<Session>,
    result_capacity: usize,
    error_capacity: usize,
    tasks: Vec<JoinHandle<()>>,
}

impl PubsubClient {
    /// Dial `config.ws_url` and start the reader and keepalive tasks.
    pub async fn connect(config: &ClientConfig) -> Result<Self, PubsubError> {
        config
            .validate()
            .map_err(|e| PubsubError::InvalidConfig(e.to_string()))?;

        let url = Url::parse(&config.ws_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(PubsubError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let (stream, response) = timeout(config.handshake_timeout(), connect_async(url.as_str()))
            .await
            .map_err(|_| {
                PubsubError::Connect(format!(
                    "handshake timed out after {:?}",
                    config.handshake_timeout()
                ))
            })?
            .map_err(|e| PubsubError::Connect(e.to_string()))?;
        info!(url = %url, status = %response.status(), "websocket connected");

        let (writer, reader) = stream.split();
        let session = Arc::new(Session::new(writer, config.write_wait(), config.short_id));

        let tasks = vec![
            tokio::spawn(read_loop(Arc::clone(&session), reader, config.pong_wait())),
            tokio::spawn(keepalive(Arc::clone(&session), config.ping_period())),
        ];

        Ok(Self {
            session,
            result_capacity: config.result_capacity,
            error_capacity: config.error_capacity,
            tasks,
        })
    }

    /// Open a subscription with a caller-supplied decoder for the
    /// notification `result` payload.
    pub async fn subscribe<T, D>(
        &self,
        method: &str,
        unsubscribe_method: &str,
        params: Vec<Value>,
        conf: Map<String, Value>,
        decoder: D,
    ) -> Result<Subscription<T>, PubsubError>
    where
        T: Send + 'static,
        D: Fn(Value) -> Result<T, PubsubError> + Send + Sync + 'static,
    {
        let (results_tx, results) = mpsc::channel(self.result_capacity);
        let (errors_tx, errors) = mpsc::channel(self.error_capacity);
        let sink = TypedSink::new(Box::new(decoder), results_tx, errors_tx);

        let (entry, request) =
            self.session
                .register(method, unsubscribe_method, params, conf, Arc::new(sink));
        if let Err(err) = self.session.send_request(&request).await {
            self.session.remove(entry.request_id);
            return Err(err);
        }

        Ok(Subscription::new(
            Arc::clone(&self.session),
            entry,
            results,
            errors,
        ))
    }

    /// Account changes. Data defaults to base64.
    pub async fn account_subscribe(
        &self,
        account: &PublicKey,
        commitment: Option<Commitment>,
        encoding: Option<AccountEncoding>,
    ) -> Result<Subscription<AccountNotification>, PubsubError> {
        let mut conf = Map::new();
        conf.insert("encoding".into(), json!(encoding.unwrap_or_default()));
        if let Some(commitment) = commitment {
            conf.insert("commitment".into(), json!(commitment));
        }

        self.subscribe(
            "accountSubscribe",
            "accountUnsubscribe",
            vec![json!(account.to_string())],
            conf,
            decode_json::<AccountNotification>,
        )
        .await
    }

    /// Transaction logs matching `filter`.
    pub async fn logs_subscribe(
        &self,
        filter: &LogsFilter,
        commitment: Option<Commitment>,
    ) -> Result<Subscription<LogsNotification>, PubsubError> {
        let mut conf = Map::new();
        if let Some(commitment) = commitment {
            conf.insert("commitment".into(), json!(commitment));
        }

        self.subscribe(
            "logsSubscribe",
            "logsUnsubscribe",
            vec![filter.to_value()],
            conf,
            decode_json::<LogsNotification>,
        )
        .await
    }

    /// Logs of transactions that mention `pubkey`.
    pub async fn logs_subscribe_mentions(
        &self,
        pubkey: &PublicKey,
        commitment: Option<Commitment>,
    ) -> Result<Subscription<LogsNotification>, PubsubError> {
        self.logs_subscribe(&LogsFilter::Mentions(vec![*pubkey]), commitment)
            .await
    }

    pub fn active_subscriptions(&self) -> ActiveSubscriptions {
        self.session.active()
    }

    /// Stop the background tasks, close every subscription and the socket.
    pub async fn close(&self) -> Result<(), PubsubError> {
        for task in &self.tasks {
            task.abort();
        }
        self.session.fail_all(PubsubError::Closed);
        debug!("closing websocket");
        self.session.shutdown().await
    }
}

impl Drop for PubsubClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.session.fail_all(PubsubError::Closed);
    }
}

impl std::fmt::Debug for PubsubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubsubClient")
            .field("active", &self.active_subscriptions())
            .finish()
    }
}
