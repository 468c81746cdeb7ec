//! WebSocket subscription client for ledger nodes.
//!
//! One [`PubsubClient`] owns one socket. Subscriptions are correlated first
//! by request id and then by the server-assigned subscription id, and each
//! gets its own bounded queue. A reader task dispatches frames and a
//! keepalive task pings at 90% of the pong wait.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod notifications;
pub mod request;
mod session;
pub mod subscription;

pub use client::PubsubClient;
pub use config::{load_config, ClientConfig};
pub use error::{ErrorKind, PubsubError};
pub use notifications::{AccountEncoding, AccountNotification, LogsFilter, LogsNotification};
pub use session::ActiveSubscriptions;
pub use subscription::Subscription;
