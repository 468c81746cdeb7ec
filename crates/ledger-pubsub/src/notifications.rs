//! Typed payloads for the built-in subscriptions.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ledger_core::{PublicKey, Signature};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::PubsubError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Context {
    pub slot: u64,
}

/// `{"context":{"slot":..},"value":..}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response<T> {
    pub context: Context,
    pub value: T,
}

// ---------------------------------------------------------------------------
// accountSubscribe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccountEncoding {
    #[serde(rename = "base58")]
    Base58,
    #[default]
    #[serde(rename = "base64")]
    Base64,
    #[serde(rename = "base64+zstd")]
    Base64Zstd,
    #[serde(rename = "jsonParsed")]
    JsonParsed,
}

/// Account data as sent by the server: `[payload, encoding]` or, for
/// `jsonParsed`, an arbitrary JSON object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AccountData {
    Encoded(String, AccountEncoding),
    Json(Value),
}

impl AccountData {
    /// Raw account bytes. Compressed and parsed forms are not decoded.
    pub fn decode(&self) -> Result<Vec<u8>, PubsubError> {
        match self {
            AccountData::Encoded(data, AccountEncoding::Base64) => BASE64
                .decode(data)
                .map_err(|e| PubsubError::Decode(format!("account data: {e}"))),
            AccountData::Encoded(data, AccountEncoding::Base58) => bs58::decode(data)
                .into_vec()
                .map_err(|e| PubsubError::Decode(format!("account data: {e}"))),
            AccountData::Encoded(_, encoding) => Err(PubsubError::Decode(format!(
                "account data: cannot decode {encoding:?} payload"
            ))),
            AccountData::Json(_) => Err(PubsubError::Decode(
                "account data: parsed json has no raw form".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub lamports: u64,
    pub owner: PublicKey,
    pub data: AccountData,
    pub executable: bool,
    pub rent_epoch: u64,
    #[serde(default)]
    pub space: Option<u64>,
}

pub type AccountNotification = Response<Account>;

// ---------------------------------------------------------------------------
// logsSubscribe
// ---------------------------------------------------------------------------

/// Which transactions a `logsSubscribe` stream covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogsFilter {
    /// Everything except simple vote transactions.
    All,
    AllWithVotes,
    /// Transactions that mention any of these keys.
    Mentions(Vec<PublicKey>),
}

impl LogsFilter {
    pub fn to_value(&self) -> Value {
        match self {
            LogsFilter::All => json!("all"),
            LogsFilter::AllWithVotes => json!("allWithVotes"),
            LogsFilter::Mentions(keys) => {
                let keys: Vec<String> = keys.iter().map(PublicKey::to_string).collect();
                json!({ "mentions": keys })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Logs {
    pub signature: Signature,
    /// The transaction error, if it failed.
    #[serde(default)]
    pub err: Option<Value>,
    /// `None` when the transaction failed before it could execute.
    #[serde(default)]
    pub logs: Option<Vec<String>>,
}

pub type LogsNotification = Response<Logs>;

/// Decode a notification `result` with serde.
pub fn decode_json<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, PubsubError> {
    serde_json::from_value(value).map_err(PubsubError::from)
}
