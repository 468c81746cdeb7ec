//! JSON-RPC envelopes on the socket.
//!
//! ```text
//! request:       {"jsonrpc":"2.0","method":m,"params":[..],"id":n}
//! ack:           {"jsonrpc":"2.0","result":<sub id>,"id":n}
//! notification:  {"jsonrpc":"2.0","method":m,"params":{"result":..,"subscription":<sub id>}}
//! error:         {"jsonrpc":"2.0","error":{"code":c,"message":s},"id":n}
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PubsubError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl Request {
    /// Build a request. A non-empty `conf` object is appended to `params`.
    pub fn new(method: &str, mut params: Vec<Value>, conf: Map<String, Value>, id: u64) -> Self {
        if !conf.is_empty() {
            params.push(Value::Object(conf));
        }
        Self {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
            id,
        }
    }

    pub fn encode(&self) -> Result<String, PubsubError> {
        serde_json::to_string(self).map_err(|e| PubsubError::Encode(e.to_string()))
    }
}

/// A random request id: 63 bits, or 31 bits for servers that reject large ids.
pub fn request_id(short: bool) -> u64 {
    let mut rng = rand::thread_rng();
    if short {
        u64::from(rng.gen::<u32>() >> 1)
    } else {
        rng.gen::<u64>() >> 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    params: Option<RawParams>,
}

#[derive(Debug, Deserialize)]
struct RawParams {
    #[serde(default)]
    result: Value,
    subscription: Option<Value>,
}

/// An inbound frame, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Reply to a request. For subscribe requests `result` is the server
    /// subscription id; unsubscribe replies carry a bool.
    Response { id: u64, result: Value },
    /// Server-side failure for request `id`.
    Error { id: Option<u64>, error: RpcErrorBody },
    /// Payload for a server subscription.
    Notification { subscription: u64, result: Value },
    /// Anything else: well-formed JSON the client has no use for.
    Other,
}

impl Frame {
    pub fn parse(bytes: &[u8]) -> Result<Self, PubsubError> {
        let raw: RawFrame = serde_json::from_slice(bytes)?;
        let id = raw.id.as_ref().and_then(Value::as_u64);

        if let Some(error) = raw.error {
            let error = serde_json::from_value(error.clone()).unwrap_or_else(|_| RpcErrorBody {
                code: -32000,
                message: error.to_string(),
            });
            return Ok(Frame::Error { id, error });
        }

        if let Some(id) = id {
            return Ok(Frame::Response {
                id,
                result: raw.result.unwrap_or(Value::Null),
            });
        }

        if let Some(params) = raw.params {
            if let Some(subscription) = params.subscription.as_ref().and_then(Value::as_u64) {
                return Ok(Frame::Notification {
                    subscription,
                    result: params.result,
                });
            }
        }

        Ok(Frame::Other)
    }
}
