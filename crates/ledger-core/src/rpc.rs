//! One-shot request/response collaborator.
//!
//! The core never talks to the network itself. Callers plug in an
//! [`RpcCall`] implementation and these helpers shape the requests and parse
//! the `result` payloads.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::LedgerError;
use crate::keys::{Hash, Signature};
use crate::transaction::Transaction;

/// Issue one JSON-RPC call and return the raw bytes of its `result` field.
pub trait RpcCall {
    fn call(&self, method: &str, params: &[Value]) -> Result<Vec<u8>, LedgerError>;
}

/// How settled the state a request observes must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestBlockhash {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

/// Options for [`send_transaction`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    pub skip_preflight: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preflight_commitment: Option<Commitment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_context_slot: Option<u64>,
}

fn parse<'a, T: Deserialize<'a>>(method: &str, bytes: &'a [u8]) -> Result<T, LedgerError> {
    serde_json::from_slice(bytes).map_err(|e| LedgerError::Rpc(format!("{method}: {e}")))
}

/// Fetch a recent blockhash for a new message.
pub fn latest_blockhash<R: RpcCall + ?Sized>(
    rpc: &R,
    commitment: Option<Commitment>,
) -> Result<LatestBlockhash, LedgerError> {
    let mut params = Vec::new();
    if let Some(commitment) = commitment {
        params.push(json!({ "commitment": commitment }));
    }
    let bytes = rpc.call("getLatestBlockhash", &params)?;
    let result: WithContext<LatestBlockhash> = parse("getLatestBlockhash", &bytes)?;
    Ok(result.value)
}

/// Submit a signed transaction as base64 and return its signature.
pub fn send_transaction<R: RpcCall + ?Sized>(
    rpc: &R,
    transaction: &Transaction,
    options: &SendOptions,
) -> Result<Signature, LedgerError> {
    let encoded = transaction.serialize_base64()?;
    let mut config = serde_json::to_value(options).map_err(|e| LedgerError::Rpc(e.to_string()))?;
    if let Value::Object(map) = &mut config {
        map.insert("encoding".into(), Value::from("base64"));
    }

    let bytes = rpc.call("sendTransaction", &[Value::from(encoded), config])?;
    parse("sendTransaction", &bytes)
}
