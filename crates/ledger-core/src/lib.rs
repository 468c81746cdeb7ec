//! Ledger wire protocol core.
//!
//! Builds, serializes and signs ledger transactions without pulling in a
//! full node SDK. The compact binary wire format is implemented by hand, with
//! `ed25519-dalek` for signing, `curve25519-dalek` for curve checks and `bs58`
//! for Base58 text.
//!
//! The usual flow is instructions -> [`compile`] -> [`Message`] ->
//! [`Transaction::sign`] -> [`Transaction::serialize_base64`] -> RPC.

pub mod codec;
pub mod compiler;
pub mod error;
pub mod instruction;
pub mod keys;
pub mod message;
pub mod pda;
pub mod programs;
pub mod registry;
pub mod rpc;
pub mod transaction;

// Re-export key public types for ergonomic imports.
pub use codec::{decode_compact_u16, encode_compact_u16, Cursor};
pub use compiler::{compile, CompileOptions};
pub use error::{ErrorKind, LedgerError};
pub use instruction::{AccountMeta, GenericInstruction, Instruction, TypeIdEncoding};
pub use keys::{derive_public_key, sign, Hash, PrivateKey, PublicKey, Signature};
pub use message::{
    AddressTables, CompiledInstruction, Message, MessageAddressTableLookup, MessageHeader,
    MessageVersion,
};
pub use pda::{create_program_address, find_associated_token_address, find_program_address};
pub use registry::DecoderRegistry;
pub use transaction::{KeyProvider, Transaction};
