use thiserror::Error;

/// Broad failure classes a caller can branch on without matching every
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad length prefixes or truncated buffers. The caller can recover.
    MalformedInput,
    /// Caller configuration errors. Reported immediately, never retried.
    ValidationFailure,
    /// Off-curve keys and signature mismatches.
    CryptoFailure,
}

/// Ledger codec, key and compiler errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // -- malformed input -------------------------------------------------
    #[error("malformed compact-u16 length")]
    MalformedLength,

    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },

    #[error("declared {what} count {count} exceeds remaining {remaining} bytes")]
    CountOverflow {
        what: &'static str,
        count: usize,
        remaining: usize,
    },

    #[error("unsupported message version: {0}")]
    InvalidVersion(u8),

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    #[error("invalid base58: {0}")]
    InvalidBase58(String),

    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid message header: {0}")]
    InvalidHeader(String),

    // -- validation ------------------------------------------------------
    #[error("cannot determine a fee payer: pass one explicitly or make the first instruction carry a signer")]
    NoFeePayer,

    #[error("signer key {0} not found")]
    MissingSigner(String),

    #[error("invalid signatures length: expected {expected}, got {actual}")]
    SignatureCountMismatch { expected: usize, actual: usize },

    #[error("too many seeds: {0} (max 16)")]
    TooManySeeds(usize),

    #[error("seed too long: {0} bytes (max 32)")]
    SeedTooLong(usize),

    #[error("no valid program address found for the given seeds")]
    NoValidAddress,

    #[error("invalid seeds: address must fall off the curve")]
    InvalidSeeds,

    #[error("length {0} exceeds the compact-u16 range")]
    LengthOverflow(usize),

    #[error("too many accounts: {0}")]
    TooManyAccounts(usize),

    #[error("account index {0} does not fit in a u8")]
    IndexOverflow(usize),

    #[error("account index {0} is outside the message key space")]
    AccountIndexOutOfRange(usize),

    #[error("lookup table {table} has no entry at index {index}")]
    LookupIndexOutOfRange { table: String, index: u8 },

    #[error("lookup table {table} holds {len} addresses (max 256)")]
    LookupTableTooLarge { table: String, len: usize },

    #[error("address tables already set")]
    AddressTablesAlreadySet,

    #[error("address table {0} was not supplied")]
    MissingAddressTable(String),

    #[error("legacy messages cannot carry address table lookups")]
    LookupsInLegacyMessage,

    #[error("legacy messages allow at most 127 signers, got {0}")]
    TooManyLegacySigners(usize),

    #[error("a decoder is already registered for program {0}")]
    DuplicateDecoder(String),

    #[error("no decoder registered for program {0}")]
    UnknownProgram(String),

    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("rpc call failed: {0}")]
    Rpc(String),

    // -- crypto ----------------------------------------------------------
    #[error("invalid private key size: expected 64, got {0}")]
    InvalidKeySize(usize),

    #[error("public key is not on the ed25519 curve")]
    NotOnCurve,

    #[error("private key halves do not match")]
    KeypairMismatch,

    #[error("signature verification failed for {0}")]
    SignatureVerification(String),
}

impl LedgerError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            MalformedLength
            | TruncatedInput { .. }
            | CountOverflow { .. }
            | InvalidVersion(_)
            | TrailingBytes(_)
            | InvalidBase58(_)
            | InvalidBase64(_)
            | InvalidLength { .. }
            | InvalidHeader(_) => ErrorKind::MalformedInput,
            InvalidKeySize(_) | NotOnCurve | KeypairMismatch | SignatureVerification(_) => {
                ErrorKind::CryptoFailure
            }
            _ => ErrorKind::ValidationFailure,
        }
    }
}
