//! Program id -> instruction decoder lookup.

use std::collections::HashMap;

use crate::error::LedgerError;
use crate::instruction::AccountMeta;
use crate::keys::PublicKey;

/// Decodes one program's instruction from its resolved accounts and data.
pub type DecoderFn<T> = fn(&[AccountMeta], &[u8]) -> Result<T, LedgerError>;

/// An explicit decoder table, owned by whoever needs to decode.
pub struct DecoderRegistry<T> {
    decoders: HashMap<PublicKey, DecoderFn<T>>,
}

impl<T> DecoderRegistry<T> {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register `decoder` for `program_id`. A program can only be
    /// registered once.
    pub fn register(&mut self, program_id: PublicKey, decoder: DecoderFn<T>) -> Result<(), LedgerError> {
        if self.decoders.contains_key(&program_id) {
            return Err(LedgerError::DuplicateDecoder(program_id.to_string()));
        }
        self.decoders.insert(program_id, decoder);
        Ok(())
    }

    pub fn contains(&self, program_id: &PublicKey) -> bool {
        self.decoders.contains_key(program_id)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decode an instruction addressed to `program_id`.
    pub fn decode(
        &self,
        program_id: &PublicKey,
        accounts: &[AccountMeta],
        data: &[u8],
    ) -> Result<T, LedgerError> {
        let decoder = self
            .decoders
            .get(program_id)
            .ok_or_else(|| LedgerError::UnknownProgram(program_id.to_string()))?;
        decoder(accounts, data)
    }
}

impl<T> Default for DecoderRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
