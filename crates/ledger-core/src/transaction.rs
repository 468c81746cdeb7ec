//! Signed transactions and their wire format.
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message                 (see `message`)
//! ```
//!
//! Signature `i` belongs to `message.account_keys[i]`; an all-zero
//! signature marks a slot that has not been signed yet.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;

use crate::codec::{write_compact_len, Cursor};
use crate::compiler::{compile, CompileOptions};
use crate::error::LedgerError;
use crate::instruction::Instruction;
use crate::keys::{Hash, PrivateKey, PublicKey, Signature, SIGNATURE_LENGTH};
use crate::message::Message;

// ---------------------------------------------------------------------------
// Key lookup
// ---------------------------------------------------------------------------

/// Source of private keys for signing.
pub trait KeyProvider {
    fn private_key(&self, pubkey: &PublicKey) -> Option<&PrivateKey>;
}

impl KeyProvider for [PrivateKey] {
    fn private_key(&self, pubkey: &PublicKey) -> Option<&PrivateKey> {
        self.iter().find(|k| k.public_key() == *pubkey)
    }
}

impl<const N: usize> KeyProvider for [PrivateKey; N] {
    fn private_key(&self, pubkey: &PublicKey) -> Option<&PrivateKey> {
        self.as_slice().private_key(pubkey)
    }
}

impl KeyProvider for Vec<PrivateKey> {
    fn private_key(&self, pubkey: &PublicKey) -> Option<&PrivateKey> {
        self.as_slice().private_key(pubkey)
    }
}

impl KeyProvider for HashMap<PublicKey, PrivateKey> {
    fn private_key(&self, pubkey: &PublicKey) -> Option<&PrivateKey> {
        self.get(pubkey)
    }
}

impl KeyProvider for PrivateKey {
    fn private_key(&self, pubkey: &PublicKey) -> Option<&PrivateKey> {
        (self.public_key() == *pubkey).then_some(self)
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    pub signatures: Vec<Signature>,
    pub message: Message,
}

impl Transaction {
    /// Compile `instructions` into an unsigned transaction.
    pub fn new<I: Instruction>(
        instructions: &[I],
        recent_blockhash: Hash,
        options: &CompileOptions,
    ) -> Result<Self, LedgerError> {
        Ok(Self::from_message(compile(instructions, recent_blockhash, options)?))
    }

    pub fn from_message(message: Message) -> Self {
        Self {
            signatures: Vec::new(),
            message,
        }
    }

    /// The first signature, which doubles as the transaction id.
    pub fn signature(&self) -> Option<&Signature> {
        self.signatures.first()
    }

    /// Whether every required signature slot holds a signature.
    pub fn is_signed(&self) -> bool {
        self.signatures.len() == self.message.header.num_required_signatures as usize
            && self.signatures.iter().all(|s| !s.is_zero())
    }

    /// The signer keys, failing if the header claims more signers than the
    /// message carries keys.
    fn checked_signer_keys(&self) -> Result<&[PublicKey], LedgerError> {
        let signer_keys = self.message.signer_keys();
        let required = self.message.header.num_required_signatures as usize;
        if signer_keys.len() != required {
            return Err(LedgerError::InvalidHeader(format!(
                "{required} required signatures but only {} account keys",
                signer_keys.len()
            )));
        }
        Ok(signer_keys)
    }

    /// Sign with every key `keys` can supply, leaving other slots untouched.
    ///
    /// An empty signature list is first sized to the signer count.
    pub fn partial_sign<K: KeyProvider + ?Sized>(
        &mut self,
        keys: &K,
    ) -> Result<&[Signature], LedgerError> {
        let message_bytes = self.message.serialize()?;
        let signer_keys = self.checked_signer_keys()?.to_vec();

        if self.signatures.is_empty() {
            self.signatures = vec![Signature::default(); signer_keys.len()];
        } else if self.signatures.len() != signer_keys.len() {
            return Err(LedgerError::SignatureCountMismatch {
                expected: signer_keys.len(),
                actual: self.signatures.len(),
            });
        }

        let mut signed = 0usize;
        for (slot, pubkey) in self.signatures.iter_mut().zip(&signer_keys) {
            if let Some(private_key) = keys.private_key(pubkey) {
                *slot = private_key.sign(&message_bytes)?;
                signed += 1;
            }
        }
        debug!(signed, required = signer_keys.len(), "signed transaction");

        Ok(&self.signatures)
    }

    /// Sign with all required signers. Fails with `MissingSigner` before
    /// touching any slot if one of them cannot be resolved.
    pub fn sign<K: KeyProvider + ?Sized>(&mut self, keys: &K) -> Result<&[Signature], LedgerError> {
        if let Some(missing) = self
            .message
            .signer_keys()
            .iter()
            .find(|pubkey| keys.private_key(pubkey).is_none())
        {
            return Err(LedgerError::MissingSigner(missing.to_string()));
        }
        self.partial_sign(keys)
    }

    /// Check every required signature against its signer key.
    pub fn verify_signatures(&self) -> Result<(), LedgerError> {
        let signer_keys = self.checked_signer_keys()?;
        if self.signatures.len() != signer_keys.len() {
            return Err(LedgerError::SignatureCountMismatch {
                expected: signer_keys.len(),
                actual: self.signatures.len(),
            });
        }
        let message_bytes = self.message.serialize()?;
        for (signature, pubkey) in self.signatures.iter().zip(signer_keys) {
            signature.verify(pubkey, &message_bytes)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    pub fn serialize(&self) -> Result<Vec<u8>, LedgerError> {
        let message_bytes = self.message.serialize()?;
        let mut wire =
            Vec::with_capacity(3 + self.signatures.len() * SIGNATURE_LENGTH + message_bytes.len());

        write_compact_len(&mut wire, self.signatures.len())?;
        for signature in &self.signatures {
            wire.extend_from_slice(signature.as_bytes());
        }
        wire.extend_from_slice(&message_bytes);

        Ok(wire)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, LedgerError> {
        let mut cursor = Cursor::new(data);

        let count = cursor.read_count("signature", SIGNATURE_LENGTH)?;
        let mut signatures = Vec::with_capacity(count);
        for _ in 0..count {
            signatures.push(Signature(cursor.read_array()?));
        }

        let message = Message::read_from(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(LedgerError::TrailingBytes(cursor.remaining()));
        }

        Ok(Self {
            signatures,
            message,
        })
    }

    /// Base64 wire form, as submitted over RPC.
    pub fn serialize_base64(&self) -> Result<String, LedgerError> {
        Ok(BASE64.encode(self.serialize()?))
    }

    pub fn from_base64(text: &str) -> Result<Self, LedgerError> {
        let bytes = BASE64
            .decode(text)
            .map_err(|e| LedgerError::InvalidBase64(e.to_string()))?;
        Self::deserialize(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{AccountMeta, GenericInstruction};
    use crate::programs::SystemInstruction;

    fn keypair(b: u8) -> PrivateKey {
        PrivateKey::from_seed(&[b; 32])
    }

    fn transfer_tx(from: &PrivateKey) -> Transaction {
        let ix = SystemInstruction::Transfer {
            from: from.public_key(),
            to: PublicKey::new([0xbb; 32]),
            lamports: 1_000_000,
        };
        Transaction::new(&[ix], Hash::new([0xcc; 32]), &CompileOptions::default()).unwrap()
    }

    /// Two signers: the payer and a co-signer on a custom program.
    fn two_signer_tx(payer: &PrivateKey, cosigner: &PrivateKey) -> Transaction {
        let ix = GenericInstruction::new(
            PublicKey::new([0x40; 32]),
            vec![
                AccountMeta::writable(payer.public_key(), true),
                AccountMeta::readonly(cosigner.public_key(), true),
            ],
            vec![1, 2, 3],
        );
        Transaction::new(&[ix], Hash::new([0xdd; 32]), &CompileOptions::default()).unwrap()
    }

    // -- signing ------------------------------------------------------------

    #[test]
    fn sign_produces_valid_wire_bytes() {
        let key = keypair(0x42);
        let mut tx = transfer_tx(&key);
        tx.sign(&key).unwrap();

        let wire = tx.serialize().unwrap();
        // Wire starts with compact-u16 num_signatures = 1 (one byte: 0x01).
        assert_eq!(wire[0], 0x01);

        let signature = Signature::from_slice(&wire[1..65]).unwrap();
        let message_bytes = &wire[65..];
        assert!(signature.verify(&key.public_key(), message_bytes).is_ok());
        assert!(tx.verify_signatures().is_ok());
        assert!(tx.is_signed());
    }

    #[test]
    fn signing_is_deterministic() {
        let key = keypair(0x55);
        let mut a = transfer_tx(&key);
        let mut b = transfer_tx(&key);
        a.sign(&key).unwrap();
        b.sign(&key).unwrap();
        assert_eq!(a.serialize().unwrap(), b.serialize().unwrap());
    }

    #[test]
    fn sign_with_missing_signer_leaves_transaction_untouched() {
        let payer = keypair(1);
        let cosigner = keypair(2);
        let mut tx = two_signer_tx(&payer, &cosigner);

        let err = tx.sign(&[payer.clone()]).unwrap_err();
        assert_eq!(err, LedgerError::MissingSigner(cosigner.public_key().to_string()));
        assert!(tx.signatures.is_empty());
    }

    #[test]
    fn partial_sign_fills_matching_slots() {
        let payer = keypair(1);
        let cosigner = keypair(2);
        let mut tx = two_signer_tx(&payer, &cosigner);

        tx.partial_sign(&vec![cosigner.clone()]).unwrap();
        assert_eq!(tx.signatures.len(), 2);
        assert!(tx.signatures[0].is_zero());
        assert!(!tx.signatures[1].is_zero());
        assert!(!tx.is_signed());
        assert!(tx.verify_signatures().is_err());

        tx.partial_sign(&payer).unwrap();
        assert!(tx.is_signed());
        assert!(tx.verify_signatures().is_ok());
    }

    #[test]
    fn partial_sign_rejects_wrong_signature_count() {
        let payer = keypair(1);
        let mut tx = transfer_tx(&payer);
        tx.signatures = vec![Signature::default(); 3];
        assert_eq!(
            tx.partial_sign(&payer).unwrap_err(),
            LedgerError::SignatureCountMismatch {
                expected: 1,
                actual: 3
            }
        );
    }

    #[test]
    fn hashmap_provider() {
        let payer = keypair(1);
        let cosigner = keypair(2);
        let mut keys = HashMap::new();
        keys.insert(payer.public_key(), payer.clone());
        keys.insert(cosigner.public_key(), cosigner.clone());

        let mut tx = two_signer_tx(&payer, &cosigner);
        tx.sign(&keys).unwrap();
        assert!(tx.verify_signatures().is_ok());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let key = keypair(7);
        let mut tx = transfer_tx(&key);
        tx.sign(&key).unwrap();
        tx.message.recent_blockhash = Hash::new([0x01; 32]);
        assert!(matches!(
            tx.verify_signatures(),
            Err(LedgerError::SignatureVerification(_))
        ));
    }

    // -- wire format --------------------------------------------------------

    #[test]
    fn wire_roundtrip() {
        let payer = keypair(1);
        let cosigner = keypair(2);
        let mut tx = two_signer_tx(&payer, &cosigner);
        tx.partial_sign(&payer).unwrap();

        let wire = tx.serialize().unwrap();
        assert_eq!(Transaction::deserialize(&wire).unwrap(), tx);

        let text = tx.serialize_base64().unwrap();
        assert_eq!(Transaction::from_base64(&text).unwrap(), tx);
    }

    #[test]
    fn resign_decoded_transaction() {
        // A transaction handed over unsigned can be decoded, signed and
        // re-encoded without touching the message bytes.
        let key = keypair(0x42);
        let mut tx = transfer_tx(&key);
        tx.signatures = vec![Signature::default()];
        let unsigned = tx.serialize().unwrap();

        let mut decoded = Transaction::deserialize(&unsigned).unwrap();
        decoded.sign(&key).unwrap();
        let signed = decoded.serialize().unwrap();

        assert_eq!(&signed[65..], &unsigned[65..]);
        assert_ne!(&signed[1..65], &unsigned[1..65]);
    }

    #[test]
    fn hostile_signature_count_rejected() {
        // Claims 127 signatures with almost nothing behind it.
        let data = [0x7f, 0x00, 0x01];
        assert!(matches!(
            Transaction::deserialize(&data),
            Err(LedgerError::CountOverflow {
                what: "signature",
                ..
            })
        ));
    }

    #[test]
    fn decoded_header_claiming_missing_signers_rejected() {
        let key = keypair(9);
        let tx = transfer_tx(&key);
        let mut wire = tx.serialize().unwrap();
        // No signatures yet, so the header starts at byte 1. Claim 5 signers
        // over 3 keys.
        assert_eq!(wire[0], 0);
        wire[1] = 5;
        assert!(matches!(
            Transaction::deserialize(&wire),
            Err(LedgerError::InvalidHeader(_))
        ));
    }

    #[test]
    fn short_key_list_cannot_be_signed() {
        let key = keypair(9);
        let mut tx = transfer_tx(&key);
        tx.message.header.num_required_signatures = 5;

        assert!(matches!(
            tx.partial_sign(&key),
            Err(LedgerError::InvalidHeader(_))
        ));
        assert!(tx.signatures.is_empty());
        assert!(matches!(
            tx.verify_signatures(),
            Err(LedgerError::InvalidHeader(_))
        ));
    }

    #[test]
    fn empty_input_rejected() {
        assert!(Transaction::deserialize(&[]).is_err());
        assert!(Transaction::deserialize(&[0x00]).is_err());
    }

    #[test]
    fn trailing_bytes_rejected() {
        let key = keypair(3);
        let mut tx = transfer_tx(&key);
        tx.sign(&key).unwrap();
        let mut wire = tx.serialize().unwrap();
        wire.extend_from_slice(&[0, 0]);
        assert_eq!(
            Transaction::deserialize(&wire),
            Err(LedgerError::TrailingBytes(2))
        );
    }
}
