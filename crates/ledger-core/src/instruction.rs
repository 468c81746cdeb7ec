//! Instructions as the compiler sees them: a program id, an ordered list of
//! account references and an opaque data payload.

use crate::codec::Cursor;
use crate::error::LedgerError;
use crate::keys::PublicKey;

// ---------------------------------------------------------------------------
// Account references
// ---------------------------------------------------------------------------

/// A single account reference in an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: PublicKey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(pubkey: PublicKey, is_signer: bool, is_writable: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable,
        }
    }

    /// Writable reference, optionally a signer.
    pub fn writable(pubkey: PublicKey, is_signer: bool) -> Self {
        Self::new(pubkey, is_signer, true)
    }

    /// Read-only reference, optionally a signer.
    pub fn readonly(pubkey: PublicKey, is_signer: bool) -> Self {
        Self::new(pubkey, is_signer, false)
    }
}

// ---------------------------------------------------------------------------
// Instruction capability
// ---------------------------------------------------------------------------

/// Anything the compiler can place into a message.
pub trait Instruction {
    fn program_id(&self) -> PublicKey;
    fn accounts(&self) -> Vec<AccountMeta>;
    fn data(&self) -> Result<Vec<u8>, LedgerError>;
}

impl<T: Instruction + ?Sized> Instruction for &T {
    fn program_id(&self) -> PublicKey {
        (**self).program_id()
    }

    fn accounts(&self) -> Vec<AccountMeta> {
        (**self).accounts()
    }

    fn data(&self) -> Result<Vec<u8>, LedgerError> {
        (**self).data()
    }
}

impl<T: Instruction + ?Sized> Instruction for Box<T> {
    fn program_id(&self) -> PublicKey {
        (**self).program_id()
    }

    fn accounts(&self) -> Vec<AccountMeta> {
        (**self).accounts()
    }

    fn data(&self) -> Result<Vec<u8>, LedgerError> {
        (**self).data()
    }
}

/// A fully materialised instruction with no program-specific typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericInstruction {
    pub program_id: PublicKey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

impl GenericInstruction {
    pub fn new(program_id: PublicKey, accounts: Vec<AccountMeta>, data: Vec<u8>) -> Self {
        Self {
            program_id,
            accounts,
            data,
        }
    }

    /// Snapshot any instruction into a plain value.
    pub fn from_instruction<I: Instruction + ?Sized>(ix: &I) -> Result<Self, LedgerError> {
        Ok(Self::new(ix.program_id(), ix.accounts(), ix.data()?))
    }
}

impl Instruction for GenericInstruction {
    fn program_id(&self) -> PublicKey {
        self.program_id
    }

    fn accounts(&self) -> Vec<AccountMeta> {
        self.accounts.clone()
    }

    fn data(&self) -> Result<Vec<u8>, LedgerError> {
        Ok(self.data.clone())
    }
}

// ---------------------------------------------------------------------------
// Variant discriminants
// ---------------------------------------------------------------------------

/// How a program prefixes its instruction data with a variant id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeIdEncoding {
    /// One byte (token program).
    U8,
    /// Little-endian u32 (system program).
    U32,
    /// No prefix; the program has a single instruction.
    None,
}

/// Prefix `body` with the discriminant `type_id` in the given encoding.
pub fn encode_variant(
    encoding: TypeIdEncoding,
    type_id: u32,
    body: &[u8],
) -> Result<Vec<u8>, LedgerError> {
    let mut out = Vec::with_capacity(4 + body.len());
    match encoding {
        TypeIdEncoding::U8 => {
            let id = u8::try_from(type_id).map_err(|_| {
                LedgerError::InvalidInstruction(format!("type id {type_id} does not fit in a u8"))
            })?;
            out.push(id);
        }
        TypeIdEncoding::U32 => out.extend_from_slice(&type_id.to_le_bytes()),
        TypeIdEncoding::None => {}
    }
    out.extend_from_slice(body);
    Ok(out)
}

/// Read the discriminant written by [`encode_variant`].
///
/// `TypeIdEncoding::None` always yields 0 and consumes nothing.
pub fn decode_variant(encoding: TypeIdEncoding, cursor: &mut Cursor<'_>) -> Result<u32, LedgerError> {
    match encoding {
        TypeIdEncoding::U8 => Ok(cursor.read_u8()? as u32),
        TypeIdEncoding::U32 => cursor.read_u32(),
        TypeIdEncoding::None => Ok(0),
    }
}

/// Fetch the account at `index` or fail naming the missing slot.
pub(crate) fn account_at(
    accounts: &[AccountMeta],
    index: usize,
    name: &str,
) -> Result<AccountMeta, LedgerError> {
    accounts
        .get(index)
        .copied()
        .ok_or_else(|| LedgerError::InvalidInstruction(format!("missing {name} account")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_meta_helpers() {
        let key = PublicKey::new([4u8; 32]);
        let w = AccountMeta::writable(key, true);
        assert!(w.is_signer && w.is_writable);
        let r = AccountMeta::readonly(key, false);
        assert!(!r.is_signer && !r.is_writable);
    }

    #[test]
    fn generic_instruction_through_trait_objects() {
        let ix = GenericInstruction::new(
            PublicKey::new([1u8; 32]),
            vec![AccountMeta::writable(PublicKey::new([2u8; 32]), true)],
            vec![9, 9],
        );
        let boxed: Box<dyn Instruction> = Box::new(ix.clone());
        assert_eq!(boxed.program_id(), ix.program_id);
        assert_eq!(boxed.accounts(), ix.accounts);
        assert_eq!(GenericInstruction::from_instruction(&boxed).unwrap(), ix);
    }

    // -- variant discriminants ----------------------------------------------

    #[test]
    fn encode_variant_u32_little_endian() {
        let data = encode_variant(TypeIdEncoding::U32, 2, &[0xaa]).unwrap();
        assert_eq!(data, vec![2, 0, 0, 0, 0xaa]);
    }

    #[test]
    fn encode_variant_u8() {
        let data = encode_variant(TypeIdEncoding::U8, 17, &[]).unwrap();
        assert_eq!(data, vec![17]);
    }

    #[test]
    fn encode_variant_u8_rejects_wide_ids() {
        assert!(matches!(
            encode_variant(TypeIdEncoding::U8, 300, &[]),
            Err(LedgerError::InvalidInstruction(_))
        ));
    }

    #[test]
    fn encode_variant_none_is_body_only() {
        let data = encode_variant(TypeIdEncoding::None, 0, &[1, 2]).unwrap();
        assert_eq!(data, vec![1, 2]);
    }

    #[test]
    fn decode_variant_reads_prefix() {
        let data = [3u8, 0, 0, 0, 7];
        let mut cursor = Cursor::new(&data);
        assert_eq!(decode_variant(TypeIdEncoding::U32, &mut cursor).unwrap(), 3);
        assert_eq!(cursor.remaining(), 1);

        let mut cursor = Cursor::new(&data);
        assert_eq!(decode_variant(TypeIdEncoding::None, &mut cursor).unwrap(), 0);
        assert_eq!(cursor.remaining(), 5);
    }
}
