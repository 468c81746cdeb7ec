//! System Program instructions.
//!
//! Data is a little-endian u32 variant id followed by the fixed-layout
//! arguments of that variant.

use sha2::{Digest, Sha256};

use crate::codec::Cursor;
use crate::error::LedgerError;
use crate::instruction::{
    account_at, decode_variant, encode_variant, AccountMeta, Instruction, TypeIdEncoding,
};
use crate::keys::PublicKey;
use crate::pda::MAX_SEED_LEN;

use super::SYSTEM_PROGRAM_ID;

const CREATE_ACCOUNT: u32 = 0;
const ASSIGN: u32 = 1;
const TRANSFER: u32 = 2;
const CREATE_ACCOUNT_WITH_SEED: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemInstruction {
    /// Create a new account funded by `funding`.
    CreateAccount {
        funding: PublicKey,
        new_account: PublicKey,
        lamports: u64,
        space: u64,
        owner: PublicKey,
    },
    /// Assign `account` to a program.
    Assign { account: PublicKey, owner: PublicKey },
    /// Move lamports between accounts.
    Transfer {
        from: PublicKey,
        to: PublicKey,
        lamports: u64,
    },
    /// Create an account at an address derived from `base` and `seed`.
    ///
    /// `base` only appears as a separate signer account when it differs from
    /// `funding`.
    CreateAccountWithSeed {
        funding: PublicKey,
        created: PublicKey,
        base: PublicKey,
        seed: String,
        lamports: u64,
        space: u64,
        owner: PublicKey,
    },
}

impl SystemInstruction {
    fn type_id(&self) -> u32 {
        match self {
            Self::CreateAccount { .. } => CREATE_ACCOUNT,
            Self::Assign { .. } => ASSIGN,
            Self::Transfer { .. } => TRANSFER,
            Self::CreateAccountWithSeed { .. } => CREATE_ACCOUNT_WITH_SEED,
        }
    }
}

impl Instruction for SystemInstruction {
    fn program_id(&self) -> PublicKey {
        SYSTEM_PROGRAM_ID
    }

    fn accounts(&self) -> Vec<AccountMeta> {
        match self {
            Self::CreateAccount {
                funding,
                new_account,
                ..
            } => vec![
                AccountMeta::writable(*funding, true),
                AccountMeta::writable(*new_account, true),
            ],
            Self::Assign { account, .. } => vec![AccountMeta::writable(*account, true)],
            Self::Transfer { from, to, .. } => vec![
                AccountMeta::writable(*from, true),
                AccountMeta::writable(*to, false),
            ],
            Self::CreateAccountWithSeed {
                funding,
                created,
                base,
                ..
            } => {
                let mut accounts = vec![
                    AccountMeta::writable(*funding, true),
                    AccountMeta::writable(*created, false),
                ];
                if base != funding {
                    accounts.push(AccountMeta::readonly(*base, true));
                }
                accounts
            }
        }
    }

    fn data(&self) -> Result<Vec<u8>, LedgerError> {
        let mut body = Vec::with_capacity(64);
        match self {
            Self::CreateAccount {
                lamports,
                space,
                owner,
                ..
            } => {
                body.extend_from_slice(&lamports.to_le_bytes());
                body.extend_from_slice(&space.to_le_bytes());
                body.extend_from_slice(owner.as_bytes());
            }
            Self::Assign { owner, .. } => body.extend_from_slice(owner.as_bytes()),
            Self::Transfer { lamports, .. } => body.extend_from_slice(&lamports.to_le_bytes()),
            Self::CreateAccountWithSeed {
                base,
                seed,
                lamports,
                space,
                owner,
                ..
            } => {
                if seed.len() > MAX_SEED_LEN {
                    return Err(LedgerError::SeedTooLong(seed.len()));
                }
                body.extend_from_slice(base.as_bytes());
                body.extend_from_slice(&(seed.len() as u64).to_le_bytes());
                body.extend_from_slice(seed.as_bytes());
                body.extend_from_slice(&lamports.to_le_bytes());
                body.extend_from_slice(&space.to_le_bytes());
                body.extend_from_slice(owner.as_bytes());
            }
        }
        encode_variant(TypeIdEncoding::U32, self.type_id(), &body)
    }
}

/// Derive the address `CreateAccountWithSeed` creates:
/// `SHA-256(base || seed || owner)`.
pub fn create_with_seed(
    base: &PublicKey,
    seed: &str,
    owner: &PublicKey,
) -> Result<PublicKey, LedgerError> {
    if seed.len() > MAX_SEED_LEN {
        return Err(LedgerError::SeedTooLong(seed.len()));
    }
    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    hasher.update(seed.as_bytes());
    hasher.update(owner.as_bytes());
    Ok(PublicKey(hasher.finalize().into()))
}

/// Decode a System Program instruction.
pub fn decode_instruction(
    accounts: &[AccountMeta],
    data: &[u8],
) -> Result<SystemInstruction, LedgerError> {
    let mut cursor = Cursor::new(data);
    let ix = match decode_variant(TypeIdEncoding::U32, &mut cursor)? {
        CREATE_ACCOUNT => SystemInstruction::CreateAccount {
            funding: account_at(accounts, 0, "funding")?.pubkey,
            new_account: account_at(accounts, 1, "new")?.pubkey,
            lamports: cursor.read_u64()?,
            space: cursor.read_u64()?,
            owner: PublicKey(cursor.read_array()?),
        },
        ASSIGN => SystemInstruction::Assign {
            account: account_at(accounts, 0, "assigned")?.pubkey,
            owner: PublicKey(cursor.read_array()?),
        },
        TRANSFER => SystemInstruction::Transfer {
            from: account_at(accounts, 0, "funding")?.pubkey,
            to: account_at(accounts, 1, "recipient")?.pubkey,
            lamports: cursor.read_u64()?,
        },
        CREATE_ACCOUNT_WITH_SEED => {
            let base = PublicKey(cursor.read_array()?);
            let seed_len = cursor.read_u64()?;
            let seed_len = usize::try_from(seed_len)
                .ok()
                .filter(|len| *len <= MAX_SEED_LEN)
                .ok_or(LedgerError::SeedTooLong(seed_len as usize))?;
            let seed = String::from_utf8(cursor.read_exact(seed_len)?.to_vec())
                .map_err(|e| LedgerError::InvalidInstruction(format!("seed is not utf-8: {e}")))?;
            SystemInstruction::CreateAccountWithSeed {
                funding: account_at(accounts, 0, "funding")?.pubkey,
                created: account_at(accounts, 1, "created")?.pubkey,
                base,
                seed,
                lamports: cursor.read_u64()?,
                space: cursor.read_u64()?,
                owner: PublicKey(cursor.read_array()?),
            }
        }
        other => {
            return Err(LedgerError::InvalidInstruction(format!(
                "unsupported system instruction {other}"
            )))
        }
    };

    if !cursor.is_empty() {
        return Err(LedgerError::TrailingBytes(cursor.remaining()));
    }
    Ok(ix)
}
