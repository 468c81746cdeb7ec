//! Token Program instructions.
//!
//! Data is a one-byte variant id followed by the variant's arguments. The
//! authority of `Transfer` and `CloseAccount` is either a single signing
//! owner or a multisig account followed by its signers.

use crate::codec::Cursor;
use crate::error::LedgerError;
use crate::instruction::{
    account_at, decode_variant, encode_variant, AccountMeta, Instruction, TypeIdEncoding,
};
use crate::keys::PublicKey;

use super::{SYSVAR_RENT_ID, TOKEN_PROGRAM_ID};

const INITIALIZE_ACCOUNT: u32 = 1;
const TRANSFER: u32 = 3;
const CLOSE_ACCOUNT: u32 = 9;
const SYNC_NATIVE: u32 = 17;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenInstruction {
    /// Initialize a token account for `mint` held by `owner`.
    InitializeAccount {
        account: PublicKey,
        mint: PublicKey,
        owner: PublicKey,
    },
    /// Move `amount` base units between token accounts.
    Transfer {
        source: PublicKey,
        destination: PublicKey,
        owner: PublicKey,
        signers: Vec<PublicKey>,
        amount: u64,
    },
    /// Close a token account and send its lamports to `destination`.
    CloseAccount {
        account: PublicKey,
        destination: PublicKey,
        owner: PublicKey,
        signers: Vec<PublicKey>,
    },
    /// Sync a wrapped-native account's token balance with its lamports.
    SyncNative { account: PublicKey },
}

impl TokenInstruction {
    /// Single-owner transfer.
    pub fn transfer(source: PublicKey, destination: PublicKey, owner: PublicKey, amount: u64) -> Self {
        Self::Transfer {
            source,
            destination,
            owner,
            signers: Vec::new(),
            amount,
        }
    }

    fn type_id(&self) -> u32 {
        match self {
            Self::InitializeAccount { .. } => INITIALIZE_ACCOUNT,
            Self::Transfer { .. } => TRANSFER,
            Self::CloseAccount { .. } => CLOSE_ACCOUNT,
            Self::SyncNative { .. } => SYNC_NATIVE,
        }
    }
}

/// Owner meta plus one read-only signer meta per multisig signer.
fn authority_accounts(owner: &PublicKey, signers: &[PublicKey]) -> Vec<AccountMeta> {
    let mut accounts = Vec::with_capacity(1 + signers.len());
    accounts.push(AccountMeta::readonly(*owner, signers.is_empty()));
    accounts.extend(signers.iter().map(|s| AccountMeta::readonly(*s, true)));
    accounts
}

impl Instruction for TokenInstruction {
    fn program_id(&self) -> PublicKey {
        TOKEN_PROGRAM_ID
    }

    fn accounts(&self) -> Vec<AccountMeta> {
        match self {
            Self::InitializeAccount {
                account,
                mint,
                owner,
            } => vec![
                AccountMeta::writable(*account, false),
                AccountMeta::readonly(*mint, false),
                AccountMeta::readonly(*owner, false),
                AccountMeta::readonly(SYSVAR_RENT_ID, false),
            ],
            Self::Transfer {
                source,
                destination,
                owner,
                signers,
                ..
            } => {
                let mut accounts = vec![
                    AccountMeta::writable(*source, false),
                    AccountMeta::writable(*destination, false),
                ];
                accounts.extend(authority_accounts(owner, signers));
                accounts
            }
            Self::CloseAccount {
                account,
                destination,
                owner,
                signers,
            } => {
                let mut accounts = vec![
                    AccountMeta::writable(*account, false),
                    AccountMeta::writable(*destination, false),
                ];
                accounts.extend(authority_accounts(owner, signers));
                accounts
            }
            Self::SyncNative { account } => vec![AccountMeta::writable(*account, false)],
        }
    }

    fn data(&self) -> Result<Vec<u8>, LedgerError> {
        let body = match self {
            Self::Transfer { amount, .. } => amount.to_le_bytes().to_vec(),
            _ => Vec::new(),
        };
        encode_variant(TypeIdEncoding::U8, self.type_id(), &body)
    }
}

/// Decode a Token Program instruction.
pub fn decode_instruction(
    accounts: &[AccountMeta],
    data: &[u8],
) -> Result<TokenInstruction, LedgerError> {
    let signers = || -> Vec<PublicKey> { accounts.iter().skip(3).map(|a| a.pubkey).collect() };

    let mut cursor = Cursor::new(data);
    let ix = match decode_variant(TypeIdEncoding::U8, &mut cursor)? {
        INITIALIZE_ACCOUNT => TokenInstruction::InitializeAccount {
            account: account_at(accounts, 0, "token")?.pubkey,
            mint: account_at(accounts, 1, "mint")?.pubkey,
            owner: account_at(accounts, 2, "owner")?.pubkey,
        },
        TRANSFER => TokenInstruction::Transfer {
            source: account_at(accounts, 0, "source")?.pubkey,
            destination: account_at(accounts, 1, "destination")?.pubkey,
            owner: account_at(accounts, 2, "owner")?.pubkey,
            signers: signers(),
            amount: cursor.read_u64()?,
        },
        CLOSE_ACCOUNT => TokenInstruction::CloseAccount {
            account: account_at(accounts, 0, "token")?.pubkey,
            destination: account_at(accounts, 1, "destination")?.pubkey,
            owner: account_at(accounts, 2, "owner")?.pubkey,
            signers: signers(),
        },
        SYNC_NATIVE => TokenInstruction::SyncNative {
            account: account_at(accounts, 0, "native token")?.pubkey,
        },
        other => {
            return Err(LedgerError::InvalidInstruction(format!(
                "unsupported token instruction {other}"
            )))
        }
    };

    if !cursor.is_empty() {
        return Err(LedgerError::TrailingBytes(cursor.remaining()));
    }
    Ok(ix)
}
