//! Associated Token Account Program instructions.

use crate::error::LedgerError;
use crate::instruction::{account_at, encode_variant, AccountMeta, Instruction, TypeIdEncoding};
use crate::keys::PublicKey;
use crate::pda::find_associated_token_address;

use super::{ASSOCIATED_TOKEN_PROGRAM_ID, SYSTEM_PROGRAM_ID, SYSVAR_RENT_ID, TOKEN_PROGRAM_ID};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociatedTokenInstruction {
    /// Create the associated token account of `wallet` for `mint`, paid by
    /// `payer`.
    Create {
        payer: PublicKey,
        associated_account: PublicKey,
        wallet: PublicKey,
        mint: PublicKey,
    },
}

impl AssociatedTokenInstruction {
    /// Build a `Create`, deriving the associated account address.
    pub fn create(payer: PublicKey, wallet: PublicKey, mint: PublicKey) -> Result<Self, LedgerError> {
        let (associated_account, _bump) = find_associated_token_address(&wallet, &mint)?;
        Ok(Self::Create {
            payer,
            associated_account,
            wallet,
            mint,
        })
    }
}

impl Instruction for AssociatedTokenInstruction {
    fn program_id(&self) -> PublicKey {
        ASSOCIATED_TOKEN_PROGRAM_ID
    }

    fn accounts(&self) -> Vec<AccountMeta> {
        match self {
            Self::Create {
                payer,
                associated_account,
                wallet,
                mint,
            } => vec![
                AccountMeta::writable(*payer, true),
                AccountMeta::writable(*associated_account, false),
                AccountMeta::readonly(*wallet, false),
                AccountMeta::readonly(*mint, false),
                AccountMeta::readonly(SYSTEM_PROGRAM_ID, false),
                AccountMeta::readonly(TOKEN_PROGRAM_ID, false),
                AccountMeta::readonly(SYSVAR_RENT_ID, false),
            ],
        }
    }

    fn data(&self) -> Result<Vec<u8>, LedgerError> {
        encode_variant(TypeIdEncoding::None, 0, &[])
    }
}

/// Decode an Associated Token Account Program instruction.
pub fn decode_instruction(
    accounts: &[AccountMeta],
    data: &[u8],
) -> Result<AssociatedTokenInstruction, LedgerError> {
    if !data.is_empty() {
        return Err(LedgerError::TrailingBytes(data.len()));
    }
    Ok(AssociatedTokenInstruction::Create {
        payer: account_at(accounts, 0, "payer")?.pubkey,
        associated_account: account_at(accounts, 1, "associated token")?.pubkey,
        wallet: account_at(accounts, 2, "wallet")?.pubkey,
        mint: account_at(accounts, 3, "mint")?.pubkey,
    })
}
