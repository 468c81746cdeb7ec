//! Built-in program ids and instruction builders.
//!
//! Each program module exposes a typed instruction enum that implements
//! [`Instruction`](crate::instruction::Instruction) and a matching
//! `decode_instruction(accounts, data)`.

pub mod associated_token;
pub mod system;
pub mod token;

use crate::error::LedgerError;
use crate::keys::PublicKey;
use crate::registry::DecoderRegistry;

pub use associated_token::AssociatedTokenInstruction;
pub use system::SystemInstruction;
pub use token::TokenInstruction;

// ---------------------------------------------------------------------------
// Well-known program ids
// ---------------------------------------------------------------------------

/// System Program: 32 zero bytes, `11111111111111111111111111111111`.
pub const SYSTEM_PROGRAM_ID: PublicKey = PublicKey::new([0u8; 32]);

/// Token Program: `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: PublicKey = PublicKey::new([
    0x06, 0xdd, 0xf6, 0xe1, 0xd7, 0x65, 0xa1, 0x93, 0xd9, 0xcb, 0xe1, 0x46, 0xce, 0xeb, 0x79, 0xac,
    0x1c, 0xb4, 0x85, 0xed, 0x5f, 0x5b, 0x37, 0x91, 0x3a, 0x8c, 0xf5, 0x85, 0x7e, 0xff, 0x00, 0xa9,
]);

/// Associated Token Account Program: `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: PublicKey = PublicKey::new([
    0x8c, 0x97, 0x25, 0x8f, 0x4e, 0x24, 0x89, 0xf1, 0xbb, 0x3d, 0x10, 0x29, 0x14, 0x8e, 0x0d, 0x83,
    0x0b, 0x5a, 0x13, 0x99, 0xda, 0xff, 0x10, 0x84, 0x04, 0x8e, 0x7b, 0xd8, 0xdb, 0xe9, 0xf8, 0x59,
]);

/// Rent sysvar: `SysvarRent111111111111111111111111111111111`
pub const SYSVAR_RENT_ID: PublicKey = PublicKey::new([
    0x06, 0xa7, 0xd5, 0x17, 0x19, 0x2c, 0x5c, 0x51, 0x21, 0x8c, 0xc9, 0x4c, 0x3d, 0x4a, 0xf1, 0x7f,
    0x58, 0xda, 0xee, 0x08, 0x9b, 0xa1, 0xfd, 0x44, 0xe3, 0xdb, 0xd9, 0x8a, 0x00, 0x00, 0x00, 0x00,
]);

/// Wrapped native mint: `So11111111111111111111111111111111111111112`
pub const NATIVE_MINT: PublicKey = PublicKey::new([
    0x06, 0x9b, 0x88, 0x57, 0xfe, 0xab, 0x81, 0x84, 0xfb, 0x68, 0x7f, 0x63, 0x46, 0x18, 0xc0, 0x35,
    0xda, 0xc4, 0x39, 0xdc, 0x1a, 0xeb, 0x3b, 0x55, 0x98, 0xa0, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x01,
]);

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Any instruction of a built-in program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramInstruction {
    System(SystemInstruction),
    Token(TokenInstruction),
    AssociatedToken(AssociatedTokenInstruction),
}

/// A registry with decoders for the System, Token and Associated Token
/// programs.
pub fn default_registry() -> Result<DecoderRegistry<ProgramInstruction>, LedgerError> {
    let mut registry = DecoderRegistry::new();
    registry.register(SYSTEM_PROGRAM_ID, |accounts, data| {
        system::decode_instruction(accounts, data).map(ProgramInstruction::System)
    })?;
    registry.register(TOKEN_PROGRAM_ID, |accounts, data| {
        token::decode_instruction(accounts, data).map(ProgramInstruction::Token)
    })?;
    registry.register(ASSOCIATED_TOKEN_PROGRAM_ID, |accounts, data| {
        associated_token::decode_instruction(accounts, data).map(ProgramInstruction::AssociatedToken)
    })?;
    Ok(registry)
}
