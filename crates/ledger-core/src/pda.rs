//! Program-derived addresses.
//!
//! A PDA is `SHA-256(seed_0 || ... || seed_n || program_id || "ProgramDerivedAddress")`
//! that does NOT decompress to an ed25519 point, so nobody can hold a
//! private key for it. [`find_program_address`] walks a trailing one-byte
//! bump seed from 255 down to 1 until the hash lands off the curve.

use sha2::{Digest, Sha256};

use crate::error::LedgerError;
use crate::keys::{is_on_curve, PublicKey};
use crate::programs::{ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_PROGRAM_ID};

/// Maximum number of seeds.
pub const MAX_SEEDS: usize = 16;

/// Maximum length of a single seed in bytes.
pub const MAX_SEED_LEN: usize = 32;

/// The string appended to PDA derivation.
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

fn check_seeds(seeds: &[&[u8]]) -> Result<(), LedgerError> {
    if seeds.len() > MAX_SEEDS {
        return Err(LedgerError::TooManySeeds(seeds.len()));
    }
    if let Some(seed) = seeds.iter().find(|s| s.len() > MAX_SEED_LEN) {
        return Err(LedgerError::SeedTooLong(seed.len()));
    }
    Ok(())
}

fn hash_seeds(seeds: &[&[u8]], bump: Option<u8>, program_id: &PublicKey) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    if let Some(bump) = bump {
        hasher.update([bump]);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    hasher.finalize().into()
}

/// Derive a PDA from exactly the given seeds, without a bump search.
///
/// Fails with `InvalidSeeds` if the result happens to lie on the curve.
pub fn create_program_address(
    seeds: &[&[u8]],
    program_id: &PublicKey,
) -> Result<PublicKey, LedgerError> {
    check_seeds(seeds)?;
    let hash = hash_seeds(seeds, None, program_id);
    if is_on_curve(&hash) {
        return Err(LedgerError::InvalidSeeds);
    }
    Ok(PublicKey(hash))
}

/// Find a valid PDA and its bump seed for the given seeds and program.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &PublicKey,
) -> Result<(PublicKey, u8), LedgerError> {
    check_seeds(seeds)?;

    for bump in (1u8..=255).rev() {
        let hash = hash_seeds(seeds, Some(bump), program_id);
        if !is_on_curve(&hash) {
            return Ok((PublicKey(hash), bump));
        }
    }

    Err(LedgerError::NoValidAddress)
}

/// Derive the associated token account for a wallet + mint pair.
///
/// Seeds are `[wallet, token_program_id, mint]` against the associated
/// token account program.
pub fn find_associated_token_address(
    wallet: &PublicKey,
    mint: &PublicKey,
) -> Result<(PublicKey, u8), LedgerError> {
    find_program_address(
        &[wallet.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
}
