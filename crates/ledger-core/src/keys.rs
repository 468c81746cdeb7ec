//! Public keys, hashes, signatures and ed25519 private keys.
//!
//! Public keys and hashes are plain 32-byte values whose text form is
//! Base58 (the Bitcoin alphabet used by the `bs58` crate). There is no
//! hashing step: the ed25519 public key bytes ARE the address bytes.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::LedgerError;

pub const PUBLIC_KEY_LENGTH: usize = 32;
pub const HASH_LENGTH: usize = 32;
pub const SIGNATURE_LENGTH: usize = 64;
pub const PRIVATE_KEY_LENGTH: usize = 64;

/// Decode Base58 text into exactly `N` bytes.
fn decode_base58<const N: usize>(text: &str) -> Result<[u8; N], LedgerError> {
    let bytes = bs58::decode(text)
        .into_vec()
        .map_err(|e| LedgerError::InvalidBase58(e.to_string()))?;

    bytes
        .try_into()
        .map_err(|v: Vec<u8>| LedgerError::InvalidLength {
            expected: N,
            actual: v.len(),
        })
}

/// Fixed-width byte values with Base58 text, serde as a Base58 string, and a
/// distinguished all-zero "unset" value.
macro_rules! base58_value {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, LedgerError> {
                let arr: [u8; $len] =
                    bytes.try_into().map_err(|_| LedgerError::InvalidLength {
                        expected: $len,
                        actual: bytes.len(),
                    })?;
                Ok(Self(arr))
            }

            pub fn to_bytes(&self) -> [u8; $len] {
                self.0
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self([0u8; $len])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl FromStr for $name {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_base58::<$len>(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&bs58::encode(self.0).into_string())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

base58_value!(
    /// A 32-byte account address / ed25519 public key.
    PublicKey,
    PUBLIC_KEY_LENGTH
);

base58_value!(
    /// A 32-byte content hash, also used as the recent-blockhash liveness
    /// token of a message.
    Hash,
    HASH_LENGTH
);

base58_value!(
    /// A 64-byte ed25519 signature. All-zero means "slot not signed yet".
    Signature,
    SIGNATURE_LENGTH
);

impl PublicKey {
    /// Whether the bytes decompress to a point on the ed25519 curve.
    pub fn is_on_curve(&self) -> bool {
        is_on_curve(&self.0)
    }
}

impl Signature {
    /// Verify this signature over `message` against `pubkey`.
    pub fn verify(&self, pubkey: &PublicKey, message: &[u8]) -> Result<(), LedgerError> {
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&pubkey.0)
            .map_err(|_| LedgerError::NotOnCurve)?;
        let signature = ed25519_dalek::Signature::from_bytes(&self.0);
        verifying_key
            .verify(message, &signature)
            .map_err(|_| LedgerError::SignatureVerification(pubkey.to_string()))
    }
}

/// Check if 32 bytes represent a valid ed25519 curve point.
///
/// Uses `curve25519-dalek` to attempt decompression. If it succeeds, the
/// point is on the curve.
pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    curve25519_dalek::edwards::CompressedEdwardsY(*bytes)
        .decompress()
        .is_some()
}

// ---------------------------------------------------------------------------
// Private keys
// ---------------------------------------------------------------------------

/// A 64-byte ed25519 secret: 32-byte seed followed by the 32-byte public key.
///
/// Zeroed on drop. Deliberately has no `Serialize` impl and its `Debug`
/// output only shows the public half.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; PRIVATE_KEY_LENGTH]);

impl PrivateKey {
    /// Wrap 64 raw bytes, validating length and the embedded public half.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        let arr: [u8; PRIVATE_KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| LedgerError::InvalidKeySize(bytes.len()))?;
        let key = Self(arr);
        key.validate()?;
        Ok(key)
    }

    /// Expand a 32-byte seed into a full keypair.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = ed25519_dalek::SigningKey::from_bytes(seed);
        Self(signing_key.to_keypair_bytes())
    }

    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let signing_key = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
        Self(signing_key.to_keypair_bytes())
    }

    /// Decode a Base58 keypair string, the format wallet exports use.
    pub fn from_base58(text: &str) -> Result<Self, LedgerError> {
        let mut bytes = bs58::decode(text)
            .into_vec()
            .map_err(|e| LedgerError::InvalidBase58(e.to_string()))?;
        let result = Self::from_bytes(&bytes);
        bytes.zeroize();
        result
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Check the embedded public half lies on the curve.
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut public = [0u8; PUBLIC_KEY_LENGTH];
        public.copy_from_slice(&self.0[32..]);
        if !is_on_curve(&public) {
            return Err(LedgerError::NotOnCurve);
        }
        Ok(())
    }

    /// The public key embedded in the second half of the secret.
    pub fn public_key(&self) -> PublicKey {
        let mut public = [0u8; PUBLIC_KEY_LENGTH];
        public.copy_from_slice(&self.0[32..]);
        PublicKey(public)
    }

    /// Deterministic ed25519 signature (RFC 8032) over `message`.
    pub fn sign(&self, message: &[u8]) -> Result<Signature, LedgerError> {
        self.validate()?;
        let signing_key = ed25519_dalek::SigningKey::from_keypair_bytes(&self.0)
            .map_err(|_| LedgerError::KeypairMismatch)?;
        Ok(Signature(signing_key.sign(message).to_bytes()))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(public={})", self.public_key())
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for PrivateKey {}

/// Derive the public key of a raw 64-byte secret.
///
/// Fails with `InvalidKeySize` if the secret is not 64 bytes, or
/// `NotOnCurve` if its public half is not a valid curve point.
pub fn derive_public_key(private_key: &[u8]) -> Result<PublicKey, LedgerError> {
    PrivateKey::from_bytes(private_key).map(|k| k.public_key())
}

/// Sign `message` with a raw 64-byte secret.
pub fn sign(private_key: &[u8], message: &[u8]) -> Result<Signature, LedgerError> {
    PrivateKey::from_bytes(private_key)?.sign(message)
}
