//! Seed and private-key handling, plus the key-derivation contract.
//!
//! The actual HD derivation (curve math, mnemonic handling) is an external
//! collaborator behind [`KeyDerivation`]. This module only guards the secret
//! material: seeds and private keys are zeroized on drop and never appear in
//! `Debug` output or logs.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::KeyError;
use crate::types::ReserveWallet;

/// A 32-byte master seed for deterministic wallet derivation.
///
/// Secret material is zeroized on drop to prevent leaking key material
/// in freed memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; 32],
}

impl Seed {
    /// Generate a random seed from the OS cryptographic RNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create a seed from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl Clone for Seed {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("bytes", &"[REDACTED]").finish()
    }
}

/// A reserve wallet's private key, write-once and never logged.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(material: String) -> Self {
        Self(material)
    }

    /// Expose the key material for the signing collaborator. Handle with care.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

/// Deterministic wallet generation from a seed and derivation path.
///
/// Implemented outside this core (BIP-32/BIP-44 libraries, HSM, ...).
/// Must be deterministic: identical seed and path yield identical wallets.
pub trait KeyDerivation: Send + Sync {
    fn derive(&self, seed: &Seed, path: &str) -> Result<ReserveWallet, KeyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_debug_redacted() {
        let seed = Seed::from_bytes([7u8; 32]);
        let debug = format!("{seed:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains('7'));
    }

    #[test]
    fn seed_generate_not_constant() {
        let a = Seed::generate();
        let b = Seed::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn private_key_debug_redacted() {
        let key = PrivateKey::new("supersecret".into());
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("supersecret"));
        assert_eq!(key.expose(), "supersecret");
    }
}
