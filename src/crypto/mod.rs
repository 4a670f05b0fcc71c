// src/crypto/mod.rs

//! Cryptographic primitives for seals and secrets
//!
//! - [`PgpKey`]: PGP certificates that sign seals and encrypt secrets
//! - [`legacy`]: PEM RSA keys with PKCS#1 v1.5 / SHA-1 signatures
//! - [`aes`]: symmetric encryption with self-describing output
//! - [`digest`]: the manifest + archive checksum
//!
//! Seals are signed and verified through [`SealSigner`] and
//! [`SealVerifier`] so either key class can back them.

pub mod aes;
pub mod digest;
pub mod legacy;
mod pgp;

pub use digest::{checksum, decode_digest, encode_digest};
pub use legacy::{LegacyPrivateKey, LegacyPublicKey};
pub use pgp::PgpKey;

use crate::error::Result;

/// Produces signatures over seal digests
pub trait SealSigner {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Checks signatures over seal digests
pub trait SealVerifier {
    /// `Ok(())` if `signature` is valid for `data`
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()>;
}

impl SealSigner for PgpKey {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        PgpKey::sign(self, data)
    }
}

impl SealVerifier for PgpKey {
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        PgpKey::verify(self, data, signature)
    }
}
