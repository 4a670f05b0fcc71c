// src/crypto/legacy.rs

//! PEM RSA keys signing with PKCS#1 v1.5 over SHA-1
//!
//! Kept so seals produced by older signers can still be verified. New
//! seals use [`crate::crypto::PgpKey`].

use crate::config::MAX_KEY_BITS;
use crate::crypto::{SealSigner, SealVerifier};
use crate::error::{Error, Result};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use std::fs;
use std::path::Path;
use tracing::info;

/// File name of a generated legacy private key
pub const LEGACY_PRIVATE_FILE: &str = "id_rsa.pem";

/// File name of a generated legacy public key
pub const LEGACY_PUBLIC_FILE: &str = "id_rsa_pub.pem";

/// RSA private key in PEM form
pub struct LegacyPrivateKey {
    key: RsaPrivateKey,
}

/// RSA public key in PEM form
#[derive(Debug, Clone)]
pub struct LegacyPublicKey {
    key: RsaPublicKey,
}

impl LegacyPrivateKey {
    pub fn generate(bits: usize) -> Result<Self> {
        if bits > MAX_KEY_BITS {
            return Err(Error::Crypto(format!(
                "key size {} exceeds the maximum of {} bits",
                bits, MAX_KEY_BITS
            )));
        }
        let key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| Error::Crypto(format!("RSA key generation failed: {}", e)))?;
        Ok(Self { key })
    }

    /// Parse a PKCS#8 or PKCS#1 PEM private key
    pub fn from_pem(pem: &str) -> Result<Self> {
        RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map(|key| Self { key })
            .map_err(|e| Error::KeyFormat(format!("cannot parse PEM private key: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let pem = fs::read_to_string(path)
            .map_err(|e| Error::KeyFormat(format!("cannot read key {}: {}", path.display(), e)))?;
        Self::from_pem(&pem)
    }

    pub fn to_pem(&self) -> Result<String> {
        self.key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| Error::Crypto(format!("cannot encode private key: {}", e)))
    }

    pub fn public_key(&self) -> LegacyPublicKey {
        LegacyPublicKey {
            key: self.key.to_public_key(),
        }
    }

    /// Write `id_rsa.pem` and `id_rsa_pub.pem` into `dir`
    pub fn save_pair(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let private_path = dir.join(LEGACY_PRIVATE_FILE);
        fs::write(&private_path, self.to_pem()?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&private_path, fs::Permissions::from_mode(0o600))?;
        }
        fs::write(dir.join(LEGACY_PUBLIC_FILE), self.public_key().to_pem()?)?;

        info!(
            "Wrote {}-bit legacy RSA key pair to {}",
            self.key.size() * 8,
            dir.display()
        );
        Ok(())
    }
}

impl LegacyPublicKey {
    /// Parse an SPKI or PKCS#1 PEM public key
    pub fn from_pem(pem: &str) -> Result<Self> {
        RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map(|key| Self { key })
            .map_err(|e| Error::KeyFormat(format!("cannot parse PEM public key: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let pem = fs::read_to_string(path)
            .map_err(|e| Error::KeyFormat(format!("cannot read key {}: {}", path.display(), e)))?;
        Self::from_pem(&pem)
    }

    pub fn to_pem(&self) -> Result<String> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::Crypto(format!("cannot encode public key: {}", e)))
    }
}

impl SealSigner for LegacyPrivateKey {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signing_key = SigningKey::<Sha1>::new(self.key.clone());
        let signature = signing_key
            .try_sign(data)
            .map_err(|e| Error::Crypto(format!("RSA signing failed: {}", e)))?;
        Ok(signature.to_vec())
    }
}

impl SealVerifier for LegacyPublicKey {
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let verifying_key = VerifyingKey::<Sha1>::new(self.key.clone());
        let signature = Signature::try_from(signature)
            .map_err(|e| Error::VerificationFailed(format!("malformed signature: {}", e)))?;
        verifying_key
            .verify(data, &signature)
            .map_err(|_| Error::VerificationFailed("RSA signature mismatch".to_string()))
    }
}

impl SealVerifier for LegacyPrivateKey {
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        self.public_key().verify(data, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sign_verify() {
        let key = LegacyPrivateKey::generate(1024).unwrap();
        let public = key.public_key();

        let signature = key.sign(b"digest").unwrap();
        assert_eq!(signature.len(), 128);
        public.verify(b"digest", &signature).unwrap();

        assert!(public.verify(b"digest!", &signature).is_err());
        let mut tampered = signature.clone();
        tampered[10] ^= 0x01;
        assert!(matches!(
            public.verify(b"digest", &tampered),
            Err(Error::VerificationFailed(_))
        ));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let key = LegacyPrivateKey::generate(1024).unwrap();
        assert_eq!(key.sign(b"same").unwrap(), key.sign(b"same").unwrap());
    }

    #[test]
    fn test_pem_round_trip_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let key = LegacyPrivateKey::generate(1024).unwrap();
        key.save_pair(temp_dir.path()).unwrap();

        let private = LegacyPrivateKey::load(&temp_dir.path().join(LEGACY_PRIVATE_FILE)).unwrap();
        let public = LegacyPublicKey::load(&temp_dir.path().join(LEGACY_PUBLIC_FILE)).unwrap();
        let signature = private.sign(b"payload").unwrap();
        public.verify(b"payload", &signature).unwrap();
    }

    #[test]
    fn test_bad_pem() {
        assert!(matches!(
            LegacyPublicKey::from_pem("not a key"),
            Err(Error::KeyFormat(_))
        ));
        assert!(LegacyPrivateKey::generate(MAX_KEY_BITS + 1).is_err());
    }
}
