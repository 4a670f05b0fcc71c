// src/seal.rs

//! Manifests and seals
//!
//! Every archive travels with a JSON sidecar, its seal. The seal carries the
//! manifest describing the archive, the digest binding manifest and archive
//! together, and a signature over that digest.

use crate::crypto::{SealSigner, SealVerifier, checksum, decode_digest, encode_digest};
use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Metadata describing one archive
///
/// Field order is part of the digest input and must not change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub license: String,
    /// Content name of the archive
    pub name: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Origin URI or local path of the source
    #[serde(default)]
    pub source: String,
    /// VCS revision, empty when the source is not versioned
    #[serde(default)]
    pub commit: String,
    pub target: String,
    /// RFC 3339 creation time
    pub time: String,
    /// Human readable archive size
    #[serde(default)]
    pub size: String,
    /// The target already was an archive and was packaged unchanged
    #[serde(default)]
    pub zip: bool,
}

/// A signed manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seal {
    pub manifest: Manifest,
    /// `sha256:<base64>` of manifest JSON followed by archive bytes
    pub digest: String,
    /// Base64 signature over the raw digest
    pub signature: String,
}

impl Seal {
    /// Compute the digest of `archive` with `manifest` and sign it
    pub fn create(archive: &Path, manifest: Manifest, signer: &dyn SealSigner) -> Result<Self> {
        let digest = checksum(archive, &manifest)?;
        let signature = signer.sign(&digest)?;
        debug!("Sealed {} ({})", manifest.name, archive.display());

        Ok(Self {
            manifest,
            digest: encode_digest(&digest),
            signature: BASE64.encode(signature),
        })
    }

    /// Recompute the digest over `archive` and check the signature
    pub fn verify(&self, archive: &Path, verifier: &dyn SealVerifier) -> Result<()> {
        let actual = checksum(archive, &self.manifest)?;
        let recorded = decode_digest(&self.digest)?;
        if recorded != actual {
            return Err(Error::VerificationFailed(format!(
                "digest mismatch for {}: archive or manifest was modified",
                self.manifest.name
            )));
        }

        let signature = BASE64.decode(&self.signature).map_err(|e| {
            Error::VerificationFailed(format!("signature is not valid base64: {}", e))
        })?;
        verifier.verify(&actual, &signature)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read(path)
            .map_err(|e| Error::IoError(format!("cannot read seal {}: {}", path.display(), e)))?;
        serde_json::from_slice(&content)
            .map_err(|e| Error::ParseError(format!("invalid seal {}: {}", path.display(), e)))
    }

    /// Write the seal as indented JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{LegacyPrivateKey, PgpKey};
    use tempfile::TempDir;

    fn manifest() -> Manifest {
        Manifest {
            kind: "text".to_string(),
            license: "MIT".to_string(),
            name: "170426101112123-0123456789".to_string(),
            profile: "default".to_string(),
            labels: BTreeMap::from([("team".to_string(), "core".to_string())]),
            source: "/src/app".to_string(),
            commit: String::new(),
            target: "out.txt".to_string(),
            time: "2026-04-17T10:11:12Z".to_string(),
            size: "22 B".to_string(),
            zip: false,
        }
    }

    #[test]
    fn test_create_and_verify() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("a.zip");
        fs::write(&archive, b"PK\x03\x04 pretend archive").unwrap();
        let key = PgpKey::generate("seal-test", "", "", 2048, None).unwrap();

        let seal = Seal::create(&archive, manifest(), &key).unwrap();
        assert!(seal.digest.starts_with("sha256:"));
        seal.verify(&archive, &key.public_key()).unwrap();

        let seal_path = temp_dir.path().join("a.json");
        seal.save(&seal_path).unwrap();
        let text = fs::read_to_string(&seal_path).unwrap();
        assert!(text.starts_with("{\n  \"manifest\": {"));
        assert!(text.contains("\"type\": \"text\""));
        assert_eq!(Seal::load(&seal_path).unwrap(), seal);
    }

    #[test]
    fn test_tampering_is_detected() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("a.zip");
        fs::write(&archive, b"original bytes").unwrap();
        let key = LegacyPrivateKey::generate(1024).unwrap();
        let seal = Seal::create(&archive, manifest(), &key).unwrap();
        seal.verify(&archive, &key.public_key()).unwrap();

        let mut edited = seal.clone();
        edited.manifest.labels.insert("team".to_string(), "other".to_string());
        assert!(matches!(
            edited.verify(&archive, &key.public_key()),
            Err(Error::VerificationFailed(_))
        ));

        fs::write(&archive, b"modified bytes").unwrap();
        assert!(matches!(
            seal.verify(&archive, &key.public_key()),
            Err(Error::VerificationFailed(_))
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("a.zip");
        fs::write(&archive, b"bytes").unwrap();
        let signer = LegacyPrivateKey::generate(1024).unwrap();
        let other = LegacyPrivateKey::generate(1024).unwrap();

        let seal = Seal::create(&archive, manifest(), &signer).unwrap();
        assert!(seal.verify(&archive, &other.public_key()).is_err());
    }
}
