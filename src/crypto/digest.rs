// src/crypto/digest.rs

//! Seal digests
//!
//! The digest is SHA-256 over the pretty-printed JSON of the manifest
//! followed by the raw archive bytes, so neither can be swapped without the
//! other.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Prefix of the encoded digest stored in seals
pub const DIGEST_PREFIX: &str = "sha256:";

/// Hash a manifest and the archive at `archive`
pub fn checksum<M: Serialize>(archive: &Path, manifest: &M) -> Result<[u8; 32]> {
    let file = File::open(archive).map_err(|e| {
        Error::IoError(format!("cannot open archive {}: {}", archive.display(), e))
    })?;
    checksum_reader(BufReader::new(file), manifest)
}

/// Hash a manifest and a stream of archive bytes
pub fn checksum_reader<M: Serialize, R: Read>(mut archive: R, manifest: &M) -> Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec_pretty(manifest)?);

    let mut buffer = [0u8; 8192];
    loop {
        let n = archive.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize().into())
}

/// `sha256:<base64>` form stored in seals
pub fn encode_digest(digest: &[u8; 32]) -> String {
    format!("{}{}", DIGEST_PREFIX, BASE64.encode(digest))
}

/// Parse the stored form, accepting a bare base64 value too
pub fn decode_digest(value: &str) -> Result<Vec<u8>> {
    let encoded = value.strip_prefix(DIGEST_PREFIX).unwrap_or(value);
    BASE64
        .decode(encoded)
        .map_err(|e| Error::VerificationFailed(format!("digest is not valid base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checksum_binds_manifest_and_archive() {
        let manifest = json!({"name": "a", "target": "out.txt"});
        let other_manifest = json!({"name": "a", "target": "out2.txt"});

        let a = checksum_reader(&b"archive bytes"[..], &manifest).unwrap();
        assert_eq!(a, checksum_reader(&b"archive bytes"[..], &manifest).unwrap());
        assert_ne!(a, checksum_reader(&b"archive bytes"[..], &other_manifest).unwrap());
        assert_ne!(a, checksum_reader(&b"archive byte5"[..], &manifest).unwrap());
    }

    #[test]
    fn test_checksum_file_matches_reader() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("a.zip");
        std::fs::write(&path, vec![3u8; 20_000]).unwrap();
        let manifest = json!({"name": "a"});

        assert_eq!(
            checksum(&path, &manifest).unwrap(),
            checksum_reader(&vec![3u8; 20_000][..], &manifest).unwrap()
        );
    }

    #[test]
    fn test_encode_decode() {
        let digest = [0xabu8; 32];
        let encoded = encode_digest(&digest);
        assert!(encoded.starts_with("sha256:"));
        assert_eq!(decode_digest(&encoded).unwrap(), digest.to_vec());
        assert!(decode_digest("sha256:!!!").is_err());
    }
}
