// src/crypto/pgp.rs

//! OpenPGP keys for sealing and secret encryption
//!
//! Uses sequoia-openpgp (pure Rust). A [`PgpKey`] wraps one RSA certificate
//! with a signing subkey and an encryption subkey. Certificates carrying
//! secret material sign and decrypt; the public half verifies and encrypts.

use crate::config::MAX_KEY_BITS;
use crate::error::{Error, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use openpgp::armor;
use openpgp::cert::{CertBuilder, CipherSuite};
use openpgp::crypto::{KeyPair, Password, SessionKey};
use openpgp::packet::key::{SecretParts, UnspecifiedRole};
use openpgp::packet::{Key, PKESK, SKESK};
use openpgp::parse::Parse;
use openpgp::parse::stream::{
    DecryptionHelper, DecryptorBuilder, MessageStructure, VerificationHelper,
};
use openpgp::policy::{Policy, StandardPolicy};
use openpgp::serialize::Serialize as _;
use openpgp::serialize::stream::{Armorer, Encryptor, LiteralWriter, Message, Signer};
use openpgp::types::{HashAlgorithm, SymmetricAlgorithm};
use openpgp::{Cert, Fingerprint, KeyHandle, Packet, PacketPile};
use sequoia_openpgp as openpgp;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

/// Hash used for seal signatures
const SIGNATURE_HASH: HashAlgorithm = HashAlgorithm::SHA256;

/// A PGP certificate, with or without secret key material
#[derive(Clone)]
pub struct PgpKey {
    cert: Cert,
    passphrase: Option<Password>,
}

impl std::fmt::Debug for PgpKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgpKey")
            .field("fingerprint", &self.fingerprint())
            .field("private", &self.has_private())
            .finish()
    }
}

impl PgpKey {
    /// Generate a new RSA key pair
    ///
    /// `bits` above [`MAX_KEY_BITS`] is rejected. The modulus is rounded up
    /// to the nearest supported suite (2048, 3072 or 4096).
    pub fn generate(
        name: &str,
        comment: &str,
        email: &str,
        bits: usize,
        passphrase: Option<&str>,
    ) -> Result<Self> {
        if bits > MAX_KEY_BITS {
            return Err(Error::Crypto(format!(
                "key size {} exceeds the maximum of {} bits",
                bits, MAX_KEY_BITS
            )));
        }
        let suite = match bits {
            0..=2048 => CipherSuite::RSA2k,
            2049..=3072 => CipherSuite::RSA3k,
            _ => CipherSuite::RSA4k,
        };

        let userid = match (comment.is_empty(), email.is_empty()) {
            (true, true) => name.to_string(),
            (true, false) => format!("{} <{}>", name, email),
            (false, true) => format!("{} ({})", name, comment),
            (false, false) => format!("{} ({}) <{}>", name, comment, email),
        };

        let mut builder = CertBuilder::general_purpose(Some(suite), Some(userid.as_str()));
        if let Some(p) = passphrase {
            builder = builder.set_password(Some(Password::from(p)));
        }
        let (cert, _revocation) = builder
            .generate()
            .map_err(|e| Error::Crypto(format!("key generation failed: {}", e)))?;

        debug!("Generated {:?} key {}", suite, cert.fingerprint());
        Ok(Self {
            cert,
            passphrase: passphrase.map(Password::from),
        })
    }

    /// Parse an armored or binary key
    ///
    /// A key whose secret material is passphrase protected can only be
    /// loaded together with the right passphrase.
    pub fn from_bytes(data: &[u8], passphrase: Option<&str>) -> Result<Self> {
        let cert = Cert::from_bytes(data)
            .map_err(|e| Error::KeyFormat(format!("cannot parse PGP key: {}", e)))?;
        let key = Self {
            cert,
            passphrase: passphrase.map(Password::from),
        };

        let encrypted: Vec<_> = key
            .cert
            .keys()
            .secret()
            .filter(|ka| !ka.key().has_unencrypted_secret())
            .map(|ka| ka.key().clone())
            .collect();
        if let Some(first) = encrypted.into_iter().next() {
            // fails on a missing or wrong passphrase
            key.unlock(first)?;
        }

        Ok(key)
    }

    /// Load a key file
    pub fn load(path: &Path, passphrase: Option<&str>) -> Result<Self> {
        let data = fs::read(path)
            .map_err(|e| Error::KeyFormat(format!("cannot read key {}: {}", path.display(), e)))?;
        Self::from_bytes(&data, passphrase)
    }

    /// Whether this key can sign and decrypt
    pub fn has_private(&self) -> bool {
        self.cert.is_tsk()
    }

    pub fn fingerprint(&self) -> String {
        self.cert.fingerprint().to_hex()
    }

    /// The public half of this key
    pub fn public_key(&self) -> Self {
        Self {
            cert: self.cert.clone().strip_secret_key_material(),
            passphrase: None,
        }
    }

    /// ASCII-armored public key block
    pub fn armored_public(&self) -> Result<Vec<u8>> {
        self.armor(armor::Kind::PublicKey)
    }

    /// ASCII-armored private key block
    pub fn armored_private(&self) -> Result<Vec<u8>> {
        if !self.has_private() {
            return Err(Error::NoPrivateKey(self.fingerprint()));
        }
        self.armor(armor::Kind::SecretKey)
    }

    /// Write the armored public key
    pub fn save_public(&self, path: &Path) -> Result<()> {
        write_key_file(path, &self.armored_public()?, 0o644)
    }

    /// Write the armored private key, readable by the owner only
    pub fn save_private(&self, path: &Path) -> Result<()> {
        write_key_file(path, &self.armored_private()?, 0o600)
    }

    /// Create an armored detached signature over `data`
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let keypair = self.signing_keypair()?;
        let mut sink = Vec::new();
        {
            let message = Message::new(&mut sink);
            let message = Armorer::new(message)
                .kind(armor::Kind::Signature)
                .build()
                .map_err(crypto_err)?;
            let mut signer = Signer::new(message, keypair)
                .hash_algo(SIGNATURE_HASH)
                .map_err(crypto_err)?
                .detached()
                .build()
                .map_err(crypto_err)?;
            signer.write_all(data)?;
            signer.finalize().map_err(crypto_err)?;
        }
        Ok(sink)
    }

    /// Check a detached signature over `data`
    ///
    /// Signatures made with any hash other than SHA-256 are rejected even if
    /// they are otherwise valid.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let pile = PacketPile::from_bytes(signature)
            .map_err(|e| Error::VerificationFailed(format!("cannot parse signature: {}", e)))?;
        let policy = StandardPolicy::new();

        for packet in pile.into_children() {
            if let Packet::Signature(mut sig) = packet {
                if sig.hash_algo() != SIGNATURE_HASH {
                    return Err(Error::VerificationFailed(format!(
                        "signature uses {} instead of {}",
                        sig.hash_algo(),
                        SIGNATURE_HASH
                    )));
                }
                for ka in self.cert.keys().with_policy(&policy, None).for_signing() {
                    if sig.verify_message(ka.key(), data).is_ok() {
                        return Ok(());
                    }
                }
            }
        }

        Err(Error::VerificationFailed(
            "no valid signature for this key".to_string(),
        ))
    }

    /// Compress and encrypt `plaintext`, returning an armored message
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(plaintext)?;
        let compressed = gz.finish()?;

        let policy = StandardPolicy::new();
        let recipients: Vec<_> = self
            .cert
            .keys()
            .with_policy(&policy, None)
            .alive()
            .revoked(false)
            .for_transport_encryption()
            .collect();
        if recipients.is_empty() {
            return Err(Error::Crypto(format!(
                "key {} has no encryption-capable subkey",
                self.fingerprint()
            )));
        }

        let mut sink = Vec::new();
        {
            let message = Message::new(&mut sink);
            let message = Armorer::new(message).build().map_err(crypto_err)?;
            #[allow(deprecated)]
            let message = Encryptor::for_recipients(message, recipients)
                .build()
                .map_err(crypto_err)?;
            let mut literal = LiteralWriter::new(message).build().map_err(crypto_err)?;
            literal.write_all(&compressed)?;
            literal.finalize().map_err(crypto_err)?;
        }
        Ok(sink)
    }

    /// Decrypt an armored message produced by [`PgpKey::encrypt`]
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if !self.has_private() {
            return Err(Error::NoPrivateKey(self.fingerprint()));
        }
        let policy = StandardPolicy::new();
        let helper = DecryptHelper {
            key: self,
            policy: &policy,
        };

        let mut decryptor = DecryptorBuilder::from_bytes(ciphertext)
            .map_err(crypto_err)?
            .with_policy(&policy, None, helper)
            .map_err(crypto_err)?;
        let mut compressed = Vec::new();
        decryptor.read_to_end(&mut compressed)?;

        let mut plaintext = Vec::new();
        GzDecoder::new(compressed.as_slice()).read_to_end(&mut plaintext)?;
        Ok(plaintext)
    }

    fn armor(&self, kind: armor::Kind) -> Result<Vec<u8>> {
        let bits = self
            .cert
            .primary_key()
            .key()
            .mpis()
            .bits()
            .unwrap_or_default();
        let created: chrono::DateTime<chrono::Utc> =
            self.cert.primary_key().key().creation_time().into();
        let headers = [
            ("Version", format!("art-{}", env!("CARGO_PKG_VERSION"))),
            (
                "Comment",
                format!(
                    "Cipher: AES256, Hash: SHA256, RSA-bits: {}, Created: {}",
                    bits,
                    created.to_rfc3339()
                ),
            ),
            ("Hash", "SHA256".to_string()),
        ];

        let secret = kind == armor::Kind::SecretKey;
        let mut writer =
            armor::Writer::with_headers(Vec::new(), kind, headers).map_err(crypto_err)?;
        let written = if secret {
            self.cert.as_tsk().serialize(&mut writer)
        } else {
            self.cert.serialize(&mut writer)
        };
        written.map_err(crypto_err)?;
        Ok(writer.finalize()?)
    }

    fn signing_keypair(&self) -> Result<KeyPair> {
        let policy = StandardPolicy::new();
        let ka = self
            .cert
            .keys()
            .secret()
            .with_policy(&policy, None)
            .alive()
            .revoked(false)
            .for_signing()
            .next()
            .ok_or_else(|| Error::NoPrivateKey(self.fingerprint()))?;
        self.unlock(ka.key().clone())
    }

    fn unlock(&self, key: Key<SecretParts, UnspecifiedRole>) -> Result<KeyPair> {
        let key = if key.has_unencrypted_secret() {
            key
        } else {
            let password = self.passphrase.as_ref().ok_or_else(|| {
                Error::KeyFormat(format!(
                    "key {} is passphrase protected",
                    self.fingerprint()
                ))
            })?;
            key.decrypt_secret(password)
                .map_err(|e| Error::KeyFormat(format!("cannot unlock key: {}", e)))?
        };
        key.into_keypair().map_err(crypto_err)
    }
}

/// Decryption callbacks for sequoia's streaming decryptor
struct DecryptHelper<'a> {
    key: &'a PgpKey,
    policy: &'a dyn Policy,
}

impl VerificationHelper for DecryptHelper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(Vec::new())
    }

    // messages are encrypted only, not signed
    fn check(&mut self, _structure: MessageStructure) -> openpgp::Result<()> {
        Ok(())
    }
}

impl DecryptionHelper for DecryptHelper<'_> {
    fn decrypt<D>(
        &mut self,
        pkesks: &[PKESK],
        _skesks: &[SKESK],
        sym_algo: Option<SymmetricAlgorithm>,
        mut decrypt: D,
    ) -> openpgp::Result<Option<Fingerprint>>
    where
        D: FnMut(SymmetricAlgorithm, &SessionKey) -> bool,
    {
        let keys: Vec<_> = self
            .key
            .cert
            .keys()
            .secret()
            .with_policy(self.policy, None)
            .for_transport_encryption()
            .map(|ka| ka.key().clone())
            .collect();

        for key in keys {
            let fingerprint = key.fingerprint();
            let mut pair = self
                .key
                .unlock(key)
                .map_err(|e| openpgp::Error::InvalidOperation(e.to_string()))?;
            for pkesk in pkesks {
                if let Some((algo, session_key)) = pkesk.decrypt(&mut pair, sym_algo)
                    && decrypt(algo, &session_key)
                {
                    return Ok(Some(fingerprint));
                }
            }
        }

        Err(openpgp::Error::InvalidOperation("no matching decryption key".to_string()).into())
    }
}

fn crypto_err(e: impl std::fmt::Display) -> Error {
    Error::Crypto(e.to_string())
}

fn write_key_file(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}
