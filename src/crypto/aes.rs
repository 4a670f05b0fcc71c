// src/crypto/aes.rs

//! AES encryption of small secrets
//!
//! Two modes are available behind the [`CipherMode`] trait: CBC with PKCS#7
//! padding and GCM. Output is a self-describing packed layout, base64
//! encoded:
//!
//! ```text
//! [iv length: u8][tag length: u8, GCM only][iv][ciphertext]
//! ```

use crate::error::{Error, Result};
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// IV length for CBC
pub const CBC_IV_SIZE: usize = 16;

/// Nonce length for GCM
pub const GCM_NONCE_SIZE: usize = 12;

/// Authentication tag length appended by GCM
pub const GCM_TAG_SIZE: u8 = 16;

/// An AES key of 128, 192 or 256 bits
#[derive(Clone, PartialEq, Eq)]
pub struct AesKey(Vec<u8>);

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AesKey({} bits)", self.0.len() * 8)
    }
}

impl AesKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        match bytes.len() {
            16 | 24 | 32 => Ok(Self(bytes)),
            n => Err(Error::Crypto(format!(
                "AES key must be 16, 24 or 32 bytes, got {}",
                n
            ))),
        }
    }

    /// Random 256-bit key
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_hex(value: &str) -> Result<Self> {
        let bytes = hex::decode(value.trim())
            .map_err(|e| Error::Crypto(format!("AES key is not valid hex: {}", e)))?;
        Self::new(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A block cipher mode of operation
pub trait CipherMode {
    fn name(&self) -> &'static str;

    /// Tag length recorded in the packed header, `None` if the mode has no tag
    fn tag_len(&self) -> Option<u8>;

    /// Encrypt, returning `(iv, ciphertext)`
    fn seal(&self, key: &AesKey, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)>;

    fn open(&self, key: &AesKey, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// CBC with PKCS#7 padding
#[derive(Debug, Clone, Copy, Default)]
pub struct Cbc;

/// Galois/Counter mode
#[derive(Debug, Clone, Copy, Default)]
pub struct Gcm;

impl CipherMode for Cbc {
    fn name(&self) -> &'static str {
        "cbc"
    }

    fn tag_len(&self) -> Option<u8> {
        None
    }

    fn seal(&self, key: &AesKey, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut iv = vec![0u8; CBC_IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        let ciphertext = match key.0.len() {
            16 => cbc_encrypt::<Aes128>(&key.0, &iv, plaintext)?,
            24 => cbc_encrypt::<Aes192>(&key.0, &iv, plaintext)?,
            _ => cbc_encrypt::<Aes256>(&key.0, &iv, plaintext)?,
        };
        Ok((iv, ciphertext))
    }

    fn open(&self, key: &AesKey, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if iv.len() != CBC_IV_SIZE {
            return Err(Error::Crypto(format!("CBC IV must be {} bytes", CBC_IV_SIZE)));
        }
        match key.0.len() {
            16 => cbc_decrypt::<Aes128>(&key.0, iv, ciphertext),
            24 => cbc_decrypt::<Aes192>(&key.0, iv, ciphertext),
            _ => cbc_decrypt::<Aes256>(&key.0, iv, ciphertext),
        }
    }
}

impl CipherMode for Gcm {
    fn name(&self) -> &'static str {
        "gcm"
    }

    fn tag_len(&self) -> Option<u8> {
        Some(GCM_TAG_SIZE)
    }

    fn seal(&self, key: &AesKey, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut nonce = vec![0u8; GCM_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = match key.0.len() {
            16 => gcm_seal::<Aes128Gcm>(&key.0, &nonce, plaintext)?,
            24 => gcm_seal::<Aes192Gcm>(&key.0, &nonce, plaintext)?,
            _ => gcm_seal::<Aes256Gcm>(&key.0, &nonce, plaintext)?,
        };
        Ok((nonce, ciphertext))
    }

    fn open(&self, key: &AesKey, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if iv.len() != GCM_NONCE_SIZE {
            return Err(Error::Crypto(format!(
                "GCM nonce must be {} bytes",
                GCM_NONCE_SIZE
            )));
        }
        match key.0.len() {
            16 => gcm_open::<Aes128Gcm>(&key.0, iv, ciphertext),
            24 => gcm_open::<Aes192Gcm>(&key.0, iv, ciphertext),
            _ => gcm_open::<Aes256Gcm>(&key.0, iv, ciphertext),
        }
    }
}

/// Look up a mode by name (`cbc` or `gcm`)
pub fn mode_by_name(name: &str) -> Result<Box<dyn CipherMode>> {
    match name.to_ascii_lowercase().as_str() {
        "cbc" => Ok(Box::new(Cbc)),
        "gcm" => Ok(Box::new(Gcm)),
        other => Err(Error::Crypto(format!("unknown cipher mode '{}'", other))),
    }
}

/// Encrypt and return the base64 packed form
pub fn encrypt(mode: &dyn CipherMode, key: &AesKey, plaintext: &[u8]) -> Result<String> {
    let (iv, ciphertext) = mode.seal(key, plaintext)?;
    Ok(BASE64.encode(pack(&iv, &ciphertext, mode.tag_len())))
}

/// Decrypt the base64 packed form
pub fn decrypt(mode: &dyn CipherMode, key: &AesKey, packed: &str) -> Result<Vec<u8>> {
    let data = BASE64
        .decode(packed.trim())
        .map_err(|e| Error::Crypto(format!("ciphertext is not valid base64: {}", e)))?;
    let unpacked = unpack(&data, mode.tag_len().is_some())?;
    mode.open(key, &unpacked.iv, &unpacked.ciphertext)
}

/// Fields of a packed cipher payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packed {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub tag_len: Option<u8>,
}

/// Lay out `[iv len][tag len?][iv][ciphertext]`
pub fn pack(iv: &[u8], ciphertext: &[u8], tag_len: Option<u8>) -> Vec<u8> {
    let mut data = Vec::with_capacity(2 + iv.len() + ciphertext.len());
    data.push(iv.len() as u8);
    if let Some(tag) = tag_len {
        data.push(tag);
    }
    data.extend_from_slice(iv);
    data.extend_from_slice(ciphertext);
    data
}

/// Split a packed payload; `has_tag` must match the mode that packed it
pub fn unpack(data: &[u8], has_tag: bool) -> Result<Packed> {
    let header = if has_tag { 2 } else { 1 };
    if data.len() < header {
        return Err(Error::Crypto("packed ciphertext is truncated".to_string()));
    }
    let iv_len = data[0] as usize;
    let tag_len = has_tag.then(|| data[1]);
    let rest = &data[header..];
    if rest.len() < iv_len {
        return Err(Error::Crypto("packed ciphertext is truncated".to_string()));
    }
    let (iv, ciphertext) = rest.split_at(iv_len);
    Ok(Packed {
        ciphertext: ciphertext.to_vec(),
        iv: iv.to_vec(),
        tag_len,
    })
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let encryptor = cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| Error::Crypto(format!("invalid key or IV: {}", e)))?;
    Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| Error::Crypto(format!("invalid key or IV: {}", e)))?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::Padding("PKCS#7 padding check failed".to_string()))
}

fn gcm_seal<A: Aead + KeyInit>(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = A::new_from_slice(key).map_err(|e| Error::Crypto(e.to_string()))?;
    cipher
        .encrypt(GenericArray::from_slice(nonce), plaintext)
        .map_err(|_| Error::Crypto("GCM encryption failed".to_string()))
}

fn gcm_open<A: Aead + KeyInit>(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = A::new_from_slice(key).map_err(|e| Error::Crypto(e.to_string()))?;
    cipher
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| Error::VerificationFailed("GCM authentication tag mismatch".to_string()))
}
