// src/commands/secrets.rs

//! Secret commands - encrypt values for pipeline definitions

use anyhow::{Context, Result};
use art::crypto::PgpKey;
use art::crypto::aes::{self, AesKey};
use art::keys::key_slot;
use art::ArtConfig;
use std::io::{self, Read};
use std::path::Path;

/// Encrypt `text` with the public key of a slot and print the armored result
pub fn cmd_encrypt(home: &Path, text: &str, group: Option<&str>, name: Option<&str>) -> Result<()> {
    let config = ArtConfig::load(home)?;
    let path = key_slot(&config.keys_dir(), group, name, false);
    let key = PgpKey::load(&path, None)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    let armored = key.encrypt(text.as_bytes())?;
    print!("{}", String::from_utf8_lossy(&armored));
    Ok(())
}

/// Decrypt an armored value from stdin with the private key of a slot
pub fn cmd_decrypt(
    home: &Path,
    group: Option<&str>,
    name: Option<&str>,
    passphrase: Option<&str>,
) -> Result<()> {
    let config = ArtConfig::load(home)?;
    let path = key_slot(&config.keys_dir(), group, name, true);
    let key = PgpKey::load(&path, passphrase)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    let mut input = Vec::new();
    io::stdin()
        .read_to_end(&mut input)
        .context("Failed to read ciphertext from stdin")?;
    let plaintext = key.decrypt(&input)?;
    println!("{}", String::from_utf8_lossy(&plaintext));
    Ok(())
}

/// Encrypt `text` with a hex AES key and print the base64 packed result
pub fn cmd_aes_encrypt(text: &str, key: &str, mode: &str) -> Result<()> {
    let key = AesKey::from_hex(key).context("Invalid AES key")?;
    let mode = aes::mode_by_name(mode)?;
    println!("{}", aes::encrypt(mode.as_ref(), &key, text.as_bytes())?);
    Ok(())
}

/// Decrypt a base64 packed value from stdin with a hex AES key
pub fn cmd_aes_decrypt(key: &str, mode: &str) -> Result<()> {
    let key = AesKey::from_hex(key).context("Invalid AES key")?;
    let mode = aes::mode_by_name(mode)?;

    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read ciphertext from stdin")?;
    let plaintext = aes::decrypt(mode.as_ref(), &key, &input)?;
    println!("{}", String::from_utf8_lossy(&plaintext));
    Ok(())
}

/// Print a fresh AES-256 key
pub fn cmd_aes_key() -> Result<()> {
    println!("{}", AesKey::generate().to_hex());
    Ok(())
}
