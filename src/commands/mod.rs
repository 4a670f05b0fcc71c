// src/commands/mod.rs
//! Command handlers for the art CLI

mod build;
mod keys;
mod registry;
mod secrets;

pub use build::{cmd_build, cmd_run};
pub use keys::{cmd_key_export, cmd_key_gen, cmd_key_import, cmd_legacy_key_gen};
pub use registry::{cmd_list, cmd_open, cmd_remove, cmd_tag, cmd_verify};
pub use secrets::{
    cmd_aes_decrypt, cmd_aes_encrypt, cmd_aes_key, cmd_decrypt, cmd_encrypt,
};

use anyhow::{Context, Result};
use art::{ArtConfig, Registry};
use std::path::Path;

/// Load the configuration under `home` and open its registry
pub(crate) fn open_home(home: &Path) -> Result<(ArtConfig, Registry)> {
    let config = ArtConfig::load(home)
        .with_context(|| format!("Failed to load configuration from {}", home.display()))?;
    let registry = Registry::open(&config.home)
        .with_context(|| format!("Failed to open registry at {}", home.display()))?;
    Ok((config, registry))
}
