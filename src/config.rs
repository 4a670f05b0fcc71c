// src/config.rs

//! Runtime configuration
//!
//! Defaults live in code; an optional `config.toml` under the storage root
//! overrides them and CLI flags override both.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the storage root directory under the user's home
pub const HOME_DIR_NAME: &str = ".art";

/// Environment variable overriding the storage root
pub const HOME_ENV: &str = "ART_HOME";

/// Configuration file name inside the storage root
pub const CONFIG_FILE: &str = "config.toml";

/// Largest RSA modulus accepted for key generation
pub const MAX_KEY_BITS: usize = 4500;

/// Modulus used when none is requested
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Configuration for builds, keys and the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtConfig {
    /// Storage root holding the registry, artefacts and keys
    pub home: PathBuf,
    /// Directory under which build working directories are created
    ///
    /// `None` means the current directory.
    pub work_root: Option<PathBuf>,
    /// Number of checks for a profile target before giving up
    pub target_poll_attempts: u32,
    /// Delay between target checks
    #[serde(with = "millis")]
    pub target_poll_interval: Duration,
    /// Upper bound for a remote clone
    #[serde(with = "millis")]
    pub clone_timeout: Duration,
    /// RSA modulus for generated keys
    pub default_key_bits: usize,
    /// Keep targets that already are zip archives instead of re-archiving them
    pub reuse_archives: bool,
}

impl Default for ArtConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from(HOME_DIR_NAME),
            work_root: None,
            target_poll_attempts: 30,
            target_poll_interval: Duration::from_millis(500),
            clone_timeout: Duration::from_secs(300),
            default_key_bits: DEFAULT_KEY_BITS,
            reuse_archives: true,
        }
    }
}

impl ArtConfig {
    /// Defaults rooted at an explicit storage directory
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Self::default()
        }
    }

    /// Load `<home>/config.toml` if it exists, otherwise return defaults
    ///
    /// The `home` field always reflects the directory passed in, whatever
    /// the file says.
    pub fn load(home: &Path) -> Result<Self> {
        let path = home.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
            toml::from_str::<ArtConfig>(&content)
                .map_err(|e| Error::ParseError(format!("Invalid {}: {}", path.display(), e)))?
        } else {
            Self::default()
        };
        config.home = home.to_path_buf();
        Ok(config)
    }

    /// Root of the key tree
    pub fn keys_dir(&self) -> PathBuf {
        self.home.join("keys")
    }

    /// Directory under which working directories are created
    pub fn work_root(&self) -> Result<PathBuf> {
        match &self.work_root {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    /// Total time spent waiting for a target
    pub fn target_timeout(&self) -> Duration {
        self.target_poll_interval * self.target_poll_attempts
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
