// src/cli/mod.rs
//! CLI definitions for art
//!
//! The command implementations are in the `commands` module.
//!
//! - `build` - Build, seal and register artefacts from a source
//! - `run` - Run a build descriptor function in a local source
//! - `ls` / `tag` / `rm` - Registry housekeeping
//! - `open` / `verify` - Check an artefact's seal, optionally extracting it
//! - `key` - Key pair management
//! - `encrypt` / `decrypt` / `aes-key` - Secrets for pipeline definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod key;

pub use key::KeyCommands;

#[derive(Parser)]
#[command(name = "art")]
#[command(version)]
#[command(about = "Build, seal and store application artefacts", long_about = None)]
pub struct Cli {
    /// Storage root for the registry and keys (default: $ART_HOME or ~/.art)
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the profiles of a source and register the results
    Build {
        /// Git URL (http/https) or local directory
        #[arg(default_value = ".")]
        source: String,

        /// Repository name and optional tag (name[:tag])
        #[arg(short, long)]
        name: String,

        /// Access token for remote sources
        #[arg(short, long)]
        token: Option<String>,

        /// Sub-folder of the source holding package.yaml
        #[arg(short, long)]
        path: Option<String>,

        /// Profile to build, `default` or `all` (default: the default profile)
        #[arg(long)]
        profile: Option<String>,

        /// Build a local source in place instead of a copy
        #[arg(long)]
        no_copy: bool,

        /// Stream command output and prompt for undefined variables
        #[arg(short, long)]
        interactive: bool,

        /// Passphrase of the signing key
        #[arg(long)]
        passphrase: Option<String>,
    },

    /// Run a function of a local source's build descriptor
    Run {
        /// Function name
        function: String,

        /// Local directory holding package.yaml
        #[arg(default_value = ".")]
        path: String,

        /// Stream command output and prompt for undefined variables
        #[arg(short, long)]
        interactive: bool,
    },

    /// List artefacts in the local registry
    Ls,

    /// Add a tag to an artefact
    Tag {
        /// Existing artefact (name[:tag])
        source: String,

        /// New reference (name[:tag])
        target: String,
    },

    /// Remove artefacts from the local registry
    Rm {
        /// Artefacts to remove (name[:tag])
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Verify an artefact and extract it
    Open {
        /// Artefact to open (name[:tag])
        name: String,

        /// Directory to extract into
        dest: PathBuf,

        /// Verify with a legacy PEM public key instead of the key tree
        #[arg(long)]
        pem: Option<PathBuf>,
    },

    /// Verify an artefact's digest and signature
    Verify {
        /// Artefact to verify (name[:tag])
        name: String,

        /// Verify with a legacy PEM public key instead of the key tree
        #[arg(long)]
        pem: Option<PathBuf>,
    },

    /// Key pair management
    #[command(subcommand)]
    Key(KeyCommands),

    /// Encrypt a value with a public key, or an AES key
    Encrypt {
        /// Value to encrypt
        text: String,

        /// Key group
        #[arg(short, long)]
        group: Option<String>,

        /// Key name within the group
        #[arg(short, long)]
        name: Option<String>,

        /// Hex AES key to use instead of the key tree
        #[arg(long, conflicts_with_all = ["group", "name"])]
        aes_key: Option<String>,

        /// AES cipher mode (cbc or gcm)
        #[arg(long, default_value = "gcm")]
        mode: String,
    },

    /// Decrypt an armored value read from stdin
    Decrypt {
        /// Key group
        #[arg(short, long)]
        group: Option<String>,

        /// Key name within the group
        #[arg(short, long)]
        name: Option<String>,

        /// Passphrase of the private key
        #[arg(long)]
        passphrase: Option<String>,

        /// Hex AES key to use instead of the key tree
        #[arg(long, conflicts_with_all = ["group", "name", "passphrase"])]
        aes_key: Option<String>,

        /// AES cipher mode (cbc or gcm)
        #[arg(long, default_value = "gcm")]
        mode: String,
    },

    /// Print a new random 256-bit AES key as hex
    AesKey,
}
