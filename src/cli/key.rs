// src/cli/key.rs
//! Key management commands

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Generate a PGP key pair
    ///
    /// Without a group the pair is the root key used by every repository
    /// that has no more specific key.
    Gen {
        /// Group the key belongs to (e.g. acme)
        #[arg(short, long)]
        group: Option<String>,

        /// Name within the group (e.g. web)
        #[arg(short, long)]
        name: Option<String>,

        /// RSA key size in bits
        #[arg(short, long)]
        bits: Option<usize>,

        /// Protect the private key with a passphrase
        #[arg(long)]
        passphrase: Option<String>,
    },

    /// Import an armored PGP key into the key tree
    Import {
        /// Key file to import
        file: PathBuf,

        /// Group the key belongs to
        #[arg(short, long)]
        group: Option<String>,

        /// Name within the group
        #[arg(short, long)]
        name: Option<String>,

        /// The file holds a private key
        #[arg(long)]
        private: bool,
    },

    /// Write a public key from the key tree to a file
    Export {
        /// Destination file
        dest: PathBuf,

        /// Group the key belongs to
        #[arg(short, long)]
        group: Option<String>,

        /// Name within the group
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Generate a legacy PEM RSA key pair
    LegacyGen {
        /// Directory to write id_rsa.pem and id_rsa_pub.pem into
        dir: PathBuf,

        /// RSA key size in bits
        #[arg(short, long)]
        bits: Option<usize>,
    },
}
