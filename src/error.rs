// src/error.rs

//! Error types for the art library
//!
//! Every failure in the library surfaces as an [`Error`]. Variants carry a
//! human readable message; [`Error::kind`] groups them into the classes the
//! CLI maps onto process exit codes.

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Library error
#[derive(Debug, Error)]
pub enum Error {
    /// Source could not be cloned, copied or its descriptor loaded
    #[error("staging failed: {0}")]
    Staging(String),

    /// A profile command failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// The profile target did not appear after its commands finished
    #[error("target not found after command execution: {0}")]
    TargetNotFound(String),

    /// Key material could not be parsed or is armor-corrupt
    #[error("invalid key: {0}")]
    KeyFormat(String),

    /// Signing or decryption was requested on a public-only key
    #[error("key has no private material: {0}")]
    NoPrivateKey(String),

    /// A digest or signature did not match
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    /// Symmetric decryption found invalid or tampered padding
    #[error("invalid padding: {0}")]
    Padding(String),

    /// Any other cryptographic failure
    #[error("crypto error: {0}")]
    Crypto(String),

    /// A name:tag reference could not be parsed
    #[error("malformed name:tag '{0}'")]
    MalformedTag(String),

    /// The artefact already exists in the repository
    #[error("cannot add duplicate artefact {artefact} to repository {repository}")]
    DuplicateArtefact { repository: String, artefact: String },

    /// A file offered to the registry is not an artefact archive
    #[error("registry format error: {0}")]
    RegistryFormat(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A path tried to escape its root
    #[error("path traversal attempt: {0}")]
    PathTraversal(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failure class of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Staging,
    Execution,
    Crypto,
    Registry,
    Io,
}

impl ErrorKind {
    /// Process exit code for this class
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Staging => 2,
            Self::Execution => 3,
            Self::Crypto => 4,
            Self::Registry => 5,
            Self::Io => 1,
        }
    }
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Staging(_) | Self::ParseError(_) => ErrorKind::Staging,
            Self::Execution(_) | Self::TargetNotFound(_) => ErrorKind::Execution,
            Self::KeyFormat(_)
            | Self::NoPrivateKey(_)
            | Self::VerificationFailed(_)
            | Self::Padding(_)
            | Self::Crypto(_) => ErrorKind::Crypto,
            Self::MalformedTag(_)
            | Self::DuplicateArtefact { .. }
            | Self::RegistryFormat(_)
            | Self::NotFound(_) => ErrorKind::Registry,
            Self::InvalidPath(_)
            | Self::PathTraversal(_)
            | Self::IoError(_)
            | Self::Io(_)
            | Self::Json(_) => ErrorKind::Io,
        }
    }
}
