// src/lib.rs

//! art - build, seal and store application artefacts
//!
//! A build stages a source tree, runs the commands of each profile in its
//! `package.yaml`, archives the profile target and signs the archive
//! together with a manifest. The sealed archive then lands in a local,
//! tag-addressed registry.
//!
//! # Architecture
//!
//! - [`build`]: staging, command execution, ignore filtering, archiving
//! - [`crypto`]: digests, PGP and legacy RSA signing, secret encryption
//! - [`keys`]: per-repository key resolution with a root fallback
//! - [`registry`]: repositories, artefacts and tags on disk
//! - [`seal`]: manifests and their signed sidecars

pub mod build;
pub mod config;
pub mod crypto;
pub mod descriptor;
mod error;
pub mod filesystem;
pub mod keys;
pub mod registry;
pub mod seal;

pub use build::{BuildOptions, BuildOutput, Builder};
pub use config::ArtConfig;
pub use crypto::{PgpKey, SealSigner, SealVerifier};
pub use descriptor::{BuildDescriptor, Profile};
pub use error::{Error, ErrorKind, Result};
pub use keys::KeyIndex;
pub use registry::{Artefact, NameTag, Registry};
pub use seal::{Manifest, Seal};
