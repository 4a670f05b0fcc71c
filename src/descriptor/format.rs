// src/descriptor/format.rs

//! Build descriptor format definitions
//!
//! A descriptor is the `package.yaml` file at the root of a source tree. It
//! lists one or more profiles, each a sequence of shell commands and the
//! path they are expected to produce, and optionally named functions that
//! profiles call with `$(name)` or that run on their own.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Descriptor file name looked up in the staged source root
pub const DESCRIPTOR_FILE: &str = "package.yaml";

/// A complete build descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildDescriptor {
    /// Technology of the artefact, e.g. `java` or `golang`
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// License identifier recorded in every manifest
    #[serde(default)]
    pub license: Option<String>,

    /// Variables available to every profile
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Labels added to every manifest
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Build configurations
    #[serde(default)]
    pub profiles: Vec<Profile>,

    /// Reusable command lists
    #[serde(default)]
    pub functions: Vec<Function>,
}

/// A named build configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,

    /// Profile used when a build asks for the default one
    #[serde(default)]
    pub default: bool,

    /// Overrides the descriptor-level type
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Overrides the descriptor-level license
    #[serde(default)]
    pub license: Option<String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Shell commands, run in order from the source root
    #[serde(default)]
    pub run: Vec<String>,

    /// File or directory, relative to the source root, to package
    #[serde(default)]
    pub target: String,
}

/// A named list of commands with its own environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Function {
    pub name: String,

    /// Overlaid on the descriptor environment while the function runs
    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub run: Vec<String>,
}

impl BuildDescriptor {
    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// The profile flagged `default`, or the first one
    pub fn default_profile(&self) -> Option<&Profile> {
        self.profiles
            .iter()
            .find(|p| p.default)
            .or_else(|| self.profiles.first())
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Descriptor labels overlaid with the profile's; profile wins
    pub fn merged_labels(&self, profile: &Profile) -> BTreeMap<String, String> {
        let mut labels = self.labels.clone();
        labels.extend(profile.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        labels
    }

    /// Artefact type for a profile, falling back to the descriptor value
    pub fn kind_for(&self, profile: &Profile) -> String {
        profile
            .kind
            .clone()
            .or_else(|| self.kind.clone())
            .unwrap_or_default()
    }

    /// License for a profile, falling back to the descriptor value
    pub fn license_for(&self, profile: &Profile) -> String {
        profile
            .license
            .clone()
            .or_else(|| self.license.clone())
            .unwrap_or_default()
    }
}
