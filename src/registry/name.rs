// src/registry/name.rs

//! `name[:tag]` references

use crate::error::{Error, Result};
use std::fmt;

/// Tag given to artefacts when none is requested
pub const LATEST: &str = "latest";

/// A parsed `repository[:tag]` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTag {
    pub repository: String,
    pub tag: Option<String>,
}

impl NameTag {
    /// Parse on a single optional colon
    ///
    /// `repo` has no tag, `repo:v1` has tag `v1`; anything with more than
    /// one colon, or an empty side, is malformed.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let parts: Vec<&str> = value.split(':').collect();
        match parts.as_slice() {
            [repository] if !repository.is_empty() => Ok(Self {
                repository: repository.to_string(),
                tag: None,
            }),
            [repository, tag] if !repository.is_empty() && !tag.is_empty() => Ok(Self {
                repository: repository.to_string(),
                tag: Some(tag.to_string()),
            }),
            _ => Err(Error::MalformedTag(value.to_string())),
        }
    }

    /// Explicit tag, or `latest`
    pub fn tag_or_latest(&self) -> &str {
        self.tag.as_deref().unwrap_or(LATEST)
    }
}

impl fmt::Display for NameTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{}", self.repository, tag),
            None => write!(f, "{}", self.repository),
        }
    }
}

/// Tag derived for an untagged add: `latest`, or `latest-<profile>`
pub fn derived_tag(profile: Option<&str>) -> String {
    match profile.filter(|p| !p.is_empty()) {
        Some(profile) => format!("{}-{}", LATEST, profile),
        None => LATEST.to_string(),
    }
}
