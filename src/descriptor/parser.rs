// src/descriptor/parser.rs

//! Build descriptor parsing and validation

use crate::descriptor::format::BuildDescriptor;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::Path;

/// Parse a descriptor from a YAML string
pub fn parse_descriptor(content: &str) -> Result<BuildDescriptor> {
    serde_yaml::from_str(content)
        .map_err(|e| Error::ParseError(format!("Invalid build descriptor: {}", e)))
}

/// Parse a descriptor from a file
pub fn parse_descriptor_file(path: &Path) -> Result<BuildDescriptor> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Staging(format!(
            "cannot load build descriptor from {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_descriptor(&content)
}

/// Check a descriptor before anything runs
///
/// Structural problems are errors; missing metadata only produces warnings.
pub fn validate_descriptor(descriptor: &BuildDescriptor) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if descriptor.profiles.is_empty() && descriptor.functions.is_empty() {
        return Err(Error::ParseError(
            "Build descriptor defines no profiles".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for (index, profile) in descriptor.profiles.iter().enumerate() {
        if profile.name.trim().is_empty() {
            return Err(Error::ParseError(format!(
                "Profile #{} has an empty name",
                index + 1
            )));
        }
        if !seen.insert(profile.name.as_str()) {
            return Err(Error::ParseError(format!(
                "Profile '{}' is defined more than once",
                profile.name
            )));
        }
        if profile.target.trim().is_empty() {
            return Err(Error::ParseError(format!(
                "Profile '{}' has no target",
                profile.name
            )));
        }
        if profile.run.is_empty() {
            warnings.push(format!("Profile '{}' has no run commands", profile.name));
        }
    }

    let mut functions = HashSet::new();
    for function in &descriptor.functions {
        if function.name.trim().is_empty() {
            return Err(Error::ParseError("Function with an empty name".to_string()));
        }
        if !functions.insert(function.name.as_str()) {
            return Err(Error::ParseError(format!(
                "Function '{}' is defined more than once",
                function.name
            )));
        }
        if function.run.is_empty() {
            warnings.push(format!("Function '{}' has no run commands", function.name));
        }
    }

    if descriptor.profiles.iter().filter(|p| p.default).count() > 1 {
        warnings.push("More than one profile is marked default; the first one wins".to_string());
    }
    if descriptor.license.is_none() && descriptor.profiles.iter().any(|p| p.license.is_none()) {
        warnings.push("Missing license".to_string());
    }
    if descriptor.kind.is_none() && descriptor.profiles.iter().any(|p| p.kind.is_none()) {
        warnings.push("Missing artefact type".to_string());
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALID: &str = r#"
type: golang
license: MIT
env:
  CGO_ENABLED: "0"
labels:
  team: platform
profiles:
  - name: linux
    default: true
    env:
      GOOS: linux
    run:
      - go build -o bin/app .
    target: bin/app
  - name: docs
    type: html
    run:
      - mkdocs build
    target: site
"#;

    #[test]
    fn test_parse_valid_descriptor() {
        let descriptor = parse_descriptor(VALID).unwrap();
        assert_eq!(descriptor.kind.as_deref(), Some("golang"));
        assert_eq!(descriptor.profiles.len(), 2);
        assert_eq!(descriptor.profiles[0].run, vec!["go build -o bin/app ."]);
        assert!(descriptor.profiles[0].default);
        assert_eq!(descriptor.profiles[1].kind.as_deref(), Some("html"));
        assert!(validate_descriptor(&descriptor).unwrap().is_empty());
    }

    #[test]
    fn test_parse_invalid_descriptor() {
        assert!(parse_descriptor("profiles: [unterminated").is_err());
    }

    #[test]
    fn test_missing_file_is_staging_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = parse_descriptor_file(&temp_dir.path().join("package.yaml")).unwrap_err();
        assert!(matches!(err, Error::Staging(_)));
    }

    #[test]
    fn test_validate_no_profiles() {
        let descriptor = parse_descriptor("license: MIT\n").unwrap();
        assert!(validate_descriptor(&descriptor).is_err());
    }

    #[test]
    fn test_validate_empty_target() {
        let descriptor = parse_descriptor(
            "profiles:\n  - name: app\n    run: [\"make\"]\n",
        )
        .unwrap();
        assert!(validate_descriptor(&descriptor).is_err());
    }

    #[test]
    fn test_validate_duplicate_profiles() {
        let descriptor = parse_descriptor(
            "profiles:\n  - name: app\n    target: a\n  - name: app\n    target: b\n",
        )
        .unwrap();
        assert!(validate_descriptor(&descriptor).is_err());
    }

    #[test]
    fn test_functions() {
        let descriptor = parse_descriptor(
            "functions:\n  - name: clean\n    env:\n      DIR: out\n    run: [\"rm -rf ${DIR}\"]\n",
        )
        .unwrap();
        assert!(descriptor.profiles.is_empty());
        assert_eq!(descriptor.functions[0].env["DIR"], "out");
        // a descriptor holding only functions is still usable
        validate_descriptor(&descriptor).unwrap();

        let duplicate = parse_descriptor(
            "functions:\n  - name: clean\n    run: [a]\n  - name: clean\n    run: [b]\n",
        )
        .unwrap();
        assert!(validate_descriptor(&duplicate).is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let descriptor = parse_descriptor(
            "profiles:\n  - name: app\n    run: [\"echo ok > out.txt\"]\n    target: out.txt\n",
        )
        .unwrap();
        let warnings = validate_descriptor(&descriptor).unwrap();
        assert!(warnings.iter().any(|w| w.contains("license")));
        assert!(warnings.iter().any(|w| w.contains("type")));
    }
}
