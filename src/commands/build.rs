// src/commands/build.rs

//! Build commands - build, seal and register artefacts, or run a function

use super::open_home;
use anyhow::{Context, Result};
use art::{BuildOptions, Builder, KeyIndex};
use std::path::Path;
use tracing::info;

/// Build the profiles of `source` and register them as `name`
#[allow(clippy::too_many_arguments)]
pub fn cmd_build(
    home: &Path,
    source: &str,
    name: &str,
    token: Option<String>,
    path: Option<String>,
    profile: Option<String>,
    no_copy: bool,
    interactive: bool,
    passphrase: Option<String>,
) -> Result<()> {
    let (config, registry) = open_home(home)?;
    let keys = KeyIndex::scan(&config.keys_dir())
        .with_context(|| format!("Failed to index keys in {}", config.keys_dir().display()))?;

    let opts = BuildOptions {
        source: source.to_string(),
        path,
        token,
        name: name.to_string(),
        profile,
        copy: !no_copy,
        interactive,
    };

    info!("Building {} from {}", name, source);
    let outputs = Builder::new(&config, &registry, &keys)
        .with_passphrase(passphrase)
        .build(&opts)
        .with_context(|| format!("Failed to build {}", source))?;

    for output in &outputs {
        let tags: Vec<&str> = output
            .artefact
            .tags
            .iter()
            .filter(|t| **t != output.artefact.name)
            .map(String::as_str)
            .collect();
        println!(
            "[OK] {} ({}, {}) tagged {}",
            output.artefact.name,
            output.profile,
            output.seal.manifest.size,
            tags.join(", ")
        );
    }
    Ok(())
}

/// Run descriptor function `function` in the local source at `path`
pub fn cmd_run(function: &str, path: &str, interactive: bool) -> Result<()> {
    art::build::run_function(function, path, interactive)
        .with_context(|| format!("Failed to run function '{}' in {}", function, path))?;
    println!("[OK] {}", function);
    Ok(())
}
