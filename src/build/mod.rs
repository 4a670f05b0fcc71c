// src/build/mod.rs

//! Build pipeline
//!
//! A build runs these steps in order, stopping at the first failure:
//!
//! 1. stage the source and load its descriptor ([`stage`])
//! 2. drop ignored paths ([`archive::IgnoreList`])
//! 3. run each selected profile's commands and function calls ([`exec`])
//! 4. wait for the profile target and archive it
//! 5. seal the archive with the repository's key
//! 6. add archive and seal to the registry
//!
//! The working directory is removed on every path out of
//! [`Builder::build`], including failures.
//!
//! [`run_function`] runs a single descriptor function in a local source
//! without staging, archiving or registering anything.

pub mod archive;
pub mod exec;
pub mod stage;

pub use archive::{IGNORE_FILE, IgnoreList};
pub use exec::{BuildEnv, exit_message};
pub use stage::{StageRequest, Staged, WorkDir, load_descriptor};

use crate::config::ArtConfig;
use crate::descriptor::{BuildDescriptor, Profile};
use crate::error::{Error, Result};
use crate::filesystem::human_size;
use crate::filesystem::path::safe_join;
use crate::keys::KeyIndex;
use crate::registry::{ARCHIVE_EXTENSION, Artefact, NameTag, Registry, SEAL_EXTENSION};
use crate::seal::{Manifest, Seal};
use rand::Rng;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Profile selector resolving to the descriptor's default profile
pub const DEFAULT_PROFILE: &str = "default";

/// Profile selector building every profile in one run
pub const ALL_PROFILES: &str = "all";

/// What to build and where to register it
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// HTTP(S) git URL or local directory
    pub source: String,
    /// Sub-folder of the source holding the descriptor
    pub path: Option<String>,
    /// Credential for remote clones
    pub token: Option<String>,
    /// `repository[:tag]` to register under
    pub name: String,
    /// Profile to build; `None` builds the default profile and
    /// [`ALL_PROFILES`] builds every profile
    pub profile: Option<String>,
    /// Build a private copy of a local source instead of the source itself
    pub copy: bool,
    /// Stream command output and prompt for undefined variables
    pub interactive: bool,
}

/// One registered artefact
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub profile: String,
    pub artefact: Artefact,
    pub seal: Seal,
}

/// Drives builds against one registry and key tree
pub struct Builder<'a> {
    config: &'a ArtConfig,
    registry: &'a Registry,
    keys: &'a KeyIndex,
    passphrase: Option<String>,
}

impl<'a> Builder<'a> {
    pub fn new(config: &'a ArtConfig, registry: &'a Registry, keys: &'a KeyIndex) -> Self {
        Self {
            config,
            registry,
            keys,
            passphrase: None,
        }
    }

    /// Passphrase protecting the signing key
    pub fn with_passphrase(mut self, passphrase: Option<String>) -> Self {
        self.passphrase = passphrase;
        self
    }

    /// Build, seal and register every selected profile
    pub fn build(&self, opts: &BuildOptions) -> Result<Vec<BuildOutput>> {
        let reference = NameTag::parse(&opts.name)?;
        let signer = self.keys.resolve(
            &reference.repository,
            true,
            self.passphrase.as_deref(),
        )?;

        let request = StageRequest {
            source: &opts.source,
            path: opts.path.as_deref(),
            token: opts.token.as_deref(),
            copy: opts.copy,
            clone_timeout: self.config.clone_timeout,
        };
        let staged = stage::stage(&request, &self.config.work_root()?)?;

        let ignore = IgnoreList::load(&staged.source_root)?;
        let zip_ignore = if staged.copied {
            ignore.remove_all()?;
            IgnoreList::default()
        } else {
            ignore
        };

        let profiles = select_profiles(&staged.descriptor, opts.profile.as_deref())?;
        let multi = profiles.len() > 1;
        let base_name = content_name(&staged.commit);

        let mut outputs = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let name = if multi {
                format!("{}-{}", base_name, profile.name)
            } else {
                base_name.clone()
            };
            info!("Building profile '{}' as {}", profile.name, name);

            let mut env = self.environment(&staged, profile, &name, opts.interactive)?;
            for step in &profile.run {
                env.run_step(step, &staged.source_root, &staged.descriptor.functions)?;
            }

            let target = env.expand(&profile.target)?;
            let target = safe_join(&staged.source_root, &target)?;
            debug!(
                "Waiting up to {:?} for {}",
                self.config.target_timeout(),
                target.display()
            );
            exec::wait_for_target(
                &target,
                self.config.target_poll_attempts,
                self.config.target_poll_interval,
            )?;

            let archive = staged
                .work_dir
                .path()
                .join(format!("{}.{}", name, ARCHIVE_EXTENSION));
            let zip = archive::archive_target(
                &target,
                &archive,
                &zip_ignore,
                self.config.reuse_archives,
            )?;

            let size = fs::metadata(&archive)?.len();
            let manifest = Manifest {
                kind: staged.descriptor.kind_for(profile),
                license: staged.descriptor.license_for(profile),
                name: name.clone(),
                profile: profile.name.clone(),
                labels: staged.descriptor.merged_labels(profile),
                source: staged.from_uri.clone(),
                commit: staged.commit.clone(),
                target: profile.target.clone(),
                time: chrono::Local::now().to_rfc3339(),
                size: human_size(size),
                zip,
            };
            let seal = Seal::create(&archive, manifest, &signer)?;
            seal.save(&archive.with_extension(SEAL_EXTENSION))?;

            let artefact = match (&reference.tag, multi) {
                (Some(tag), true) => {
                    let name_tag = format!("{}:{}-{}", reference.repository, tag, profile.name);
                    self.registry.add(&archive, &name_tag, None)?
                }
                (None, true) => {
                    self.registry
                        .add(&archive, &reference.repository, Some(&profile.name))?
                }
                (_, false) => self.registry.add(&archive, &opts.name, None)?,
            };

            outputs.push(BuildOutput {
                profile: profile.name.clone(),
                artefact,
                seal,
            });
        }

        debug!("Cleaning up {}", staged.work_dir.path().display());
        drop(staged);
        Ok(outputs)
    }

    fn environment(
        &self,
        staged: &Staged,
        profile: &Profile,
        name: &str,
        interactive: bool,
    ) -> Result<BuildEnv> {
        let root = &staged.source_root;
        let mut env = BuildEnv::from_process(interactive);
        env.overlay(&staged.descriptor.env, root)?;
        env.overlay(&profile.env, root)?;

        env.set("ART_REF", name);
        env.set("ART_BUILD_PATH", path_string(root));
        env.set("ART_GIT_COMMIT", staged.commit.as_str());
        env.set("ART_WORK_DIR", path_string(staged.work_dir.path()));
        env.set("ART_FROM_URI", staged.from_uri.as_str());
        Ok(env)
    }
}

/// Profiles a build covers, in declaration order
///
/// No selector, or `default`, picks the profile flagged as default and
/// otherwise the first one; `all` picks every profile. A profile literally
/// named like a selector wins over the selector.
fn select_profiles<'d>(
    descriptor: &'d BuildDescriptor,
    profile: Option<&str>,
) -> Result<Vec<&'d Profile>> {
    if let Some(found) = profile.and_then(|name| descriptor.profile(name)) {
        return Ok(vec![found]);
    }
    match profile {
        None | Some(DEFAULT_PROFILE) => descriptor
            .default_profile()
            .map(|p| vec![p])
            .ok_or_else(|| Error::Staging("build descriptor defines no profiles".to_string())),
        Some(ALL_PROFILES) if !descriptor.profiles.is_empty() => {
            Ok(descriptor.profiles.iter().collect())
        }
        Some(name) => Err(Error::Staging(format!("profile '{}' is not defined", name))),
    }
}

/// Run descriptor function `function` in the local source at `path`
///
/// The function runs in place with the descriptor environment, its own
/// environment and the `ART_*` variables of a build.
pub fn run_function(function: &str, path: &str, interactive: bool) -> Result<()> {
    let path = if path.is_empty() { "." } else { path };
    if stage::is_remote(path) {
        return Err(Error::Staging(format!(
            "functions run in local sources only, not {}",
            path
        )));
    }
    let root = fs::canonicalize(path)
        .map_err(|e| Error::Staging(format!("cannot resolve source {}: {}", path, e)))?;
    let descriptor = load_descriptor(&root)?;
    let commit = if root.join(".git").exists() {
        stage::head_commit(&root)
    } else {
        String::new()
    };

    let root_str = path_string(&root);
    let mut env = BuildEnv::from_process(interactive);
    env.overlay(&descriptor.env, &root)?;
    env.set("ART_REF", content_name(&commit));
    env.set("ART_BUILD_PATH", root_str.as_str());
    env.set("ART_GIT_COMMIT", commit.as_str());
    env.set("ART_WORK_DIR", root_str.as_str());
    env.set("ART_FROM_URI", root_str.as_str());

    info!("Running function '{}' in {}", function, root.display());
    env.call_function(function, &root, &descriptor.functions)
}

/// `<ddmmyyHHMMSSmmm>-<revision>`, with a random suffix when unversioned
pub fn content_name(commit: &str) -> String {
    let stamp = chrono::Local::now().format("%d%m%y%H%M%S%3f");
    let suffix = if commit.len() >= 10 {
        commit[..10].to_string()
    } else {
        hex::encode(rand::thread_rng().r#gen::<[u8; 5]>())
    };
    format!("{}-{}", stamp, suffix)
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_profiles() -> BuildDescriptor {
        crate::descriptor::parse_descriptor(
            "profiles:\n  - name: debug\n    target: a\n  - name: release\n    default: true\n    target: b\n",
        )
        .unwrap()
    }

    fn names(profiles: Vec<&Profile>) -> Vec<&str> {
        profiles.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_select_profiles() {
        let d = two_profiles();
        assert_eq!(names(select_profiles(&d, None).unwrap()), vec!["release"]);
        assert_eq!(names(select_profiles(&d, Some("default")).unwrap()), vec!["release"]);
        assert_eq!(names(select_profiles(&d, Some("debug")).unwrap()), vec!["debug"]);
        assert_eq!(
            names(select_profiles(&d, Some("all")).unwrap()),
            vec!["debug", "release"]
        );
        assert!(matches!(
            select_profiles(&d, Some("nope")),
            Err(Error::Staging(_))
        ));
    }

    #[test]
    fn test_select_profiles_literal_name_wins() {
        let d = crate::descriptor::parse_descriptor(
            "profiles:\n  - name: app\n    target: a\n  - name: all\n    target: b\n",
        )
        .unwrap();
        assert_eq!(names(select_profiles(&d, Some("all")).unwrap()), vec!["all"]);
        assert_eq!(names(select_profiles(&d, None).unwrap()), vec!["app"]);
    }

    #[test]
    fn test_select_without_profiles() {
        let d = crate::descriptor::parse_descriptor("functions:\n  - name: x\n    run: [a]\n").unwrap();
        assert!(matches!(select_profiles(&d, None), Err(Error::Staging(_))));
        assert!(matches!(select_profiles(&d, Some("all")), Err(Error::Staging(_))));
    }

    #[test]
    fn test_content_name_with_commit() {
        let name = content_name("0123456789abcdef0123456789abcdef01234567");
        let (stamp, suffix) = name.split_once('-').unwrap();
        assert_eq!(stamp.len(), 15);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(suffix, "0123456789");
    }

    #[test]
    fn test_content_name_without_commit() {
        let a = content_name("");
        let b = content_name("");
        let suffix = a.split_once('-').unwrap().1;
        assert_eq!(suffix.len(), 10);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
