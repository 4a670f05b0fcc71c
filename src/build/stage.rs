// src/build/stage.rs

//! Source staging
//!
//! A remote source is cloned into a fresh working directory. A local source
//! is copied there, or used where it is when copying is turned off. Either
//! way the descriptor is loaded and validated before any command runs.

use crate::descriptor::{BuildDescriptor, DESCRIPTOR_FILE, parse_descriptor_file, validate_descriptor};
use crate::error::{Error, Result};
use crate::filesystem::copy_tree;
use crate::filesystem::path::safe_join;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// Name of the source folder inside a working directory
pub const SOURCE_DIR: &str = "art";

/// User name sent with token authentication; any non-empty value works
const TOKEN_USER: &str = "art";

/// A randomly named working directory, removed when dropped
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
}

impl WorkDir {
    /// Create `<root>/.<random>`
    pub fn create(root: &Path) -> Result<Self> {
        let root = fs::canonicalize(root).map_err(|e| {
            Error::Staging(format!("cannot resolve work root {}: {}", root.display(), e))
        })?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = root.join(format!(".{}", &id[..12]));
        fs::create_dir_all(&path).map_err(|e| {
            Error::Staging(format!("cannot create working directory {}: {}", path.display(), e))
        })?;
        debug!("Created working directory {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed working directory {}", self.path.display()),
            Err(e) => warn!("Cannot remove {}: {}", self.path.display(), e),
        }
    }
}

/// Where and how to stage a source
#[derive(Debug, Clone)]
pub struct StageRequest<'a> {
    /// HTTP(S) URL of a git repository, or a local path
    pub source: &'a str,
    /// Sub-folder holding the descriptor
    pub path: Option<&'a str>,
    /// Credential for remote clones
    pub token: Option<&'a str>,
    /// Copy a local source before building
    pub copy: bool,
    pub clone_timeout: Duration,
}

/// A staged source with its loaded descriptor
#[derive(Debug)]
pub struct Staged {
    pub work_dir: WorkDir,
    /// Directory holding the descriptor; commands run here
    pub source_root: PathBuf,
    /// URL or absolute path the source came from
    pub from_uri: String,
    /// VCS revision, empty when the source is not versioned
    pub commit: String,
    pub descriptor: BuildDescriptor,
    /// Whether `source_root` is a private copy that may be modified
    pub copied: bool,
}

/// Whether `source` names a remote repository
pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Stage `request.source` under a new working directory in `work_root`
pub fn stage(request: &StageRequest<'_>, work_root: &Path) -> Result<Staged> {
    let work_dir = WorkDir::create(work_root)?;
    let checkout = work_dir.path().join(SOURCE_DIR);

    let (base, from_uri, commit, copied) = if is_remote(request.source) {
        clone(request.source, request.token, &checkout, request.clone_timeout)?;
        let commit = head_commit(&checkout);
        (checkout, request.source.to_string(), commit, true)
    } else {
        let absolute = fs::canonicalize(request.source).map_err(|e| {
            Error::Staging(format!("cannot resolve source {}: {}", request.source, e))
        })?;
        if !absolute.is_dir() {
            return Err(Error::Staging(format!(
                "source {} is not a directory",
                absolute.display()
            )));
        }
        let from_uri = absolute.display().to_string();
        let commit = if absolute.join(".git").exists() {
            head_commit(&absolute)
        } else {
            String::new()
        };
        if request.copy {
            let files = copy_tree(&absolute, &checkout)
                .map_err(|e| Error::Staging(format!("cannot copy {}: {}", from_uri, e)))?;
            info!("Copied {} files from {}", files, from_uri);
            (checkout, from_uri, commit, true)
        } else {
            info!("Building {} in place", from_uri);
            (absolute, from_uri, commit, false)
        }
    };

    let source_root = match request.path.filter(|p| !p.is_empty()) {
        Some(sub) => safe_join(&base, sub)
            .map_err(|e| Error::Staging(format!("invalid source path '{}': {}", sub, e)))?,
        None => base,
    };

    let descriptor = load_descriptor(&source_root)?;

    Ok(Staged {
        work_dir,
        source_root,
        from_uri,
        commit,
        descriptor,
        copied,
    })
}

/// Parse and validate `<root>/package.yaml`, logging its warnings
///
/// Any problem with the descriptor is a staging error.
pub fn load_descriptor(root: &Path) -> Result<BuildDescriptor> {
    let path = root.join(DESCRIPTOR_FILE);
    let descriptor = parse_descriptor_file(&path).map_err(as_staging)?;
    for warning in validate_descriptor(&descriptor).map_err(as_staging)? {
        warn!("{}: {}", path.display(), warning);
    }
    Ok(descriptor)
}

fn as_staging(e: Error) -> Error {
    match e {
        Error::ParseError(msg) => Error::Staging(msg),
        other => other,
    }
}

/// Clone `url` into `dest`, killing git if it exceeds `timeout`
fn clone(url: &str, token: Option<&str>, dest: &Path, timeout: Duration) -> Result<()> {
    info!("Cloning {}", url);

    let mut cmd = Command::new("git");
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        let credentials = BASE64.encode(format!("{}:{}", TOKEN_USER, token));
        cmd.arg("-c")
            .arg(format!("http.extraHeader=Authorization: Basic {}", credentials));
    }
    let mut child = cmd
        .arg("clone")
        .arg("--quiet")
        .arg(url)
        .arg(dest)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Staging(format!("cannot run git: {}", e)))?;

    match child.wait_timeout(timeout)? {
        Some(status) => {
            let output = child.wait_with_output()?;
            if status.success() {
                return Ok(());
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::Staging(format!(
                "cannot clone {}: exit code {}: {}",
                url,
                status.code().unwrap_or(-1),
                stderr.trim()
            )))
        }
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Err(Error::Staging(format!(
                "cloning {} timed out after {} seconds",
                url,
                timeout.as_secs()
            )))
        }
    }
}

/// HEAD revision of the repository at `dir`, or an empty string
pub(crate) fn head_commit(dir: &Path) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["rev-parse", "HEAD"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();
    match output {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => {
            debug!("{} is not a git checkout", dir.display());
            String::new()
        }
    }
}
