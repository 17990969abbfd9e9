// src/collab/mod.rs
//
// Seams to the host: everything that installs, writes, links, runs,
// restarts or reads secrets goes through one of these traits.

use std::path::{Path, PathBuf};

use crate::{
    artifact::{Artifact, Directory, FileMode, Job, ServiceAction, SitePlan},
    error::CollaboratorError,
};

pub mod apache;
pub mod dry_run;
pub mod fs;
pub mod secrets;
pub mod system;

pub use apache::SiteLinks;
pub use dry_run::{Call, DryRun};
pub use fs::FsWriter;
pub use secrets::{MemorySecretStore, PlaceholderSecrets, TomlSecretStore};
pub use system::{NativePackages, ProcessRunner, Systemctl};

pub trait PackageInstaller {
    /// Installs or upgrades `packages`. `options` is passed to the native
    /// package manager as-is.
    fn install(&mut self, packages: &[String], options: Option<&str>)
        -> Result<(), CollaboratorError>;

    fn purge(&mut self, packages: &[String]) -> Result<(), CollaboratorError>;
}

pub trait FileWriter {
    /// Writes the artifact, creating parent directories. Returns whether the
    /// file on disk changed.
    fn write(&mut self, artifact: &Artifact) -> Result<bool, CollaboratorError>;

    /// Creates the directory and its parents when missing, then applies
    /// owner, group and mode. Returns whether it was created.
    fn ensure_dir(&mut self, dir: &Directory) -> Result<bool, CollaboratorError>;

    /// Applies owner, group and mode to a path that already exists. Returns
    /// false, touching nothing, when it does not.
    fn fix_permissions(
        &mut self,
        path: &Path,
        owner: &str,
        group: &str,
        mode: FileMode,
    ) -> Result<bool, CollaboratorError>;

    /// Removes a file. Returns whether something was removed.
    fn remove(&mut self, path: &Path) -> Result<bool, CollaboratorError>;

    /// Paths matching `pattern`. Patterns without glob characters come back
    /// unchanged whether or not they exist.
    fn expand(&self, pattern: &str) -> Result<Vec<PathBuf>, CollaboratorError> {
        expand_glob(pattern, Path::new("/"))
    }
}

pub(crate) fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expands `pattern` (an absolute path) below `root`, returning absolute
/// paths as seen from `/`.
pub(crate) fn expand_glob(pattern: &str, root: &Path) -> Result<Vec<PathBuf>, CollaboratorError> {
    if !is_glob(pattern) {
        return Ok(vec![PathBuf::from(pattern)]);
    }

    let pattern_err = |message: String| CollaboratorError::File {
        path: PathBuf::from(pattern),
        message,
    };

    let rooted = root.join(pattern.trim_start_matches('/'));
    let rooted = rooted.to_string_lossy();
    let mut out = Vec::new();
    for entry in glob::glob(&rooted).map_err(|e| pattern_err(e.to_string()))? {
        let path = entry.map_err(|e| pattern_err(e.to_string()))?;
        let rel = path.strip_prefix(root).unwrap_or(&path);
        out.push(Path::new("/").join(rel));
    }
    out.sort();
    Ok(out)
}

pub trait WebServer {
    /// Enables modules, sets listen addresses and links sites in and out.
    /// Returns whether anything changed.
    fn configure(&mut self, plan: &SitePlan) -> Result<bool, CollaboratorError>;
}

pub trait CommandRunner {
    fn run(&mut self, job: &Job) -> Result<(), CollaboratorError>;
}

pub trait ServiceManager {
    fn run(&mut self, service: &str, action: ServiceAction) -> Result<(), CollaboratorError>;
}

pub trait SecretStore {
    fn secret(&self, category: &str, key: &str) -> Result<String, CollaboratorError>;
}
