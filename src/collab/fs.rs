// src/collab/fs.rs

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::Command,
};

use super::{expand_glob, FileWriter};
use crate::{
    artifact::{Artifact, Directory, FileMode},
    error::CollaboratorError,
};

/// Writes artifacts to the local filesystem.
///
/// Content is only rewritten when it differs from what is on disk, and a
/// rewrite never exposes the file with a wider mode or half its content.
/// Mode bits are always enforced; ownership goes through `chown` unless
/// disabled.
#[derive(Debug, Clone)]
pub struct FsWriter {
    root: Option<PathBuf>,
    chown: bool,
}

impl Default for FsWriter {
    fn default() -> Self {
        Self {
            root: None,
            chown: true,
        }
    }
}

impl FsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places every path under `root` instead of `/`. Ownership is left alone.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            chown: false,
        }
    }

    pub fn with_chown(mut self, chown: bool) -> Self {
        self.chown = chown;
        self
    }

    fn target(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.strip_prefix("/").unwrap_or(path)),
            None => path.to_path_buf(),
        }
    }
}

fn file_err(path: &Path, e: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::File {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

impl FsWriter {
    fn chown(&self, path: &Path, owner: &str, group: &str) -> Result<(), CollaboratorError> {
        if !self.chown {
            return Ok(());
        }
        let owner = format!("{owner}:{group}");
        let out = Command::new("chown")
            .arg(&owner)
            .arg(path)
            .output()
            .map_err(|e| file_err(path, e))?;
        if !out.status.success() {
            return Err(file_err(
                path,
                format!(
                    "chown {owner}: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
            ));
        }
        Ok(())
    }

    /// Content lands in a sibling temp file that already carries the final
    /// mode and owner, then replaces the target in one rename.
    fn replace(&self, target: &Path, artifact: &Artifact) -> Result<(), CollaboratorError> {
        let parent = target.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent).map_err(|e| file_err(parent, e))?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{file_name}.tmp-{}", std::process::id()));

        let staged = write_new(&tmp, &artifact.content, artifact.mode.bits())
            .and_then(|()| self.chown(&tmp, &artifact.owner, &artifact.group))
            .and_then(|()| fs::rename(&tmp, target).map_err(|e| file_err(target, e)));
        if staged.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        staged
    }
}

/// Creates `path` with `bits` before any content is written to it.
fn write_new(path: &Path, content: &[u8], bits: u32) -> Result<(), CollaboratorError> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(file_err(path, e)),
    }

    let mut opts = fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(bits);
    }
    let mut file = opts.open(path).map_err(|e| file_err(path, e))?;
    // the umask may have cleared bits
    set_mode(path, bits)?;

    file.write_all(content).map_err(|e| file_err(path, e))?;
    file.sync_all().map_err(|e| file_err(path, e))
}

impl FileWriter for FsWriter {
    fn write(&mut self, artifact: &Artifact) -> Result<bool, CollaboratorError> {
        let target = self.target(&artifact.path);

        let changed = match fs::read(&target) {
            Ok(existing) => existing != artifact.content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(file_err(&target, e)),
        };

        if changed {
            self.replace(&target, artifact)?;
        } else {
            set_mode(&target, artifact.mode.bits())?;
            self.chown(&target, &artifact.owner, &artifact.group)?;
        }

        tracing::debug!(
            path = %target.display(),
            mode = %artifact.mode,
            changed,
            "artifact written"
        );
        Ok(changed)
    }

    fn ensure_dir(&mut self, dir: &Directory) -> Result<bool, CollaboratorError> {
        let target = self.target(&dir.path);
        let created = !target.is_dir();
        if created {
            fs::create_dir_all(&target).map_err(|e| file_err(&target, e))?;
        }
        set_mode(&target, dir.mode.bits())?;
        self.chown(&target, &dir.owner, &dir.group)?;

        tracing::debug!(path = %target.display(), mode = %dir.mode, created, "directory");
        Ok(created)
    }

    fn fix_permissions(
        &mut self,
        path: &Path,
        owner: &str,
        group: &str,
        mode: FileMode,
    ) -> Result<bool, CollaboratorError> {
        let target = self.target(path);
        if !target.exists() {
            return Ok(false);
        }
        set_mode(&target, mode.bits())?;
        self.chown(&target, owner, group)?;
        Ok(true)
    }

    fn remove(&mut self, path: &Path) -> Result<bool, CollaboratorError> {
        let target = self.target(path);
        match fs::remove_file(&target) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(file_err(&target, e)),
        }
    }

    fn expand(&self, pattern: &str) -> Result<Vec<PathBuf>, CollaboratorError> {
        let root = self.root.as_deref().unwrap_or(Path::new("/"));
        expand_glob(pattern, root)
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, bits: u32) -> Result<(), CollaboratorError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(bits)).map_err(|e| file_err(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _bits: u32) -> Result<(), CollaboratorError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "horizon-cookbook-{}-{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn second_write_is_unchanged() {
        let root = scratch("unchanged");
        let mut w = FsWriter::rooted(&root);
        let a = Artifact::new("settings", "/etc/dash/local_settings.py", "DEBUG = False\n")
            .mode(0o640);

        assert!(w.write(&a).unwrap());
        assert!(!w.write(&a).unwrap());
        assert_eq!(
            fs::read_to_string(root.join("etc/dash/local_settings.py")).unwrap(),
            "DEBUG = False\n"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = fs::metadata(root.join("etc/dash/local_settings.py")).unwrap();
            assert_eq!(meta.permissions().mode() & 0o777, 0o640);
        }

        let _ = fs::remove_dir_all(&root);
    }

    #[cfg(unix)]
    #[test]
    fn new_files_carry_their_mode_from_the_start() {
        use std::os::unix::fs::PermissionsExt;

        let root = scratch("mode");
        let mut w = FsWriter::rooted(&root);
        let key = Artifact::new("ssl-key", "/etc/ssl/private/horizon.key", "KEY").mode(0o600);
        assert!(w.write(&key).unwrap());

        let path = root.join("etc/ssl/private/horizon.key");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);

        // a rewrite replaces the file and leaves no temp file behind
        let key = Artifact::new("ssl-key", "/etc/ssl/private/horizon.key", "NEW").mode(0o640);
        assert!(w.write(&key).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "NEW");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o640);
        let names: Vec<_> = fs::read_dir(root.join("etc/ssl/private"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("horizon.key")]);

        let _ = fs::remove_dir_all(&root);
    }

    #[cfg(unix)]
    #[test]
    fn directories_and_permission_fixes() {
        use std::os::unix::fs::PermissionsExt;

        let root = scratch("dirs");
        let mut w = FsWriter::rooted(&root);
        let dir = Directory::new("local", "/srv/dash/local").mode(0o750);
        assert!(w.ensure_dir(&dir).unwrap());
        assert!(!w.ensure_dir(&dir).unwrap());
        let meta = fs::metadata(root.join("srv/dash/local")).unwrap();
        assert!(meta.is_dir());
        assert_eq!(meta.permissions().mode() & 0o777, 0o750);

        let store = Path::new("/srv/dash/local/.secret_key_store");
        assert!(!w.fix_permissions(store, "horizon", "horizon", FileMode(0o600)).unwrap());
        assert!(!root.join("srv/dash/local/.secret_key_store").exists());

        fs::write(root.join("srv/dash/local/.secret_key_store"), "k").unwrap();
        assert!(w.fix_permissions(store, "horizon", "horizon", FileMode(0o600)).unwrap());
        let meta = fs::metadata(root.join("srv/dash/local/.secret_key_store")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn removing_a_missing_file_is_not_a_change() {
        let root = scratch("remove");
        let mut w = FsWriter::rooted(&root);
        assert!(!w.remove(Path::new("/etc/httpd/conf.d/old.conf")).unwrap());

        w.write(&Artifact::new("old", "/etc/httpd/conf.d/old.conf", "x"))
            .unwrap();
        assert!(w.remove(Path::new("/etc/httpd/conf.d/old.conf")).unwrap());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn globs_expand_below_the_root() {
        let root = scratch("glob");
        let mut w = FsWriter::rooted(&root);
        for name in ["a.conf", "b.conf", "keep.txt"] {
            w.write(&Artifact::new(name, format!("/etc/dash/{name}"), "x"))
                .unwrap();
        }

        assert_eq!(
            w.expand("/etc/dash/*.conf").unwrap(),
            vec![
                PathBuf::from("/etc/dash/a.conf"),
                PathBuf::from("/etc/dash/b.conf")
            ]
        );
        assert_eq!(
            w.expand("/etc/dash/missing.conf").unwrap(),
            vec![PathBuf::from("/etc/dash/missing.conf")]
        );

        let _ = fs::remove_dir_all(&root);
    }
}
