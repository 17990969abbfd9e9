// src/collab/dry_run.rs

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use super::{is_glob, CommandRunner, FileWriter, PackageInstaller, ServiceManager, WebServer};
use crate::{
    artifact::{Artifact, Directory, FileMode, Job, ServiceAction, SitePlan},
    error::CollaboratorError,
};

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Install {
        packages: Vec<String>,
        options: Option<String>,
    },
    Purge {
        packages: Vec<String>,
    },
    Write {
        path: PathBuf,
        owner: String,
        group: String,
        mode: FileMode,
        changed: bool,
    },
    Dir {
        path: PathBuf,
        owner: String,
        group: String,
        mode: FileMode,
        created: bool,
    },
    Permissions {
        path: PathBuf,
        owner: String,
        group: String,
        mode: FileMode,
        existed: bool,
    },
    Remove {
        path: PathBuf,
        existed: bool,
    },
    Site {
        plan: SitePlan,
        changed: bool,
    },
    Job {
        name: String,
        argv: Vec<String>,
        cwd: PathBuf,
    },
    Service {
        service: String,
        action: ServiceAction,
    },
}

/// Records every call instead of touching the host.
///
/// Files seeded with [`DryRun::with_file`] count as already present, so a
/// write with identical content reports "unchanged". Directories and the
/// last web server plan are remembered the same way.
#[derive(Debug, Default)]
pub struct DryRun {
    calls: Vec<Call>,
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
    site: Option<SitePlan>,
}

impl DryRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Content written to `path` during this run, if any.
    pub fn file(&self, path: &Path) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn jobs(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Job { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn services(&self) -> Vec<(String, ServiceAction)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Service { service, action } => Some((service.clone(), *action)),
                _ => None,
            })
            .collect()
    }
}

impl PackageInstaller for DryRun {
    fn install(
        &mut self,
        packages: &[String],
        options: Option<&str>,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(packages = ?packages, options, "would install");
        self.calls.push(Call::Install {
            packages: packages.to_vec(),
            options: options.map(str::to_string),
        });
        Ok(())
    }

    fn purge(&mut self, packages: &[String]) -> Result<(), CollaboratorError> {
        tracing::info!(packages = ?packages, "would purge");
        self.calls.push(Call::Purge {
            packages: packages.to_vec(),
        });
        Ok(())
    }
}

impl FileWriter for DryRun {
    fn write(&mut self, artifact: &Artifact) -> Result<bool, CollaboratorError> {
        let changed = self.files.get(&artifact.path) != Some(&artifact.content);
        tracing::info!(
            path = %artifact.path.display(),
            owner = %artifact.owner,
            group = %artifact.group,
            mode = %artifact.mode,
            changed,
            "would write"
        );

        self.files
            .insert(artifact.path.clone(), artifact.content.clone());
        self.calls.push(Call::Write {
            path: artifact.path.clone(),
            owner: artifact.owner.clone(),
            group: artifact.group.clone(),
            mode: artifact.mode,
            changed,
        });
        Ok(changed)
    }

    fn ensure_dir(&mut self, dir: &Directory) -> Result<bool, CollaboratorError> {
        let created = self.dirs.insert(dir.path.clone());
        tracing::info!(
            path = %dir.path.display(),
            owner = %dir.owner,
            group = %dir.group,
            mode = %dir.mode,
            created,
            "would create directory"
        );
        self.calls.push(Call::Dir {
            path: dir.path.clone(),
            owner: dir.owner.clone(),
            group: dir.group.clone(),
            mode: dir.mode,
            created,
        });
        Ok(created)
    }

    fn fix_permissions(
        &mut self,
        path: &Path,
        owner: &str,
        group: &str,
        mode: FileMode,
    ) -> Result<bool, CollaboratorError> {
        let existed = self.files.contains_key(path);
        tracing::info!(
            path = %path.display(),
            owner,
            group,
            %mode,
            existed,
            "would fix permissions"
        );
        self.calls.push(Call::Permissions {
            path: path.to_path_buf(),
            owner: owner.to_string(),
            group: group.to_string(),
            mode,
            existed,
        });
        Ok(existed)
    }

    fn remove(&mut self, path: &Path) -> Result<bool, CollaboratorError> {
        let existed = self.files.remove(path).is_some();
        tracing::info!(path = %path.display(), existed, "would remove");
        self.calls.push(Call::Remove {
            path: path.to_path_buf(),
            existed,
        });
        Ok(existed)
    }

    /// Globs match against the files this recorder knows about.
    fn expand(&self, pattern: &str) -> Result<Vec<PathBuf>, CollaboratorError> {
        if !is_glob(pattern) {
            return Ok(vec![PathBuf::from(pattern)]);
        }
        let matcher = glob::Pattern::new(pattern).map_err(|e| CollaboratorError::File {
            path: PathBuf::from(pattern),
            message: e.to_string(),
        })?;
        Ok(self
            .files
            .keys()
            .filter(|p| matcher.matches_path(p))
            .cloned()
            .collect())
    }
}

impl WebServer for DryRun {
    fn configure(&mut self, plan: &SitePlan) -> Result<bool, CollaboratorError> {
        let changed = self.site.as_ref() != Some(plan);
        tracing::info!(
            modules = ?plan.modules,
            listen = ?plan.listen,
            enable = ?plan.enable,
            disable = ?plan.disable,
            changed,
            "would configure web server"
        );
        self.site = Some(plan.clone());
        self.calls.push(Call::Site {
            plan: plan.clone(),
            changed,
        });
        Ok(changed)
    }
}

impl CommandRunner for DryRun {
    fn run(&mut self, job: &Job) -> Result<(), CollaboratorError> {
        tracing::info!(name = %job.name, argv = ?job.argv, cwd = %job.cwd.display(), "would run");
        self.calls.push(Call::Job {
            name: job.name.clone(),
            argv: job.argv.clone(),
            cwd: job.cwd.clone(),
        });
        Ok(())
    }
}

impl ServiceManager for DryRun {
    fn run(&mut self, service: &str, action: ServiceAction) -> Result<(), CollaboratorError> {
        tracing::info!(service, %action, "would run service action");
        self.calls.push(Call::Service {
            service: service.to_string(),
            action,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_is_unchanged() {
        let mut dry = DryRun::new().with_file("/etc/a", "same");
        assert!(!dry.write(&Artifact::new("a", "/etc/a", "same")).unwrap());
        assert!(dry.write(&Artifact::new("a", "/etc/a", "different")).unwrap());
        assert!(dry.write(&Artifact::new("b", "/etc/b", "new")).unwrap());
    }

    #[test]
    fn remove_reports_existence() {
        let mut dry = DryRun::new().with_file("/etc/old.conf", "x");
        assert!(dry.remove(Path::new("/etc/old.conf")).unwrap());
        assert!(!dry.remove(Path::new("/etc/old.conf")).unwrap());
    }

    #[test]
    fn directories_and_site_plans_are_remembered() {
        let mut dry = DryRun::new();
        let dir = Directory::new("local", "/srv/dash/local").mode(0o2770);
        assert!(dry.ensure_dir(&dir).unwrap());
        assert!(!dry.ensure_dir(&dir).unwrap());

        let plan = SitePlan {
            modules: vec!["wsgi".to_string()],
            ..SitePlan::default()
        };
        assert!(WebServer::configure(&mut dry, &plan).unwrap());
        assert!(!WebServer::configure(&mut dry, &plan).unwrap());
    }

    #[test]
    fn permission_fixes_need_an_existing_file() {
        let mut dry = DryRun::new().with_file("/srv/dash/local/.secret_key_store", "k");
        let mode = FileMode(0o600);
        assert!(dry
            .fix_permissions(Path::new("/srv/dash/local/.secret_key_store"), "a", "a", mode)
            .unwrap());
        assert!(!dry
            .fix_permissions(Path::new("/srv/dash/local/missing"), "a", "a", mode)
            .unwrap());
    }

    #[test]
    fn globs_match_known_files() {
        let dry = DryRun::new()
            .with_file("/etc/httpd/conf.d/a.conf", "")
            .with_file("/etc/httpd/conf.d/b.txt", "");
        assert_eq!(
            dry.expand("/etc/httpd/conf.d/*.conf").unwrap(),
            vec![PathBuf::from("/etc/httpd/conf.d/a.conf")]
        );
    }
}
