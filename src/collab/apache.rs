// src/collab/apache.rs

use std::{
    fs,
    path::{Path, PathBuf},
};

use super::WebServer;
use crate::{artifact::SitePlan, error::CollaboratorError};

/// Debian-style Apache layout managed through symlinks, the way
/// `a2enmod`/`a2ensite` do it:
///
/// - `mods-enabled/<m>.load` (and `.conf`) -> `../mods-available/...`
/// - `sites-enabled/<s>.conf` -> `../sites-available/<s>.conf`
/// - `ports.conf` holds one `Listen` line per address
///
/// Module links are skipped when the server has no `mods-available`; such
/// distributions load modules from their own configuration.
#[derive(Debug, Clone, Default)]
pub struct SiteLinks {
    root: Option<PathBuf>,
}

impl SiteLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Works below `root` instead of `/`.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn target(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.strip_prefix("/").unwrap_or(path)),
            None => path.to_path_buf(),
        }
    }
}

fn site_err(dir: &Path, message: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::Site {
        dir: dir.to_path_buf(),
        message: message.to_string(),
    }
}

impl WebServer for SiteLinks {
    fn configure(&mut self, plan: &SitePlan) -> Result<bool, CollaboratorError> {
        let dir = self.target(&plan.dir);
        let mut changed = false;

        let mods_available = dir.join("mods-available");
        if mods_available.is_dir() {
            for module in &plan.modules {
                let load = format!("{module}.load");
                if !mods_available.join(&load).exists() {
                    return Err(site_err(&dir, format!("module {module} is not available")));
                }
                changed |= link(&dir, "mods-enabled", "mods-available", &load)?;

                let conf = format!("{module}.conf");
                if mods_available.join(&conf).exists() {
                    changed |= link(&dir, "mods-enabled", "mods-available", &conf)?;
                }
            }
        } else {
            tracing::debug!(dir = %dir.display(), "no mods-available; leaving modules alone");
        }

        let ports: String = plan
            .listen
            .iter()
            .map(|addr| format!("Listen {addr}\n"))
            .collect();
        let ports_conf = dir.join("ports.conf");
        if fs::read_to_string(&ports_conf).ok().as_deref() != Some(ports.as_str()) {
            fs::create_dir_all(&dir).map_err(|e| site_err(&dir, e))?;
            fs::write(&ports_conf, &ports).map_err(|e| site_err(&dir, e))?;
            changed = true;
        }

        for site in &plan.disable {
            for name in [format!("{site}.conf"), site.clone()] {
                let enabled = dir.join("sites-enabled").join(name);
                if enabled.symlink_metadata().is_ok() {
                    fs::remove_file(&enabled).map_err(|e| site_err(&dir, e))?;
                    changed = true;
                }
            }
        }

        for site in &plan.enable {
            let conf = format!("{site}.conf");
            if !dir.join("sites-available").join(&conf).exists() {
                return Err(site_err(&dir, format!("site {site} is not available")));
            }
            changed |= link(&dir, "sites-enabled", "sites-available", &conf)?;
        }

        tracing::debug!(dir = %dir.display(), changed, "web server configured");
        Ok(changed)
    }
}

/// Points `<dir>/<enabled>/<name>` at `../<available>/<name>`. Returns whether
/// the link had to change.
fn link(
    dir: &Path,
    enabled: &str,
    available: &str,
    name: &str,
) -> Result<bool, CollaboratorError> {
    let link_path = dir.join(enabled).join(name);
    let wanted = Path::new("..").join(available).join(name);

    if fs::read_link(&link_path).ok().as_deref() == Some(wanted.as_path()) {
        return Ok(false);
    }
    if link_path.symlink_metadata().is_ok() {
        fs::remove_file(&link_path).map_err(|e| site_err(dir, e))?;
    }
    fs::create_dir_all(dir.join(enabled)).map_err(|e| site_err(dir, e))?;
    symlink(&wanted, &link_path).map_err(|e| site_err(dir, e))?;
    Ok(true)
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(not(unix))]
fn symlink(_original: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "site links need a unix host",
    ))
}

#[cfg(all(test, unix))]
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

    fn plan() -> SitePlan {
        SitePlan {
            dir: PathBuf::from("/etc/apache2"),
            modules: vec!["wsgi".to_string(), "ssl".to_string()],
            listen: vec!["127.0.0.1:80".to_string(), "127.0.0.1:443".to_string()],
            disable: vec!["000-default".to_string()],
            enable: vec!["openstack-dashboard".to_string()],
        }
    }

    fn touch(path: PathBuf) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn links_modules_and_sites_once() {
        let root = scratch("sites");
        let apache = root.join("etc/apache2");
        touch(apache.join("mods-available/wsgi.load"));
        touch(apache.join("mods-available/ssl.load"));
        touch(apache.join("mods-available/ssl.conf"));
        touch(apache.join("sites-available/000-default.conf"));
        touch(apache.join("sites-available/openstack-dashboard.conf"));
        fs::create_dir_all(apache.join("sites-enabled")).unwrap();
        std::os::unix::fs::symlink(
            "../sites-available/000-default.conf",
            apache.join("sites-enabled/000-default.conf"),
        )
        .unwrap();

        let mut web = SiteLinks::rooted(&root);
        assert!(web.configure(&plan()).unwrap());

        assert_eq!(
            fs::read_link(apache.join("sites-enabled/openstack-dashboard.conf")).unwrap(),
            PathBuf::from("../sites-available/openstack-dashboard.conf")
        );
        assert!(apache.join("mods-enabled/wsgi.load").symlink_metadata().is_ok());
        assert!(apache.join("mods-enabled/ssl.conf").symlink_metadata().is_ok());
        assert!(apache.join("sites-enabled/000-default.conf").symlink_metadata().is_err());
        assert_eq!(
            fs::read_to_string(apache.join("ports.conf")).unwrap(),
            "Listen 127.0.0.1:80\nListen 127.0.0.1:443\n"
        );

        assert!(!web.configure(&plan()).unwrap());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_site_or_module_is_an_error() {
        let root = scratch("missing");
        let mut web = SiteLinks::rooted(&root);
        let err = web.configure(&plan()).unwrap_err();
        assert!(err.to_string().contains("site openstack-dashboard is not available"));

        touch(root.join("etc/apache2/mods-available/wsgi.load"));
        let err = web.configure(&plan()).unwrap_err();
        assert!(err.to_string().contains("module ssl is not available"));

        let _ = fs::remove_dir_all(&root);
    }
}
