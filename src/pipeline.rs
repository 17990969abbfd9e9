//! The ordered run: packages, secrets, directories, artifacts, jobs,
//! obsolete files, web server sites, then one service action.

use serde::Serialize;
use std::path::PathBuf;

use crate::{
    artifact::{Artifact, Directory, FileMode, Job, ServiceAction, SitePlan},
    attributes::ConfigMap,
    collab::{CommandRunner, FileWriter, PackageInstaller, SecretStore, ServiceManager, WebServer},
    error::{ConfigurationError, Result},
    guards,
    templates::{RenderSecrets, Renderer, TemplateName},
};

/// The host-facing collaborators for one run.
pub struct Collaborators<'a> {
    pub packages: &'a mut dyn PackageInstaller,
    pub files: &'a mut dyn FileWriter,
    pub web: &'a mut dyn WebServer,
    pub commands: &'a mut dyn CommandRunner,
    pub services: &'a mut dyn ServiceManager,
    pub secrets: &'a dyn SecretStore,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackagePlan {
    /// Dashboard, database driver and plugin packages, in that order.
    pub install: Vec<String>,
    pub options: Option<String>,
    /// Only filled when sessions live in memcached.
    pub memcache: Vec<String>,
    pub purge: Vec<String>,
}

pub fn package_plan(cfg: &ConfigMap) -> Result<PackagePlan, ConfigurationError> {
    let mut install = cfg.str_list("packages.horizon")?;

    let service_type = cfg.str("db.service_type")?;
    install.extend(cfg.str_list(&format!("packages.db_python.{service_type}"))?);

    for plugin in guards::plugins(cfg)? {
        let key = format!("packages.plugins.{plugin}");
        if cfg.get(&key).is_none() {
            tracing::debug!(%plugin, "no package mapping for plugin");
        }
        install.extend(cfg.str_list(&key)?);
    }
    dedup_in_order(&mut install);

    let memcache = match cfg.str("session_backend")? {
        "memcached" => cfg.str_list("packages.memcache_python")?,
        _ => Vec::new(),
    };

    Ok(PackagePlan {
        install,
        options: cfg.opt_str("packages.options").map(str::to_string),
        memcache,
        purge: cfg.str_list("packages.purge")?,
    })
}

fn dedup_in_order(items: &mut Vec<String>) {
    let mut seen = std::collections::BTreeSet::new();
    items.retain(|p| seen.insert(p.clone()));
}

/// Credentials fetched from the secret store.
#[derive(Clone, Default)]
pub struct SecretMaterial {
    pub db_password: String,
    pub ssl: Option<SslMaterial>,
}

#[derive(Clone)]
pub struct SslMaterial {
    pub cert: String,
    pub key: String,
    pub chain: Option<String>,
}

impl std::fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("db_password", &"<redacted>")
            .field("ssl", &self.ssl.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Reads the database password and, when certificates come from the secret
/// store, the certificate, key and chain.
pub fn fetch_secrets(cfg: &ConfigMap, store: &dyn SecretStore) -> Result<SecretMaterial> {
    let db_password = store.secret("db", "horizon")?;

    let ssl = if guards::ssl_enabled(cfg)? && cfg.bool("ssl.use_data_bag")? {
        Some(SslMaterial {
            cert: store.secret("certs", cfg.str("ssl.cert")?)?,
            key: store.secret("certs", cfg.str("ssl.key")?)?,
            chain: match cfg.opt_str("ssl.chain") {
                Some(name) => Some(store.secret("certs", name)?),
                None => None,
            },
        })
    } else {
        None
    };

    tracing::debug!(ssl = ssl.is_some(), "secrets fetched");
    Ok(SecretMaterial { db_password, ssl })
}

/// Every file the run places on disk, in write order.
pub fn build_artifacts(
    cfg: &ConfigMap,
    renderer: &Renderer,
    secrets: &SecretMaterial,
) -> Result<Vec<Artifact>> {
    let horizon_user = cfg.str("horizon_user")?;
    let horizon_group = cfg.str("horizon_group")?;
    let mut out = Vec::new();

    let render_secrets = RenderSecrets {
        db_password: secrets.db_password.clone(),
    };
    let settings = renderer.render(TemplateName::Settings, cfg, &render_secrets)?;
    out.push(
        Artifact::new("settings", cfg.str("local_settings_path")?, settings)
            .owned_by("root", horizon_group)
            .mode(0o640)
            .notifies(ServiceAction::Restart),
    );

    if let Some(ssl) = &secrets.ssl {
        let files = guards::ssl_files(cfg)?;

        // A combined PEM is written once, as the key.
        if files.cert != files.key {
            out.push(Artifact::new("ssl-cert", &files.cert, ssl.cert.as_str()));
        }
        if let (Some(path), Some(chain)) = (&files.chain, &ssl.chain) {
            out.push(Artifact::new("ssl-chain", path, chain.as_str()));
        }
        out.push(
            Artifact::new("ssl-key", &files.key, ssl.key.as_str())
                .owned_by("root", cfg.str("key_group")?)
                .mode(0o640),
        );
    }

    if let Some(content) = cfg.opt_str("secret_key_content") {
        out.push(
            Artifact::new("secret-key", cfg.str("secret_key_path")?, content)
                .owned_by(horizon_user, horizon_group)
                .mode(0o600)
                .notifies(ServiceAction::Restart),
        );
    }

    let vhost = renderer.render(TemplateName::Vhost, cfg, &RenderSecrets::default())?;
    out.push(
        Artifact::new("vhost", cfg.str("vhost_path")?, vhost).notifies(ServiceAction::Reload),
    );

    Ok(out)
}

/// `.blackhole` is the vhost's empty document root; `local` holds runtime
/// state such as the secret key store.
pub fn directories(cfg: &ConfigMap) -> Result<Vec<Directory>, ConfigurationError> {
    let dash_path = cfg.str("dash_path")?.trim_end_matches('/');
    Ok(vec![
        Directory::new("local", format!("{dash_path}/local"))
            .owned_by("root", cfg.str("horizon_group")?)
            .mode(0o2770),
        Directory::new("blackhole", format!("{dash_path}/.blackhole")),
    ])
}

pub fn site_plan(cfg: &ConfigMap) -> Result<SitePlan, ConfigurationError> {
    let mut modules: Vec<String> = ["wsgi", "rewrite", "headers"].map(String::from).into();
    if guards::ssl_enabled(cfg)? {
        modules.push("ssl".to_string());
    }
    Ok(SitePlan {
        dir: PathBuf::from(cfg.str("apache.dir")?),
        modules,
        listen: guards::listen_addresses(cfg)?,
        disable: cfg.str_list("apache.default_sites")?,
        enable: vec![cfg.str("site_name")?.to_string()],
    })
}

/// Jobs for this run; `syncdb` only when [`guards::syncdb_required`].
pub fn jobs(cfg: &ConfigMap) -> Result<Vec<Job>, ConfigurationError> {
    if !guards::syncdb_required(cfg)? {
        return Ok(Vec::new());
    }
    let django_path = cfg.str("django_path")?;
    Ok(vec![Job {
        name: "syncdb".to_string(),
        argv: ["python", "manage.py", "syncdb", "--noinput"]
            .map(String::from)
            .into(),
        cwd: PathBuf::from(django_path),
        paths: vec![(
            "PYTHONPATH".to_string(),
            format!("{}:{django_path}", cfg.str("config_dir")?),
        )],
    }])
}

/// Restart wins over reload; start and stop are never queued by artifacts.
pub fn pending_action<I>(requested: I) -> Option<ServiceAction>
where
    I: IntoIterator<Item = ServiceAction>,
{
    requested.into_iter().fold(None, |acc, a| match (acc, a) {
        (Some(ServiceAction::Restart), _) | (_, ServiceAction::Restart) => {
            Some(ServiceAction::Restart)
        }
        (Some(prev), _) => Some(prev),
        (None, a) => Some(a),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub name: String,
    pub path: PathBuf,
    pub owner: String,
    pub group: String,
    pub mode: FileMode,
    pub changed: bool,
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub platform: String,
    pub packages: PackagePlan,
    /// `changed` means created.
    pub directories: Vec<WriteOutcome>,
    pub written: Vec<WriteOutcome>,
    /// Existing files whose owner and mode were enforced.
    pub fixed: Vec<PathBuf>,
    pub jobs: Vec<String>,
    pub removed: Vec<PathBuf>,
    pub site: SitePlan,
    pub site_changed: bool,
    pub service: String,
    pub service_action: Option<ServiceAction>,
}

impl RunReport {
    pub fn changed(&self) -> bool {
        self.directories.iter().any(|d| d.changed)
            || self.written.iter().any(|w| w.changed)
            || !self.removed.is_empty()
            || self.site_changed
    }
}

/// Runs the pipeline. Errors abort; artifacts already written stay.
pub fn run(cfg: &ConfigMap, renderer: &Renderer, collab: Collaborators<'_>) -> Result<RunReport> {
    let Collaborators {
        packages,
        files,
        web,
        commands,
        services,
        secrets,
    } = collab;

    let mut report = RunReport {
        platform: cfg.family().to_string(),
        service: cfg.str("apache.service")?.to_string(),
        ..RunReport::default()
    };

    // 1) packages
    let plan = package_plan(cfg)?;
    if !plan.install.is_empty() {
        tracing::info!(count = plan.install.len(), "installing packages");
        packages.install(&plan.install, plan.options.as_deref())?;
    }
    // memcache clients follow the backend name even with no servers listed
    if !plan.memcache.is_empty() {
        packages.install(&plan.memcache, None)?;
    }
    if !plan.purge.is_empty() {
        tracing::info!(packages = ?plan.purge, "purging packages");
        packages.purge(&plan.purge)?;
    }
    report.packages = plan;

    // 2) secrets
    let material = fetch_secrets(cfg, secrets)?;

    // 3) directories
    for dir in directories(cfg)? {
        let created = files.ensure_dir(&dir)?;
        tracing::info!(path = %dir.path.display(), mode = %dir.mode, created, "directory");
        report.directories.push(WriteOutcome {
            name: dir.name,
            path: dir.path,
            owner: dir.owner,
            group: dir.group,
            mode: dir.mode,
            changed: created,
        });
    }

    // 4) artifacts
    let mut requested = Vec::new();
    for artifact in build_artifacts(cfg, renderer, &material)? {
        let changed = files.write(&artifact)?;
        tracing::info!(
            name = %artifact.name,
            path = %artifact.path.display(),
            mode = %artifact.mode,
            changed,
            "artifact"
        );
        if changed {
            requested.extend(artifact.on_change);
        }
        report.written.push(WriteOutcome {
            name: artifact.name,
            path: artifact.path,
            owner: artifact.owner,
            group: artifact.group,
            mode: artifact.mode,
            changed,
        });
    }

    // a key store created by the dashboard itself still needs tight permissions
    if cfg.opt_str("secret_key_content").is_none() {
        let path = PathBuf::from(cfg.str("secret_key_path")?);
        let (user, group) = (cfg.str("horizon_user")?, cfg.str("horizon_group")?);
        if files.fix_permissions(&path, user, group, FileMode(0o600))? {
            tracing::debug!(path = %path.display(), "secret key store permissions enforced");
            report.fixed.push(path);
        }
    }

    // 5) jobs
    for job in jobs(cfg)? {
        commands.run(&job)?;
        report.jobs.push(job.name);
    }

    // 6) obsolete files
    for pattern in cfg.str_list("obsolete_files")? {
        for path in files.expand(&pattern)? {
            if files.remove(&path)? {
                tracing::info!(path = %path.display(), "removed obsolete file");
                report.removed.push(path);
            }
        }
    }

    // 7) modules, listen addresses and site links
    report.site = site_plan(cfg)?;
    report.site_changed = web.configure(&report.site)?;
    if report.site_changed {
        tracing::info!(sites = ?report.site.enable, "web server configuration changed");
        requested.push(ServiceAction::Reload);
    }

    // 8) one service action
    report.service_action = pending_action(requested);
    match report.service_action {
        Some(action) => services.run(&report.service, action)?,
        None => tracing::debug!(service = %report.service, "nothing changed; no service action"),
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_supersedes_reload() {
        use ServiceAction::*;
        assert_eq!(pending_action([Reload, Restart, Reload]), Some(Restart));
        assert_eq!(pending_action([Reload, Reload]), Some(Reload));
        assert_eq!(pending_action([Restart]), Some(Restart));
        assert_eq!(pending_action(Vec::new()), None);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut v = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        dedup_in_order(&mut v);
        assert_eq!(v, vec!["a".to_string(), "b".to_string()]);
    }
}
