//! Pure predicates and derived values over the effective configuration.
//!
//! Every conditional section of the templates is driven by one of these
//! functions, so the decisions can be tested without rendering text.

use serde::Serialize;

use crate::{attributes::ConfigMap, error::ConfigurationError};

pub fn ssl_enabled(cfg: &ConfigMap) -> Result<bool, ConfigurationError> {
    cfg.bool("use_ssl")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SslFiles {
    pub cert: String,
    pub key: String,
    pub chain: Option<String>,
}

pub fn ssl_files(cfg: &ConfigMap) -> Result<SslFiles, ConfigurationError> {
    let cert_dir = cfg.str("ssl.cert_dir")?;
    let key_dir = cfg.str("ssl.key_dir")?;

    Ok(SslFiles {
        cert: join(cert_dir, cfg.str("ssl.cert")?),
        key: join(key_dir, cfg.str("ssl.key")?),
        chain: cfg.opt_str("ssl.chain").map(|c| join(cert_dir, c)),
    })
}

fn join(dir: &str, name: &str) -> String {
    if name.starts_with('/') {
        return name.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionEngine {
    File,
    Database,
    Cache { locations: Vec<String> },
}

impl SessionEngine {
    pub fn django_backend(&self) -> &'static str {
        match self {
            Self::File => "django.contrib.sessions.backends.file",
            Self::Database => "django.contrib.sessions.backends.db",
            Self::Cache { .. } => "django.contrib.sessions.backends.cache",
        }
    }
}

/// Selects the session engine from `session_backend`.
///
/// A memcached backend with no servers yields `None`: neither the session
/// engine nor the cache is configured and Django keeps its defaults.
pub fn session_engine(cfg: &ConfigMap) -> Result<Option<SessionEngine>, ConfigurationError> {
    let backend = cfg.str("session_backend")?;
    let engine = match backend {
        "file" => SessionEngine::File,
        "sql" | "db" | "database" => SessionEngine::Database,
        "memcached" => {
            let locations = cfg.str_list("memcached_servers")?;
            if locations.is_empty() {
                tracing::warn!(
                    "session_backend is memcached but memcached_servers is empty; \
                     leaving the session engine unconfigured"
                );
                return Ok(None);
            }
            SessionEngine::Cache { locations }
        }
        _ => {
            return Err(ConfigurationError::WrongType {
                key: "session_backend".to_string(),
                expected: "one of file, memcached, sql",
            })
        }
    };
    Ok(Some(engine))
}

pub fn plugins(cfg: &ConfigMap) -> Result<Vec<String>, ConfigurationError> {
    cfg.str_list("plugins")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLevel {
    pub component: String,
    pub level: String,
}

/// One entry per `log_level` component, ordered by component name.
pub fn log_levels(cfg: &ConfigMap) -> Result<Vec<LogLevel>, ConfigurationError> {
    let table = cfg.table("log_level")?;
    let mut out = Vec::with_capacity(table.len());
    for (component, level) in table {
        let level = level
            .as_str()
            .ok_or_else(|| ConfigurationError::WrongType {
                key: format!("log_level.{component}"),
                expected: "string",
            })?;
        out.push(LogLevel {
            component: component.clone(),
            level: level.to_string(),
        });
    }
    out.sort_by(|a, b| a.component.cmp(&b.component));
    Ok(out)
}

/// `identity_api_version` when set, else derived from `auth.version`
/// (`v3.0` -> `3`, `v2.0` -> `2.0`).
pub fn identity_api_version(cfg: &ConfigMap) -> Result<String, ConfigurationError> {
    match cfg.get("identity_api_version") {
        Some(serde_json::Value::Number(n)) => return Ok(n.to_string()),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
            return Ok(s.trim().to_string())
        }
        _ => {}
    }

    let raw = cfg.scalar_text("auth.version")?;
    let v = raw.trim().trim_start_matches(['v', 'V']);
    let major = v.split('.').next().unwrap_or(v);
    match major.parse::<u32>() {
        Ok(m) if m >= 3 => Ok(m.to_string()),
        _ => Ok(v.to_string()),
    }
}

pub fn keystone_url(cfg: &ConfigMap, endpoint: &str) -> Result<String, ConfigurationError> {
    let base = format!("identity.{endpoint}");
    Ok(format!(
        "{}://{}:{}{}",
        cfg.str(&format!("{base}.scheme"))?,
        cfg.str(&format!("{base}.host"))?,
        cfg.u16(&format!("{base}.port"))?,
        cfg.str(&format!("{base}.path"))?,
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Database {
    pub engine: &'static str,
    pub name: String,
    /// sqlite has no server, user or password.
    pub networked: bool,
}

pub fn database(cfg: &ConfigMap) -> Result<Database, ConfigurationError> {
    let service_type = cfg.str("db.service_type")?;
    let engine = match service_type {
        "mysql" => "django.db.backends.mysql",
        "sqlite" => "django.db.backends.sqlite3",
        "postgresql" => "django.db.backends.postgresql_psycopg2",
        "db2" => "ibm_db_django",
        _ => {
            return Err(ConfigurationError::WrongType {
                key: "db.service_type".to_string(),
                expected: "one of mysql, sqlite, postgresql, db2",
            })
        }
    };
    Ok(Database {
        engine,
        name: cfg.str("db.name")?.to_string(),
        networked: service_type != "sqlite",
    })
}

/// Target of the HTTP -> HTTPS rewrite rule.
pub fn https_redirect(cfg: &ConfigMap) -> Result<String, ConfigurationError> {
    let http = cfg.u16("http_bind.port")?;
    let https = cfg.u16("https_bind.port")?;
    if http == 80 && https == 443 {
        Ok("https://%{HTTP_HOST}%{REQUEST_URI}".to_string())
    } else {
        Ok(format!("https://%{{SERVER_NAME}}:{https}%{{REQUEST_URI}}"))
    }
}

/// `host:port` pairs the web server listens on; HTTPS only with SSL.
pub fn listen_addresses(cfg: &ConfigMap) -> Result<Vec<String>, ConfigurationError> {
    let mut out = vec![format!(
        "{}:{}",
        cfg.str("http_bind.host")?,
        cfg.u16("http_bind.port")?
    )];
    if ssl_enabled(cfg)? {
        out.push(format!(
            "{}:{}",
            cfg.str("https_bind.host")?,
            cfg.u16("https_bind.port")?
        ));
    }
    Ok(out)
}

/// Django tables are created for SQL sessions when migration is enabled, and
/// always for sqlite.
pub fn syncdb_required(cfg: &ConfigMap) -> Result<bool, ConfigurationError> {
    let sql_sessions = matches!(cfg.str("session_backend")?, "sql" | "db" | "database");
    Ok((sql_sessions && cfg.bool("db.migrate")?) || cfg.str("db.service_type")? == "sqlite")
}

pub fn apache_22(cfg: &ConfigMap) -> Result<bool, ConfigurationError> {
    Ok(cfg.scalar_text("apache.version")?.trim() == "2.2")
}
