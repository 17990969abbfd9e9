use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::{collections::BTreeMap, fmt, fs, path::Path, str::FromStr};

use crate::error::ConfigurationError;

const BUILTIN_PLATFORMS: &str = include_str!("../assets/platforms.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlatformFamily {
    Debian,
    Rhel,
    Suse,
}

impl PlatformFamily {
    pub const ALL: [PlatformFamily; 3] = [Self::Debian, Self::Rhel, Self::Suse];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debian => "debian",
            Self::Rhel => "rhel",
            Self::Suse => "suse",
        }
    }

    /// Maps a family or a concrete distribution id to its family.
    pub fn parse(name: &str) -> Result<Self, ConfigurationError> {
        let n = name.trim().to_ascii_lowercase();
        let family = match n.as_str() {
            "debian" | "ubuntu" | "linuxmint" => Self::Debian,
            "rhel" | "redhat" | "centos" | "fedora" | "amazon" | "amzn" | "scientific"
            | "rocky" | "almalinux" => Self::Rhel,
            "suse" | "opensuse" | "opensuse-leap" | "opensuse-tumbleweed" | "sles" | "sled" => {
                Self::Suse
            }
            _ => {
                return Err(ConfigurationError::UnknownPlatform {
                    name: name.to_string(),
                })
            }
        };
        Ok(family)
    }

    /// Detects the family from the contents of an os-release file.
    /// `ID` wins over `ID_LIKE`; `ID_LIKE` entries are tried in order.
    pub fn from_os_release(text: &str) -> Option<Self> {
        let fields = parse_os_release(text);

        let candidates = fields
            .get("ID")
            .into_iter()
            .map(String::as_str)
            .chain(
                fields
                    .get("ID_LIKE")
                    .into_iter()
                    .flat_map(|s| s.split_whitespace()),
            );

        for id in candidates {
            if let Ok(f) = Self::parse(id) {
                return Some(f);
            }
        }
        None
    }

    pub fn detect_from(path: &Path) -> Option<Self> {
        let text = fs::read_to_string(path).ok()?;
        Self::from_os_release(&text)
    }

    /// CLI flag, then the `HORIZON_PLATFORM` value, then the os-release file.
    /// Blank values count as unset.
    pub fn select(
        cli: Option<&str>,
        env: Option<&str>,
        os_release: &Path,
    ) -> Result<Self, ConfigurationError> {
        if let Some(name) = cli {
            return Self::parse(name);
        }
        if let Some(name) = env.filter(|s| !s.trim().is_empty()) {
            return Self::parse(name);
        }
        let family = Self::detect_from(os_release).ok_or(ConfigurationError::Undetected)?;
        tracing::debug!(%family, path = %os_release.display(), "platform detected");
        Ok(family)
    }
}

impl FromStr for PlatformFamily {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_os_release(text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();

    for line in text.lines() {
        let s = line.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };

        let mut val = v.trim();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }
        out.insert(k.trim().to_string(), val.to_ascii_lowercase());
    }

    out
}

/// Platform-specific attributes: package names, path conventions and the
/// users/groups the distribution packages run as.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformOverlay {
    pub horizon_packages: Vec<String>,

    #[serde(default)]
    pub package_options: String,

    #[serde(default)]
    pub db_python_packages: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub memcache_python_packages: Vec<String>,

    /// Dashboard plugin module -> packages providing it.
    #[serde(default)]
    pub plugin_packages: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub purge_packages: Vec<String>,

    /// Files shipped by the distro package that conflict with our vhost.
    #[serde(default)]
    pub obsolete_files: Vec<String>,

    pub horizon_user: String,
    pub horizon_group: String,
    pub key_group: String,

    pub local_settings_path: String,
    pub dash_path: String,
    pub ssl_dir: String,

    pub apache: ApacheOverlay,

    #[serde(default)]
    pub login_url: String,
    #[serde(default)]
    pub logout_url: String,
    #[serde(default)]
    pub login_redirect_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApacheOverlay {
    pub service: String,
    pub dir: String,
    pub log_dir: String,
    /// Sites the distribution enables out of the box.
    #[serde(default)]
    pub default_sites: Vec<String>,
}

impl PlatformOverlay {
    /// The overlay as a configuration-map layer.
    pub fn to_layer(&self) -> Map<String, Value> {
        let layer = json!({
            "packages": {
                "horizon": self.horizon_packages,
                "options": self.package_options,
                "db_python": self.db_python_packages,
                "memcache_python": self.memcache_python_packages,
                "plugins": self.plugin_packages,
                "purge": self.purge_packages,
            },
            "obsolete_files": self.obsolete_files,
            "horizon_user": self.horizon_user,
            "horizon_group": self.horizon_group,
            "key_group": self.key_group,
            "local_settings_path": self.local_settings_path,
            "dash_path": self.dash_path,
            "ssl": { "dir": self.ssl_dir },
            "apache": {
                "service": self.apache.service,
                "dir": self.apache.dir,
                "log_dir": self.apache.log_dir,
                "default_sites": self.apache.default_sites,
            },
            "login_url": self.login_url,
            "logout_url": self.logout_url,
            "login_redirect_url": self.login_redirect_url,
        });

        match layer {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }
}

/// Lookup table from family to overlay.
#[derive(Debug, Clone)]
pub struct OverlayTable {
    rows: BTreeMap<PlatformFamily, PlatformOverlay>,
}

impl OverlayTable {
    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::from_toml_str(BUILTIN_PLATFORMS, "builtin platforms.toml")
    }

    pub fn from_toml_str(text: &str, source_name: &str) -> Result<Self, ConfigurationError> {
        let raw: BTreeMap<String, PlatformOverlay> =
            toml::from_str(text).map_err(|e| ConfigurationError::Parse {
                source_name: source_name.to_string(),
                message: e.to_string(),
            })?;

        let mut rows = BTreeMap::new();
        for (name, overlay) in raw {
            rows.insert(PlatformFamily::parse(&name)?, overlay);
        }
        Ok(Self { rows })
    }

    pub fn get(&self, family: PlatformFamily) -> Result<&PlatformOverlay, ConfigurationError> {
        self.rows
            .get(&family)
            .ok_or_else(|| ConfigurationError::MissingOverlay {
                family: family.to_string(),
            })
    }
}
