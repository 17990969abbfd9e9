use regex::Regex;
use serde_json::{Map, Value};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::{
    error::ConfigurationError,
    platform::{OverlayTable, PlatformFamily},
    resolve::{lookup, Resolver},
};

const BUILTIN_DEFAULTS: &str = include_str!("../assets/defaults.toml");

pub type Layer = Map<String, Value>;

/// Attribute file precedence:
/// 1) explicit path (CLI)
/// 2) HORIZON_ATTRIBUTES
/// 3) <config dir>/horizon-cookbook/attributes.toml, only if it exists
pub fn locate_attributes(cli: Option<&Path>) -> Option<PathBuf> {
    locate_attributes_in(
        cli,
        std::env::var_os("HORIZON_ATTRIBUTES"),
        dirs::config_dir(),
    )
}

fn locate_attributes_in(
    cli: Option<&Path>,
    env: Option<OsString>,
    config_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(p) = cli {
        return Some(p.to_path_buf());
    }
    if let Some(p) = env.filter(|s| !s.is_empty()) {
        return Some(PathBuf::from(p));
    }
    let p = config_dir?.join("horizon-cookbook").join("attributes.toml");
    p.exists().then_some(p)
}

/// User-supplied attribute overrides. Unrecognized keys pass through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    layer: Layer,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(text: &str, source_name: &str) -> Result<Self, ConfigurationError> {
        Ok(Self {
            layer: toml_to_layer(text, source_name)?,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Sets one dotted key, creating intermediate tables.
    pub fn insert(&mut self, key: &str, value: Value) -> Result<(), ConfigurationError> {
        validate_key(key)?;

        let mut parts: Vec<&str> = key.split('.').collect();
        let last = parts.pop().unwrap_or_default();

        let mut cur = &mut self.layer;
        for part in parts {
            let slot = cur
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(next) = slot else {
                return Err(wrong_type(part, "table"));
            };
            cur = next;
        }
        cur.insert(last.to_string(), value);
        Ok(())
    }

    /// Applies a `key.path=value` assignment. The value is read as a TOML
    /// literal (`true`, `8080`, `["a", "b"]`) and falls back to a plain string.
    pub fn set(&mut self, raw: &str) -> Result<(), ConfigurationError> {
        let (k, v) = raw
            .split_once('=')
            .ok_or_else(|| ConfigurationError::InvalidOverride {
                raw: raw.to_string(),
            })?;
        let key = k.trim();
        let value = parse_literal(v.trim());
        self.insert(key, value)
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }
}

fn validate_key(key: &str) -> Result<(), ConfigurationError> {
    let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*(\.[A-Za-z_][A-Za-z0-9_-]*)*$")
        .map_err(|e| ConfigurationError::Parse {
            source_name: "key pattern".to_string(),
            message: e.to_string(),
        })?;
    if re.is_match(key) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidKey {
            key: key.to_string(),
        })
    }
}

fn parse_literal(raw: &str) -> Value {
    let parsed = toml::from_str::<toml::Table>(&format!("v = {raw}"))
        .ok()
        .and_then(|mut t| t.remove("v"))
        .and_then(|v| serde_json::to_value(v).ok());
    parsed.unwrap_or_else(|| Value::String(raw.to_string()))
}

fn toml_to_layer(text: &str, source_name: &str) -> Result<Layer, ConfigurationError> {
    let parse_err = |message: String| ConfigurationError::Parse {
        source_name: source_name.to_string(),
        message,
    };
    let table: toml::Table = toml::from_str(text).map_err(|e| parse_err(e.to_string()))?;
    match serde_json::to_value(table).map_err(|e| parse_err(e.to_string()))? {
        Value::Object(m) => Ok(m),
        _ => Err(parse_err("top level is not a table".to_string())),
    }
}

/// Key-wise last writer wins. Tables merge key by key; lists and scalars
/// are replaced whole.
pub fn merge_into(dst: &mut Layer, src: Layer) {
    for (k, v) in src {
        match (dst.get_mut(&k), v) {
            (Some(Value::Object(d)), Value::Object(s)) => merge_into(d, s),
            (_, v) => {
                dst.insert(k, v);
            }
        }
    }
}

/// Builds the effective configuration: defaults, then the platform overlay,
/// then user overrides. Tokens in default and overlay strings are expanded
/// against the merged map; override values are kept exactly as given.
#[derive(Debug, Clone)]
pub struct AttributeResolver {
    defaults: Layer,
    overlays: OverlayTable,
}

impl AttributeResolver {
    pub fn new(defaults: Layer, overlays: OverlayTable) -> Self {
        Self { defaults, overlays }
    }

    pub fn builtin() -> Result<Self, ConfigurationError> {
        Ok(Self::new(
            toml_to_layer(BUILTIN_DEFAULTS, "builtin defaults.toml")?,
            OverlayTable::builtin()?,
        ))
    }

    pub fn resolve(
        &self,
        family: PlatformFamily,
        overrides: &Overrides,
    ) -> Result<ConfigMap, ConfigurationError> {
        let overlay = self.overlays.get(family)?;

        let mut merged = self.defaults.clone();
        merge_into(&mut merged, overlay.to_layer());
        merge_into(&mut merged, overrides.layer.clone());

        let root = Resolver::new(&merged)
            .with_literal(&overrides.layer)
            .expand_all()?;
        tracing::debug!(%family, keys = root.len(), "attributes resolved");

        Ok(ConfigMap { family, root })
    }
}

/// The effective, read-only configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigMap {
    family: PlatformFamily,
    root: Map<String, Value>,
}

impl ConfigMap {
    pub fn family(&self) -> PlatformFamily {
        self.family
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        lookup(&self.root, key)
    }

    fn require(&self, key: &str) -> Result<&Value, ConfigurationError> {
        self.get(key).ok_or_else(|| ConfigurationError::MissingKey {
            key: key.to_string(),
        })
    }

    pub fn str(&self, key: &str) -> Result<&str, ConfigurationError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| wrong_type(key, "string"))
    }

    /// A scalar read as text. `--set apache.version=2.2` arrives as a float
    /// and reads back as `"2.2"`.
    pub fn scalar_text(&self, key: &str) -> Result<String, ConfigurationError> {
        match self.require(key)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(wrong_type(key, "string")),
        }
    }

    /// A string attribute, or `None` when it is absent or empty.
    pub fn opt_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn bool(&self, key: &str) -> Result<bool, ConfigurationError> {
        self.require(key)?
            .as_bool()
            .ok_or_else(|| wrong_type(key, "boolean"))
    }

    /// Ports and similar: accepts integers and numeric strings.
    pub fn u16(&self, key: &str) -> Result<u16, ConfigurationError> {
        let v = self.require(key)?;
        let n = match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        n.and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| wrong_type(key, "port number"))
    }

    /// A list of strings; absent or null reads as empty.
    pub fn str_list(&self, key: &str) -> Result<Vec<String>, ConfigurationError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| wrong_type(key, "list of strings"))
                })
                .collect(),
            Some(_) => Err(wrong_type(key, "list of strings")),
        }
    }

    pub fn table(&self, key: &str) -> Result<&Map<String, Value>, ConfigurationError> {
        self.require(key)?
            .as_object()
            .ok_or_else(|| wrong_type(key, "table"))
    }
}

fn wrong_type(key: &str, expected: &'static str) -> ConfigurationError {
    ConfigurationError::WrongType {
        key: key.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tables_merge_and_lists_replace() {
        let mut dst = json!({
            "ssl": { "dir": "/etc/ssl", "cert": "a.pem" },
            "hosts": ["a", "b"],
        })
        .as_object()
        .cloned()
        .unwrap();
        let src = json!({ "ssl": { "cert": "b.pem" }, "hosts": ["c"] })
            .as_object()
            .cloned()
            .unwrap();

        merge_into(&mut dst, src);
        assert_eq!(dst["ssl"], json!({ "dir": "/etc/ssl", "cert": "b.pem" }));
        assert_eq!(dst["hosts"], json!(["c"]));
    }

    #[test]
    fn set_parses_toml_literals() {
        let mut o = Overrides::new();
        o.set("use_ssl=false").unwrap();
        o.set("http_bind.port = 8080").unwrap();
        o.set("allowed_hosts=[\"dash.example.net\"]").unwrap();
        o.set("server_hostname=dash.example.net").unwrap();

        let l = o.layer();
        assert_eq!(l["use_ssl"], json!(false));
        assert_eq!(l["http_bind"]["port"], json!(8080));
        assert_eq!(l["allowed_hosts"], json!(["dash.example.net"]));
        assert_eq!(l["server_hostname"], json!("dash.example.net"));
    }

    #[test]
    fn set_rejects_malformed_assignments() {
        let mut o = Overrides::new();
        assert!(matches!(
            o.set("no-equals-sign"),
            Err(ConfigurationError::InvalidOverride { .. })
        ));
        assert!(matches!(
            o.set(".bad..key=1"),
            Err(ConfigurationError::InvalidKey { .. })
        ));
    }

    #[test]
    fn attribute_file_precedence() {
        let dir = std::env::temp_dir()
            .join(format!("horizon-cookbook-{}-locate", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let cli = Path::new("/tmp/cli.toml");
        let env = || Some(OsString::from("/tmp/env.toml"));

        assert_eq!(
            locate_attributes_in(Some(cli), env(), Some(dir.clone())),
            Some(cli.to_path_buf())
        );
        assert_eq!(
            locate_attributes_in(None, env(), Some(dir.clone())),
            Some(PathBuf::from("/tmp/env.toml"))
        );
        // an empty variable counts as unset, and a missing file is skipped
        assert_eq!(
            locate_attributes_in(None, Some(OsString::new()), Some(dir.clone())),
            None
        );

        let file = dir.join("horizon-cookbook").join("attributes.toml");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "use_ssl = false\n").unwrap();
        assert_eq!(locate_attributes_in(None, None, Some(dir.clone())), Some(file));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn numeric_overrides_read_as_text() {
        let mut o = Overrides::new();
        o.set("apache.version=2.2").unwrap();
        let cfg = AttributeResolver::builtin()
            .unwrap()
            .resolve(PlatformFamily::Debian, &o)
            .unwrap();

        assert_eq!(cfg.scalar_text("apache.version").unwrap(), "2.2");
        assert!(cfg.str("apache.version").is_err());
        assert!(matches!(
            cfg.scalar_text("allowed_hosts"),
            Err(ConfigurationError::WrongType { .. })
        ));
    }

    #[test]
    fn scalar_typed_accessors() {
        let cfg = AttributeResolver::builtin()
            .unwrap()
            .resolve(PlatformFamily::Debian, &Overrides::new())
            .unwrap();

        assert!(cfg.bool("use_ssl").unwrap());
        assert_eq!(cfg.u16("https_bind.port").unwrap(), 443);
        assert_eq!(cfg.opt_str("ssl.chain"), None);
        assert!(matches!(
            cfg.bool("ssl.cert"),
            Err(ConfigurationError::WrongType { .. })
        ));
        assert!(matches!(
            cfg.str("does.not.exist"),
            Err(ConfigurationError::MissingKey { .. })
        ));
    }
}
