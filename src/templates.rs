use minijinja::{value::ValueKind, AutoEscape, Environment, UndefinedBehavior, Value};
use serde_json::json;
use std::{fmt, str::FromStr};

use crate::{
    attributes::ConfigMap,
    error::{ConfigurationError, Error, TemplateError},
    guards,
};

const VHOST_SOURCE: &str = include_str!("../assets/templates/dash-site.conf.j2");
const SETTINGS_SOURCE: &str = include_str!("../assets/templates/local_settings.py.j2");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TemplateName {
    Vhost,
    Settings,
}

impl TemplateName {
    pub const ALL: [TemplateName; 2] = [Self::Vhost, Self::Settings];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vhost => "vhost",
            Self::Settings => "settings",
        }
    }

    fn file_name(self) -> &'static str {
        match self {
            Self::Vhost => "dash-site.conf.j2",
            Self::Settings => "local_settings.py.j2",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Self::Vhost => VHOST_SOURCE,
            Self::Settings => SETTINGS_SOURCE,
        }
    }
}

impl FromStr for TemplateName {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "vhost" | "vhost-template" | "dash-site" => Ok(Self::Vhost),
            "settings" | "settings-template" | "local_settings" => Ok(Self::Settings),
            other => Err(TemplateError::Unknown {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TemplateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values from the secret store that a template needs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RenderSecrets {
    pub db_password: String,
}

impl fmt::Debug for RenderSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSecrets")
            .field("db_password", &"<redacted>")
            .finish()
    }
}

/// Renders the embedded templates. Rendering is pure: the same map and
/// secrets always produce the same bytes.
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self, TemplateError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);

        env.add_filter("tojson", tojson);
        env.add_filter("pystr", pystr);
        env.add_filter("pybool", pybool);
        env.add_filter("pylist", pylist);
        env.add_filter("pyval", pyval);

        for name in TemplateName::ALL {
            env.add_template(name.file_name(), name.source())
                .map_err(|e| render_error(name, &e))?;
        }

        Ok(Self { env })
    }

    pub fn render(
        &self,
        name: TemplateName,
        cfg: &ConfigMap,
        secrets: &RenderSecrets,
    ) -> Result<String, Error> {
        // A key the guards need is as unconditional as one the template reads.
        let ctx_json = context_json(cfg, secrets).map_err(|e| TemplateError::Render {
            template: name.to_string(),
            message: e.to_string(),
        })?;

        let tpl = self
            .env
            .get_template(name.file_name())
            .map_err(|e| render_error(name, &e))?;
        let v = Value::from_serialize(&ctx_json);
        let text = tpl.render(v).map_err(|e| render_error(name, &e))?;

        tracing::debug!(template = %name, bytes = text.len(), "rendered");
        Ok(text)
    }
}

// Context passed to MiniJinja:
// - attr: the effective configuration map
// - guard: predicates and derived values the conditional sections use
// - secret: credentials fetched for this run
fn context_json(
    cfg: &ConfigMap,
    secrets: &RenderSecrets,
) -> Result<serde_json::Value, ConfigurationError> {
    let session = guards::session_engine(cfg)?;
    let identity_api_version = guards::identity_api_version(cfg)?;
    let webroot = cfg.str("webroot")?;

    Ok(json!({
        "platform": cfg.family().as_str(),
        "attr": cfg.as_map(),
        "guard": {
            "ssl": guards::ssl_enabled(cfg)?,
            "ssl_files": guards::ssl_files(cfg)?,
            "session_backend": session.as_ref().map(|s| s.django_backend()),
            "session": session,
            "plugins": guards::plugins(cfg)?,
            "log_levels": guards::log_levels(cfg)?,
            "identity_v3": identity_api_version.split('.').next() == Some("3"),
            "identity_api_version": identity_api_version,
            "keystone_url": guards::keystone_url(cfg, "internal")?,
            "keystone_admin_url": guards::keystone_url(cfg, "admin")?,
            "database": guards::database(cfg)?,
            "https_redirect": guards::https_redirect(cfg)?,
            "apache_22": guards::apache_22(cfg)?,
            "static_url": format!("{}/static", webroot.trim_end_matches('/')),
        },
        "secret": {
            "db_password": secrets.db_password,
        },
    }))
}

fn render_error(name: TemplateName, e: &minijinja::Error) -> TemplateError {
    TemplateError::Render {
        template: name.to_string(),
        message: format!("{e:#}"),
    }
}

fn invalid(msg: String) -> minijinja::Error {
    minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, msg)
}

/// JSON string literal, which Python reads as a double-quoted string.
fn tojson(v: Value) -> Result<String, minijinja::Error> {
    let s = scalar_text(&v)?;
    serde_json::to_string(&s).map_err(|e| invalid(e.to_string()))
}

/// Single-quoted Python string literal.
fn pystr(v: Value) -> Result<String, minijinja::Error> {
    Ok(quote_py(&scalar_text(&v)?))
}

/// `True`/`False`; also accepts the strings "true"/"false" in any case.
fn pybool(v: Value) -> Result<String, minijinja::Error> {
    let b = match v.kind() {
        ValueKind::Bool => v.is_true(),
        ValueKind::String => {
            let text = v.as_str().unwrap_or_default().trim().to_ascii_lowercase();
            match text.as_str() {
                "true" | "yes" | "on" | "1" => true,
                "false" | "no" | "off" | "0" | "" => false,
                other => return Err(invalid(format!("not a boolean: {other}"))),
            }
        }
        ValueKind::Number => v.is_true(),
        _ => return Err(invalid(format!("not a boolean: {v}"))),
    };
    Ok(py_bool(b).to_string())
}

/// Python list of double-quoted strings: `["a", "b"]`.
fn pylist(v: Value) -> Result<String, minijinja::Error> {
    let mut items = Vec::new();
    for item in v.try_iter()? {
        items.push(tojson(item)?);
    }
    Ok(format!("[{}]", items.join(", ")))
}

/// Any value as a Python literal.
fn pyval(v: Value) -> Result<String, minijinja::Error> {
    Ok(match v.kind() {
        ValueKind::None | ValueKind::Undefined => "None".to_string(),
        ValueKind::Bool => py_bool(v.is_true()).to_string(),
        ValueKind::Number => v.to_string(),
        ValueKind::String => quote_py(v.as_str().unwrap_or_default()),
        ValueKind::Seq => {
            let mut items = Vec::new();
            for item in v.try_iter()? {
                items.push(pyval(item)?);
            }
            format!("[{}]", items.join(", "))
        }
        ValueKind::Map => {
            let mut items = Vec::new();
            for key in v.try_iter()? {
                let item = v.get_item(&key)?;
                items.push(format!("{}: {}", pyval(key)?, pyval(item)?));
            }
            format!("{{{}}}", items.join(", "))
        }
        _ => quote_py(&v.to_string()),
    })
}

fn scalar_text(v: &Value) -> Result<String, minijinja::Error> {
    match v.kind() {
        ValueKind::String => Ok(v.as_str().unwrap_or_default().to_string()),
        ValueKind::Number | ValueKind::Bool => Ok(v.to_string()),
        _ => Err(invalid(format!("expected a scalar, got {v}"))),
    }
}

fn quote_py(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

fn py_bool(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}
