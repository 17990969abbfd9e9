// src/collab/secrets.rs

use std::{collections::BTreeMap, fmt, path::Path};

use super::SecretStore;
use crate::error::{CollaboratorError, ConfigurationError};

fn missing(category: &str, key: &str, message: &str) -> CollaboratorError {
    CollaboratorError::Secret {
        category: category.to_string(),
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Secrets kept in memory, keyed by category and name.
#[derive(Clone, Default)]
pub struct MemorySecretStore {
    values: BTreeMap<(String, String), String>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: &str, key: &str, value: &str) -> Self {
        self.insert(category, key, value);
        self
    }

    pub fn insert(&mut self, category: &str, key: &str, value: &str) {
        self.values
            .insert((category.to_string(), key.to_string()), value.to_string());
    }
}

impl fmt::Debug for MemorySecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.values.keys().map(|(c, k)| format!("{c}/{k}")))
            .finish()
    }
}

impl SecretStore for MemorySecretStore {
    fn secret(&self, category: &str, key: &str) -> Result<String, CollaboratorError> {
        self.values
            .get(&(category.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| missing(category, key, "not found"))
    }
}

/// Secrets from a TOML file with one table per category:
///
/// ```toml
/// [db]
/// horizon = "s3cret"
///
/// [certs]
/// "horizon.pem" = """
/// -----BEGIN CERTIFICATE-----
/// ..."""
/// ```
#[derive(Clone, Default)]
pub struct TomlSecretStore {
    inner: MemorySecretStore,
}

impl TomlSecretStore {
    pub fn from_toml_str(text: &str, source_name: &str) -> Result<Self, ConfigurationError> {
        let parse_err = |message: String| ConfigurationError::Parse {
            source_name: source_name.to_string(),
            message,
        };

        let doc: BTreeMap<String, BTreeMap<String, String>> =
            toml::from_str(text).map_err(|e| parse_err(e.to_string()))?;

        let mut inner = MemorySecretStore::new();
        for (category, entries) in doc {
            for (key, value) in entries {
                inner.insert(&category, &key, &value);
            }
        }
        Ok(Self { inner })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }
}

impl fmt::Debug for TomlSecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TomlSecretStore").field(&self.inner).finish()
    }
}

impl SecretStore for TomlSecretStore {
    fn secret(&self, category: &str, key: &str) -> Result<String, CollaboratorError> {
        self.inner.secret(category, key)
    }
}

/// Answers every lookup with a visible marker instead of a value. Lets
/// `render` and `plan` run without access to real credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderSecrets;

impl SecretStore for PlaceholderSecrets {
    fn secret(&self, category: &str, key: &str) -> Result<String, CollaboratorError> {
        Ok(format!("<{category}/{key}>"))
    }
}
