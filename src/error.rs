//! Error taxonomy for resolving, rendering and applying the dashboard config.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// The effective configuration could not be built.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("unknown platform family: {name}")]
    UnknownPlatform { name: String },

    #[error("no platform overlay defined for family {family}")]
    MissingOverlay { family: String },

    #[error("could not detect the platform family (set --platform or HORIZON_PLATFORM)")]
    Undetected,

    #[error("invalid attribute key '{key}'")]
    InvalidKey { key: String },

    #[error("override '{raw}' must look like key.path=value")]
    InvalidOverride { raw: String },

    #[error("attribute {key} must be a {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("required attribute {key} is not set")]
    MissingKey { key: String },

    #[error("unknown token {{{token}}} in {key}")]
    UnknownToken { key: String, token: String },

    #[error("unclosed token in {key}: {value}")]
    UnclosedToken { key: String, value: String },

    #[error("token {{{token}}} in {key} does not refer to a scalar")]
    NonScalarToken { key: String, token: String },

    #[error("token cycle while expanding {key}: {chain}")]
    TokenCycle { key: String, chain: String },

    #[error("failed to read attributes from {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to parse {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },
}

/// A template could not be rendered from the effective configuration.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unknown template: {name}")]
    Unknown { name: String },

    #[error("template {template} failed to render: {message}")]
    Render { template: String, message: String },
}

/// An external collaborator reported a failure.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("package operation failed for {packages}: {message}")]
    Package { packages: String, message: String },

    #[error("failed to write {path}: {message}")]
    File { path: PathBuf, message: String },

    #[error("web server configuration under {dir} failed: {message}")]
    Site { dir: PathBuf, message: String },

    #[error("command {name} failed: {message}")]
    Command { name: String, message: String },

    #[error("service {service} {action} failed: {message}")]
    Service {
        service: String,
        action: String,
        message: String,
    },

    #[error("secret {category}/{key} is unavailable: {message}")]
    Secret {
        category: String,
        key: String,
        message: String,
    },
}
