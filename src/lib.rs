pub mod artifact;
pub mod attributes;
pub mod cli;
pub mod collab;
pub mod error;
pub mod guards;
pub mod logging;
pub mod pipeline;
pub mod platform;
pub mod report;
pub mod resolve;
pub mod templates;

pub use artifact::{Artifact, FileMode, ServiceAction};
pub use attributes::{locate_attributes, AttributeResolver, ConfigMap, Overrides};
pub use error::{CollaboratorError, ConfigurationError, Error, Result, TemplateError};
pub use pipeline::{run, Collaborators, RunReport};
pub use platform::{OverlayTable, PlatformFamily, PlatformOverlay};
pub use templates::{RenderSecrets, Renderer, TemplateName};
