use serde::Serialize;
use std::{fmt, path::PathBuf};

/// Unix permission bits, displayed as at least three octal digits (`640`,
/// `2770` with the setgid bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileMode(pub u32);

impl FileMode {
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03o}", self.0)
    }
}

impl Serialize for FileMode {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
    Reload,
    Restart,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reload => "reload",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file to place on disk, and what the web server must do when it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub name: String,
    pub path: PathBuf,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub owner: String,
    pub group: String,
    pub mode: FileMode,
    pub on_change: Option<ServiceAction>,
}

impl Artifact {
    pub fn new(name: &str, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            content: content.into(),
            owner: "root".to_string(),
            group: "root".to_string(),
            mode: FileMode(0o644),
            on_change: None,
        }
    }

    pub fn owned_by(mut self, owner: &str, group: &str) -> Self {
        self.owner = owner.to_string();
        self.group = group.to_string();
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = FileMode(mode);
        self
    }

    pub fn notifies(mut self, action: ServiceAction) -> Self {
        self.on_change = Some(action);
        self
    }
}

/// A directory the run makes sure exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directory {
    pub name: String,
    pub path: PathBuf,
    pub owner: String,
    pub group: String,
    pub mode: FileMode,
}

impl Directory {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            owner: "root".to_string(),
            group: "root".to_string(),
            mode: FileMode(0o755),
        }
    }

    pub fn owned_by(mut self, owner: &str, group: &str) -> Self {
        self.owner = owner.to_string();
        self.group = group.to_string();
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = FileMode(mode);
        self
    }
}

/// Web server state outside the vhost file: modules, listen addresses and
/// which sites are linked in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SitePlan {
    /// Server configuration directory (`/etc/apache2`).
    pub dir: PathBuf,
    pub modules: Vec<String>,
    /// `host:port` pairs.
    pub listen: Vec<String>,
    pub disable: Vec<String>,
    pub enable: Vec<String>,
}

/// A one-off command run on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub name: String,
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    /// Search-path variables. Each value goes in front of the inherited one.
    pub paths: Vec<(String, String)>,
}
