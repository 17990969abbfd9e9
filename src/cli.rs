use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::templates::TemplateName;

#[derive(Parser, Debug)]
#[command(name = "horizon-cookbook", version, about)]
pub struct Args {
    /// Platform family or distro id (overrides HORIZON_PLATFORM and /etc/os-release)
    #[arg(long, global = true)]
    pub platform: Option<String>,

    /// Path to an attributes TOML file (overrides HORIZON_ATTRIBUTES and the config dir default)
    #[arg(long, global = true)]
    pub attributes: Option<PathBuf>,

    /// Override one attribute, e.g. --set http_bind.port=8080 (repeatable, applied last)
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    pub set: Vec<String>,

    /// More log output (-v debug, -vv trace); RUST_LOG wins when set
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the effective attributes
    Show {
        #[arg(long, value_enum, default_value_t = Format::Toml)]
        format: Format,

        /// Print secret-like values instead of <redacted>
        #[arg(long = "no-redact", default_value_t = false)]
        no_redact: bool,
    },

    /// Render one template to stdout or a file
    Render {
        /// vhost or settings
        template: TemplateName,

        /// Secrets TOML file; placeholders are used when omitted
        #[arg(long)]
        secrets: Option<PathBuf>,

        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show what apply would do without touching the host
    Plan {
        #[arg(long)]
        secrets: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = ReportMode::Summary)]
        report: ReportMode,
    },

    /// Install packages, write files and notify the web server
    Apply {
        #[arg(long)]
        secrets: PathBuf,

        /// Write files below this directory instead of / (skips packages, services and chown)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Do not chown written files
        #[arg(long = "no-chown", default_value_t = false)]
        no_chown: bool,

        #[arg(long, value_enum, default_value_t = ReportMode::Summary)]
        report: ReportMode,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Toml,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportMode {
    Summary,
    Full,
}
