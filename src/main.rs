use anyhow::{Context as _, Result};
use clap::Parser;
use std::path::Path;

use horizon_cookbook::{
    cli::{Args, Command, Format},
    collab::{
        DryRun, FsWriter, NativePackages, PlaceholderSecrets, ProcessRunner, SecretStore,
        SiteLinks, Systemctl, TomlSecretStore,
    },
    locate_attributes, logging,
    pipeline::{self, Collaborators},
    report, AttributeResolver, ConfigMap, Overrides, PlatformFamily, RenderSecrets, Renderer,
};

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let cfg = resolve(&args)?;
    let renderer = Renderer::new()?;

    match args.command {
        Command::Show { format, no_redact } => {
            let dump = report::attribute_dump(&cfg, !no_redact);
            let text = match format {
                Format::Toml => toml::to_string_pretty(&dump).context("failed to encode TOML")?,
                Format::Json => serde_json::to_string_pretty(&dump)? + "\n",
            };
            print!("{text}");
        }

        Command::Render {
            template,
            secrets,
            out,
        } => {
            let store = secret_store(secrets.as_deref())?;
            let render_secrets = RenderSecrets {
                db_password: store.secret("db", "horizon")?,
            };
            let text = renderer.render(template, &cfg, &render_secrets)?;
            match out {
                Some(path) => std::fs::write(&path, text)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => print!("{text}"),
            }
        }

        Command::Plan { secrets, report: mode } => {
            let store = secret_store(secrets.as_deref())?;
            let mut packages = DryRun::new();
            let mut files = DryRun::new();
            let mut web = DryRun::new();
            let mut commands = DryRun::new();
            let mut services = DryRun::new();

            let run = pipeline::run(
                &cfg,
                &renderer,
                Collaborators {
                    packages: &mut packages,
                    files: &mut files,
                    web: &mut web,
                    commands: &mut commands,
                    services: &mut services,
                    secrets: store.as_ref(),
                },
            )?;
            print!("{}", report::build_report(&run, mode));
        }

        Command::Apply {
            secrets,
            root,
            no_chown,
            report: mode,
        } => {
            let store = TomlSecretStore::load(&secrets)?;

            let run = match root {
                // Staging tree: files and site links only.
                Some(root) => {
                    let mut files = FsWriter::rooted(&root);
                    let mut web = SiteLinks::rooted(&root);
                    let mut packages = DryRun::new();
                    let mut commands = DryRun::new();
                    let mut services = DryRun::new();
                    pipeline::run(
                        &cfg,
                        &renderer,
                        Collaborators {
                            packages: &mut packages,
                            files: &mut files,
                            web: &mut web,
                            commands: &mut commands,
                            services: &mut services,
                            secrets: &store,
                        },
                    )?
                }
                None => {
                    let mut files = FsWriter::new().with_chown(!no_chown);
                    let mut web = SiteLinks::new();
                    let mut packages = NativePackages::new(cfg.family());
                    let mut commands = ProcessRunner;
                    let mut services = Systemctl;
                    pipeline::run(
                        &cfg,
                        &renderer,
                        Collaborators {
                            packages: &mut packages,
                            files: &mut files,
                            web: &mut web,
                            commands: &mut commands,
                            services: &mut services,
                            secrets: &store,
                        },
                    )?
                }
            };
            print!("{}", report::build_report(&run, mode));
        }
    }

    Ok(())
}

fn resolve(args: &Args) -> Result<ConfigMap> {
    let env = std::env::var("HORIZON_PLATFORM").ok();
    let family = PlatformFamily::select(
        args.platform.as_deref(),
        env.as_deref(),
        Path::new("/etc/os-release"),
    )?;

    let mut overrides = Overrides::new();
    if let Some(path) = locate_attributes(args.attributes.as_deref()) {
        tracing::debug!(path = %path.display(), "loading attributes");
        overrides = Overrides::load(&path)?;
    }
    for raw in &args.set {
        overrides.set(raw)?;
    }

    let cfg = AttributeResolver::builtin()?
        .resolve(family, &overrides)
        .with_context(|| format!("failed to resolve attributes for {family}"))?;
    Ok(cfg)
}

fn secret_store(path: Option<&Path>) -> Result<Box<dyn SecretStore>> {
    Ok(match path {
        Some(p) => Box::new(TomlSecretStore::load(p)?),
        None => Box::new(PlaceholderSecrets),
    })
}
