// src/collab/system.rs

use std::process::Command;

use super::{CommandRunner, PackageInstaller, ServiceManager};
use crate::{
    artifact::{Job, ServiceAction},
    error::CollaboratorError,
    platform::PlatformFamily,
};

/// Service actions through `systemctl`.
#[derive(Debug, Default, Clone)]
pub struct Systemctl;

impl ServiceManager for Systemctl {
    fn run(&mut self, service: &str, action: ServiceAction) -> Result<(), CollaboratorError> {
        tracing::info!(service, %action, "service action");
        let out = Command::new("systemctl")
            .arg(action.as_str())
            .arg(service)
            .output()
            .map_err(|e| service_err(service, action, e.to_string()))?;

        if out.status.success() {
            Ok(())
        } else {
            Err(service_err(
                service,
                action,
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            ))
        }
    }
}

fn service_err(service: &str, action: ServiceAction, message: String) -> CollaboratorError {
    CollaboratorError::Service {
        service: service.to_string(),
        action: action.to_string(),
        message,
    }
}

/// The family's native package manager: apt-get, dnf or zypper.
///
/// The option string goes through `sh -c` so it keeps its shell quoting
/// (`-o Dpkg::Options::='--force-confold'`). Package names are passed as
/// positional arguments and never reach the shell parser.
#[derive(Debug, Clone, Copy)]
pub struct NativePackages {
    family: PlatformFamily,
}

impl NativePackages {
    pub fn new(family: PlatformFamily) -> Self {
        Self { family }
    }

    pub fn install_script(&self, options: Option<&str>) -> String {
        let base = match self.family {
            PlatformFamily::Debian => "DEBIAN_FRONTEND=noninteractive apt-get install -y",
            PlatformFamily::Rhel => "dnf install -y",
            PlatformFamily::Suse => "zypper --non-interactive install",
        };
        script(base, options)
    }

    pub fn purge_script(&self) -> String {
        let base = match self.family {
            PlatformFamily::Debian => "DEBIAN_FRONTEND=noninteractive apt-get purge -y",
            PlatformFamily::Rhel => "dnf remove -y",
            PlatformFamily::Suse => "zypper --non-interactive remove",
        };
        script(base, None)
    }

    fn run(&self, packages: &[String], script: String) -> Result<(), CollaboratorError> {
        if packages.is_empty() {
            return Ok(());
        }
        tracing::info!(command = %script, packages = ?packages, "package manager");

        let out = shell(&script, packages)
            .output()
            .map_err(|e| package_err(packages, e.to_string()))?;

        if out.status.success() {
            Ok(())
        } else {
            Err(package_err(
                packages,
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            ))
        }
    }
}

fn script(base: &str, options: Option<&str>) -> String {
    let mut cmd = base.to_string();
    if let Some(opts) = options.map(str::trim).filter(|s| !s.is_empty()) {
        cmd.push(' ');
        cmd.push_str(opts);
    }
    cmd.push_str(" \"$@\"");
    cmd
}

/// `sh -c <script> sh <args...>`: the arguments become `"$@"`.
fn shell(script: &str, args: &[String]) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script).arg("sh").args(args);
    cmd
}

fn package_err(packages: &[String], message: String) -> CollaboratorError {
    CollaboratorError::Package {
        packages: packages.join(" "),
        message,
    }
}

impl PackageInstaller for NativePackages {
    fn install(
        &mut self,
        packages: &[String],
        options: Option<&str>,
    ) -> Result<(), CollaboratorError> {
        self.run(packages, self.install_script(options))
    }

    fn purge(&mut self, packages: &[String]) -> Result<(), CollaboratorError> {
        self.run(packages, self.purge_script())
    }
}

/// Runs jobs as child processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    fn command(job: &Job) -> Result<Command, CollaboratorError> {
        let (program, args) = job.argv.split_first().ok_or_else(|| CollaboratorError::Command {
            name: job.name.clone(),
            message: "empty command line".to_string(),
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&job.cwd);
        for (var, value) in &job.paths {
            let joined = match std::env::var(var).ok().filter(|v| !v.is_empty()) {
                Some(inherited) => format!("{value}:{inherited}"),
                None => value.clone(),
            };
            cmd.env(var, joined);
        }
        Ok(cmd)
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&mut self, job: &Job) -> Result<(), CollaboratorError> {
        tracing::info!(name = %job.name, argv = ?job.argv, cwd = %job.cwd.display(), "running");
        let command_err = |message: String| CollaboratorError::Command {
            name: job.name.clone(),
            message,
        };

        let out = Self::command(job)?
            .output()
            .map_err(|e| command_err(e.to_string()))?;
        if out.status.success() {
            Ok(())
        } else {
            Err(command_err(
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            ))
        }
    }
}
