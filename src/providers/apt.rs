//! Debian package provider (dpkg-query, apt-cache, apt-get)

use anyhow::{Result, bail};
use declarative::{PackageProvider, PackageStatus, PackageVersion};

use crate::runner;

const APT_ENV: &[(&str, &str)] = &[("DEBIAN_FRONTEND", "noninteractive")];

/// Packages managed through apt
#[derive(Debug, Default)]
pub struct AptPackages;

impl AptPackages {
    fn apt_get(&self, args: &[&str]) -> Result<()> {
        let mut argv = vec!["-y", "-q", "-o", "Dpkg::Options::=--force-confold"];
        argv.extend_from_slice(args);
        let output = runner::run_output("apt-get", &argv, APT_ENV)?;
        if !output.success {
            bail!("apt-get {} failed: {}", args.join(" "), output.stderr_str().trim());
        }
        Ok(())
    }

    fn is_outdated(&self, name: &str) -> Result<bool> {
        let output = runner::run_output("apt-cache", &["policy", name], &[])?;
        if !output.success {
            bail!("apt-cache policy {name} failed: {}", output.stderr_str().trim());
        }
        Ok(parse_policy(&output.stdout_str()))
    }
}

impl PackageProvider for AptPackages {
    fn status(&self, name: &str) -> Result<PackageStatus> {
        let output = runner::run_output(
            "dpkg-query",
            &["-W", "-f=${db:Status-Abbrev}", name],
            &[],
        )?;
        // dpkg-query exits 1 for packages it has never heard of
        if !output.success {
            return Ok(PackageStatus::NotInstalled);
        }

        match parse_status(&output.stdout_str()) {
            PackageStatus::Installed { .. } => Ok(PackageStatus::Installed {
                outdated: self.is_outdated(name)?,
            }),
            other => Ok(other),
        }
    }

    fn install(&self, name: &str, version: PackageVersion) -> Result<()> {
        // `install` on an installed package upgrades it to the candidate
        match version {
            PackageVersion::Any => self.apt_get(&["install", "--no-upgrade", name]),
            PackageVersion::Latest => self.apt_get(&["install", name]),
        }
    }

    fn remove(&self, name: &str, purge_config: bool) -> Result<()> {
        if purge_config {
            self.apt_get(&["purge", name])
        } else {
            self.apt_get(&["remove", name])
        }
    }
}

/// Interpret `${db:Status-Abbrev}` (e.g. `ii `, `rc `)
fn parse_status(abbrev: &str) -> PackageStatus {
    let mut chars = abbrev.chars();
    let _desired = chars.next();
    match chars.next() {
        Some('i' | 'U' | 'F' | 'W' | 't') => PackageStatus::Installed { outdated: false },
        Some('c') => PackageStatus::ConfigOnly,
        _ => PackageStatus::NotInstalled,
    }
}

/// Whether `apt-cache policy` reports a newer candidate than the installed version
fn parse_policy(policy: &str) -> bool {
    let field = |label: &str| {
        policy
            .lines()
            .find_map(|line| line.trim().strip_prefix(label))
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != "(none)")
    };
    match (field("Installed:"), field("Candidate:")) {
        (Some(installed), Some(candidate)) => installed != candidate,
        _ => false,
    }
}
