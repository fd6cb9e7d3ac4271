//! Real host collaborators: apt, systemd, the local filesystem and the shell

mod apt;
mod local_fs;
mod shell;
mod systemd;

pub use apt::AptPackages;
pub use local_fs::LocalFs;
pub use shell::ShellRunner;
pub use systemd::Systemd;

use declarative::Providers;

/// Tools the providers shell out to
pub const REQUIRED_TOOLS: &[&str] = &["dpkg-query", "apt-cache", "apt-get", "systemctl", "sh"];

/// Providers for a Debian-family host running systemd
#[derive(Debug, Default)]
pub struct Host {
    packages: AptPackages,
    services: Systemd,
    fs: LocalFs,
    runner: ShellRunner,
}

impl Host {
    pub fn providers(&self) -> Providers<'_> {
        Providers {
            packages: &self.packages,
            services: &self.services,
            fs: &self.fs,
            runner: &self.runner,
        }
    }
}
