//! Service provider backed by systemctl

use anyhow::{Result, bail};
use declarative::{ServiceEnsure, ServiceProvider, ServiceStatus};

use crate::runner;

#[derive(Debug, Default)]
pub struct Systemd;

impl Systemd {
    fn systemctl(&self, verb: &str, name: &str) -> Result<()> {
        let output = runner::run_output("systemctl", &[verb, name], &[])?;
        if !output.success {
            bail!("systemctl {verb} {name} failed: {}", output.stderr_str().trim());
        }
        Ok(())
    }
}

impl ServiceProvider for Systemd {
    fn status(&self, name: &str) -> Result<ServiceStatus> {
        Ok(ServiceStatus {
            running: runner::run_quiet("systemctl", &["is-active", "--quiet", name]),
            enabled: runner::run_quiet("systemctl", &["is-enabled", "--quiet", name]),
        })
    }

    fn set_state(&self, name: &str, ensure: ServiceEnsure, enable: bool) -> Result<()> {
        let current = self.status(name)?;

        if current.enabled != enable {
            self.systemctl(if enable { "enable" } else { "disable" }, name)?;
        }

        let running = ensure == ServiceEnsure::Running;
        if current.running != running {
            self.systemctl(if running { "start" } else { "stop" }, name)?;
        }
        Ok(())
    }

    fn restart(&self, name: &str) -> Result<()> {
        self.systemctl("restart", name)
    }
}
