//! Centralized path resolution for openvpn-provision
//!
//! # Environment Variables
//!
//! - `OPENVPN_PROVISION_CONFIG` - Override the configuration file
//! - `OPENVPN_PROVISION_STATE_DIR` - Override the run record directory
//!
//! The `--config` flag wins over the environment variable (clap reads the
//! variable as the flag's default).

use std::path::PathBuf;

/// Environment variable for the configuration file override
pub const ENV_CONFIG: &str = "OPENVPN_PROVISION_CONFIG";

/// Environment variable for the state directory override
pub const ENV_STATE_DIR: &str = "OPENVPN_PROVISION_STATE_DIR";

/// Default configuration file
pub const DEFAULT_CONFIG: &str = "/etc/openvpn-provision/config.toml";

/// Default state directory
pub const DEFAULT_STATE_DIR: &str = "/var/lib/openvpn-provision";

/// Resolve the configuration file path
///
/// Priority:
/// 1. `--config` flag / `OPENVPN_PROVISION_CONFIG`
/// 2. `/etc/openvpn-provision/config.toml`
pub fn config_file(flag: Option<&str>) -> PathBuf {
    if let Some(path) = flag {
        let path = expand(path);
        log::debug!("Using config file {}", path.display());
        return path;
    }
    PathBuf::from(DEFAULT_CONFIG)
}

/// Resolve the directory the run record is written to
///
/// Priority:
/// 1. `OPENVPN_PROVISION_STATE_DIR` env var
/// 2. `/var/lib/openvpn-provision`
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return path;
    }
    PathBuf::from(DEFAULT_STATE_DIR)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Resolve a source or template reference against `root`
///
/// Accepts plain paths, `file://` URLs, `~` and environment variables.
/// Relative references are joined onto `root` when one is given.
pub fn resolve_reference(reference: &str, root: Option<&PathBuf>) -> PathBuf {
    let reference = reference.strip_prefix("file://").unwrap_or(reference);
    let path = expand(reference);
    match root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path,
    }
}

// ============================================================================
// Tests
// ============================================================================
