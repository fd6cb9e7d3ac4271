//! Provisioning configuration (`config.toml`)

use anyhow::{Context, Result};
use declarative::{PackageEnsure, ServiceEnsure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// Configuration problems found by [`ProvisionConfig::validate`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    EmptyName { field: &'static str },

    #[error("config_dir.purge requires config_dir.recurse")]
    PurgeWithoutRecurse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Base directory for relative `source`/`template` references
    pub source_root: Option<String>,
    pub package: PackageConfig,
    pub service: ServiceConfig,
    pub config_file: ConfigFileConfig,
    pub config_dir: ConfigDirConfig,
    pub easy_rsa: EasyRsaConfig,
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageConfig {
    pub name: String,
    pub ensure: PackageEnsure,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            name: "openvpn".to_string(),
            ensure: PackageEnsure::Present,
        }
    }
}

/// Unset `ensure`/`enable` fall back to defaults derived from the package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    pub ensure: Option<ServiceEnsure>,
    pub enable: Option<bool>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "openvpn".to_string(),
            ensure: None,
            enable: None,
        }
    }
}

/// How `/etc/openvpn/openvpn.conf` is delivered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFileConfig {
    pub source: Option<String>,
    pub content: Option<String>,
    pub template: Option<String>,
    /// Template values
    pub options: BTreeMap<String, String>,
}

impl ConfigFileConfig {
    /// Number of delivery modes set
    pub fn modes_set(&self) -> usize {
        [
            self.source.is_some(),
            self.content.is_some(),
            self.template.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigDirConfig {
    /// Tree copied into `/etc/openvpn`
    pub source: Option<String>,
    /// Remove files under `/etc/openvpn` that the source does not have
    pub purge: bool,
    pub recurse: bool,
}

impl Default for ConfigDirConfig {
    fn default() -> Self {
        Self {
            source: None,
            purge: false,
            recurse: true,
        }
    }
}

/// Certificate fields written to the easy-rsa `vars` file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EasyRsaConfig {
    pub country: String,
    pub province: String,
    pub city: String,
    pub org: String,
    pub email: String,
    pub ou: String,
}

impl Default for EasyRsaConfig {
    fn default() -> Self {
        Self {
            country: "US".to_string(),
            province: "CA".to_string(),
            city: "SanFrancisco".to_string(),
            org: "Fort-Funston".to_string(),
            email: "me@myhost.mydomain".to_string(),
            ou: "MyOrganizationalUnit".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformConfig {
    /// Distribution codename; detected from the host when unset
    pub codename: Option<String>,
}

impl ProvisionConfig {
    /// Load the configuration file, or defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("{} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.package.name.trim().is_empty() {
            return Err(ConfigError::EmptyName {
                field: "package.name",
            });
        }
        if self.service.name.trim().is_empty() {
            return Err(ConfigError::EmptyName {
                field: "service.name",
            });
        }
        if self.config_dir.purge && !self.config_dir.recurse {
            return Err(ConfigError::PurgeWithoutRecurse);
        }
        Ok(())
    }

    /// Expanded `source_root`
    pub fn source_root(&self) -> Option<PathBuf> {
        self.source_root.as_deref().map(paths::expand)
    }

    /// Resolve a `source`/`template` reference against `source_root`
    pub fn resolve(&self, reference: &str) -> PathBuf {
        paths::resolve_reference(reference, self.source_root().as_ref())
    }
}
