//! Host facts the manifest depends on

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use crate::config::ProvisionConfig;

pub const OS_RELEASE: &str = "/etc/os-release";

static CODENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^VERSION_CODENAME=["']?([A-Za-z0-9._-]*)["']?\s*$"#)
        .expect("Invalid VERSION_CODENAME regex")
});

/// Facts gathered once, before the graph is built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformFacts {
    /// Distribution codename (`jessie`, `trusty`, ...), empty when unknown
    pub codename: String,
}

impl PlatformFacts {
    /// Gather facts; an explicit codename wins over the config, which wins
    /// over detection
    pub fn gather(flag: Option<&str>, config: &ProvisionConfig) -> Self {
        Self::gather_from(flag, config, Path::new(OS_RELEASE))
    }

    pub fn gather_from(flag: Option<&str>, config: &ProvisionConfig, os_release: &Path) -> Self {
        let codename = flag
            .or(config.platform.codename.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| match detect_codename(os_release) {
                Ok(Some(codename)) => codename,
                Ok(None) => {
                    log::warn!("No VERSION_CODENAME in {}", os_release.display());
                    String::new()
                }
                Err(e) => {
                    log::warn!("{e:#}");
                    String::new()
                }
            });

        log::debug!("Platform codename: {codename:?}");
        Self { codename }
    }
}

/// Read `VERSION_CODENAME` from an os-release file
pub fn detect_codename(os_release: &Path) -> Result<Option<String>> {
    let content = fs::read_to_string(os_release)
        .with_context(|| format!("Failed to read {}", os_release.display()))?;
    Ok(parse_codename(&content))
}

fn parse_codename(content: &str) -> Option<String> {
    CODENAME_RE
        .captures(content)
        .map(|c| c[1].to_string())
        .filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const JESSIE: &str = r#"PRETTY_NAME="Debian GNU/Linux 8 (jessie)"
NAME="Debian GNU/Linux"
VERSION_ID="8"
VERSION="8 (jessie)"
VERSION_CODENAME=jessie
ID=debian
"#;

    #[test]
    fn test_parse_codename() {
        assert_eq!(parse_codename(JESSIE).as_deref(), Some("jessie"));
        assert_eq!(
            parse_codename("VERSION_CODENAME=\"trusty\"\n").as_deref(),
            Some("trusty")
        );
        assert_eq!(parse_codename("VERSION_CODENAME=\n"), None);
        assert_eq!(parse_codename("ID=debian\n"), None);
    }

    #[test]
    fn test_flag_wins_over_config() {
        let mut config = ProvisionConfig::default();
        config.platform.codename = Some("squeeze".into());
        let facts = PlatformFacts::gather_from(Some("trusty"), &config, Path::new("/nonexistent"));
        assert_eq!(facts.codename, "trusty");

        let facts = PlatformFacts::gather_from(None, &config, Path::new("/nonexistent"));
        assert_eq!(facts.codename, "squeeze");
    }

    #[test]
    fn test_detects_from_os_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("os-release");
        fs::write(&path, JESSIE).unwrap();

        let facts = PlatformFacts::gather_from(None, &ProvisionConfig::default(), &path);
        assert_eq!(facts.codename, "jessie");
    }

    #[test]
    fn test_unknown_when_undetectable() {
        let dir = TempDir::new().unwrap();
        let facts = PlatformFacts::gather_from(
            None,
            &ProvisionConfig::default(),
            &dir.path().join("missing"),
        );
        assert_eq!(facts, PlatformFacts::default());
    }
}
