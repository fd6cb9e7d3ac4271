use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{ConvergenceReport, ExecuteSummary};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

const RECORD_FILE: &str = "last-run.toml";

// ============================================================================
// Run Record
// ============================================================================

/// What the last `apply` did to this host
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,

    /// Codename the graph was built for
    #[serde(default)]
    pub codename: String,

    pub summary: ExecuteSummary,

    /// Nodes that changed the host
    #[serde(default)]
    pub changed: Vec<String>,

    /// Nodes re-applied through a notification
    #[serde(default)]
    pub refreshed: Vec<String>,

    /// Failed or blocked nodes (id, reason)
    #[serde(default)]
    pub failures: Vec<(String, String)>,
}

impl RunRecord {
    pub fn from_report(report: &ConvergenceReport, codename: &str, started: DateTime<Utc>) -> Self {
        Self {
            started,
            finished: Utc::now(),
            codename: codename.to_string(),
            summary: report.summary(),
            changed: report.changed().into_iter().map(str::to_string).collect(),
            refreshed: report.refreshed.clone(),
            failures: report
                .failures()
                .into_iter()
                .chain(report.blocked())
                .map(|n| (n.id.clone(), n.result.to_string()))
                .collect(),
        }
    }

    /// Record file under the state directory
    pub fn path() -> PathBuf {
        paths::state_dir().join(RECORD_FILE)
    }

    /// Load the last record, if any
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&paths::state_dir())
    }

    pub fn load_from(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(RECORD_FILE);

        if !path.exists() {
            log::debug!("No run record at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read run record: {}", path.display()))?;

        let record: RunRecord = toml::from_str(&content)
            .with_context(|| format!("Failed to parse run record: {}", path.display()))?;

        log::debug!("Loaded run record from {}", path.display());
        Ok(Some(record))
    }

    /// Save the record, replacing the previous one
    pub fn save(&self) -> Result<()> {
        self.save_to(&paths::state_dir())
    }

    pub fn save_to(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;

        let path = dir.join(RECORD_FILE);
        let content =
            toml::to_string_pretty(&self).context("Failed to serialize run record to TOML")?;

        fs::write(&path, &content)
            .with_context(|| format!("Failed to write run record: {}", path.display()))?;

        log::debug!("Saved run record to {}", path.display());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
