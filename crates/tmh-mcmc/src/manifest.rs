use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tmh_core::errors::ErrorInfo;
use tmh_core::TmhError;

use crate::config::ChainConfig;
use crate::metrics::AcceptanceStats;

/// Structured manifest describing a completed chain run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainManifest {
    /// Configuration used for the run.
    pub config: ChainConfig,
    /// Master seed used to derive transition substreams.
    pub master_seed: u64,
    /// Optional seed label captured from the configuration.
    pub seed_label: Option<String>,
    /// Acceptance statistics of the run.
    pub acceptance: AcceptanceStats,
    /// Log score of the final trace.
    pub final_score: f64,
    /// Samples file produced during the run (relative to run directory).
    pub samples_file: Option<PathBuf>,
}

impl ChainManifest {
    /// Writes the manifest to a JSON file.
    pub fn write(&self, path: &Path) -> Result<(), TmhError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                TmhError::Config(
                    ErrorInfo::new("manifest-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            TmhError::Config(
                ErrorInfo::new("manifest-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            TmhError::Config(
                ErrorInfo::new("manifest-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, TmhError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            TmhError::Config(
                ErrorInfo::new("manifest-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            TmhError::Config(
                ErrorInfo::new("manifest-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}
