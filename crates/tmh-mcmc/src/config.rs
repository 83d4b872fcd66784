use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tmh_core::errors::ErrorInfo;
use tmh_core::TmhError;

/// YAML-configurable parameters governing a chain run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Number of samples to record after burn-in.
    pub samples: usize,
    /// Number of initial transitions to discard.
    #[serde(default)]
    pub burn_in: usize,
    /// Transitions between recorded samples.
    #[serde(default = "default_lag")]
    pub lag: usize,
    /// Prior executions attempted before giving up on initialisation.
    #[serde(default = "default_max_init_attempts")]
    pub max_init_attempts: usize,
    /// Choices before this index are never resampled.
    #[serde(default)]
    pub proposal_boundary: usize,
    /// Master seed and substream policy.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Output directory configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_lag() -> usize {
    1
}

fn default_max_init_attempts() -> usize {
    1000
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            samples: 100,
            burn_in: 0,
            lag: default_lag(),
            max_init_attempts: default_max_init_attempts(),
            proposal_boundary: 0,
            seed_policy: SeedPolicy::default(),
            output: OutputConfig::default(),
        }
    }
}

impl ChainConfig {
    /// Parses a configuration from YAML text and validates it.
    pub fn from_yaml_str(text: &str) -> Result<Self, TmhError> {
        let config: ChainConfig = serde_yaml::from_str(text).map_err(|err| {
            TmhError::Config(ErrorInfo::new("config-parse", err.to_string()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, TmhError> {
        let text = fs::read_to_string(path).map_err(|err| {
            TmhError::Config(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&text).map_err(|err| match err {
            TmhError::Config(info) => {
                TmhError::Config(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), TmhError> {
        let checks = [
            ("samples", self.samples),
            ("lag", self.lag),
            ("max_init_attempts", self.max_init_attempts),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(TmhError::Config(
                    ErrorInfo::new("config-range", format!("{field} must be at least 1"))
                        .with_context("field", field),
                ));
            }
        }
        Ok(())
    }

    /// Total number of kernel applications the chain performs.
    pub fn total_transitions(&self) -> usize {
        self.burn_in + self.samples * self.lag
    }
}

/// Deterministic seeding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed used for the run.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// Optional label recorded in manifests.
    #[serde(default)]
    pub label: Option<String>,
}

fn default_master_seed() -> u64 {
    0x05EE_D5EE_DD15_5EED_u64
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
            label: None,
        }
    }
}

/// Output directory layout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for run artefacts. Nothing is written when unset.
    #[serde(default)]
    pub run_directory: Option<PathBuf>,
    /// Samples CSV filename relative to `run_directory`.
    #[serde(default = "default_samples_filename")]
    pub samples_file: PathBuf,
    /// Manifest filename relative to `run_directory`.
    #[serde(default = "default_manifest_filename")]
    pub manifest_file: PathBuf,
}

fn default_samples_filename() -> PathBuf {
    PathBuf::from("samples.csv")
}

fn default_manifest_filename() -> PathBuf {
    PathBuf::from("manifest.json")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_directory: None,
            samples_file: default_samples_filename(),
            manifest_file: default_manifest_filename(),
        }
    }
}
