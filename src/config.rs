//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.annotator.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".annotator.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Assignment planner settings.
    #[serde(default)]
    pub assignment: AssignmentConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding records and manifests.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Corpus location: a 20 Newsgroups directory tree or a JSON file.
    #[serde(default = "default_corpus")]
    pub corpus: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            corpus: default_corpus(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("annotations")
}

fn default_corpus() -> PathBuf {
    PathBuf::from("20news-bydate")
}

/// Assignment planner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentConfig {
    /// Documents per annotator in Phase 1.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Size of the shared Phase 2 subset.
    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,

    /// Seed for every assignment shuffle.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Only select Phase 2 documents whose owner already labeled them.
    #[serde(default)]
    pub labeled_only: bool,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            overlap_size: default_overlap_size(),
            seed: default_seed(),
            labeled_only: false,
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_overlap_size() -> usize {
    15
}

fn default_seed() -> u64 {
    42
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Gap between annotations (minutes) treated as a break.
    #[serde(default = "default_break_threshold")]
    pub break_threshold_minutes: f64,

    /// Maximum disagreements listed in the agreement report.
    #[serde(default = "default_disagreement_limit")]
    pub disagreement_limit: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            break_threshold_minutes: default_break_threshold(),
            disagreement_limit: default_disagreement_limit(),
        }
    }
}

fn default_break_threshold() -> f64 {
    10.0
}

fn default_disagreement_limit() -> usize {
    50
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only explicitly provided values override.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data_dir) = args.data_dir {
            self.general.data_dir = data_dir.clone();
        }
        if let Some(ref corpus) = args.corpus {
            self.general.corpus = corpus.clone();
        }

        match &args.command {
            Some(crate::cli::Command::Assign(assign)) => {
                if let Some(batch_size) = assign.batch_size {
                    self.assignment.batch_size = batch_size;
                }
                if let Some(seed) = assign.seed {
                    self.assignment.seed = seed;
                }
            }
            Some(crate::cli::Command::Reassign(reassign)) => {
                if let Some(overlap_size) = reassign.overlap_size {
                    self.assignment.overlap_size = overlap_size;
                }
                if let Some(seed) = reassign.seed {
                    self.assignment.seed = seed;
                }
                if reassign.labeled_only {
                    self.assignment.labeled_only = true;
                }
            }
            Some(crate::cli::Command::Report(report)) => {
                if let Some(threshold) = report.break_threshold {
                    self.report.break_threshold_minutes = threshold;
                }
            }
            _ => {}
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
