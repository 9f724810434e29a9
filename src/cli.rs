//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Annotator - assignment and agreement for 20 Newsgroups annotation
///
/// Plans disjoint Phase 1 batches, selects a shared Phase 2 subset,
/// runs interactive labeling sessions and measures inter-annotator
/// agreement.
///
/// Examples:
///   annotator assign --annotators alice,bob
///   annotator annotate --name alice --mode 1
///   annotator reassign
///   annotator agreement --format json --output agreement.json
///   annotator --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .annotator.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding annotation records and manifests
    #[arg(long, value_name = "DIR", env = "ANNOTATOR_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Corpus location (20 Newsgroups directory tree or JSON file)
    #[arg(long, value_name = "PATH", env = "ANNOTATOR_CORPUS", global = true)]
    pub corpus: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Generate a default .annotator.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Workflow commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start an interactive annotation session
    Annotate(AnnotateArgs),

    /// Plan disjoint Phase 1 batches
    Assign(AssignArgs),

    /// Select the shared Phase 2 subset for re-annotation
    Reassign(ReassignArgs),

    /// Compute inter-annotator agreement on the Phase 2 subset
    Agreement(OutputArgs),

    /// Summarize annotation progress and time per instance
    Report(ReportArgs),

    /// Export every labeled document with all labels to one JSON file
    Export(ExportArgs),
}

/// Arguments for `annotate`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct AnnotateArgs {
    /// Annotator name (prompted when omitted)
    #[arg(short, long)]
    pub name: Option<String>,

    /// 1 = initial annotation, 2 = re-annotation (prompted when omitted)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub mode: Option<u8>,
}

/// Arguments for `assign`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct AssignArgs {
    /// Annotator names (comma-separated)
    ///
    /// Annotators already in the manifest keep their batches.
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub annotators: Vec<String>,

    /// Documents per annotator
    #[arg(long, value_name = "COUNT")]
    pub batch_size: Option<usize>,

    /// Seed for the shuffle
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for `reassign`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ReassignArgs {
    /// Number of shared documents
    #[arg(long, value_name = "COUNT")]
    pub overlap_size: Option<usize>,

    /// Seed for the selection
    #[arg(long)]
    pub seed: Option<u64>,

    /// Only pick documents their Phase 1 owner has already labeled
    #[arg(long)]
    pub labeled_only: bool,
}

/// Output destination and format.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Arguments for `report`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ReportArgs {
    #[command(flatten)]
    pub output: OutputArgs,

    /// Gap in minutes treated as a break
    #[arg(long, value_name = "MINUTES")]
    pub break_threshold: Option<f64>,
}

/// Arguments for `export`.
#[derive(clap::Args, Debug, Clone)]
pub struct ExportArgs {
    /// Output JSON file
    #[arg(short, long, default_value = "all_annotations.json", value_name = "FILE")]
    pub output: PathBuf,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        let Some(ref command) = self.command else {
            return Err("A command is required (see --help)".to_string());
        };

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match command {
            Command::Assign(assign) => {
                if assign.annotators.iter().all(|a| a.trim().is_empty()) {
                    return Err("At least one annotator is required".to_string());
                }
                if assign.batch_size == Some(0) {
                    return Err("Batch size must be at least 1".to_string());
                }
            }
            Command::Reassign(reassign) => {
                if reassign.overlap_size == Some(0) {
                    return Err("Overlap size must be at least 1".to_string());
                }
            }
            Command::Report(report) => {
                if let Some(threshold) = report.break_threshold {
                    if !threshold.is_finite() || threshold <= 0.0 {
                        return Err("Break threshold must be positive".to_string());
                    }
                }
            }
            Command::Annotate(_) | Command::Agreement(_) | Command::Export(_) => {}
        }

        // Validate corpus path if provided
        if let Some(ref corpus) = self.corpus {
            if !corpus.exists() {
                return Err(format!("Corpus path does not exist: {}", corpus.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
