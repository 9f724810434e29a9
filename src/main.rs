//! Newsgroup Annotator - assignment and agreement for 20 Newsgroups labeling
//!
//! A CLI tool that splits a corpus into disjoint Phase 1 batches, selects a
//! shared Phase 2 subset for re-annotation, runs interactive labeling
//! sessions and measures inter-annotator agreement.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Configuration, data or runtime error

mod analysis;
mod cli;
mod config;
mod context;
mod corpus;
mod error;
mod models;
mod planner;
mod report;
mod session;
mod store;

use anyhow::{Context, Result};
use cli::{AnnotateArgs, Args, Command, OutputArgs, OutputFormat};
use config::{Config, CONFIG_FILE};
use context::ProjectContext;
use std::io;
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("Newsgroup Annotator v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args) {
        error!("Command failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .annotator.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize the data directory, corpus, batch sizes and seed.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration, build the project context and dispatch the command.
fn run(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    debug!("Effective configuration: {:?}", config);

    let ctx = ProjectContext::new(config, !args.quiet);

    match args.command {
        Some(Command::Annotate(annotate)) => run_annotate(&ctx, annotate),
        Some(Command::Assign(assign)) => run_assign(&ctx, &assign.annotators),
        Some(Command::Reassign(_)) => run_reassign(&ctx),
        Some(Command::Agreement(output)) => run_agreement(&ctx, &output),
        Some(Command::Report(report)) => run_report(&ctx, &report.output),
        Some(Command::Export(export)) => run_export(&ctx, &export.output),
        None => Ok(()),
    }
}

fn run_annotate(ctx: &ProjectContext, args: AnnotateArgs) -> Result<()> {
    println!("📚 Loading corpus: {}", ctx.config.general.corpus.display());
    let corpus = ctx.load_corpus().context("Failed to load corpus")?;
    println!("   {} documents available.\n", corpus.len());

    let mut session = session::Session::new(&ctx.store, &corpus);
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let summary = session::console::run(
        &mut session,
        args.name,
        args.mode.map(|m| m.to_string()),
        stdin.lock(),
        &mut stdout,
    )
    .context("Annotation session ended with an error")?;

    if let (Some(annotator), Some(phase)) = (summary.annotator, summary.phase) {
        println!("\n📊 Session Summary:");
        println!("   Annotator: {}", annotator);
        println!("   {}", phase);
        println!("   Labeled this session: {}", summary.labeled);
        println!("   Skipped: {}", summary.skipped);
        println!("   Remaining: {}", summary.remaining);
    }
    println!("\n✅ Session closed. Records are in {}", ctx.store.dir().display());
    Ok(())
}

fn run_assign(ctx: &ProjectContext, annotators: &[String]) -> Result<()> {
    println!("🗂️  Planning Phase 1 batches...");
    let plan = ctx.assign(annotators).context("Phase 1 planning failed")?;

    println!("\n📋 Phase 1 Assignment:");
    println!("   Seed: {}", plan.manifest.seed);
    println!("   Batch size: {}", plan.manifest.batch_size);
    println!("   Pool size: {}", plan.manifest.pool_size);
    println!(
        "   Batches: {} new, {} kept",
        plan.added.len(),
        plan.kept.len()
    );
    for (name, ids) in &plan.manifest.batches {
        let marker = if plan.kept.contains(name) { "kept" } else { "new" };
        println!("     👤 {} ({} documents, {})", name, ids.len(), marker);
    }
    println!(
        "\n✅ Manifest saved to: {}",
        ctx.store.phase1_manifest_path().display()
    );
    Ok(())
}

fn run_reassign(ctx: &ProjectContext) -> Result<()> {
    println!("🔀 Selecting the Phase 2 re-annotation subset...");
    let manifest = ctx.reassign().context("Phase 2 planning failed")?;

    println!("\n📋 Phase 2 Assignment:");
    println!("   Shared documents: {}", manifest.subset.len());
    println!("   Annotators: {}", manifest.assignments.len());
    for name in manifest.assignments.keys() {
        let contributed = manifest.sources.values().filter(|o| *o == name).count();
        println!("     👤 {} ({} documents from their Phase 1 batch)", name, contributed);
    }
    println!(
        "\n✅ Manifest saved to: {}",
        ctx.store.phase2_manifest_path().display()
    );
    Ok(())
}

fn run_agreement(ctx: &ProjectContext, output: &OutputArgs) -> Result<()> {
    let report = ctx.agreement().context("Agreement calculation failed")?;

    let content = match output.format {
        OutputFormat::Json => report::generate_json(&report)?,
        OutputFormat::Markdown => {
            report::generate_agreement_markdown(&report, ctx.config.report.disagreement_limit)
        }
    };
    write_output(&content, output)?;

    if output.output.is_some() {
        println!("\n📊 Agreement Summary:");
        println!("   {}: {:.3} ({})", report.primary.kind, report.primary.value, report.band);
        for coefficient in &report.secondary {
            println!("   {}: {:.3}", coefficient.kind, coefficient.value);
        }
        println!(
            "   Documents used: {} of {}",
            report.metadata.documents_used, report.metadata.subset_size
        );
    }
    if !report.metadata.documents_excluded.is_empty() {
        warn!(
            "{} document(s) excluded for missing labels",
            report.metadata.documents_excluded.len()
        );
    }
    Ok(())
}

fn run_report(ctx: &ProjectContext, output: &OutputArgs) -> Result<()> {
    let report = ctx.progress().context("Failed to read annotation records")?;

    let content = match output.format {
        OutputFormat::Json => report::generate_json(&report)?,
        OutputFormat::Markdown => report::generate_progress_markdown(&report),
    };
    write_output(&content, output)
}

fn run_export(ctx: &ProjectContext, path: &Path) -> Result<()> {
    println!("📦 Exporting annotations...");
    let bundle = ctx.export().context("Export failed")?;

    let content = report::generate_json(&bundle)?;
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write export to {}", path.display()))?;

    println!(
        "\n✅ Exported {} documents from {} annotator(s) to: {}",
        bundle.documents.len(),
        bundle.annotators.len(),
        path.display()
    );
    Ok(())
}

/// Write a report to `--output` or stdout.
fn write_output(content: &str, output: &OutputArgs) -> Result<()> {
    match &output.output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("✅ Report saved to: {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
