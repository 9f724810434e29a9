//! Markdown and JSON report generation.
//!
//! This module renders agreement and progress reports as Markdown
//! documents, and any report payload as pretty JSON.

use crate::models::{
    AgreementBand, AgreementMetadata, AgreementReport, Disagreement, PairAgreement, ProgressReport,
};
use anyhow::Result;
use serde::Serialize;

/// Generate the agreement report as Markdown.
///
/// At most `disagreement_limit` disagreements are listed; 0 lists all.
pub fn generate_agreement_markdown(report: &AgreementReport, disagreement_limit: usize) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Inter-Annotator Agreement Report\n\n");

    output.push_str(&generate_agreement_metadata_section(&report.metadata));
    output.push_str(&generate_coefficients_section(report));

    if !report.pairs.is_empty() {
        output.push_str(&generate_pairs_section(&report.pairs));
    }

    output.push_str(&generate_interpretation_section(report.band));
    output.push_str(&generate_disagreements_section(
        &report.disagreements,
        disagreement_limit,
    ));

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_agreement_metadata_section(metadata: &AgreementMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Annotators:** {}\n",
        metadata.annotators.join(", ")
    ));
    if !metadata.non_participating.is_empty() {
        section.push_str(&format!(
            "- **Not participating:** {}\n",
            metadata.non_participating.join(", ")
        ));
    }
    section.push_str(&format!("- **Shared subset:** {} documents\n", metadata.subset_size));
    section.push_str(&format!(
        "- **Documents used:** {}\n",
        metadata.documents_used
    ));

    if !metadata.documents_excluded.is_empty() {
        let ids: Vec<String> = metadata
            .documents_excluded
            .iter()
            .map(|id| id.to_string())
            .collect();
        section.push_str(&format!(
            "- **Documents excluded:** {} ({})\n",
            ids.len(),
            ids.join(", ")
        ));
    }
    section.push_str(&format!(
        "- **Missing data:** {}\n",
        metadata.missing_data_policy
    ));
    section.push('\n');

    section
}

/// Generate the coefficient table.
fn generate_coefficients_section(report: &AgreementReport) -> String {
    let mut section = String::new();

    section.push_str("## Agreement\n\n");
    section.push_str("| Statistic | Value | Interpretation |\n");
    section.push_str("|:---|:---:|:---|\n");
    section.push_str(&format!(
        "| **{}** | **{:.3}** | **{}** |\n",
        report.primary.kind, report.primary.value, report.band
    ));
    for coefficient in &report.secondary {
        section.push_str(&format!(
            "| {} | {:.3} | {} |\n",
            coefficient.kind,
            coefficient.value,
            AgreementBand::from_score(coefficient.value)
        ));
    }
    section.push_str(&format!(
        "| Observed agreement | {:.1}% | |\n\n",
        report.observed_agreement * 100.0
    ));

    section
}

/// Generate the pairwise Cohen's kappa table.
fn generate_pairs_section(pairs: &[PairAgreement]) -> String {
    let mut section = String::new();

    section.push_str("## Pairwise Cohen's Kappa\n\n");
    section.push_str("| Annotators | Documents | Observed | Kappa | Interpretation |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---|\n");

    for pair in pairs {
        section.push_str(&format!(
            "| {} / {} | {} | {:.1}% | {:.3} | {} |\n",
            pair.first,
            pair.second,
            pair.documents,
            pair.observed_agreement * 100.0,
            pair.kappa,
            pair.band
        ));
    }
    section.push('\n');

    section
}

/// Generate the interpretation scale with the achieved band marked.
fn generate_interpretation_section(band: AgreementBand) -> String {
    let mut section = String::new();

    section.push_str("## Interpretation\n\n");
    section.push_str("| Range | Agreement |\n");
    section.push_str("|:---:|:---|\n");

    for (row, range) in AgreementBand::table() {
        if row == band {
            section.push_str(&format!("| **{}** | **{}** ◀ |\n", range, row));
        } else {
            section.push_str(&format!("| {} | {} |\n", range, row));
        }
    }
    section.push_str("\n*Landis & Koch (1977).*\n\n");

    section
}

/// Generate the disagreement listing.
fn generate_disagreements_section(disagreements: &[Disagreement], limit: usize) -> String {
    let mut section = String::new();

    section.push_str("## Disagreements\n\n");

    if disagreements.is_empty() {
        section.push_str("All annotators agreed on every shared document. 🎉\n\n");
        return section;
    }

    let shown = if limit == 0 {
        disagreements.len()
    } else {
        limit.min(disagreements.len())
    };

    section.push_str("| Document | Original label | Labels |\n");
    section.push_str("|:---:|:---|:---|\n");

    for disagreement in &disagreements[..shown] {
        let labels: Vec<String> = disagreement
            .labels
            .iter()
            .map(|(annotator, category)| format!("{}: `{}`", annotator, category))
            .collect();
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            disagreement.document_id,
            disagreement.original_label.as_deref().unwrap_or("-"),
            labels.join("<br>")
        ));
    }

    if shown < disagreements.len() {
        section.push_str(&format!(
            "\n*... and {} more.*\n",
            disagreements.len() - shown
        ));
    }
    section.push('\n');

    section
}

/// Generate the progress report as Markdown.
pub fn generate_progress_markdown(report: &ProgressReport) -> String {
    let mut output = String::new();

    output.push_str("# Annotation Progress Report\n\n");

    output.push_str(&format!(
        "- **Generated:** {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!(
        "- **Break threshold:** {} minutes\n\n",
        report.break_threshold_minutes
    ));

    // Per-annotator table
    output.push_str("## Annotators\n\n");
    if report.annotators.is_empty() {
        output.push_str("No annotation records found.\n\n");
    } else {
        output.push_str(
            "| Annotator | Phase 1 | Phase 2 | Intervals | Breaks | Avg. time | Working hours |\n",
        );
        output.push_str("|:---|:---:|:---:|:---:|:---:|:---:|:---:|\n");
        for progress in &report.annotators {
            output.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {:.2} |\n",
                progress.annotator,
                progress.phase1_annotations,
                progress.phase2_annotations,
                progress.valid_intervals,
                progress.breaks,
                format_seconds(progress.average_seconds),
                progress.total_hours
            ));
        }
        output.push('\n');
    }

    // Totals
    output.push_str("## Totals\n\n");
    output.push_str(&format!(
        "- **Annotations:** {}\n",
        report.total_annotations
    ));
    output.push_str(&format!(
        "- **Working intervals:** {}\n",
        report.total_intervals
    ));
    output.push_str(&format!("- **Breaks:** {}\n", report.total_breaks));
    output.push_str(&format!(
        "- **Average time per instance:** {}\n\n",
        format_seconds(report.overall_average_seconds)
    ));

    // Time distribution
    if let Some(p) = report.time_percentiles {
        output.push_str("## Time per Instance (minutes)\n\n");
        output.push_str("| Min | 25th | Median | 75th | 90th | Max |\n");
        output.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
        output.push_str(&format!(
            "| {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} |\n\n",
            p.min, p.p25, p.median, p.p75, p.p90, p.max
        ));
    }

    // Category distribution
    if !report.category_distribution.is_empty() {
        output.push_str("## Category Distribution\n\n");
        output.push_str("| Category | Count | Share |\n");
        output.push_str("|:---|:---:|:---:|\n");
        for entry in &report.category_distribution {
            output.push_str(&format!(
                "| {} | {} | {:.1}% |\n",
                entry.category, entry.count, entry.percentage
            ));
        }
        output.push('\n');
    }

    output.push_str(&generate_footer());

    output
}

/// `95.0` -> `1m 35s`
fn format_seconds(seconds: f64) -> String {
    let total = seconds.round() as u64;
    if total >= 60 {
        format!("{}m {}s", total / 60, total % 60)
    } else {
        format!("{}s", total)
    }
}

/// Generate the report footer.
fn generate_footer() -> String {
    format!(
        "---\n\n*Report generated by newsgroup-annotator v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Serialize any report payload as pretty JSON.
pub fn generate_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}
