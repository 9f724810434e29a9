//! Inter-annotator agreement over the Phase 2 shared subset.
//!
//! Missing data is handled by listwise exclusion: annotators without any
//! Phase 2 label on the subset are reported as non-participating, and a
//! document missing a label from any participating annotator is excluded
//! from every coefficient.

use super::coefficients::{cohens_kappa, fleiss_kappa, krippendorff_alpha};
use crate::error::{AnnotatorError, Result};
use crate::models::{
    AgreementBand, AgreementMetadata, AgreementReport, AnnotationRecord, AnnotatorName, Category,
    Coefficient, CoefficientKind, Disagreement, DocumentId, PairAgreement, Phase, Phase2Manifest,
};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const MISSING_DATA_POLICY: &str = "listwise exclusion: a shared document missing a label from any participating annotator is excluded from every coefficient";

/// Document x annotator matrix of Phase 2 labels on the shared subset.
#[derive(Debug, Clone)]
pub struct LabelMatrix {
    documents: Vec<DocumentId>,
    annotators: Vec<AnnotatorName>,
    /// `cells[doc][annotator]`
    cells: Vec<Vec<Option<Category>>>,
    original_labels: BTreeMap<DocumentId, String>,
}

impl LabelMatrix {
    /// Build the matrix for every annotator listed in the manifest.
    ///
    /// Labels outside the subset or from Phase 1 are ignored. An annotator
    /// with no entry in `records` contributes an empty column.
    pub fn build(
        manifest: &Phase2Manifest,
        records: &BTreeMap<AnnotatorName, AnnotationRecord>,
    ) -> Result<Self> {
        let documents = manifest.subset.clone();
        let annotators: Vec<AnnotatorName> = manifest.assignments.keys().cloned().collect();
        let mut cells = vec![vec![None; annotators.len()]; documents.len()];
        let mut original_labels = BTreeMap::new();

        for (col, name) in annotators.iter().enumerate() {
            let Some(record) = records.get(name) else {
                debug!("No record loaded for {}", name);
                continue;
            };

            for (row, &id) in documents.iter().enumerate() {
                let Some(annotation) = record.get(Phase::Reannotation, id) else {
                    continue;
                };
                cells[row][col] = Some(annotation.category(name.as_str())?);
                if !annotation.original_label.is_empty() {
                    original_labels
                        .entry(id)
                        .or_insert_with(|| annotation.original_label.clone());
                }
            }
        }

        Ok(Self {
            documents,
            annotators,
            cells,
            original_labels,
        })
    }

    /// Column indices of annotators with at least one label.
    fn participating(&self) -> Vec<usize> {
        (0..self.annotators.len())
            .filter(|&col| self.cells.iter().any(|row| row[col].is_some()))
            .collect()
    }
}

/// Compute the agreement report from the Phase 2 manifest and records.
pub fn calculate_agreement(
    manifest: &Phase2Manifest,
    records: &BTreeMap<AnnotatorName, AnnotationRecord>,
) -> Result<AgreementReport> {
    let matrix = LabelMatrix::build(manifest, records)?;
    let participating = matrix.participating();

    let non_participating: Vec<String> = (0..matrix.annotators.len())
        .filter(|col| !participating.contains(col))
        .map(|col| matrix.annotators[col].to_string())
        .collect();
    if !non_participating.is_empty() {
        warn!(
            "No Phase 2 labels on the shared subset from: {}",
            non_participating.join(", ")
        );
    }

    if participating.len() < 2 {
        return Err(AnnotatorError::InsufficientOverlap(format!(
            "{} annotator(s) labeled the shared subset in Phase 2, at least 2 are required",
            participating.len()
        )));
    }

    let mut used: Vec<(DocumentId, Vec<Category>)> = Vec::new();
    let mut excluded = Vec::new();
    for (row, &id) in matrix.documents.iter().enumerate() {
        let labels: Option<Vec<Category>> = participating
            .iter()
            .map(|&col| matrix.cells[row][col])
            .collect();
        match labels {
            Some(labels) => used.push((id, labels)),
            None => excluded.push(id),
        }
    }

    if !excluded.is_empty() {
        info!(
            "Excluding {} document(s) not labeled by every participating annotator",
            excluded.len()
        );
    }
    if used.is_empty() {
        return Err(AnnotatorError::InsufficientOverlap(
            "no shared document was labeled by every participating annotator".to_string(),
        ));
    }

    let names: Vec<String> = participating
        .iter()
        .map(|&col| matrix.annotators[col].to_string())
        .collect();
    let rows: Vec<Vec<Category>> = used.iter().map(|(_, labels)| labels.clone()).collect();
    let empty = || AnnotatorError::InsufficientOverlap("no pairable labels".to_string());

    let alpha_units: Vec<Vec<Option<Category>>> = rows
        .iter()
        .map(|labels| labels.iter().copied().map(Some).collect())
        .collect();
    let alpha = Coefficient {
        kind: CoefficientKind::KrippendorffsAlpha,
        value: krippendorff_alpha(&alpha_units).ok_or_else(empty)?,
    };

    let pair_stats = |a: usize, b: usize| {
        let pairs: Vec<(Category, Category)> = rows.iter().map(|r| (r[a], r[b])).collect();
        cohens_kappa(&pairs).ok_or_else(empty)
    };

    let (primary, secondary, pairs) = if names.len() == 2 {
        let stats = pair_stats(0, 1)?;
        let kappa = Coefficient {
            kind: CoefficientKind::CohensKappa,
            value: stats.kappa,
        };
        (kappa, vec![alpha], Vec::new())
    } else {
        let fleiss = Coefficient {
            kind: CoefficientKind::FleissKappa,
            value: fleiss_kappa(&rows).ok_or_else(empty)?,
        };

        let mut pairs = Vec::new();
        for a in 0..names.len() {
            for b in (a + 1)..names.len() {
                let stats = pair_stats(a, b)?;
                pairs.push(PairAgreement {
                    first: names[a].clone(),
                    second: names[b].clone(),
                    documents: rows.len(),
                    observed_agreement: stats.observed,
                    kappa: stats.kappa,
                    band: AgreementBand::from_score(stats.kappa),
                });
            }
        }
        (alpha, vec![fleiss], pairs)
    };

    let unanimous = rows
        .iter()
        .filter(|labels| labels.iter().all(|l| *l == labels[0]))
        .count();

    let disagreements = used
        .iter()
        .filter(|(_, labels)| labels.iter().any(|l| *l != labels[0]))
        .map(|(id, labels)| Disagreement {
            document_id: *id,
            original_label: matrix.original_labels.get(id).cloned(),
            labels: names
                .iter()
                .cloned()
                .zip(labels.iter().map(|c| c.name().to_string()))
                .collect(),
        })
        .collect();

    info!(
        "{} = {:.3} over {} document(s) and {} annotator(s)",
        primary.kind,
        primary.value,
        used.len(),
        names.len()
    );

    Ok(AgreementReport {
        metadata: AgreementMetadata {
            generated_at: Utc::now(),
            annotators: names,
            non_participating,
            subset_size: matrix.documents.len(),
            documents_used: used.len(),
            documents_excluded: excluded,
            missing_data_policy: MISSING_DATA_POLICY.to_string(),
        },
        band: AgreementBand::from_score(primary.value),
        primary,
        secondary,
        observed_agreement: unanimous as f64 / rows.len() as f64,
        pairs,
        disagreements,
    })
}
