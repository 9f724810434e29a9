//! Data models for the annotation workflow.
//!
//! This module contains the core data structures shared by the planner,
//! the session, the agreement calculator and the reports: documents, the
//! guideline label set, annotation records, assignment manifests and
//! report payloads.

use crate::error::{AnnotatorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Stable identifier of a corpus document.
pub type DocumentId = u32;

/// Guideline category names, numbered 1..=20 in this order.
pub const CATEGORY_NAMES: [&str; 20] = [
    "comp.graphics",
    "comp.os.ms-windows.misc",
    "comp.sys.ibm.pc.hardware",
    "comp.sys.mac.hardware",
    "comp.windows.x",
    "rec.autos",
    "rec.motorcycles",
    "rec.sport.baseball",
    "rec.sport.hockey",
    "sci.crypt",
    "sci.electronics",
    "sci.med",
    "sci.space",
    "misc.forsale",
    "talk.politics.guns",
    "talk.politics.mideast",
    "talk.politics.misc",
    "talk.religion.misc",
    "alt.atheism",
    "soc.religion.christian",
];

/// A corpus document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable document id.
    pub id: DocumentId,
    /// Body text with headers removed.
    pub text: String,
    /// Subject line, or "(No Subject)".
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Ground-truth newsgroup, never shown while annotating.
    pub original_label: String,
    /// Corpus split the document came from (train, test, ...).
    #[serde(default)]
    pub source: String,
}

fn default_subject() -> String {
    "(No Subject)".to_string()
}

/// One of the 20 guideline categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Category(u8);

impl Category {
    /// Look up a category by its guideline number (1..=20).
    pub fn from_number(number: u8) -> Option<Self> {
        (1..=CATEGORY_NAMES.len() as u8)
            .contains(&number)
            .then_some(Self(number))
    }

    /// All guideline categories in order.
    pub fn all() -> impl Iterator<Item = Category> {
        (1..=CATEGORY_NAMES.len() as u8).map(Category)
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn name(&self) -> &'static str {
        CATEGORY_NAMES[usize::from(self.0) - 1]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Annotation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Phase {
    /// Phase 1: disjoint initial annotation.
    Initial,
    /// Phase 2: overlapping re-annotation of the shared subset.
    Reannotation,
}

impl Phase {
    pub fn number(&self) -> u8 {
        match self {
            Phase::Initial => 1,
            Phase::Reannotation => 2,
        }
    }
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> Self {
        phase.number()
    }
}

impl TryFrom<u8> for Phase {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Phase::Initial),
            2 => Ok(Phase::Reannotation),
            other => Err(format!("unknown phase {}", other)),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Initial => write!(f, "Phase 1 (initial annotation)"),
            Phase::Reannotation => write!(f, "Phase 2 (re-annotation)"),
        }
    }
}

/// Normalized annotator name, safe to embed in a file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotatorName(String);

impl AnnotatorName {
    /// Normalize (trim, lowercase) and validate a human-entered name.
    pub fn parse(raw: &str) -> Result<Self> {
        let name = raw.trim().to_lowercase();
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if name.is_empty() || !valid_chars || name.ends_with("_backup") {
            return Err(AnnotatorError::InvalidName(raw.trim().to_string()));
        }

        Ok(Self(name))
    }

    /// Parse a list of names, rejecting duplicates after normalization.
    pub fn parse_list(raw: &[String]) -> Result<Vec<Self>> {
        let mut seen = BTreeSet::new();
        let mut names = Vec::with_capacity(raw.len());

        for entry in raw {
            let name = Self::parse(entry)?;
            if !seen.insert(name.clone()) {
                return Err(AnnotatorError::AmbiguousName {
                    name: entry.trim().to_string(),
                    reason: format!("collides with another annotator named '{}'", name),
                });
            }
            names.push(name);
        }

        Ok(names)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnnotatorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single label given by one annotator to one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub document_id: DocumentId,
    /// Guideline number (1..=20).
    pub category_number: u8,
    /// Guideline name matching `category_number`.
    pub category_name: String,
    pub phase: Phase,
    /// Ground-truth label, kept for later comparison.
    #[serde(default)]
    pub original_label: String,
    pub timestamp: DateTime<Utc>,
}

impl Annotation {
    /// Create an annotation for `document` labeled with `category`.
    pub fn new(document: &Document, category: Category, phase: Phase) -> Self {
        Self {
            document_id: document.id,
            category_number: category.number(),
            category_name: category.name().to_string(),
            phase,
            original_label: document.original_label.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Resolve the label against the guideline set.
    ///
    /// Fails when the number is out of range or the stored name does not
    /// match the guideline name for that number.
    pub fn category(&self, annotator: &str) -> Result<Category> {
        let mismatch = |details: String| AnnotatorError::VocabularyMismatch {
            annotator: annotator.to_string(),
            document_id: self.document_id,
            details,
        };

        let category = Category::from_number(self.category_number).ok_or_else(|| {
            mismatch(format!(
                "category number {} is not in the guideline set (1-20)",
                self.category_number
            ))
        })?;

        if !self.category_name.is_empty() && self.category_name != category.name() {
            return Err(mismatch(format!(
                "category {} is '{}' in the guidelines but '{}' in the record",
                self.category_number,
                category.name(),
                self.category_name
            )));
        }

        Ok(category)
    }
}

/// All labels produced by one annotator, across both phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub annotator: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl AnnotationRecord {
    /// Create an empty record.
    pub fn new(annotator: &AnnotatorName) -> Self {
        Self {
            annotator: annotator.to_string(),
            created_at: Utc::now(),
            last_updated: None,
            annotations: Vec::new(),
        }
    }

    /// The annotation for `document_id` in `phase`, if any.
    pub fn get(&self, phase: Phase, document_id: DocumentId) -> Option<&Annotation> {
        self.annotations
            .iter()
            .find(|a| a.phase == phase && a.document_id == document_id)
    }

    /// Ids labeled in `phase`.
    pub fn labeled_ids(&self, phase: Phase) -> BTreeSet<DocumentId> {
        self.annotations
            .iter()
            .filter(|a| a.phase == phase)
            .map(|a| a.document_id)
            .collect()
    }

    /// Number of annotations in `phase`.
    pub fn count(&self, phase: Phase) -> usize {
        self.annotations.iter().filter(|a| a.phase == phase).count()
    }

    /// Add an annotation, replacing a previous one for the same phase and document.
    pub fn record(&mut self, annotation: Annotation) {
        self.annotations
            .retain(|a| !(a.phase == annotation.phase && a.document_id == annotation.document_id));
        self.annotations.push(annotation);
    }
}

/// Phase 1 plan: disjoint batches per annotator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase1Manifest {
    pub seed: u64,
    pub batch_size: usize,
    pub pool_size: usize,
    pub created_at: DateTime<Utc>,
    pub batches: BTreeMap<AnnotatorName, Vec<DocumentId>>,
}

impl Phase1Manifest {
    /// Every document assigned to some annotator.
    pub fn union(&self) -> BTreeSet<DocumentId> {
        self.batches.values().flatten().copied().collect()
    }
}

/// Phase 2 plan: the shared subset every annotator labels again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase2Manifest {
    pub seed: u64,
    pub overlap_size: usize,
    pub created_at: DateTime<Utc>,
    /// Shared subset in selection order.
    pub subset: Vec<DocumentId>,
    /// Phase 1 owner of each subset document.
    pub sources: BTreeMap<DocumentId, AnnotatorName>,
    pub assignments: BTreeMap<AnnotatorName, Vec<DocumentId>>,
}

/// Qualitative interpretation band (Landis & Koch, 1977).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementBand {
    Poor,
    Slight,
    Fair,
    Moderate,
    Substantial,
    AlmostPerfect,
}

impl AgreementBand {
    /// Band for a coefficient value.
    pub fn from_score(score: f64) -> Self {
        if score < 0.0 {
            AgreementBand::Poor
        } else if score < 0.20 {
            AgreementBand::Slight
        } else if score < 0.40 {
            AgreementBand::Fair
        } else if score < 0.60 {
            AgreementBand::Moderate
        } else if score < 0.80 {
            AgreementBand::Substantial
        } else {
            AgreementBand::AlmostPerfect
        }
    }

    /// Bands with their printed ranges, lowest first.
    pub fn table() -> [(AgreementBand, &'static str); 6] {
        [
            (AgreementBand::Poor, "< 0.00"),
            (AgreementBand::Slight, "0.00-0.20"),
            (AgreementBand::Fair, "0.21-0.40"),
            (AgreementBand::Moderate, "0.41-0.60"),
            (AgreementBand::Substantial, "0.61-0.80"),
            (AgreementBand::AlmostPerfect, "0.81-1.00"),
        ]
    }
}

impl fmt::Display for AgreementBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgreementBand::Poor => write!(f, "Poor"),
            AgreementBand::Slight => write!(f, "Slight"),
            AgreementBand::Fair => write!(f, "Fair"),
            AgreementBand::Moderate => write!(f, "Moderate"),
            AgreementBand::Substantial => write!(f, "Substantial"),
            AgreementBand::AlmostPerfect => write!(f, "Almost perfect"),
        }
    }
}

/// Agreement coefficient kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoefficientKind {
    CohensKappa,
    FleissKappa,
    KrippendorffsAlpha,
}

impl fmt::Display for CoefficientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoefficientKind::CohensKappa => write!(f, "Cohen's Kappa"),
            CoefficientKind::FleissKappa => write!(f, "Fleiss' Kappa"),
            CoefficientKind::KrippendorffsAlpha => write!(f, "Krippendorff's Alpha"),
        }
    }
}

/// A computed coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub kind: CoefficientKind,
    pub value: f64,
}

/// Cohen's kappa for one pair of annotators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairAgreement {
    pub first: String,
    pub second: String,
    pub documents: usize,
    pub observed_agreement: f64,
    pub kappa: f64,
    pub band: AgreementBand,
}

/// A shared document the annotators labeled differently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disagreement {
    pub document_id: DocumentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_label: Option<String>,
    /// Annotator -> assigned category name.
    pub labels: BTreeMap<String, String>,
}

/// Metadata about an agreement computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementMetadata {
    pub generated_at: DateTime<Utc>,
    /// Annotators that contributed Phase 2 labels.
    pub annotators: Vec<String>,
    /// Assigned annotators without any Phase 2 label on the subset.
    pub non_participating: Vec<String>,
    pub subset_size: usize,
    pub documents_used: usize,
    /// Documents dropped because a participating annotator left them unlabeled.
    pub documents_excluded: Vec<DocumentId>,
    pub missing_data_policy: String,
}

/// The complete agreement report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementReport {
    pub metadata: AgreementMetadata,
    pub primary: Coefficient,
    pub band: AgreementBand,
    pub secondary: Vec<Coefficient>,
    /// Fraction of used documents on which all annotators agree.
    pub observed_agreement: f64,
    pub pairs: Vec<PairAgreement>,
    pub disagreements: Vec<Disagreement>,
}

/// Work statistics for one annotator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotatorProgress {
    pub annotator: String,
    pub phase1_annotations: usize,
    pub phase2_annotations: usize,
    /// Consecutive intervals at or below the break threshold.
    pub valid_intervals: usize,
    /// Gaps longer than the break threshold.
    pub breaks: usize,
    pub average_seconds: f64,
    pub total_hours: f64,
}

/// Count of one category across all records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
    pub percentage: f64,
}

/// Distribution of per-instance times, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePercentiles {
    pub min: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub p90: f64,
    pub max: f64,
}

/// Annotation progress and timing report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub generated_at: DateTime<Utc>,
    pub break_threshold_minutes: f64,
    pub annotators: Vec<AnnotatorProgress>,
    pub total_annotations: usize,
    pub total_intervals: usize,
    pub total_breaks: usize,
    pub overall_average_seconds: f64,
    pub category_distribution: Vec<CategoryCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_percentiles: Option<TimePercentiles>,
}

/// One annotator's label in the export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportLabel {
    pub annotator: String,
    pub phase: Phase,
    pub category: String,
}

/// A labeled document in the export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub document_id: DocumentId,
    pub subject: String,
    pub text: String,
    pub original_label: String,
    pub labels: Vec<ExportLabel>,
}

/// Consolidated export of every labeled document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    pub generated_at: DateTime<Utc>,
    pub annotators: Vec<String>,
    pub documents: Vec<ExportDocument>,
}
