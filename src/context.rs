//! Project context shared by every command.
//!
//! Bundles the effective configuration with the record store so commands
//! receive everything they need explicitly.

use crate::analysis::{calculate_agreement, export_bundle, progress_report};
use crate::config::Config;
use crate::corpus::{Corpus, CorpusLoader};
use crate::error::Result;
use crate::models::{
    AgreementReport, AnnotationRecord, AnnotatorName, DocumentId, ExportBundle, Phase,
    Phase1Manifest, Phase2Manifest, ProgressReport,
};
use crate::planner::{plan_phase1, plan_phase2, Phase1Plan};
use crate::store::RecordStore;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

pub struct ProjectContext {
    pub config: Config,
    pub store: RecordStore,
    show_progress: bool,
}

impl ProjectContext {
    pub fn new(config: Config, show_progress: bool) -> Self {
        let store = RecordStore::new(config.general.data_dir.clone());
        Self {
            config,
            store,
            show_progress,
        }
    }

    pub fn load_corpus(&self) -> Result<Corpus> {
        CorpusLoader::new(self.config.general.corpus.clone(), self.show_progress).load()
    }

    /// Plan Phase 1 batches for `annotators` and save the manifest.
    pub fn assign(&self, annotators: &[String]) -> Result<Phase1Plan> {
        let names = AnnotatorName::parse_list(annotators)?;
        for name in &names {
            // Fails when the record file belongs to someone else.
            self.store.load_record(name)?;
        }

        let corpus = self.load_corpus()?;
        let existing = self.store.load_phase1()?;

        let plan = plan_phase1(
            &corpus.ids(),
            &names,
            self.config.assignment.batch_size,
            self.config.assignment.seed,
            existing.as_ref(),
        )?;

        self.store.save_phase1(&plan.manifest)?;
        info!(
            "Saved Phase 1 manifest to {}",
            self.store.phase1_manifest_path().display()
        );
        Ok(plan)
    }

    /// Select the Phase 2 subset and save the manifest.
    pub fn reassign(&self) -> Result<Phase2Manifest> {
        let phase1 = self.store.require_phase1()?;

        let labeled = if self.config.assignment.labeled_only {
            Some(self.phase1_labels(&phase1)?)
        } else {
            None
        };

        if let Some(previous) = self.store.load_phase2()? {
            warn!(
                "Replacing existing Phase 2 manifest ({} documents)",
                previous.subset.len()
            );
        }

        let manifest = plan_phase2(
            &phase1,
            self.config.assignment.overlap_size,
            self.config.assignment.seed,
            labeled.as_ref(),
        )?;

        self.store.save_phase2(&manifest)?;
        info!(
            "Saved Phase 2 manifest to {}",
            self.store.phase2_manifest_path().display()
        );
        Ok(manifest)
    }

    /// Agreement over the Phase 2 subset.
    ///
    /// Every annotator in the manifest must have a record file.
    pub fn agreement(&self) -> Result<AgreementReport> {
        let manifest = self.store.require_phase2()?;

        let mut records = BTreeMap::new();
        for name in manifest.assignments.keys() {
            records.insert(name.clone(), self.store.require_record(name)?);
        }

        calculate_agreement(&manifest, &records)
    }

    pub fn progress(&self) -> Result<ProgressReport> {
        let records = self.all_records()?;
        Ok(progress_report(
            &records,
            self.config.report.break_threshold_minutes,
        ))
    }

    pub fn export(&self) -> Result<ExportBundle> {
        let corpus = self.load_corpus()?;
        let records = self.all_records()?;
        Ok(export_bundle(&corpus, &records))
    }

    /// Every record in the data directory, sorted by annotator.
    fn all_records(&self) -> Result<Vec<AnnotationRecord>> {
        self.store
            .record_annotators()?
            .iter()
            .map(|name| self.store.require_record(name))
            .collect()
    }

    /// Phase 1 labels per batch owner; annotators without a record have none.
    fn phase1_labels(
        &self,
        phase1: &Phase1Manifest,
    ) -> Result<BTreeMap<AnnotatorName, BTreeSet<DocumentId>>> {
        let mut labeled = BTreeMap::new();
        for name in phase1.batches.keys() {
            let ids = self
                .store
                .load_record(name)?
                .map(|record| record.labeled_ids(Phase::Initial))
                .unwrap_or_default();
            labeled.insert(name.clone(), ids);
        }
        Ok(labeled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnnotatorError;
    use crate::models::{AgreementBand, Annotation, Category, CoefficientKind, Document};
    use std::fs;
    use tempfile::TempDir;

    fn context(dir: &TempDir, documents: u32) -> ProjectContext {
        let corpus_path = dir.path().join("corpus.json");
        let docs: Vec<Document> = (0..documents)
            .map(|id| Document {
                id,
                text: format!("message {}", id),
                subject: format!("subject {}", id),
                original_label: "sci.crypt".to_string(),
                source: "train".to_string(),
            })
            .collect();
        fs::write(&corpus_path, serde_json::to_string(&docs).unwrap()).unwrap();

        let mut config = Config::default();
        config.general.corpus = corpus_path;
        config.general.data_dir = dir.path().join("annotations");
        ProjectContext::new(config, false)
    }

    fn label_all(ctx: &ProjectContext, annotator: &str, ids: &[DocumentId], phase: Phase, number: u8) {
        let corpus = ctx.load_corpus().unwrap();
        let name = AnnotatorName::parse(annotator).unwrap();
        let mut record = ctx.store.load_or_create_record(&name).unwrap();
        for id in ids {
            record.record(Annotation::new(
                corpus.get(*id).unwrap(),
                Category::from_number(number).unwrap(),
                phase,
            ));
        }
        ctx.store.save_record(&mut record).unwrap();
    }

    #[test]
    fn test_workflow_end_to_end() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 200);

        let plan = ctx
            .assign(&["Alice".to_string(), "bob".to_string()])
            .unwrap();
        assert_eq!(plan.added.len(), 2);
        assert!(ctx.store.phase1_manifest_path().exists());

        let phase2 = ctx.reassign().unwrap();
        assert_eq!(phase2.subset.len(), 15);

        for annotator in ["alice", "bob"] {
            label_all(&ctx, annotator, &phase2.subset, Phase::Reannotation, 10);
        }

        let report = ctx.agreement().unwrap();
        assert_eq!(report.primary.kind, CoefficientKind::CohensKappa);
        assert!((report.primary.value - 1.0).abs() < 1e-9);
        assert_eq!(report.band, AgreementBand::AlmostPerfect);

        let progress = ctx.progress().unwrap();
        assert_eq!(progress.total_annotations, 30);
        assert_eq!(progress.annotators.len(), 2);

        let bundle = ctx.export().unwrap();
        assert_eq!(bundle.documents.len(), 15);
        assert!(bundle.documents.iter().all(|d| d.labels.len() == 2));
    }

    #[test]
    fn test_assign_is_stable_when_adding_annotators() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, 300);

        let first = ctx
            .assign(&["alice".to_string(), "bob".to_string()])
            .unwrap();
        ctx.config.assignment.seed = 7;
        let second = ctx
            .assign(&["alice".to_string(), "bob".to_string(), "carol".to_string()])
            .unwrap();

        for (name, ids) in &first.manifest.batches {
            assert_eq!(&second.manifest.batches[name], ids);
        }
        assert_eq!(second.manifest.seed, 42);
        assert_eq!(second.manifest.batches.len(), 3);
    }

    #[test]
    fn test_assign_rejects_pool_too_small() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 150);
        let result = ctx.assign(&["alice".to_string(), "bob".to_string()]);
        assert!(matches!(
            result,
            Err(AnnotatorError::InsufficientDocuments { .. })
        ));
        assert!(!ctx.store.phase1_manifest_path().exists());
    }

    #[test]
    fn test_assign_rejects_foreign_record() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 200);

        label_all(&ctx, "bob", &[0], Phase::Initial, 2);
        let alice = AnnotatorName::parse("alice").unwrap();
        fs::copy(
            ctx.store.record_path(&AnnotatorName::parse("bob").unwrap()),
            ctx.store.record_path(&alice),
        )
        .unwrap();

        let result = ctx.assign(&["alice".to_string()]);
        assert!(matches!(result, Err(AnnotatorError::AmbiguousName { .. })));
        assert!(!ctx.store.phase1_manifest_path().exists());
    }

    #[test]
    fn test_reassign_labeled_only() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, 20);
        ctx.config.assignment.batch_size = 10;

        let plan = ctx
            .assign(&["alice".to_string(), "bob".to_string()])
            .unwrap();
        let alice = AnnotatorName::parse("alice").unwrap();
        let done: Vec<DocumentId> = plan.manifest.batches[&alice][..3].to_vec();
        label_all(&ctx, "alice", &done, Phase::Initial, 1);

        ctx.config.assignment.labeled_only = true;
        let phase2 = ctx.reassign().unwrap();
        let mut subset = phase2.subset.clone();
        subset.sort_unstable();
        let mut expected = done.clone();
        expected.sort_unstable();
        assert_eq!(subset, expected);
    }

    #[test]
    fn test_agreement_requires_every_record() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 200);
        ctx.assign(&["alice".to_string(), "bob".to_string()])
            .unwrap();
        let phase2 = ctx.reassign().unwrap();
        label_all(&ctx, "alice", &phase2.subset, Phase::Reannotation, 3);

        assert!(matches!(
            ctx.agreement(),
            Err(AnnotatorError::MissingRecord(_))
        ));
    }

    #[test]
    fn test_reassign_without_phase1() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, 10);
        assert!(matches!(
            ctx.reassign(),
            Err(AnnotatorError::MissingManifest { .. })
        ));
    }
}
