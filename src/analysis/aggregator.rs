//! Progress statistics and the consolidated export.
//!
//! This module aggregates annotation records across annotators: timing
//! intervals, category distribution and the per-document export bundle.

use crate::corpus::Corpus;
use crate::models::{
    AnnotationRecord, AnnotatorProgress, CategoryCount, DocumentId, ExportBundle, ExportDocument,
    ExportLabel, Phase, ProgressReport, TimePercentiles,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Gaps between consecutive annotations, in seconds, in timestamp order.
pub fn annotation_gaps(record: &AnnotationRecord) -> Vec<f64> {
    let mut stamps: Vec<_> = record.annotations.iter().map(|a| a.timestamp).collect();
    stamps.sort();

    stamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_milliseconds() as f64 / 1000.0)
        .collect()
}

/// Value at percentile `p` using `sorted[min(floor(len * p / 100), len - 1)]`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((sorted.len() as f64 * p / 100.0).floor() as usize).min(sorted.len() - 1);
    Some(sorted[idx])
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Compute the progress report for a set of records.
///
/// Gaps at or below `break_threshold_minutes` count as working time;
/// longer gaps count as breaks.
pub fn progress_report(records: &[AnnotationRecord], break_threshold_minutes: f64) -> ProgressReport {
    let threshold_seconds = break_threshold_minutes * 60.0;
    let mut annotators = Vec::with_capacity(records.len());
    let mut all_valid: Vec<f64> = Vec::new();
    let mut total_breaks = 0;
    let mut categories: HashMap<String, usize> = HashMap::new();

    for record in records {
        let gaps = annotation_gaps(record);
        let (valid, breaks): (Vec<f64>, Vec<f64>) =
            gaps.into_iter().partition(|&g| g <= threshold_seconds);

        debug!(
            "{}: {} working interval(s), {} break(s)",
            record.annotator,
            valid.len(),
            breaks.len()
        );

        for annotation in &record.annotations {
            *categories.entry(annotation.category_name.clone()).or_default() += 1;
        }

        annotators.push(AnnotatorProgress {
            annotator: record.annotator.clone(),
            phase1_annotations: record.count(Phase::Initial),
            phase2_annotations: record.count(Phase::Reannotation),
            valid_intervals: valid.len(),
            breaks: breaks.len(),
            average_seconds: mean(&valid),
            total_hours: valid.iter().sum::<f64>() / 3600.0,
        });

        total_breaks += breaks.len();
        all_valid.extend(valid);
    }

    let total_annotations: usize = records.iter().map(|r| r.annotations.len()).sum();

    let mut category_distribution: Vec<CategoryCount> = categories
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category,
            count,
            percentage: count as f64 / total_annotations as f64 * 100.0,
        })
        .collect();
    category_distribution.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.category.cmp(&b.category))
    });

    let overall_average_seconds = mean(&all_valid);

    let mut minutes: Vec<f64> = all_valid.iter().map(|s| s / 60.0).collect();
    minutes.sort_by(|a, b| a.total_cmp(b));
    let time_percentiles = match (minutes.first(), minutes.last()) {
        (Some(&min), Some(&max)) => Some(TimePercentiles {
            min,
            p25: percentile(&minutes, 25.0).unwrap_or(min),
            median: percentile(&minutes, 50.0).unwrap_or(min),
            p75: percentile(&minutes, 75.0).unwrap_or(max),
            p90: percentile(&minutes, 90.0).unwrap_or(max),
            max,
        }),
        _ => None,
    };

    ProgressReport {
        generated_at: Utc::now(),
        break_threshold_minutes,
        annotators,
        total_annotations,
        total_intervals: all_valid.len(),
        total_breaks,
        overall_average_seconds,
        category_distribution,
        time_percentiles,
    }
}

/// Collect every labeled document with all of its labels.
///
/// Documents missing from the corpus are still exported, with empty text.
pub fn export_bundle(corpus: &Corpus, records: &[AnnotationRecord]) -> ExportBundle {
    let mut documents: BTreeMap<DocumentId, ExportDocument> = BTreeMap::new();

    for record in records {
        for annotation in &record.annotations {
            let entry = documents.entry(annotation.document_id).or_insert_with(|| {
                match corpus.get(annotation.document_id) {
                    Some(doc) => ExportDocument {
                        document_id: doc.id,
                        subject: doc.subject.clone(),
                        text: doc.text.clone(),
                        original_label: doc.original_label.clone(),
                        labels: Vec::new(),
                    },
                    None => {
                        warn!(
                            "Document {} labeled by {} is not in the corpus",
                            annotation.document_id, record.annotator
                        );
                        ExportDocument {
                            document_id: annotation.document_id,
                            subject: String::new(),
                            text: String::new(),
                            original_label: annotation.original_label.clone(),
                            labels: Vec::new(),
                        }
                    }
                }
            });

            entry.labels.push(ExportLabel {
                annotator: record.annotator.clone(),
                phase: annotation.phase,
                category: annotation.category_name.clone(),
            });
        }
    }

    for doc in documents.values_mut() {
        doc.labels
            .sort_by(|a, b| a.annotator.cmp(&b.annotator).then_with(|| a.phase.cmp(&b.phase)));
    }

    ExportBundle {
        generated_at: Utc::now(),
        annotators: records.iter().map(|r| r.annotator.clone()).collect(),
        documents: documents.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Annotation, AnnotatorName, Category, Document};
    use chrono::{Duration, TimeZone};

    fn document(id: DocumentId) -> Document {
        Document {
            id,
            text: format!("text {}", id),
            subject: format!("subject {}", id),
            original_label: "rec.autos".to_string(),
            source: "train".to_string(),
        }
    }

    /// Record whose annotations are spaced by the given gaps in seconds.
    fn timed_record(annotator: &str, gaps: &[i64], category: u8) -> AnnotationRecord {
        let mut record = AnnotationRecord::new(&AnnotatorName::parse(annotator).unwrap());
        let mut at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut offsets = vec![0];
        offsets.extend_from_slice(gaps);

        for (id, offset) in offsets.into_iter().enumerate() {
            at += Duration::seconds(offset);
            let mut annotation = Annotation::new(
                &document(id as DocumentId),
                Category::from_number(category).unwrap(),
                Phase::Initial,
            );
            annotation.timestamp = at;
            record.annotations.push(annotation);
        }
        record
    }

    #[test]
    fn test_percentile_index_rule() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        assert_eq!(percentile(&values, 90.0), Some(4.0));
        assert_eq!(percentile(&values, 100.0), Some(4.0));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_breaks_are_split_from_working_time() {
        // 30s, 90s, then a 20 minute break
        let record = timed_record("alice", &[30, 90, 1200], 6);
        let report = progress_report(&[record], 10.0);

        let alice = &report.annotators[0];
        assert_eq!(alice.phase1_annotations, 4);
        assert_eq!(alice.valid_intervals, 2);
        assert_eq!(alice.breaks, 1);
        assert!((alice.average_seconds - 60.0).abs() < 1e-9);
        assert!((alice.total_hours - 120.0 / 3600.0).abs() < 1e-9);

        let percentiles = report.time_percentiles.unwrap();
        assert!((percentiles.min - 0.5).abs() < 1e-9);
        assert!((percentiles.max - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_category_distribution() {
        let a = timed_record("alice", &[10, 10], 6);
        let b = timed_record("bob", &[10], 13);
        let report = progress_report(&[a, b], 10.0);

        assert_eq!(report.total_annotations, 5);
        assert_eq!(report.total_intervals, 3);
        assert_eq!(report.category_distribution[0].category, "rec.autos");
        assert_eq!(report.category_distribution[0].count, 3);
        assert!((report.category_distribution[0].percentage - 60.0).abs() < 1e-9);
        assert_eq!(report.category_distribution[1].category, "sci.space");
    }

    #[test]
    fn test_empty_records() {
        let record = AnnotationRecord::new(&AnnotatorName::parse("alice").unwrap());
        let report = progress_report(&[record], 10.0);
        assert_eq!(report.total_annotations, 0);
        assert!(report.time_percentiles.is_none());
        assert!(report.category_distribution.is_empty());
    }

    #[test]
    fn test_export_bundle_groups_labels_by_document() {
        let corpus = Corpus::from_documents(vec![document(0), document(1)]).unwrap();
        let mut alice = timed_record("alice", &[5], 6);
        alice.record(Annotation::new(
            &document(0),
            Category::from_number(7).unwrap(),
            Phase::Reannotation,
        ));
        let bob = timed_record("bob", &[], 6);

        let bundle = export_bundle(&corpus, &[alice, bob]);
        assert_eq!(bundle.annotators, vec!["alice", "bob"]);
        assert_eq!(bundle.documents.len(), 2);

        let first = &bundle.documents[0];
        assert_eq!(first.subject, "subject 0");
        assert_eq!(first.labels.len(), 3);
        assert_eq!(first.labels[0].annotator, "alice");
        assert_eq!(first.labels[0].phase, Phase::Initial);
        assert_eq!(first.labels[1].category, "rec.motorcycles");
        assert_eq!(first.labels[2].annotator, "bob");
    }

    #[test]
    fn test_export_keeps_documents_missing_from_corpus() {
        let corpus = Corpus::from_documents(vec![]).unwrap();
        let record = timed_record("alice", &[], 1);
        let bundle = export_bundle(&corpus, &[record]);
        assert_eq!(bundle.documents[0].original_label, "rec.autos");
        assert!(bundle.documents[0].text.is_empty());
    }
}
