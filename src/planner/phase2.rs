//! Phase 2 planning: the shared re-annotation subset.
//!
//! Phase 1 batches are disjoint, so overlap is created after the fact:
//! documents are drawn round-robin from every annotator's Phase 1 batch and
//! the resulting subset is assigned to every annotator for independent
//! re-labeling.

use crate::error::{AnnotatorError, Result};
use crate::models::{AnnotatorName, DocumentId, Phase1Manifest, Phase2Manifest};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Select up to `overlap_size` shared documents from the Phase 1 union.
///
/// With `labeled`, only documents the Phase 1 owner has already labeled are
/// eligible.
pub fn plan_phase2(
    phase1: &Phase1Manifest,
    overlap_size: usize,
    seed: u64,
    labeled: Option<&BTreeMap<AnnotatorName, BTreeSet<DocumentId>>>,
) -> Result<Phase2Manifest> {
    let annotators: Vec<&AnnotatorName> = phase1.batches.keys().collect();
    if annotators.len() < 2 {
        return Err(AnnotatorError::TooFewAnnotators {
            required: 2,
            got: annotators.len(),
        });
    }
    if overlap_size == 0 {
        return Err(AnnotatorError::Configuration(
            "overlap size must be at least 1".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let candidates: Vec<Vec<DocumentId>> = phase1
        .batches
        .iter()
        .map(|(name, batch)| {
            let mut eligible: Vec<DocumentId> = match labeled {
                Some(labeled) => {
                    let done = labeled.get(name);
                    batch
                        .iter()
                        .copied()
                        .filter(|id| done.is_some_and(|d| d.contains(id)))
                        .collect()
                }
                None => batch.clone(),
            };
            eligible.sort_unstable();
            eligible.shuffle(&mut rng);
            eligible
        })
        .collect();

    let mut subset = Vec::with_capacity(overlap_size);
    let mut sources = BTreeMap::new();
    let mut round = 0;

    while subset.len() < overlap_size && candidates.iter().any(|c| round < c.len()) {
        for (owner, pool) in annotators.iter().zip(candidates.iter()) {
            if subset.len() == overlap_size {
                break;
            }
            if let Some(&id) = pool.get(round) {
                subset.push(id);
                sources.insert(id, (*owner).clone());
            }
        }
        round += 1;
    }

    if subset.is_empty() {
        return Err(AnnotatorError::Configuration(
            "no Phase 1 documents are eligible for re-annotation".to_string(),
        ));
    }
    if subset.len() < overlap_size {
        warn!(
            "Only {} of the requested {} documents are available for Phase 2",
            subset.len(),
            overlap_size
        );
    }

    let assignments = phase1
        .batches
        .keys()
        .map(|name| (name.clone(), subset.clone()))
        .collect();

    info!(
        "Phase 2 plan: {} shared documents from {} Phase 1 documents for {} annotators",
        subset.len(),
        phase1.union().len(),
        annotators.len()
    );

    Ok(Phase2Manifest {
        seed,
        overlap_size,
        created_at: Utc::now(),
        subset,
        sources,
        assignments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::phase1::plan_phase1;

    fn names(raw: &[&str]) -> Vec<AnnotatorName> {
        raw.iter().map(|r| AnnotatorName::parse(r).unwrap()).collect()
    }

    fn phase1(annotators: &[&str], pool: u32, batch: usize) -> Phase1Manifest {
        let pool: Vec<DocumentId> = (0..pool).collect();
        plan_phase1(&pool, &names(annotators), batch, 42, None)
            .unwrap()
            .manifest
    }

    #[test]
    fn test_subset_within_union_and_sized() {
        let manifest = phase1(&["alice", "bob"], 200, 100);
        let plan = plan_phase2(&manifest, 15, 42, None).unwrap();

        assert_eq!(plan.subset.len(), 15);
        let union = manifest.union();
        assert!(plan.subset.iter().all(|id| union.contains(id)));

        let unique: BTreeSet<_> = plan.subset.iter().collect();
        assert_eq!(unique.len(), 15);
    }

    #[test]
    fn test_every_annotator_gets_whole_subset() {
        let manifest = phase1(&["alice", "bob", "carol"], 300, 100);
        let plan = plan_phase2(&manifest, 15, 42, None).unwrap();

        assert_eq!(plan.assignments.len(), 3);
        for ids in plan.assignments.values() {
            assert_eq!(ids, &plan.subset);
        }
    }

    #[test]
    fn test_round_robin_draws_from_every_batch() {
        let manifest = phase1(&["alice", "bob", "carol"], 300, 100);
        let plan = plan_phase2(&manifest, 15, 42, None).unwrap();

        for name in manifest.batches.keys() {
            let from_owner = plan.sources.values().filter(|owner| *owner == name).count();
            assert_eq!(from_owner, 5);
        }
        for (id, owner) in &plan.sources {
            assert!(manifest.batches[owner].contains(id));
        }
    }

    #[test]
    fn test_deterministic() {
        let manifest = phase1(&["alice", "bob"], 200, 100);
        let a = plan_phase2(&manifest, 15, 42, None).unwrap();
        let b = plan_phase2(&manifest, 15, 42, None).unwrap();
        assert_eq!(a.subset, b.subset);
        assert_eq!(a.assignments, b.assignments);
    }

    #[test]
    fn test_bounded_by_union() {
        let manifest = phase1(&["alice", "bob"], 10, 3);
        let plan = plan_phase2(&manifest, 15, 42, None).unwrap();
        assert_eq!(plan.subset.len(), 6);
    }

    #[test]
    fn test_labeled_only() {
        let manifest = phase1(&["alice", "bob"], 200, 100);
        let alice = names(&["alice"]).remove(0);
        let done: BTreeSet<DocumentId> =
            manifest.batches[&alice].iter().take(4).copied().collect();
        let labeled = BTreeMap::from([(alice.clone(), done.clone())]);

        let plan = plan_phase2(&manifest, 15, 42, Some(&labeled)).unwrap();
        assert_eq!(plan.subset.len(), 4);
        assert!(plan.subset.iter().all(|id| done.contains(id)));
    }

    #[test]
    fn test_requires_two_annotators() {
        let manifest = phase1(&["alice"], 100, 50);
        assert!(matches!(
            plan_phase2(&manifest, 15, 42, None),
            Err(AnnotatorError::TooFewAnnotators { required: 2, .. })
        ));
    }

    #[test]
    fn test_nothing_eligible() {
        let manifest = phase1(&["alice", "bob"], 100, 50);
        let labeled = BTreeMap::new();
        assert!(matches!(
            plan_phase2(&manifest, 15, 42, Some(&labeled)),
            Err(AnnotatorError::Configuration(_))
        ));
    }
}
