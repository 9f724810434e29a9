//! Phase 1 planning: disjoint, reproducible batches.

use crate::error::{AnnotatorError, Result};
use crate::models::{AnnotatorName, DocumentId, Phase1Manifest};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// Result of a Phase 1 planning run.
#[derive(Debug, Clone)]
pub struct Phase1Plan {
    pub manifest: Phase1Manifest,
    /// Annotators that received a new batch in this run.
    pub added: Vec<AnnotatorName>,
    /// Annotators whose existing batch was kept as-is.
    pub kept: Vec<AnnotatorName>,
}

/// Seeded permutation of the pool (sorted and deduplicated first).
pub fn shuffled_pool(pool: &[DocumentId], seed: u64) -> Vec<DocumentId> {
    let mut order: Vec<DocumentId> = pool
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    order
}

/// Partition `pool` into disjoint batches of exactly `batch_size` documents.
///
/// When `existing` is given, annotators already in it keep their batches and
/// its seed and batch size are reused; only newly named annotators draw from
/// the documents no batch uses yet.
pub fn plan_phase1(
    pool: &[DocumentId],
    annotators: &[AnnotatorName],
    batch_size: usize,
    seed: u64,
    existing: Option<&Phase1Manifest>,
) -> Result<Phase1Plan> {
    if annotators.is_empty() {
        return Err(AnnotatorError::TooFewAnnotators {
            required: 1,
            got: 0,
        });
    }
    if batch_size == 0 {
        return Err(AnnotatorError::Configuration(
            "batch size must be at least 1".to_string(),
        ));
    }

    let (seed, batch_size) = match existing {
        Some(manifest) => {
            if manifest.seed != seed || manifest.batch_size != batch_size {
                warn!(
                    "Existing manifest uses seed {} and batch size {}; keeping them",
                    manifest.seed, manifest.batch_size
                );
            }
            (manifest.seed, manifest.batch_size)
        }
        None => (seed, batch_size),
    };

    let pool_set: HashSet<DocumentId> = pool.iter().copied().collect();
    let mut batches = existing.map(|m| m.batches.clone()).unwrap_or_default();

    for (name, ids) in &batches {
        if let Some(missing) = ids.iter().find(|id| !pool_set.contains(id)) {
            return Err(AnnotatorError::Configuration(format!(
                "document {} assigned to '{}' is no longer in the corpus",
                missing, name
            )));
        }
    }

    let used: HashSet<DocumentId> = batches.values().flatten().copied().collect();
    let (kept, added): (Vec<AnnotatorName>, Vec<AnnotatorName>) = annotators
        .iter()
        .cloned()
        .partition(|name| batches.contains_key(name));

    let available: Vec<DocumentId> = shuffled_pool(pool, seed)
        .into_iter()
        .filter(|id| !used.contains(id))
        .collect();

    let required = added.len() * batch_size;
    if available.len() < required {
        return Err(AnnotatorError::InsufficientDocuments {
            annotators: added.len(),
            batch_size,
            required,
            available: available.len(),
        });
    }

    for (name, chunk) in added.iter().zip(available.chunks(batch_size)) {
        debug!("Assigning {} documents to {}", chunk.len(), name);
        batches.insert(name.clone(), chunk.to_vec());
    }

    info!(
        "Phase 1 plan: {} new batch(es), {} kept, {} of {} documents assigned",
        added.len(),
        kept.len(),
        batches.values().map(Vec::len).sum::<usize>(),
        pool_set.len()
    );

    let manifest = Phase1Manifest {
        seed,
        batch_size,
        pool_size: pool_set.len(),
        created_at: existing.map(|m| m.created_at).unwrap_or_else(Utc::now),
        batches,
    };

    Ok(Phase1Plan {
        manifest,
        added,
        kept,
    })
}
