//! Chance-corrected agreement coefficients for nominal labels.
//!
//! All functions are generic over the label type so they can be checked
//! against published examples with plain integers.

use std::collections::BTreeMap;

const EPSILON: f64 = 1e-12;

/// `(observed - expected) / (1 - expected)`, with perfect expected agreement
/// mapped to 1.0 when observed agreement is also perfect and 0.0 otherwise.
fn chance_corrected(observed: f64, expected: f64) -> f64 {
    if (1.0 - expected).abs() < EPSILON {
        if (1.0 - observed).abs() < EPSILON {
            1.0
        } else {
            0.0
        }
    } else {
        (observed - expected) / (1.0 - expected)
    }
}

/// Observed and expected agreement plus Cohen's kappa for two raters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CohenStats {
    pub observed: f64,
    pub expected: f64,
    pub kappa: f64,
}

/// Cohen's kappa over paired labels. `None` when there are no pairs.
pub fn cohens_kappa<T: Ord + Copy>(pairs: &[(T, T)]) -> Option<CohenStats> {
    if pairs.is_empty() {
        return None;
    }

    let n = pairs.len() as f64;
    let mut first: BTreeMap<T, usize> = BTreeMap::new();
    let mut second: BTreeMap<T, usize> = BTreeMap::new();
    let mut agree = 0usize;

    for &(a, b) in pairs {
        *first.entry(a).or_default() += 1;
        *second.entry(b).or_default() += 1;
        if a == b {
            agree += 1;
        }
    }

    let observed = agree as f64 / n;
    let expected = first
        .iter()
        .map(|(label, &count)| {
            let other = second.get(label).copied().unwrap_or(0);
            (count as f64 / n) * (other as f64 / n)
        })
        .sum::<f64>();

    Some(CohenStats {
        observed,
        expected,
        kappa: chance_corrected(observed, expected),
    })
}

/// Fleiss' kappa for units that all carry the same number (>= 2) of labels.
pub fn fleiss_kappa<T: Ord + Copy>(units: &[Vec<T>]) -> Option<f64> {
    let raters = units.first()?.len();
    if raters < 2 || units.iter().any(|u| u.len() != raters) {
        return None;
    }

    let n = raters as f64;
    let subjects = units.len() as f64;
    let mut totals: BTreeMap<T, usize> = BTreeMap::new();
    let mut agreement_sum = 0.0;

    for unit in units {
        let mut counts: BTreeMap<T, usize> = BTreeMap::new();
        for &label in unit {
            *counts.entry(label).or_default() += 1;
            *totals.entry(label).or_default() += 1;
        }
        let squares: f64 = counts.values().map(|&c| (c * c) as f64).sum();
        agreement_sum += (squares - n) / (n * (n - 1.0));
    }

    let observed = agreement_sum / subjects;
    let expected = totals
        .values()
        .map(|&c| {
            let p = c as f64 / (subjects * n);
            p * p
        })
        .sum::<f64>();

    Some(chance_corrected(observed, expected))
}

/// Krippendorff's alpha (nominal) over units with optional labels.
///
/// Units with fewer than two labels are not pairable and are ignored.
/// `None` when fewer than two pairable values exist.
pub fn krippendorff_alpha<T: Ord + Copy>(units: &[Vec<Option<T>>]) -> Option<f64> {
    // coincidences[(c, k)] accumulates 1 / (m_u - 1) per ordered pair
    let mut coincidences: BTreeMap<(T, T), f64> = BTreeMap::new();

    for unit in units {
        let values: Vec<T> = unit.iter().flatten().copied().collect();
        let m = values.len();
        if m < 2 {
            continue;
        }
        let weight = 1.0 / (m as f64 - 1.0);
        for (i, &c) in values.iter().enumerate() {
            for (j, &k) in values.iter().enumerate() {
                if i != j {
                    *coincidences.entry((c, k)).or_default() += weight;
                }
            }
        }
    }

    let mut marginals: BTreeMap<T, f64> = BTreeMap::new();
    for (&(c, _), &w) in &coincidences {
        *marginals.entry(c).or_default() += w;
    }
    let total: f64 = marginals.values().sum();
    if total < 2.0 {
        return None;
    }

    let observed_disagreement = coincidences
        .iter()
        .filter(|((c, k), _)| c != k)
        .map(|(_, &w)| w)
        .sum::<f64>()
        / total;

    let squares: f64 = marginals.values().map(|v| v * v).sum();
    let expected_disagreement = (total * total - squares) / (total * (total - 1.0));

    if expected_disagreement.abs() < EPSILON {
        return Some(if observed_disagreement.abs() < EPSILON {
            1.0
        } else {
            0.0
        });
    }

    Some(1.0 - observed_disagreement / expected_disagreement)
}
