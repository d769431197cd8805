// ============================================================
// Layer 4 - Train/Validation Splitter
// ============================================================
// Used when no separate validation file is configured.
//
// Samples are split by SUBJECT, not by row: every view of a
// subject lands on the same side. Splitting rows would put
// views of one subject in both sets and the per-subject
// validation AUC would be measured on data the model has
// effectively seen.
//
// Subjects are shuffled with a seeded StdRng so the split is
// reproducible; `evaluate` rebuilds the exact same validation
// set from the seed stored in the run configuration.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::collections::BTreeMap;

use crate::domain::sample::Sample;

/// Shuffle subjects and split samples into (train, validation).
///
/// `train_fraction` is applied to the number of subjects.
pub fn split_by_subject(
    samples:        Vec<Sample>,
    train_fraction: f64,
    seed:           u64,
) -> (Vec<Sample>, Vec<Sample>) {
    // BTreeMap keeps subject order independent of input order
    let mut by_subject: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
    for sample in samples {
        by_subject.entry(sample.subject_key()).or_default().push(sample);
    }

    let mut subjects: Vec<Vec<Sample>> = by_subject.into_values().collect();
    let mut rng = StdRng::seed_from_u64(seed);
    subjects.shuffle(&mut rng);

    let total    = subjects.len();
    let split_at = ((total as f64) * train_fraction).round() as usize;
    let split_at = split_at.min(total);

    let val_subjects = subjects.split_off(split_at);
    let train: Vec<Sample> = subjects.into_iter().flatten().collect();
    let val:   Vec<Sample> = val_subjects.into_iter().flatten().collect();

    tracing::debug!(
        "Subject split: {} train / {} validation subjects ({} / {} samples)",
        split_at,
        total - split_at,
        train.len(),
        val.len(),
    );

    (train, val)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// `subjects` subjects with `views` views each
    fn samples(subjects: usize, views: usize) -> Vec<Sample> {
        (0..subjects)
            .flat_map(|s| {
                (0..views).map(move |v| Sample::new(format!("p-{s}-{v}"), vec![0.0], vec![1.0]))
            })
            .collect()
    }

    fn subjects_of(samples: &[Sample]) -> HashSet<String> {
        samples.iter().map(|s| s.subject_key()).collect()
    }

    #[test]
    fn test_correct_split_sizes() {
        let (train, val) = split_by_subject(samples(10, 3), 0.8, 7);
        assert_eq!(train.len(), 24);
        assert_eq!(val.len(), 6);
    }

    #[test]
    fn test_subjects_never_straddle_the_split() {
        let (train, val) = split_by_subject(samples(20, 4), 0.7, 1);
        assert!(subjects_of(&train).is_disjoint(&subjects_of(&val)));
    }

    #[test]
    fn test_same_seed_same_split() {
        let (_, a) = split_by_subject(samples(15, 2), 0.6, 42);
        let (_, b) = split_by_subject(samples(15, 2), 0.6, 42);
        let ids_a: Vec<_> = a.iter().map(|s| s.id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_empty_dataset() {
        let (train, val) = split_by_subject(Vec::new(), 0.8, 0);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }

    #[test]
    fn test_full_training_split() {
        let (train, val) = split_by_subject(samples(5, 2), 1.0, 3);
        assert_eq!(train.len(), 10);
        assert!(val.is_empty());
    }
}
