// ============================================================
// Layer 3 - Subject Aggregation
// ============================================================
// Collapses per-view predictions into one row per subject.
//
//   predictions → mean over all views of the subject
//   targets     → first row seen for the subject
//                 (every view carries the same labels)
//
// Rows come out sorted by subject key.

use std::collections::BTreeMap;

use crate::domain::sample::subject_key;

/// Predictions and targets with one row per subject, sorted by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectTable {
    pub keys:        Vec<String>,
    pub predictions: Vec<Vec<f64>>,
    pub targets:     Vec<Vec<f64>>,
}

impl SubjectTable {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Column `class` of the target matrix.
    pub fn target_column(&self, class: usize) -> Vec<f64> {
        self.targets.iter().map(|row| row[class]).collect()
    }

    /// Column `class` of the prediction matrix.
    pub fn prediction_column(&self, class: usize) -> Vec<f64> {
        self.predictions.iter().map(|row| row[class]).collect()
    }
}

struct SubjectAccumulator {
    prediction_sum: Vec<f64>,
    views:          usize,
    first_target:   Vec<f64>,
}

/// Group per-sample rows by subject key.
///
/// `ids`, `predictions` and `targets` are parallel; row `i` of each
/// belongs to sample `ids[i]`.
pub fn aggregate_by_subject(
    ids:         &[String],
    predictions: &[Vec<f64>],
    targets:     &[Vec<f64>],
) -> SubjectTable {
    let mut groups: BTreeMap<String, SubjectAccumulator> = BTreeMap::new();

    for ((id, prediction), target) in ids.iter().zip(predictions).zip(targets) {
        let entry = groups
            .entry(subject_key(id))
            .or_insert_with(|| SubjectAccumulator {
                prediction_sum: vec![0.0; prediction.len()],
                views:          0,
                first_target:   target.clone(),
            });

        for (sum, p) in entry.prediction_sum.iter_mut().zip(prediction) {
            *sum += p;
        }
        entry.views += 1;
    }

    let mut table = SubjectTable::default();
    for (key, acc) in groups {
        let n = acc.views as f64;
        table.keys.push(key);
        table.predictions.push(acc.prediction_sum.iter().map(|s| s / n).collect());
        table.targets.push(acc.first_target);
    }
    table
}
