// ============================================================
// Layer 3 - Metric Maths
// ============================================================
// Plain-Rust metric helpers shared by training and validation:
//
//   AverageMeter    - running value / sum / count / average
//   accuracy        - thresholded agreement over labelled entries
//   roc_auc         - ROC-AUC via the Mann-Whitney U statistic
//   class_auc       - per-class AUC with a neutral 0.5 fallback
//   mean_class_auc  - per-class AUCs of a subject table + their mean

use thiserror::Error;

use crate::domain::aggregation::SubjectTable;

/// Score used whenever a class AUC cannot be computed.
pub const NEUTRAL_AUC: f64 = 0.5;

// ─── AverageMeter ─────────────────────────────────────────────────────────────
/// Tracks the latest value and the count-weighted average.
#[derive(Debug, Clone, Default)]
pub struct AverageMeter {
    pub val:   f64,
    pub sum:   f64,
    pub count: usize,
    pub avg:   f64,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `val` as the mean of `n` observations.
    pub fn update(&mut self, val: f64, n: usize) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n;
        if self.count > 0 {
            self.avg = self.sum / self.count as f64;
        }
    }
}

// ─── Accuracy ─────────────────────────────────────────────────────────────────
/// Fraction of labelled entries whose thresholded prediction matches.
///
/// `predictions` are probabilities, `targets` use the {-1, 0, 1}
/// encoding. Entries with target 0 are unknown and skipped.
pub fn accuracy(predictions: &[f32], targets: &[f32]) -> f64 {
    let mut labelled = 0usize;
    let mut correct  = 0usize;

    for (&p, &t) in predictions.iter().zip(targets) {
        if t == 0.0 {
            continue;
        }
        labelled += 1;
        if (p > 0.5) == (t > 0.0) {
            correct += 1;
        }
    }

    if labelled == 0 {
        return 0.0;
    }
    correct as f64 / labelled as f64
}

// ─── ROC-AUC ──────────────────────────────────────────────────────────────────
#[derive(Debug, Error, PartialEq)]
pub enum AucError {
    #[error("labels and scores differ in length ({labels} vs {scores})")]
    LengthMismatch { labels: usize, scores: usize },

    #[error("only one class present in labels")]
    SingleClass,

    #[error("score at index {0} is not finite")]
    NonFiniteScore(usize),
}

/// Area under the ROC curve.
///
/// Computed as U / (n_pos * n_neg) where U is the Mann-Whitney
/// statistic over average ranks, so tied scores count half.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Result<f64, AucError> {
    if labels.len() != scores.len() {
        return Err(AucError::LengthMismatch {
            labels: labels.len(),
            scores: scores.len(),
        });
    }
    if let Some(i) = scores.iter().position(|s| !s.is_finite()) {
        return Err(AucError::NonFiniteScore(i));
    }

    let n_pos = labels.iter().filter(|&&l| l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(AucError::SingleClass);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Ranks are 1-based; a run of ties shares the mean of its ranks.
    let mut ranks = vec![0.0f64; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        let shared = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = shared;
        }
        start = end;
    }

    let positive_rank_sum: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, &l)| l)
        .map(|(r, _)| r)
        .sum();

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    let u = positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0;
    Ok(u / (n_pos * n_neg))
}

/// AUC of one class column.
///
/// `targets` use the {0, 0.5, 1} validation encoding; only rows that
/// are exactly 0 or 1 take part. Falls back to 0.5 when the column
/// holds a single class or the AUC cannot be computed.
pub fn class_auc(targets: &[f64], predictions: &[f64]) -> f64 {
    let (labels, scores): (Vec<bool>, Vec<f64>) = targets
        .iter()
        .zip(predictions)
        .filter(|(&t, _)| t == 0.0 || t == 1.0)
        .map(|(&t, &p)| (t == 1.0, p))
        .unzip();

    match roc_auc(&labels, &scores) {
        Ok(auc) => auc,
        Err(e) => {
            tracing::debug!("class AUC substituted with {}: {}", NEUTRAL_AUC, e);
            NEUTRAL_AUC
        }
    }
}

/// Per-class AUCs over a subject table and their mean.
///
/// With no classes the mean is the neutral score.
pub fn mean_class_auc(table: &SubjectTable, num_classes: usize) -> (Vec<f64>, f64) {
    let class_aucs: Vec<f64> = (0..num_classes)
        .map(|c| class_auc(&table.target_column(c), &table.prediction_column(c)))
        .collect();

    if class_aucs.is_empty() {
        return (class_aucs, NEUTRAL_AUC);
    }
    let mean = class_aucs.iter().sum::<f64>() / class_aucs.len() as f64;
    (class_aucs, mean)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_meter_weights_by_count() {
        let mut meter = AverageMeter::new();
        meter.update(1.0, 2);
        meter.update(4.0, 1);
        assert_eq!(meter.val, 4.0);
        assert_eq!(meter.count, 3);
        assert!((meter.avg - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_accuracy_skips_unknown_labels() {
        let preds   = [0.9, 0.2, 0.7, 0.4];
        let targets = [1.0, -1.0, 0.0, 1.0];
        // Three labelled entries, two correct
        assert!((accuracy(&preds, &targets) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_accuracy_without_labels_is_zero() {
        assert_eq!(accuracy(&[0.9, 0.1], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_perfect_and_inverted_ranking() {
        let labels = [false, false, true, true];
        let scores = [0.1, 0.2, 0.8, 0.9];
        assert_eq!(roc_auc(&labels, &scores), Ok(1.0));

        let inverted = [0.9, 0.8, 0.2, 0.1];
        assert_eq!(roc_auc(&labels, &inverted), Ok(0.0));
    }

    #[test]
    fn test_ties_count_half() {
        // All scores equal: every positive/negative pair is a tie
        let labels = [true, false, true, false];
        let scores = [0.5; 4];
        assert_eq!(roc_auc(&labels, &scores), Ok(0.5));
    }

    #[test]
    fn test_known_value() {
        // Pairs (pos, neg): (0.35 > 0.1), (0.35 < 0.4), (0.8 > 0.1), (0.8 > 0.4) → 3/4
        let labels = [false, false, true, true];
        let scores = [0.1, 0.4, 0.35, 0.8];
        assert!((roc_auc(&labels, &scores).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_errors() {
        assert_eq!(roc_auc(&[true, true], &[0.1, 0.2]), Err(AucError::SingleClass));
        assert_eq!(
            roc_auc(&[true, false], &[0.1]),
            Err(AucError::LengthMismatch { labels: 2, scores: 1 })
        );
        assert_eq!(
            roc_auc(&[true, false], &[0.1, f64::NAN]),
            Err(AucError::NonFiniteScore(1))
        );
    }

    #[test]
    fn test_class_auc_all_zero_or_all_one_is_neutral() {
        assert_eq!(class_auc(&[0.0, 0.0, 0.0], &[0.1, 0.7, 0.3]), 0.5);
        assert_eq!(class_auc(&[1.0, 1.0, 1.0], &[0.1, 0.7, 0.3]), 0.5);
    }

    #[test]
    fn test_class_auc_ignores_unknown_rows() {
        // The 0.5 row would break the perfect ranking if it took part
        let targets = [0.0, 0.5, 1.0];
        let preds   = [0.1, 0.95, 0.9];
        assert_eq!(class_auc(&targets, &preds), 1.0);
    }

    #[test]
    fn test_class_auc_non_finite_is_neutral() {
        assert_eq!(class_auc(&[0.0, 1.0], &[f64::NAN, 0.3]), 0.5);
    }

    #[test]
    fn test_mean_class_auc() {
        let table = SubjectTable {
            keys: vec!["a-1".into(), "b-1".into(), "c-1".into()],
            predictions: vec![vec![0.1, 0.3], vec![0.9, 0.2], vec![0.8, 0.1]],
            targets: vec![vec![0.0, 1.0], vec![1.0, 1.0], vec![1.0, 1.0]],
        };
        let (aucs, mean) = mean_class_auc(&table, 2);
        assert_eq!(aucs, vec![1.0, 0.5]);
        assert!((mean - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_mean_class_auc_without_classes() {
        let (aucs, mean) = mean_class_auc(&SubjectTable::default(), 0);
        assert!(aucs.is_empty());
        assert_eq!(mean, NEUTRAL_AUC);
    }
}
