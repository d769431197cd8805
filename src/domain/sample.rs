// ============================================================
// Layer 3 - Sample Domain Type
// ============================================================
// One labelled view of a subject, as read from a sample file.
//
// Sample ids are dash separated. The first two tokens name the
// subject the view belongs to (e.g. plate and well), anything
// after that distinguishes views of the same subject:
//
//   "plate7-B03-2"  →  subject "plate7-B03", view 2
//
// Targets use a three-valued encoding per class:
//   -1 = negative, 0 = unknown, 1 = positive

use serde::{Deserialize, Serialize};

/// A single training or validation example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Dash separated identifier, e.g. "plate7-B03-2"
    pub id: String,

    /// Input feature vector, one value per input dimension
    pub features: Vec<f32>,

    /// One target per class in {-1, 0, 1}
    pub targets: Vec<f32>,
}

impl Sample {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, features: Vec<f32>, targets: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            features,
            targets,
        }
    }

    /// Key of the subject this sample is a view of.
    pub fn subject_key(&self) -> String {
        subject_key(&self.id)
    }
}

/// Join the first two dash-separated tokens of `id`.
/// Ids with a single token are their own subject.
pub fn subject_key(id: &str) -> String {
    id.split('-').take(2).collect::<Vec<_>>().join("-")
}

/// Map a {-1, 0, 1} target onto {0, 0.5, 1}.
/// 0.5 marks an unknown label and is excluded from AUC.
pub fn validation_target(target: f32) -> f64 {
    target as f64 / 2.0 + 0.5
}
