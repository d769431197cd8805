// ============================================================
// Layer 4 - Feature Standardiser
// ============================================================
// Z-score normalisation of input features.
//
// Statistics are fitted on the training split only and then
// applied unchanged to validation data, so nothing about the
// validation distribution leaks into training. The fitted
// statistics are saved next to the checkpoints so `evaluate`
// can transform fresh data the same way.
//
//   x' = (x - mean) / std      (std of 0 is treated as 1)

use serde::{Deserialize, Serialize};

use crate::domain::sample::Sample;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub mean: Vec<f32>,
    pub std:  Vec<f32>,
}

impl Standardizer {
    /// Fit per-feature mean and population standard deviation.
    pub fn fit(samples: &[Sample]) -> Self {
        let dims = samples.first().map_or(0, |s| s.features.len());
        let n    = samples.len().max(1) as f64;

        let mut mean = vec![0.0f64; dims];
        for sample in samples {
            for (m, &x) in mean.iter_mut().zip(&sample.features) {
                *m += x as f64;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0f64; dims];
        for sample in samples {
            for ((v, &x), m) in var.iter_mut().zip(&sample.features).zip(&mean) {
                *v += (x as f64 - m).powi(2);
            }
        }

        let std = var
            .iter()
            .map(|v| {
                let s = (v / n).sqrt();
                if s > f64::EPSILON { s as f32 } else { 1.0 }
            })
            .collect();

        Self {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            std,
        }
    }

    /// Standardise every sample in place.
    pub fn apply(&self, samples: &mut [Sample]) {
        for sample in samples {
            for ((x, m), s) in sample.features.iter_mut().zip(&self.mean).zip(&self.std) {
                *x = (*x - m) / s;
            }
        }
    }

    pub fn num_features(&self) -> usize {
        self.mean.len()
    }
}
