// ============================================================
// Layer 3 - Learning Rate Schedules
// ============================================================
// Per-epoch learning rates.
//
// Cyclic cosine annealing (snapshot ensembles):
//
//   lr(e) = initial_lr / 2 * (cos(π * (e mod T) / T) + 1)
//
// where T is the cycle length. The rate starts every cycle at
// initial_lr and decays towards zero before the next restart.

use serde::{Deserialize, Serialize};

use crate::domain::ensemble::{EnsembleProperties, EnsembleType};

/// Annealed learning rate for `epoch` within cycles of `cycle_length`.
pub fn cyclic_annealing_lr(epoch: usize, initial_lr: f64, cycle_length: usize) -> f64 {
    let cycle_length = cycle_length.max(1);
    let position = (epoch % cycle_length) as f64 / cycle_length as f64;
    initial_lr / 2.0 * ((std::f64::consts::PI * position).cos() + 1.0)
}

/// Decay schedule for runs without an ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LrSchedule {
    /// Multiply by `gamma` every `step_size` epochs.
    Step { step_size: usize, gamma: f64 },

    /// Multiply by `gamma` at every milestone epoch reached.
    MultiStep { milestones: Vec<usize>, gamma: f64 },
}

impl LrSchedule {
    pub fn learning_rate(&self, base_lr: f64, epoch: usize) -> f64 {
        match self {
            LrSchedule::Step { step_size, gamma } => {
                let decays = epoch / (*step_size).max(1);
                base_lr * gamma.powi(decays as i32)
            }
            LrSchedule::MultiStep { milestones, gamma } => {
                let decays = milestones.iter().filter(|&&m| m <= epoch).count();
                base_lr * gamma.powi(decays as i32)
            }
        }
    }
}

/// Learning rate for `epoch`.
///
/// Snapshot ensembles anneal cyclically, deep ensembles keep the base
/// rate, and other runs follow `schedule` when one is configured.
pub fn learning_rate_for_epoch(
    epoch:    usize,
    base_lr:  f64,
    ensemble: Option<&EnsembleProperties>,
    schedule: Option<&LrSchedule>,
) -> f64 {
    match (ensemble, schedule) {
        (Some(props), _) => match props.ensemble_type {
            EnsembleType::SnapshotEnsemble => {
                let initial_lr = props.initial_lr.unwrap_or(base_lr);
                cyclic_annealing_lr(epoch, initial_lr, props.cycle_length)
            }
            EnsembleType::DeepEnsemble => base_lr,
        },
        (None, Some(schedule)) => schedule.learning_rate(base_lr, epoch),
        (None, None) => base_lr,
    }
}
