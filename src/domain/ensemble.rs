// ============================================================
// Layer 3 - Ensemble Plan
// ============================================================
// Describes how a run is split into ensemble members.
//
//   deep_ensemble     - each member trains for `cycle_length`
//                       epochs from freshly initialised weights
//   snapshot_ensemble - one continuous run; the learning rate is
//                       annealed within each cycle and a member
//                       is snapshotted at every cycle end
//
// Example with ensemble_size = 3, cycle_length = 4:
//
//   epoch (0-based)  0 1 2 3 | 4 5 6 7 | 8 9 10 11
//   member           0 0 0 0 | 1 1 1 1 | 2 2 2  2
//   checkpoint after       ^         ^          ^   (epochs 4, 8, 12)

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleType {
    DeepEnsemble,
    SnapshotEnsemble,
}

impl std::fmt::Display for EnsembleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnsembleType::DeepEnsemble     => write!(f, "deep ensemble"),
            EnsembleType::SnapshotEnsemble => write!(f, "snapshot ensemble"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum EnsembleError {
    #[error("ensemble_size must be at least 1")]
    EmptyEnsemble,

    #[error("cycle_length must be at least 1")]
    EmptyCycle,

    #[error("initial_lr must be positive, got {0}")]
    InvalidInitialLr(f64),
}

/// Ensemble settings of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleProperties {
    pub ensemble_type: EnsembleType,

    /// Number of members to produce
    pub ensemble_size: usize,

    /// Epochs spent on each member
    pub cycle_length: usize,

    /// Learning rate at the start of each snapshot cycle.
    /// Falls back to the optimizer learning rate when absent.
    #[serde(default)]
    pub initial_lr: Option<f64>,
}

impl EnsembleProperties {
    pub fn validate(&self) -> Result<(), EnsembleError> {
        if self.ensemble_size == 0 {
            return Err(EnsembleError::EmptyEnsemble);
        }
        if self.cycle_length == 0 {
            return Err(EnsembleError::EmptyCycle);
        }
        if let Some(lr) = self.initial_lr {
            if !(lr > 0.0) {
                return Err(EnsembleError::InvalidInitialLr(lr));
            }
        }
        Ok(())
    }

    pub fn total_epochs(&self) -> usize {
        self.ensemble_size * self.cycle_length
    }

    /// Index of the member trained during `epoch` (0-based).
    pub fn member_for_epoch(&self, epoch: usize) -> usize {
        epoch / self.cycle_length
    }

    /// Epoch counts after which a member checkpoint is taken.
    pub fn checkpoint_epochs(&self) -> Vec<usize> {
        (1..=self.ensemble_size)
            .map(|k| self.cycle_length * k)
            .collect()
    }

    /// True when finishing `epoch` (0-based) completes a member.
    pub fn completes_member(&self, epoch: usize) -> bool {
        self.checkpoint_epochs().contains(&(epoch + 1))
    }

    /// Deep ensembles restart from fresh weights after every member.
    pub fn reinitialises_between_members(&self) -> bool {
        self.ensemble_type == EnsembleType::DeepEnsemble
    }
}

// ─── EpochPlan ────────────────────────────────────────────────────────────────
/// Number of epochs to run and the ensemble layout, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochPlan {
    pub total_epochs: usize,
    pub ensemble:     Option<EnsembleProperties>,
}

impl EpochPlan {
    /// An ensemble overrides the plain epoch count.
    pub fn new(epochs: usize, ensemble: Option<&EnsembleProperties>) -> Self {
        match ensemble {
            Some(props) => Self {
                total_epochs: props.total_epochs(),
                ensemble:     Some(props.clone()),
            },
            None => Self { total_epochs: epochs, ensemble: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(ensemble_type: EnsembleType, size: usize, cycle: usize) -> EnsembleProperties {
        EnsembleProperties {
            ensemble_type,
            ensemble_size: size,
            cycle_length: cycle,
            initial_lr: Some(0.1),
        }
    }

    #[test]
    fn test_total_epochs() {
        assert_eq!(props(EnsembleType::SnapshotEnsemble, 5, 10).total_epochs(), 50);
    }

    #[test]
    fn test_checkpoints_at_cycle_multiples() {
        let p = props(EnsembleType::DeepEnsemble, 3, 4);
        assert_eq!(p.checkpoint_epochs(), vec![4, 8, 12]);

        let triggered: Vec<usize> = (0..20).filter(|&e| p.completes_member(e)).collect();
        // 0-based epochs whose completion hits 4, 8, 12 and nothing past the last cycle
        assert_eq!(triggered, vec![3, 7, 11]);
    }

    #[test]
    fn test_completes_member_matches_checkpoint_list() {
        let p = props(EnsembleType::SnapshotEnsemble, 4, 3);
        let listed = p.checkpoint_epochs();
        for epoch in 0..30 {
            assert_eq!(p.completes_member(epoch), listed.contains(&(epoch + 1)));
        }
    }

    #[test]
    fn test_member_for_epoch() {
        let p = props(EnsembleType::SnapshotEnsemble, 3, 4);
        assert_eq!(p.member_for_epoch(0), 0);
        assert_eq!(p.member_for_epoch(3), 0);
        assert_eq!(p.member_for_epoch(4), 1);
        assert_eq!(p.member_for_epoch(11), 2);
    }

    #[test]
    fn test_only_deep_ensembles_reinitialise() {
        assert!(props(EnsembleType::DeepEnsemble, 2, 2).reinitialises_between_members());
        assert!(!props(EnsembleType::SnapshotEnsemble, 2, 2).reinitialises_between_members());
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            props(EnsembleType::DeepEnsemble, 0, 2).validate(),
            Err(EnsembleError::EmptyEnsemble)
        );
        assert_eq!(
            props(EnsembleType::DeepEnsemble, 2, 0).validate(),
            Err(EnsembleError::EmptyCycle)
        );
        let mut p = props(EnsembleType::SnapshotEnsemble, 2, 2);
        p.initial_lr = Some(0.0);
        assert_eq!(p.validate(), Err(EnsembleError::InvalidInitialLr(0.0)));
    }

    #[test]
    fn test_epoch_plan() {
        assert_eq!(EpochPlan::new(7, None).total_epochs, 7);
        let p = props(EnsembleType::DeepEnsemble, 2, 5);
        assert_eq!(EpochPlan::new(7, Some(&p)).total_epochs, 10);
    }

    #[test]
    fn test_ensemble_type_serde_names() {
        let p: EnsembleProperties = serde_json::from_str(
            r#"{"ensemble_type":"snapshot_ensemble","ensemble_size":2,"cycle_length":3}"#,
        )
        .unwrap();
        assert_eq!(p.ensemble_type, EnsembleType::SnapshotEnsemble);
        assert_eq!(p.initial_lr, None);
    }
}
