// ============================================================
// Layer 5 - Predictors
// ============================================================
// Anything that maps a feature batch to class probabilities.
//
//   MultiLabelClassifier   one network, sigmoid outputs
//   EnsemblePredictor      several checkpoints of the same
//                          architecture, probabilities averaged
//
// Validation is written against the trait, so a single model and
// a whole ensemble are evaluated by the same loop.

use anyhow::{bail, Result};
use burn::prelude::*;

use crate::infra::checkpoint::{ensemble_checkpoint, CheckpointManager};
use crate::ml::model::{ClassifierConfig, MultiLabelClassifier};

pub trait Predictor<B: Backend> {
    /// inputs: [batch, num_features] → probabilities: [batch, num_classes]
    fn predict(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2>;
}

impl<B: Backend> Predictor<B> for MultiLabelClassifier<B> {
    fn predict(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        self.probabilities(inputs)
    }
}

/// Mean of the member probabilities.
pub struct EnsemblePredictor<B: Backend> {
    members: Vec<MultiLabelClassifier<B>>,
}

impl<B: Backend> EnsemblePredictor<B> {
    pub fn new(members: Vec<MultiLabelClassifier<B>>) -> Result<Self> {
        if members.is_empty() {
            bail!("An ensemble needs at least one member");
        }
        Ok(Self { members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Load the `ensemble_{m}` checkpoints for every index in `members`.
    pub fn from_checkpoints(
        checkpoints:  &CheckpointManager,
        model_config: &ClassifierConfig,
        members:      &[usize],
        device:       &B::Device,
    ) -> Result<Self> {
        let mut models = Vec::with_capacity(members.len());
        for &m in members {
            let fresh = model_config.init::<B>(device);
            models.push(checkpoints.load_model(&ensemble_checkpoint(m), fresh, device)?);
            tracing::info!("Loaded ensemble member {}", m);
        }
        Self::new(models)
    }
}

impl<B: Backend> Predictor<B> for EnsemblePredictor<B> {
    fn predict(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        let n = self.members.len() as f64;
        self.members
            .iter()
            .map(|model| model.probabilities(inputs.clone()))
            .reduce(|acc, p| acc + p)
            .map(|sum| sum.div_scalar(n))
            // unreachable: `new` rejects empty ensembles
            .unwrap_or_else(|| inputs.zeros_like())
    }
}
