// ============================================================
// Layer 5 - Training Session
// ============================================================
// Owns everything that changes while a run trains:
//
//   model + optimizer   the weights and the AdamW moments
//   epoch               epochs completed
//   samples_seen        training samples consumed so far
//   best_performance    best validation AUC
//   ensemble_member     member currently being trained
//
// and knows how to persist and restore itself through the
// CheckpointManager. The optimizer type is left generic so the
// caller's `AdamWConfig::init()` decides it; re-initialising a
// deep ensemble member passes a fresh optimizer of the same type.

use anyhow::{Context, Result};
use burn::{
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::{activation, backend::AutodiffBackend},
};

use crate::data::batcher::MultiLabelBatch;
use crate::infra::checkpoint::{
    ensemble_checkpoint, CheckpointManager, TrainingState, BEST_CHECKPOINT, REGULAR_CHECKPOINT,
};
use crate::ml::model::{ClassifierConfig, MultiLabelClassifier};

/// Loss and host-side class probabilities of one optimisation step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub loss:          f64,
    /// Row-major [batch, num_classes]
    pub probabilities: Vec<f32>,
}

pub struct TrainingSession<B: AutodiffBackend, O> {
    pub model:            MultiLabelClassifier<B>,
    optimizer:            O,
    model_config:         ClassifierConfig,
    device:               B::Device,
    checkpoints:          CheckpointManager,
    pub epoch:            usize,
    pub samples_seen:     usize,
    pub best_performance: Option<f64>,
    pub ensemble_member:  usize,
}

impl<B, O> TrainingSession<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<MultiLabelClassifier<B>, B>,
{
    /// Fresh weights, nothing trained yet.
    pub fn new(
        model_config: ClassifierConfig,
        optimizer:    O,
        checkpoints:  CheckpointManager,
        device:       B::Device,
    ) -> Self {
        let model = model_config.init(&device);
        Self {
            model,
            optimizer,
            model_config,
            device,
            checkpoints,
            epoch: 0,
            samples_seen: 0,
            best_performance: None,
            ensemble_member: 0,
        }
    }

    #[cfg(test)]
    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Forward, backward and one optimizer step at learning rate `lr`.
    pub fn train_step(&mut self, batch: MultiLabelBatch<B>, lr: f64) -> Result<StepOutput> {
        let (loss, logits) = self.model.forward_loss(batch.inputs, batch.targets);
        let loss_value: f64 = loss.clone().into_scalar().elem::<f64>();

        let probabilities: Vec<f32> = activation::sigmoid(logits.inner())
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("Cannot read training outputs: {e:?}"))?;

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optimizer.step(lr, self.model.clone(), grads);

        Ok(StepOutput { loss: loss_value, probabilities })
    }

    /// Replace model and optimizer with fresh ones (deep ensembles).
    pub fn re_initialise(&mut self, optimizer: O) {
        self.model = self.model_config.init(&self.device);
        self.optimizer = optimizer;
        tracing::info!("Re-initialised model weights for member {}", self.ensemble_member);
    }

    fn state(&self, performance: f64) -> TrainingState {
        TrainingState {
            epoch:            self.epoch,
            samples_seen:     self.samples_seen,
            best_performance: self.best_performance,
            performance,
            ensemble_member:  self.ensemble_member,
        }
    }

    /// Save model, optimizer and state under `name`; with `is_best`
    /// the weights are also written as the best model.
    pub fn save_checkpoint(&self, name: &str, performance: f64, is_best: bool) -> Result<()> {
        let state = self.state(performance);
        self.checkpoints.save_model(name, &self.model)?;
        self.checkpoints.save_optimizer::<B, O>(name, &self.optimizer)?;
        self.checkpoints.save_state(name, &state)?;

        if is_best {
            self.checkpoints.save_model(BEST_CHECKPOINT, &self.model)?;
            self.checkpoints.save_state(BEST_CHECKPOINT, &state)?;
            tracing::info!("New best model (AUC {:.4}) at epoch {}", performance, self.epoch);
        }
        tracing::debug!("Checkpoint '{}' saved at epoch {}", name, self.epoch);
        Ok(())
    }

    /// Save the current weights as ensemble member `member`.
    pub fn save_ensemble_checkpoint(&self, member: usize, performance: f64) -> Result<()> {
        let name = ensemble_checkpoint(member);
        let mut state = self.state(performance);
        state.ensemble_member = member;
        self.checkpoints.save_model(&name, &self.model)?;
        self.checkpoints.save_state(&name, &state)?;
        Ok(())
    }

    /// Restore model, optimizer and progress from the regular checkpoint.
    pub fn resume(self) -> Result<Self> {
        let Self {
            model,
            optimizer,
            model_config,
            device,
            checkpoints,
            ..
        } = self;

        let state = checkpoints
            .load_state(REGULAR_CHECKPOINT)
            .context("Nothing to resume from")?;
        let model     = checkpoints.load_model(REGULAR_CHECKPOINT, model, &device)?;
        let optimizer = checkpoints.load_optimizer::<B, O>(REGULAR_CHECKPOINT, optimizer, &device)?;

        tracing::info!(
            "Resuming at epoch {} ({} samples seen, best AUC {:?})",
            state.epoch,
            state.samples_seen,
            state.best_performance,
        );

        Ok(Self {
            model,
            optimizer,
            model_config,
            device,
            checkpoints,
            epoch:            state.epoch,
            samples_seen:     state.samples_seen,
            best_performance: state.best_performance,
            ensemble_member:  state.ensemble_member,
        })
    }
}
