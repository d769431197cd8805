// ============================================================
// Layer 2 - Run Configuration
// ============================================================
// Every setting of a training run in one serialisable struct.
//
// The configuration is read from a JSON file (all sections are
// optional and fall back to the defaults below), patched with
// command line overrides, validated, and finally written to the
// checkpoint directory so `evaluate` can rebuild the same model
// and the same validation split later.
//
// Example:
//   {
//     "data":      { "train": "data/train.jsonl", "val_fraction": 0.2 },
//     "training":  { "batchsize": 64, "epochs": 30, "seed": 7 },
//     "optimizer": { "lr": 0.001 },
//     "ensemble":  { "ensemble_type": "snapshot_ensemble",
//                    "ensemble_size": 5, "cycle_length": 6,
//                    "initial_lr": 0.1 }
//   }

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::domain::ensemble::{EnsembleError, EnsembleProperties};
use crate::domain::schedule::LrSchedule;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("data.train must name a sample file")]
    MissingTrainData,

    #[error("data.val and data.val_fraction are mutually exclusive")]
    ConflictingValidation,

    #[error("data.val_fraction must lie strictly between 0 and 1, got {0}")]
    InvalidValFraction(f64),

    #[error("{0} must be at least 1")]
    ZeroValue(&'static str),

    #[error("optimizer.lr must be positive, got {0}")]
    InvalidLearningRate(f64),

    #[error("model.dropout must lie in [0, 1), got {0}")]
    InvalidDropout(f64),

    #[error(transparent)]
    Ensemble(#[from] EnsembleError),
}

/// Compute backend used for training and evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// CPU via ndarray
    #[default]
    Ndarray,
    /// GPU via wgpu
    Wgpu,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Training samples (.jsonl)
    pub train:        String,
    /// Validation samples (.jsonl)
    pub val:          Option<String>,
    /// Carve a subject-aware validation split out of `train` instead
    pub val_fraction: Option<f64>,
    /// Z-score features with training statistics
    pub standardize:  bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batchsize: usize,
    /// Ignored when an ensemble is configured
    pub epochs:    usize,
    /// Shuffling and split seed
    pub seed:      u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self { batchsize: 32, epochs: 10, seed: 42 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Falls back to training.batchsize
    pub batchsize:        Option<usize>,
    /// Also write Tasks/Task_{i}_AUC summaries
    pub class_statistics: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub lr:            f64,
    pub weight_decay:  f64,
    pub max_grad_norm: Option<f64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { lr: 1e-3, weight_decay: 1e-4, max_grad_norm: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub hidden:  Vec<usize>,
    pub dropout: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { hidden: vec![256, 128], dropout: 0.2 }
    }
}

// ─── RunConfig ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub data:        DataConfig,
    /// Root directory for checkpoints, results and statistics
    pub workspace:   String,
    pub training:    TrainingConfig,
    pub evaluation:  Option<EvaluationConfig>,
    pub optimizer:   OptimizerConfig,
    pub lr_schedule: Option<LrSchedule>,
    pub ensemble:    Option<EnsembleProperties>,
    pub model:       ModelConfig,
    /// Data loader worker threads (at least one)
    pub workers:     usize,
    /// Log a progress line every `print_freq` batches
    pub print_freq:  usize,
    pub backend:     BackendKind,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data:        DataConfig::default(),
            workspace:   "workspace".to_string(),
            training:    TrainingConfig::default(),
            evaluation:  None,
            optimizer:   OptimizerConfig::default(),
            lr_schedule: None,
            ensemble:    None,
            model:       ModelConfig::default(),
            workers:     2,
            print_freq:  10,
            backend:     BackendKind::default(),
        }
    }
}

impl RunConfig {
    /// Read a configuration file; missing sections take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config '{}'", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data.train.trim().is_empty() {
            return Err(ConfigError::MissingTrainData);
        }
        if self.data.val.is_some() && self.data.val_fraction.is_some() {
            return Err(ConfigError::ConflictingValidation);
        }
        if let Some(f) = self.data.val_fraction {
            if !(f > 0.0 && f < 1.0) {
                return Err(ConfigError::InvalidValFraction(f));
            }
        }
        if self.training.batchsize == 0 {
            return Err(ConfigError::ZeroValue("training.batchsize"));
        }
        if self.ensemble.is_none() && self.training.epochs == 0 {
            return Err(ConfigError::ZeroValue("training.epochs"));
        }
        if self.evaluation.as_ref().and_then(|e| e.batchsize) == Some(0) {
            return Err(ConfigError::ZeroValue("evaluation.batchsize"));
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroValue("workers"));
        }
        if self.print_freq == 0 {
            return Err(ConfigError::ZeroValue("print_freq"));
        }
        if !(self.optimizer.lr > 0.0) {
            return Err(ConfigError::InvalidLearningRate(self.optimizer.lr));
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return Err(ConfigError::InvalidDropout(self.model.dropout));
        }
        if let Some(ensemble) = &self.ensemble {
            ensemble.validate()?;
        }
        Ok(())
    }

    /// Batch size used for validation passes.
    pub fn eval_batchsize(&self) -> usize {
        self.evaluation
            .as_ref()
            .and_then(|e| e.batchsize)
            .unwrap_or(self.training.batchsize)
    }

    pub fn class_statistics(&self) -> bool {
        self.evaluation.as_ref().map_or(false, |e| e.class_statistics)
    }
}
