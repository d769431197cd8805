// ============================================================
// Layer 6 - Checkpoint Manager
// ============================================================
// Saves and restores training state using Burn's CompactRecorder.
//
// Every named checkpoint is up to three files:
//   {name}.mpk.gz        model weights
//   {name}_optim.mpk.gz  optimizer state (regular / abort only)
//   {name}.json          TrainingState: epoch, samples seen,
//                        best and current performance, member
//
// Names in use:
//   checkpoint      latest state after each epoch (used by --resume)
//   model_best      weights with the best validation AUC so far
//   ensemble_{m}    weights of ensemble member m
//   user_abort      state written when a run stops early
//
// Plus run-level metadata:
//   train_config.json   RunConfig, so evaluate can rebuild the model
//   model_config.json   ClassifierConfig with the data dimensions
//   standardizer.json   feature statistics (if standardisation is on)

use anyhow::{Context, Result};
use burn::{
    optim::Optimizer,
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::config::RunConfig;
use crate::ml::model::MultiLabelClassifier;

pub const REGULAR_CHECKPOINT: &str = "checkpoint";
pub const BEST_CHECKPOINT: &str = "model_best";
pub const ABORT_CHECKPOINT: &str = "user_abort";

const CONFIG_FILE: &str = "train_config.json";

/// Name of the checkpoint holding ensemble member `member`.
pub fn ensemble_checkpoint(member: usize) -> String {
    format!("ensemble_{member}")
}

/// Progress metadata stored next to every checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Epochs completed; training resumes at this epoch index
    pub epoch:            usize,
    pub samples_seen:     usize,
    pub best_performance: Option<f64>,
    /// Validation AUC of these weights, -1 when unknown
    pub performance:      f64,
    /// Ensemble member being trained when the checkpoint was taken
    pub ensemble_member:  usize,
}

/// Manages saving and loading of checkpoints in one directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).ok();
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ─── Weights ──────────────────────────────────────────────────────────────

    pub fn save_model<B: Backend>(&self, name: &str, model: &MultiLabelClassifier<B>) -> Result<()> {
        let path = self.dir.join(name);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save model to '{}'", path.display()))?;
        Ok(())
    }

    /// Restore weights into `model`, whose architecture must match.
    pub fn load_model<B: Backend>(
        &self,
        name:   &str,
        model:  MultiLabelClassifier<B>,
        device: &B::Device,
    ) -> Result<MultiLabelClassifier<B>> {
        let path = self.dir.join(name);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load model '{}'", path.display()))?;
        Ok(model.load_record(record))
    }

    // ─── Optimizer ────────────────────────────────────────────────────────────

    pub fn save_optimizer<B, O>(&self, name: &str, optimizer: &O) -> Result<()>
    where
        B: AutodiffBackend,
        O: Optimizer<MultiLabelClassifier<B>, B>,
    {
        let path = self.dir.join(format!("{name}_optim"));
        CompactRecorder::new()
            .record(optimizer.to_record(), path.clone())
            .with_context(|| format!("Failed to save optimizer to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_optimizer<B, O>(&self, name: &str, optimizer: O, device: &B::Device) -> Result<O>
    where
        B: AutodiffBackend,
        O: Optimizer<MultiLabelClassifier<B>, B>,
    {
        let path = self.dir.join(format!("{name}_optim"));
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load optimizer '{}'", path.display()))?;
        Ok(optimizer.load_record(record))
    }

    // ─── State ────────────────────────────────────────────────────────────────

    pub fn save_state(&self, name: &str, state: &TrainingState) -> Result<()> {
        self.save_json(&format!("{name}.json"), state)
    }

    pub fn load_state(&self, name: &str) -> Result<TrainingState> {
        self.load_json(&format!("{name}.json"))
    }

    /// True when a checkpoint called `name` has been written.
    pub fn has_checkpoint(&self, name: &str) -> bool {
        self.dir.join(format!("{name}.json")).exists()
    }

    /// Indices of every saved ensemble member, ascending.
    pub fn ensemble_members(&self) -> Result<Vec<usize>> {
        let mut members = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read '{}'", self.dir.display()))?
        {
            let file_name = entry?.file_name();
            let Some(name) = file_name.to_str() else { continue };
            let member = name
                .strip_prefix("ensemble_")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|idx| idx.parse::<usize>().ok());
            if let Some(m) = member {
                members.push(m);
            }
        }
        members.sort_unstable();
        Ok(members)
    }

    // ─── Run metadata ─────────────────────────────────────────────────────────

    pub fn save_config(&self, cfg: &RunConfig) -> Result<()> {
        self.save_json(CONFIG_FILE, cfg)
    }

    pub fn load_config(&self) -> Result<RunConfig> {
        self.load_json(CONFIG_FILE).with_context(|| {
            format!(
                "No run configuration in '{}'. Has this workspace been trained?",
                self.dir.display()
            )
        })
    }

    pub fn save_json<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(())
    }

    pub fn load_json<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let path = self.dir.join(file);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Corrupt '{}'", path.display()))
    }
}
