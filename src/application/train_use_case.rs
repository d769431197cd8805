// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Validate the run configuration     (Layer 2)
//   Step 2: Create the workspace directories   (Layer 6 - infra)
//   Step 3: Load + split + standardise samples (Layer 4 - data)
//   Step 4: Save run config, model config and
//           feature statistics                 (Layer 6 - infra)
//   Step 5: Run the epoch loop                 (Layer 5 - ml)
//
// The interrupt flag is passed through to the epoch loop, which
// turns Ctrl-C into an orderly stop with a `user_abort` checkpoint.

use anyhow::{bail, Result};

use crate::application::{
    config::RunConfig,
    datasets::{prepare_training_data, MODEL_CONFIG_FILE, STANDARDIZER_FILE},
};
use crate::data::dataset::MultiLabelDataset;
use crate::infra::{
    checkpoint::{CheckpointManager, REGULAR_CHECKPOINT},
    interrupt::InterruptFlag,
    workspace::Workspace,
};
use crate::ml::trainer::{classifier_config, run_training, TrainOutcome, TrainingData};

pub struct TrainUseCase {
    config: RunConfig,
    resume: bool,
}

impl TrainUseCase {
    pub fn new(config: RunConfig, resume: bool) -> Self {
        Self { config, resume }
    }

    pub fn execute(&self, interrupt: &InterruptFlag) -> Result<TrainOutcome> {
        let cfg = &self.config;

        // ── Step 1: Configuration ─────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Workspace ─────────────────────────────────────────────────
        let workspace   = Workspace::create(&cfg.workspace)?;
        let checkpoints = CheckpointManager::new(&workspace.checkpoint_dir);
        if self.resume && !checkpoints.has_checkpoint(REGULAR_CHECKPOINT) {
            bail!(
                "--resume given but '{}' holds no checkpoint",
                workspace.checkpoint_dir.display()
            );
        }
        tracing::info!("Workspace: '{}'", workspace.root.display());

        // ── Step 3: Samples ───────────────────────────────────────────────────
        let prepared = prepare_training_data(&cfg.data, cfg.training.seed)?;
        let train = MultiLabelDataset::new(prepared.train);
        let val   = prepared.val.map(MultiLabelDataset::new);

        // ── Step 4: Run metadata for `evaluate` ───────────────────────────────
        checkpoints.save_config(cfg)?;
        let model_config = classifier_config(cfg, train.num_features(), train.num_classes());
        checkpoints.save_json(MODEL_CONFIG_FILE, &model_config)?;
        if let Some(standardizer) = &prepared.standardizer {
            checkpoints.save_json(STANDARDIZER_FILE, standardizer)?;
        }

        // ── Step 5: Epoch loop ────────────────────────────────────────────────
        run_training(cfg, TrainingData { train, val }, &workspace, self.resume, interrupt)
    }
}
