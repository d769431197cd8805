// ============================================================
// Layer 2 - EvaluateUseCase
// ============================================================
// Validates a trained checkpoint without training:
//
//   best         model_best   (highest validation AUC)
//   latest       checkpoint   (last completed epoch)
//   ensemble-N   ensemble_N   (one ensemble member)
//   ensemble     every ensemble_{m}, probabilities averaged
//
// The run configuration, model configuration and feature
// statistics saved by `train` rebuild the architecture and the
// validation split; --val-data evaluates on another file instead.
//
// Results land next to the training ones:
//   results/step-{samples_seen}-eval_{checkpoint}.json.gz
//   statistics/evaluate.events.csv + evaluate.json

use anyhow::{bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    data::dataloader::DataLoaderBuilder,
    prelude::*,
};
use std::{fmt, str::FromStr};
use thiserror::Error;

use crate::application::{
    config::{BackendKind, RunConfig},
    datasets::{prepare_validation_data, MODEL_CONFIG_FILE, STANDARDIZER_FILE},
};
use crate::data::{batcher::MultiLabelBatcher, dataset::MultiLabelDataset, preprocessor::Standardizer};
use crate::domain::traits::ScalarSink;
use crate::infra::{
    checkpoint::{ensemble_checkpoint, CheckpointManager, BEST_CHECKPOINT, REGULAR_CHECKPOINT},
    metrics::SummaryWriter,
    results::ResultStore,
    workspace::Workspace,
};
use crate::ml::{
    evaluator::{validate, ValidationReport, ValidationRequest},
    model::ClassifierConfig,
    predictor::EnsemblePredictor,
};

#[derive(Debug, Error, PartialEq)]
#[error("unknown checkpoint '{0}', expected best, latest, ensemble or ensemble-N")]
pub struct SelectorError(String);

/// Which weights `evaluate` loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointSelector {
    Best,
    Latest,
    Member(usize),
    Ensemble,
}

impl FromStr for CheckpointSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best" => Ok(Self::Best),
            "latest" => Ok(Self::Latest),
            "ensemble" => Ok(Self::Ensemble),
            other => other
                .strip_prefix("ensemble-")
                .and_then(|m| m.parse().ok())
                .map(Self::Member)
                .ok_or_else(|| SelectorError(other.to_string())),
        }
    }
}

impl fmt::Display for CheckpointSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best      => write!(f, "best"),
            Self::Latest    => write!(f, "latest"),
            Self::Member(m) => write!(f, "ensemble-{m}"),
            Self::Ensemble  => write!(f, "ensemble"),
        }
    }
}

pub struct EvaluateUseCase {
    workspace:  String,
    selector:   CheckpointSelector,
    val_data:   Option<String>,
    batch_size: Option<usize>,
}

/// Everything loaded from the workspace before a backend is chosen.
struct EvaluationInputs {
    cfg:          RunConfig,
    workspace:    Workspace,
    checkpoints:  CheckpointManager,
    model_config: ClassifierConfig,
    dataset:      MultiLabelDataset,
    samples_seen: usize,
}

impl EvaluateUseCase {
    pub fn new(
        workspace:  String,
        selector:   CheckpointSelector,
        val_data:   Option<String>,
        batch_size: Option<usize>,
    ) -> Self {
        Self { workspace, selector, val_data, batch_size }
    }

    pub fn execute(&self) -> Result<ValidationReport> {
        let workspace = Workspace::at(&self.workspace);
        if !workspace.checkpoint_dir.is_dir() {
            bail!("No checkpoints under '{}'", workspace.root.display());
        }
        let checkpoints = CheckpointManager::new(&workspace.checkpoint_dir);
        let cfg         = checkpoints.load_config()?;
        cfg.validate()?;

        let standardizer: Option<Standardizer> = if cfg.data.standardize {
            Some(checkpoints.load_json(STANDARDIZER_FILE)?)
        } else {
            None
        };
        let samples = prepare_validation_data(&cfg, self.val_data.as_deref(), standardizer.as_ref())?;
        let dataset = MultiLabelDataset::new(samples);

        let model_config: ClassifierConfig = checkpoints.load_json(MODEL_CONFIG_FILE)?;
        if dataset.num_features() != model_config.num_features
            || dataset.num_classes() != model_config.num_classes
        {
            bail!(
                "Validation data has {} features / {} classes, the model expects {} / {}",
                dataset.num_features(),
                dataset.num_classes(),
                model_config.num_features,
                model_config.num_classes,
            );
        }

        let samples_seen = self.samples_seen(&checkpoints)?;
        tracing::info!(
            "Evaluating '{}' checkpoint ({} samples seen) on {} samples",
            self.selector,
            samples_seen,
            dataset.samples().len(),
        );

        let backend = cfg.backend;
        let inputs = EvaluationInputs {
            cfg,
            workspace,
            checkpoints,
            model_config,
            dataset,
            samples_seen,
        };
        match backend {
            BackendKind::Ndarray => self.evaluate_on::<NdArray>(inputs, NdArrayDevice::default()),
            BackendKind::Wgpu => self.evaluate_on::<Wgpu>(inputs, WgpuDevice::default()),
        }
    }

    /// Training progress of the selected weights, used as the result step.
    fn samples_seen(&self, checkpoints: &CheckpointManager) -> Result<usize> {
        let name = match self.selector {
            CheckpointSelector::Best      => BEST_CHECKPOINT.to_string(),
            CheckpointSelector::Latest    => REGULAR_CHECKPOINT.to_string(),
            CheckpointSelector::Member(m) => ensemble_checkpoint(m),
            CheckpointSelector::Ensemble  => match checkpoints.ensemble_members()?.last() {
                Some(&last) => ensemble_checkpoint(last),
                None => bail!("The run has not written any ensemble members"),
            },
        };
        if !checkpoints.has_checkpoint(&name) {
            bail!("No '{}' checkpoint in '{}'", name, checkpoints.dir().display());
        }
        Ok(checkpoints.load_state(&name)?.samples_seen)
    }

    fn evaluate_on<B: Backend>(&self, inputs: EvaluationInputs, device: B::Device) -> Result<ValidationReport> {
        let EvaluationInputs { cfg, workspace, checkpoints, model_config, dataset, samples_seen } = inputs;

        let batch_size = self.batch_size.unwrap_or_else(|| cfg.eval_batchsize());
        let loader = DataLoaderBuilder::new(MultiLabelBatcher::<B>::new(device.clone()))
            .batch_size(batch_size)
            .num_workers(cfg.workers)
            .build(dataset);

        let results = ResultStore::new(&workspace.results_dir);
        let mut summary = SummaryWriter::new(&workspace.statistics_dir, "evaluate")?;
        let split = format!("eval_{}", self.selector.to_string().replace('-', "_"));

        let request = ValidationRequest {
            split:            &split,
            samples_seen,
            batch_size,
            num_classes:      model_config.num_classes,
            print_freq:       cfg.print_freq,
            class_statistics: cfg.class_statistics(),
            results:          Some(&results),
            summary:          Some(&mut summary as &mut dyn ScalarSink),
        };

        let report = match self.selector {
            CheckpointSelector::Ensemble => {
                let members   = checkpoints.ensemble_members()?;
                let predictor = EnsemblePredictor::<B>::from_checkpoints(
                    &checkpoints, &model_config, &members, &device,
                )?;
                tracing::info!("Averaging {} ensemble members", predictor.len());
                validate(&predictor, loader.as_ref(), request)?
            }
            selector => {
                let name = match selector {
                    CheckpointSelector::Best      => BEST_CHECKPOINT.to_string(),
                    CheckpointSelector::Member(m) => ensemble_checkpoint(m),
                    _                             => REGULAR_CHECKPOINT.to_string(),
                };
                let model = checkpoints.load_model(&name, model_config.init::<B>(&device), &device)?;
                validate(&model, loader.as_ref(), request)?
            }
        };

        tracing::info!("Summaries written to '{}'", summary.events_path().display());
        summary.export_scalars_to_json(workspace.statistics_dir.join("evaluate.json"))?;
        summary.close()?;
        Ok(report)
    }
}
