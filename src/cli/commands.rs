// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `evaluate`, and their
// flags. `train` starts from an optional JSON run configuration
// and lets the most common settings be overridden per call.

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};

use crate::application::{config::{BackendKind, RunConfig}, evaluate_use_case::CheckpointSelector};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a classifier (or an ensemble) on labelled samples
    Train(TrainArgs),

    /// Validate a saved checkpoint or the averaged ensemble
    Evaluate(EvaluateArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    Ndarray,
    Wgpu,
}

impl From<BackendArg> for BackendKind {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Ndarray => BackendKind::Ndarray,
            BackendArg::Wgpu    => BackendKind::Wgpu,
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON run configuration; every section is optional
    #[arg(long)]
    pub config: Option<String>,

    /// Training samples (.jsonl), overrides data.train
    #[arg(long)]
    pub train_data: Option<String>,

    /// Validation samples (.jsonl), overrides data.val
    #[arg(long)]
    pub val_data: Option<String>,

    /// Directory for checkpoints, results and statistics
    #[arg(long)]
    pub workspace: Option<String>,

    /// Number of epochs (ignored when an ensemble is configured)
    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Base learning rate
    #[arg(long)]
    pub lr: Option<f64>,

    /// Shuffle and split seed
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Continue from the latest checkpoint in the workspace
    #[arg(long, default_value_t = false)]
    pub resume: bool,
}

/// Read the configuration file (or start from defaults) and apply
/// the command line overrides.
impl TryFrom<&TrainArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(a: &TrainArgs) -> Result<Self> {
        let mut cfg = match &a.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(train) = &a.train_data {
            cfg.data.train = train.clone();
        }
        if let Some(val) = &a.val_data {
            cfg.data.val = Some(val.clone());
            cfg.data.val_fraction = None;
        }
        if let Some(workspace) = &a.workspace {
            cfg.workspace = workspace.clone();
        }
        if let Some(epochs) = a.epochs {
            cfg.training.epochs = epochs;
        }
        if let Some(batch_size) = a.batch_size {
            cfg.training.batchsize = batch_size;
        }
        if let Some(lr) = a.lr {
            cfg.optimizer.lr = lr;
        }
        if let Some(seed) = a.seed {
            cfg.training.seed = seed;
        }
        if let Some(backend) = a.backend {
            cfg.backend = backend.into();
        }
        Ok(cfg)
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Workspace of a finished (or interrupted) training run
    #[arg(long, default_value = "workspace")]
    pub workspace: String,

    /// best | latest | ensemble-N | ensemble
    #[arg(long, default_value = "best")]
    pub checkpoint: CheckpointSelector,

    /// Average every ensemble member (same as --checkpoint ensemble)
    #[arg(long, default_value_t = false)]
    pub ensemble: bool,

    /// Evaluate on this file instead of the run's validation split
    #[arg(long)]
    pub val_data: Option<String>,

    #[arg(long)]
    pub batch_size: Option<usize>,
}

impl EvaluateArgs {
    pub fn selector(&self) -> CheckpointSelector {
        if self.ensemble {
            CheckpointSelector::Ensemble
        } else {
            self.checkpoint
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(std::iter::once("multilabel-trainer").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn test_train_overrides_defaults() {
        let Commands::Train(args) = parse(&[
            "train", "--train-data", "t.jsonl", "--epochs", "3", "--lr", "0.01",
            "--backend", "wgpu", "--resume",
        ]) else {
            panic!("expected train");
        };
        assert!(args.resume);
        let cfg = RunConfig::try_from(&args).unwrap();
        assert_eq!(cfg.data.train, "t.jsonl");
        assert_eq!(cfg.training.epochs, 3);
        assert_eq!(cfg.optimizer.lr, 0.01);
        assert_eq!(cfg.backend, BackendKind::Wgpu);
        assert_eq!(cfg.training.batchsize, 32);
    }

    #[test]
    fn test_val_data_replaces_val_fraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"data": {"train": "a.jsonl", "val_fraction": 0.2}}"#).unwrap();

        let Commands::Train(args) = parse(&[
            "train", "--config", path.to_str().unwrap(), "--val-data", "v.jsonl",
        ]) else {
            panic!("expected train");
        };
        let cfg = RunConfig::try_from(&args).unwrap();
        assert_eq!(cfg.data.val.as_deref(), Some("v.jsonl"));
        assert_eq!(cfg.data.val_fraction, None);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_evaluate_selector() {
        let Commands::Evaluate(args) = parse(&["evaluate", "--checkpoint", "ensemble-2"]) else {
            panic!("expected evaluate");
        };
        assert_eq!(args.selector(), CheckpointSelector::Member(2));

        let Commands::Evaluate(args) = parse(&["evaluate", "--ensemble"]) else {
            panic!("expected evaluate");
        };
        assert_eq!(args.selector(), CheckpointSelector::Ensemble);

        assert!(Cli::try_parse_from(["multilabel-trainer", "evaluate", "--checkpoint", "worst"]).is_err());
    }
}
