// ============================================================
// Layer 5 - Training Loop
// ============================================================
// Epoch loop with validation, ensemble checkpoints and an abort
// guard, on any burn autodiff backend.
//
// Key burn points:
//   - Training runs on B (Autodiff<..>) so gradients are tracked
//   - model.valid() returns the model on B::InnerBackend, so the
//     validation batcher is built on the inner backend as well
//   - Both backends share one device type
//
// Per epoch:
//   lr  ← cyclic annealing (snapshot) | lr_schedule | optimizer lr
//   train one epoch, then validate, then save `checkpoint`
//   (and `model_best` when the mean AUC improved)
//   at every cycle end save `ensemble_{m}`; deep ensembles then
//   restart from fresh weights and a fresh optimizer
//
// However the loop ends, a run that did not complete every epoch
// leaves a `user_abort` checkpoint, and the summary writers are
// always exported and closed before the result is returned.

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    data::{dataloader::{DataLoader, DataLoaderBuilder}, dataset::Dataset},
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamWConfig, Optimizer},
    tensor::backend::AutodiffBackend,
};
use std::{sync::Arc, time::Instant};
use thiserror::Error;

use crate::application::config::{BackendKind, OptimizerConfig, RunConfig};
use crate::data::{
    batcher::{MultiLabelBatch, MultiLabelBatcher},
    dataset::MultiLabelDataset,
};
use crate::domain::{
    ensemble::EpochPlan,
    metrics::{accuracy, AverageMeter},
    schedule::learning_rate_for_epoch,
    traits::ScalarSink,
};
use crate::infra::{
    checkpoint::{CheckpointManager, ABORT_CHECKPOINT, REGULAR_CHECKPOINT},
    interrupt::InterruptFlag,
    metrics::SummaryWriters,
    results::ResultStore,
    workspace::Workspace,
};
use crate::ml::{
    evaluator::{validate, ValidationRequest},
    model::{ClassifierConfig, MultiLabelClassifier},
    session::TrainingSession,
};

/// Performance stored for checkpoints that were never validated.
pub const UNKNOWN_PERFORMANCE: f64 = -1.0;

#[derive(Debug, Error, PartialEq)]
pub enum TrainError {
    #[error("training interrupted during epoch {epoch} after {samples_seen} samples")]
    Interrupted { epoch: usize, samples_seen: usize },

    #[error("the training split is empty")]
    EmptyTrainingSet,
}

/// How a completed run ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOutcome {
    pub epochs_completed: usize,
    pub samples_seen:     usize,
    pub best_performance: Option<f64>,
    /// Ensemble members written by this and earlier (resumed) sessions
    pub ensemble_members: usize,
}

/// Datasets of one run; `val` is optional.
pub struct TrainingData {
    pub train: MultiLabelDataset,
    pub val:   Option<MultiLabelDataset>,
}

/// Classifier architecture for the given data dimensions.
pub fn classifier_config(cfg: &RunConfig, num_features: usize, num_classes: usize) -> ClassifierConfig {
    ClassifierConfig::new(num_features, num_classes)
        .with_hidden(cfg.model.hidden.clone())
        .with_dropout(cfg.model.dropout)
}

fn adamw_config(cfg: &OptimizerConfig) -> AdamWConfig {
    // θ ← θ - lr · (m̂ / (√v̂ + ε) + λ·θ)
    let optim = AdamWConfig::new()
        .with_epsilon(1e-8)
        .with_weight_decay(cfg.weight_decay as f32);
    match cfg.max_grad_norm {
        Some(norm) => optim.with_grad_clipping(Some(GradientClippingConfig::Norm(norm as f32))),
        None => optim,
    }
}

fn adamw<B: AutodiffBackend>(cfg: &AdamWConfig) -> impl Optimizer<MultiLabelClassifier<B>, B> {
    cfg.init()
}

pub fn run_training(
    cfg:       &RunConfig,
    data:      TrainingData,
    workspace: &Workspace,
    resume:    bool,
    interrupt: &InterruptFlag,
) -> Result<TrainOutcome> {
    match cfg.backend {
        BackendKind::Ndarray => {
            let device = NdArrayDevice::default();
            tracing::info!("Using NdArray device: {:?}", device);
            train_loop::<Autodiff<NdArray>>(cfg, data, workspace, resume, interrupt, device)
        }
        BackendKind::Wgpu => {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            train_loop::<Autodiff<Wgpu>>(cfg, data, workspace, resume, interrupt, device)
        }
    }
}

pub fn train_loop<B: AutodiffBackend>(
    cfg:       &RunConfig,
    data:      TrainingData,
    workspace: &Workspace,
    resume:    bool,
    interrupt: &InterruptFlag,
    device:    B::Device,
) -> Result<TrainOutcome> {
    let TrainingData { train, val } = data;
    if train.is_empty() {
        return Err(TrainError::EmptyTrainingSet.into());
    }
    let train_len   = train.len();
    let num_classes = train.num_classes();

    // ── Model + AdamW ─────────────────────────────────────────────────────────
    let model_config = classifier_config(cfg, train.num_features(), num_classes);
    let optim_config = adamw_config(&cfg.optimizer);
    let checkpoints  = CheckpointManager::new(&workspace.checkpoint_dir);

    let mut session = TrainingSession::new(
        model_config,
        adamw::<B>(&optim_config),
        checkpoints,
        device.clone(),
    );
    if resume {
        session = session.resume()?;
    }
    tracing::info!(
        "Model ready: {} features → {:?} → {} classes",
        train.num_features(),
        cfg.model.hidden,
        num_classes,
    );

    // ── Training loader (autodiff backend, shuffled) ──────────────────────────
    let train_loader = DataLoaderBuilder::new(MultiLabelBatcher::<B>::new(device.clone()))
        .batch_size(cfg.training.batchsize)
        .shuffle(cfg.training.seed)
        .num_workers(cfg.workers)
        .build(train);

    // ── Validation loader (inner backend, in order) ───────────────────────────
    let val_loader = val.map(|val| {
        tracing::info!("Validating on {} samples", val.len());
        DataLoaderBuilder::new(MultiLabelBatcher::<B::InnerBackend>::new(device.clone()))
            .batch_size(cfg.eval_batchsize())
            .num_workers(cfg.workers)
            .build(val)
    });

    let mut summaries = SummaryWriters::open(&workspace.statistics_dir, &["train", "val"])?;
    let results = ResultStore::new(&workspace.results_dir);

    let plan = EpochPlan::new(cfg.training.epochs, cfg.ensemble.as_ref());
    let run = EpochRun {
        cfg,
        plan: &plan,
        train_loader,
        val_loader,
        results: &results,
        train_len,
        num_classes,
        interrupt,
    };

    let outcome = run.epochs(&mut session, &mut summaries, || adamw::<B>(&optim_config));

    // ── Abort guard ───────────────────────────────────────────────────────────
    if session.epoch != plan.total_epochs {
        tracing::warn!(
            "Stopped after {} of {} epochs, saving current state as '{}'",
            session.epoch,
            plan.total_epochs,
            ABORT_CHECKPOINT,
        );
        if let Err(e) = session.save_checkpoint(ABORT_CHECKPOINT, UNKNOWN_PERFORMANCE, false) {
            tracing::error!("Saving '{}' failed: {:#}", ABORT_CHECKPOINT, e);
        }
    }

    tracing::info!("Closing summary writers");
    let closed = summaries.close_all();
    let outcome = outcome?;
    closed?;

    tracing::info!("Training complete!");
    Ok(outcome)
}

// ─── EpochRun ─────────────────────────────────────────────────────────────────
/// Everything the epoch loop reads but never changes.
struct EpochRun<'a, B: AutodiffBackend> {
    cfg:          &'a RunConfig,
    plan:         &'a EpochPlan,
    train_loader: Arc<dyn DataLoader<MultiLabelBatch<B>>>,
    val_loader:   Option<Arc<dyn DataLoader<MultiLabelBatch<B::InnerBackend>>>>,
    results:      &'a ResultStore,
    train_len:    usize,
    num_classes:  usize,
    interrupt:    &'a InterruptFlag,
}

impl<'a, B: AutodiffBackend> EpochRun<'a, B> {
    fn epochs<O, F>(
        &self,
        session:       &mut TrainingSession<B, O>,
        summaries:     &mut SummaryWriters,
        new_optimizer: F,
    ) -> Result<TrainOutcome>
    where
        O: Optimizer<MultiLabelClassifier<B>, B>,
        F: Fn() -> O,
    {
        let start_epoch = session.epoch;

        if let Some(props) = &self.plan.ensemble {
            tracing::info!(
                "Running {} of {} members with {} epochs each (total: {})",
                props.ensemble_type,
                props.ensemble_size,
                props.cycle_length,
                props.total_epochs(),
            );
            session.ensemble_member = props.member_for_epoch(start_epoch);
            tracing::info!("Training ensemble member: {}", session.ensemble_member);
        }

        if start_epoch == 0 {
            self.validate(session, 0, summaries)?;
        }

        for epoch in start_epoch..self.plan.total_epochs {
            self.train_epoch(session, epoch, summaries)?;
            session.epoch = epoch + 1;

            let mut performance = UNKNOWN_PERFORMANCE;
            match self.validate(session, (epoch + 1) * self.train_len, summaries)? {
                Some(auc) => {
                    performance = auc;
                    let is_best = session.best_performance.map_or(true, |best| auc > best);
                    if is_best {
                        session.best_performance = Some(auc);
                    }
                    session.save_checkpoint(REGULAR_CHECKPOINT, auc, is_best)?;
                }
                None => session.save_checkpoint(REGULAR_CHECKPOINT, UNKNOWN_PERFORMANCE, false)?,
            }

            let Some(props) = &self.plan.ensemble else { continue };
            if !props.completes_member(epoch) {
                continue;
            }

            let member = session.ensemble_member;
            tracing::info!("Saving ensemble member {} (epochs {})", member, epoch + 1);
            session.save_ensemble_checkpoint(member, performance)?;
            session.ensemble_member += 1;

            if props.reinitialises_between_members() && session.ensemble_member < props.ensemble_size {
                tracing::info!("Re-initialising model weights for next cycle");
                session.re_initialise(new_optimizer());
                session.save_checkpoint(REGULAR_CHECKPOINT, UNKNOWN_PERFORMANCE, false)?;
            }
        }

        Ok(TrainOutcome {
            epochs_completed: session.epoch,
            samples_seen:     session.samples_seen,
            best_performance: session.best_performance,
            ensemble_members: session.ensemble_member,
        })
    }

    fn train_epoch<O>(
        &self,
        session:   &mut TrainingSession<B, O>,
        epoch:     usize,
        summaries: &mut SummaryWriters,
    ) -> Result<()>
    where
        O: Optimizer<MultiLabelClassifier<B>, B>,
    {
        let lr = learning_rate_for_epoch(
            epoch,
            self.cfg.optimizer.lr,
            self.plan.ensemble.as_ref(),
            self.cfg.lr_schedule.as_ref(),
        );
        match &self.plan.ensemble {
            Some(props) => tracing::info!(
                "Epoch: {}, Cycle length: {}, Learning rate: {:.6}",
                epoch, props.cycle_length, lr,
            ),
            None => tracing::info!("Epoch: {}, Learning rate: {:.6}", epoch, lr),
        }

        let mut batch_time = AverageMeter::new();
        let mut data_time  = AverageMeter::new();
        let mut losses     = AverageMeter::new();
        let mut accuracies = AverageMeter::new();

        let num_batches = self.train_len.div_ceil(self.cfg.training.batchsize);
        let mut summary = summaries.get_mut("train").map(|s| s as &mut dyn ScalarSink);

        let mut end = Instant::now();
        for (i, batch) in self.train_loader.iter().enumerate() {
            if self.interrupt.is_raised() {
                return Err(TrainError::Interrupted {
                    epoch,
                    samples_seen: session.samples_seen,
                }
                .into());
            }
            data_time.update(end.elapsed().as_secs_f64(), 1);

            let n = batch.len();
            let width = self.num_classes;
            let target_width = batch.target_values.len() / n.max(1);
            let targets: Vec<f32> = batch
                .target_values
                .chunks(target_width.max(1))
                .flat_map(|row| row.iter().take(width).copied())
                .collect();

            let step = session.train_step(batch, lr)?;

            losses.update(step.loss, n);
            accuracies.update(accuracy(&step.probabilities, &targets), n);

            batch_time.update(end.elapsed().as_secs_f64(), 1);
            end = Instant::now();

            session.samples_seen += n;
            if let Some(summary) = summary.as_deref_mut() {
                let seen = session.samples_seen;
                summary.add_scalar("Loss", losses.val, seen)?;
                summary.add_scalar("Accuracy", accuracies.val, seen)?;
                summary.add_scalar("Learning_Rate", lr, seen)?;
                summary.add_scalar("Epoch", epoch as f64, seen)?;
            }

            if i % self.cfg.print_freq == 0 {
                tracing::info!(
                    "Epoch: [{}][{}/{}]\tTime {:.3} ({:.3})\tData {:.3} ({:.3})\t\
                     Loss {:.4} ({:.4})\tAccuracy {:.3} ({:.3})\tLearning Rate {:.3}",
                    epoch, i, num_batches,
                    batch_time.val, batch_time.avg,
                    data_time.val, data_time.avg,
                    losses.val, losses.avg,
                    accuracies.val, accuracies.avg,
                    lr,
                );
            }
        }
        Ok(())
    }

    /// Validate the current weights; `None` when the run has no val split.
    fn validate<O>(
        &self,
        session:      &TrainingSession<B, O>,
        samples_seen: usize,
        summaries:    &mut SummaryWriters,
    ) -> Result<Option<f64>>
    where
        O: Optimizer<MultiLabelClassifier<B>, B>,
    {
        let Some(loader) = &self.val_loader else { return Ok(None) };

        // dropout disabled, no autodiff graph
        let model = session.model.valid();
        let report = validate(
            &model,
            loader.as_ref(),
            ValidationRequest {
                split:            "val",
                samples_seen,
                batch_size:       self.cfg.eval_batchsize(),
                num_classes:      self.num_classes,
                print_freq:       self.cfg.print_freq,
                class_statistics: self.cfg.class_statistics(),
                results:          Some(self.results),
                summary:          summaries.get_mut("val").map(|s| s as &mut dyn ScalarSink),
            },
        )?;
        Ok(Some(report.auc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::DataConfig;
    use crate::domain::ensemble::{EnsembleProperties, EnsembleType};
    use crate::domain::sample::Sample;
    use crate::infra::checkpoint::{ensemble_checkpoint, BEST_CHECKPOINT};
    use crate::ml::predictor::Predictor;
    use burn::tensor::Tensor;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn dataset(n: usize, offset: usize) -> MultiLabelDataset {
        let samples = (0..n)
            .map(|i| {
                let x = if i % 2 == 0 { 1.0 } else { -1.0 };
                Sample::new(
                    format!("p-{}-v", i + offset),
                    vec![x, -x, 0.5 * x],
                    vec![x, -x],
                )
            })
            .collect();
        MultiLabelDataset::new(samples)
    }

    fn config(epochs: usize) -> RunConfig {
        let mut cfg = RunConfig {
            data: DataConfig { train: "unused".into(), ..Default::default() },
            ..Default::default()
        };
        cfg.training.epochs = epochs;
        cfg.training.batchsize = 4;
        cfg.model.hidden = vec![8];
        cfg.model.dropout = 0.0;
        cfg.optimizer.lr = 0.01;
        cfg.workers = 1;
        cfg
    }

    fn run(
        cfg: &RunConfig,
        ws: &Workspace,
        val: bool,
        resume: bool,
        interrupt: &InterruptFlag,
    ) -> Result<TrainOutcome> {
        let data = TrainingData {
            train: dataset(12, 0),
            val:   val.then(|| dataset(6, 100)),
        };
        train_loop::<TestBackend>(cfg, data, ws, resume, interrupt, Default::default())
    }

    #[test]
    fn test_plain_run_writes_checkpoints_and_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).unwrap();
        let outcome = run(&config(2), &ws, true, false, &InterruptFlag::new()).unwrap();

        assert_eq!(outcome.epochs_completed, 2);
        assert_eq!(outcome.samples_seen, 24);
        assert!(outcome.best_performance.is_some());

        let checkpoints = CheckpointManager::new(&ws.checkpoint_dir);
        assert!(checkpoints.has_checkpoint(REGULAR_CHECKPOINT));
        assert!(checkpoints.has_checkpoint(BEST_CHECKPOINT));
        assert!(!checkpoints.has_checkpoint(ABORT_CHECKPOINT));

        // initial validation at step 0 plus one per epoch
        let results = ResultStore::new(&ws.results_dir);
        for step in [0, 12, 24] {
            assert!(results.path_for(step, "val").exists(), "step {step}");
        }
        assert!(ws.statistics_dir.join("train.json").exists());
        assert!(ws.statistics_dir.join("val.json").exists());
    }

    #[test]
    fn test_snapshot_ensemble_saves_every_member() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).unwrap();
        let mut cfg = config(99);
        cfg.ensemble = Some(EnsembleProperties {
            ensemble_type: EnsembleType::SnapshotEnsemble,
            ensemble_size: 3,
            cycle_length:  2,
            initial_lr:    Some(0.05),
        });

        let outcome = run(&cfg, &ws, false, false, &InterruptFlag::new()).unwrap();
        assert_eq!(outcome.epochs_completed, 6);
        assert_eq!(outcome.ensemble_members, 3);
        assert_eq!(outcome.best_performance, None);

        let checkpoints = CheckpointManager::new(&ws.checkpoint_dir);
        assert_eq!(checkpoints.ensemble_members().unwrap(), vec![0, 1, 2]);
        let state = checkpoints.load_state(&ensemble_checkpoint(1)).unwrap();
        assert_eq!(state.epoch, 4);
        assert_eq!(state.performance, UNKNOWN_PERFORMANCE);
    }

    #[test]
    fn test_deep_ensemble_with_validation() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).unwrap();
        let mut cfg = config(1);
        cfg.ensemble = Some(EnsembleProperties {
            ensemble_type: EnsembleType::DeepEnsemble,
            ensemble_size: 2,
            cycle_length:  1,
            initial_lr:    None,
        });

        let outcome = run(&cfg, &ws, true, false, &InterruptFlag::new()).unwrap();
        assert_eq!(outcome.ensemble_members, 2);

        let checkpoints = CheckpointManager::new(&ws.checkpoint_dir);
        let member = checkpoints.load_state(&ensemble_checkpoint(0)).unwrap();
        assert!((0.0..=1.0).contains(&member.performance));
    }

    #[test]
    fn test_deep_ensemble_members_start_from_fresh_weights() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).unwrap();
        let mut cfg = config(1);
        cfg.ensemble = Some(EnsembleProperties {
            ensemble_type: EnsembleType::DeepEnsemble,
            ensemble_size: 2,
            cycle_length:  1,
            initial_lr:    None,
        });
        run(&cfg, &ws, false, false, &InterruptFlag::new()).unwrap();

        let device = Default::default();
        let checkpoints = CheckpointManager::new(&ws.checkpoint_dir);
        let model_config = classifier_config(&cfg, 3, 2);
        let outputs: Vec<Vec<f32>> = (0..2)
            .map(|m| {
                let model = checkpoints
                    .load_model(&ensemble_checkpoint(m), model_config.init::<NdArray<f32>>(&device), &device)
                    .unwrap();
                let inputs = Tensor::<NdArray<f32>, 2>::from_floats([[1.0f32, -1.0, 0.5]], &device);
                model.predict(inputs).into_data().to_vec::<f32>().unwrap()
            })
            .collect();
        assert_ne!(outputs[0], outputs[1]);

        let first  = checkpoints.load_state(&ensemble_checkpoint(0)).unwrap();
        let second = checkpoints.load_state(&ensemble_checkpoint(1)).unwrap();
        assert_eq!((first.epoch, first.ensemble_member), (1, 0));
        assert_eq!((second.epoch, second.ensemble_member), (2, 1));
    }

    #[test]
    fn test_resumed_ensemble_continues_member_numbering() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).unwrap();
        let snapshot = |size| EnsembleProperties {
            ensemble_type: EnsembleType::SnapshotEnsemble,
            ensemble_size: size,
            cycle_length:  2,
            initial_lr:    Some(0.05),
        };

        // first session stops after one member
        let mut cfg = config(1);
        cfg.ensemble = Some(snapshot(1));
        run(&cfg, &ws, false, false, &InterruptFlag::new()).unwrap();

        cfg.ensemble = Some(snapshot(3));
        let outcome = run(&cfg, &ws, false, true, &InterruptFlag::new()).unwrap();
        assert_eq!(outcome.epochs_completed, 6);
        assert_eq!(outcome.samples_seen, 72);
        assert_eq!(outcome.ensemble_members, 3);

        let checkpoints = CheckpointManager::new(&ws.checkpoint_dir);
        assert_eq!(checkpoints.ensemble_members().unwrap(), vec![0, 1, 2]);
        for (member, epoch) in [(0, 2), (1, 4), (2, 6)] {
            let state = checkpoints.load_state(&ensemble_checkpoint(member)).unwrap();
            assert_eq!(state.epoch, epoch, "member {member}");
            assert_eq!(state.ensemble_member, member);
        }
    }

    #[test]
    fn test_interrupt_saves_abort_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).unwrap();
        let interrupt = InterruptFlag::new();
        interrupt.raise();

        let err = run(&config(3), &ws, true, false, &interrupt).unwrap_err();
        assert_eq!(
            err.downcast_ref::<TrainError>(),
            Some(&TrainError::Interrupted { epoch: 0, samples_seen: 0 })
        );

        let checkpoints = CheckpointManager::new(&ws.checkpoint_dir);
        let state = checkpoints.load_state(ABORT_CHECKPOINT).unwrap();
        assert_eq!(state.performance, UNKNOWN_PERFORMANCE);
        assert_eq!(state.epoch, 0);
        // writers are still exported on the error path
        assert!(ws.statistics_dir.join("train.json").exists());
    }

    #[test]
    fn test_resume_continues_from_saved_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).unwrap();
        run(&config(1), &ws, false, false, &InterruptFlag::new()).unwrap();

        let outcome = run(&config(3), &ws, false, true, &InterruptFlag::new()).unwrap();
        assert_eq!(outcome.epochs_completed, 3);
        assert_eq!(outcome.samples_seen, 36);
    }

    #[test]
    fn test_empty_training_set_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path()).unwrap();
        let data = TrainingData { train: MultiLabelDataset::new(vec![]), val: None };
        let err = train_loop::<TestBackend>(
            &config(1), data, &ws, false, &InterruptFlag::new(), Default::default(),
        )
        .unwrap_err();
        assert_eq!(err.downcast_ref::<TrainError>(), Some(&TrainError::EmptyTrainingSet));
    }
}
