// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with clap.
// All work is delegated to Layer 2 (application).
//
//   train     trains a classifier or an ensemble
//   evaluate  validates a saved checkpoint or the whole ensemble

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

use crate::application::config::RunConfig;
use crate::infra::interrupt::InterruptFlag;

#[derive(Parser, Debug)]
#[command(
    name = "multilabel-trainer",
    version = "0.1.0",
    about = "Train and evaluate multi-label classifiers with deep and snapshot ensembles."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case; this layer only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = RunConfig::try_from(&args)?;
    tracing::info!("Starting training on samples in: {}", config.data.train);

    let interrupt = InterruptFlag::new();
    interrupt.install_ctrlc_handler()?;

    let outcome = TrainUseCase::new(config, args.resume).execute(&interrupt)?;

    println!(
        "Training complete after {} epochs ({} samples seen).",
        outcome.epochs_completed, outcome.samples_seen
    );
    if let Some(best) = outcome.best_performance {
        println!("Best validation AUC: {best:.4}");
    }
    if outcome.ensemble_members > 0 {
        println!("Ensemble members saved: {}", outcome.ensemble_members);
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let selector = args.selector();
    let report = EvaluateUseCase::new(args.workspace, selector, args.val_data, args.batch_size)
        .execute()?;

    println!("\nCheckpoint: {selector}");
    println!("Loss:       {:.4}", report.loss);
    println!("Accuracy:   {:.3}", report.accuracy);
    println!("AUC:        {:.3}", report.auc);
    for (c, auc) in report.class_aucs.iter().enumerate() {
        println!("  class {c:>3}: {auc:.3}");
    }
    Ok(())
}
