// ============================================================
// Layer 2 - Dataset Preparation
// ============================================================
// Turns the data section of a run configuration into sample
// splits:
//
//   data.val set           → train file / val file
//   data.val_fraction set  → subject-aware split of the train file
//   neither                → train only, no validation
//
// With data.standardize the feature statistics are fitted on the
// training split and applied to both splits. `evaluate` rebuilds
// the validation split through the same functions and the saved
// statistics, so it sees exactly the samples training validated on.

use anyhow::{bail, Context, Result};

use crate::application::config::{DataConfig, RunConfig};
use crate::data::{loader::JsonlSampleLoader, preprocessor::Standardizer, splitter::split_by_subject};
use crate::domain::{sample::Sample, traits::SampleSource};

pub const STANDARDIZER_FILE: &str = "standardizer.json";
pub const MODEL_CONFIG_FILE: &str = "model_config.json";

#[derive(Debug, Clone)]
pub struct PreparedData {
    pub train:        Vec<Sample>,
    pub val:          Option<Vec<Sample>>,
    pub standardizer: Option<Standardizer>,
}

pub fn load_samples(path: &str) -> Result<Vec<Sample>> {
    JsonlSampleLoader::new(path).load_all()
}

/// Load the training samples and carve out the validation split.
fn split_samples(data: &DataConfig, seed: u64) -> Result<(Vec<Sample>, Option<Vec<Sample>>)> {
    let samples = load_samples(&data.train)?;

    let (train, val) = match (&data.val, data.val_fraction) {
        (Some(path), _) => (samples, Some(load_samples(path)?)),
        (None, Some(fraction)) => {
            let (train, val) = split_by_subject(samples, 1.0 - fraction, seed);
            (train, Some(val))
        }
        (None, None) => (samples, None),
    };

    let val = match val {
        Some(val) if val.is_empty() => {
            tracing::warn!("Validation split is empty, training without validation");
            None
        }
        other => other,
    };
    Ok((train, val))
}

fn check_dimensions(train: &[Sample], val: &[Sample]) -> Result<()> {
    let (Some(t), Some(v)) = (train.first(), val.first()) else { return Ok(()) };
    if t.features.len() != v.features.len() || t.targets.len() != v.targets.len() {
        bail!(
            "Validation samples have {} features / {} targets, training samples {} / {}",
            v.features.len(),
            v.targets.len(),
            t.features.len(),
            t.targets.len(),
        );
    }
    Ok(())
}

pub fn prepare_training_data(data: &DataConfig, seed: u64) -> Result<PreparedData> {
    let (mut train, mut val) = split_samples(data, seed)?;
    if train.first().is_some_and(|s| s.targets.is_empty()) {
        bail!("Samples in '{}' carry no targets; at least one class is needed", data.train);
    }
    if let Some(val) = &val {
        check_dimensions(&train, val)?;
    }

    let standardizer = if data.standardize {
        let standardizer = Standardizer::fit(&train);
        standardizer.apply(&mut train);
        if let Some(val) = val.as_mut() {
            standardizer.apply(val);
        }
        tracing::info!("Standardised {} features", standardizer.num_features());
        Some(standardizer)
    } else {
        None
    };

    tracing::info!(
        "Split: {} train, {} validation",
        train.len(),
        val.as_ref().map_or(0, Vec::len),
    );
    Ok(PreparedData { train, val, standardizer })
}

/// Validation samples of a finished run, optionally from another file.
pub fn prepare_validation_data(
    cfg:          &RunConfig,
    val_override: Option<&str>,
    standardizer: Option<&Standardizer>,
) -> Result<Vec<Sample>> {
    let mut samples = match val_override {
        Some(path) => load_samples(path)?,
        None => split_samples(&cfg.data, cfg.training.seed)?
            .1
            .context("The run has no validation split; pass --val-data")?,
    };

    if let Some(standardizer) = standardizer {
        if let Some(first) = samples.first() {
            if first.features.len() != standardizer.num_features() {
                bail!(
                    "Samples have {} features, the run was trained on {}",
                    first.features.len(),
                    standardizer.num_features(),
                );
            }
        }
        standardizer.apply(&mut samples);
    }
    Ok(samples)
}
