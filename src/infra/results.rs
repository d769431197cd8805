// ============================================================
// Layer 6 - Prediction Dumps
// ============================================================
// After every validation pass the per-subject predictions are
// written to disk for offline analysis (calibration plots,
// ensembling across runs, error inspection):
//
//   results/step-{samples_seen}-{split}.json.gz
//
// The file is gzip-compressed JSON:
//   { "ids": [...], "predictions": [[...], ...], "targets": [[...], ...] }
//
// Targets are in the validation encoding (0, 0.5 = unknown, 1).

use anyhow::{Context, Result};
use flate2::{write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::domain::aggregation::SubjectTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionDump {
    pub ids:         Vec<String>,
    pub predictions: Vec<Vec<f64>>,
    pub targets:     Vec<Vec<f64>>,
}

impl From<&SubjectTable> for PredictionDump {
    fn from(table: &SubjectTable) -> Self {
        Self {
            ids:         table.keys.clone(),
            predictions: table.predictions.clone(),
            targets:     table.targets.clone(),
        }
    }
}

pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn path_for(&self, samples_seen: usize, split: &str) -> PathBuf {
        self.dir.join(format!("step-{samples_seen}-{split}.json.gz"))
    }

    /// Compress and write one validation result; returns the file path.
    pub fn save(&self, samples_seen: usize, split: &str, table: &SubjectTable) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(samples_seen, split);

        let file = File::create(&path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut encoder, &PredictionDump::from(table))?;
        encoder.finish()?.flush()?;

        tracing::debug!("Saved {} subject predictions to '{}'", table.len(), path.display());
        Ok(path)
    }

    #[cfg(test)]
    pub fn load(path: impl AsRef<Path>) -> Result<PredictionDump> {
        use flate2::read::GzDecoder;
        use std::io::BufReader;

        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Cannot open '{}'", path.display()))?;
        let decoder = GzDecoder::new(BufReader::new(file));
        serde_json::from_reader(decoder)
            .with_context(|| format!("Corrupt prediction dump '{}'", path.display()))
    }
}
