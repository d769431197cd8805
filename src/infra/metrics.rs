// ============================================================
// Layer 6 - Summary Writers
// ============================================================
// Records tagged scalars (Loss, Accuracy, AUC, Learning_Rate,
// ...) against the number of training samples seen.
//
// Each writer keeps two views of its scalars:
//
//   statistics/{name}.events.csv   appended as scalars arrive, so a
//                                  crashed run still leaves a log
//   statistics/{name}.json         written on close, one entry per
//                                  tag: [[wall_time, step, value], ...]
//
// The CSV is opened in append mode, so a resumed run continues the
// same log instead of overwriting it.
//
// Example CSV output:
//   tag,step,value,wall_time
//   Loss,64,0.693147,1760870000.123
//   Accuracy,64,0.515625,1760870000.124

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::domain::traits::ScalarSink;

/// One recorded scalar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarEvent {
    pub wall_time: f64,
    pub step:      usize,
    pub value:     f64,
}

/// Scalar log for one data split ("train", "val", ...).
pub struct SummaryWriter {
    events_path: PathBuf,
    events:      Option<BufWriter<File>>,
    scalars:     BTreeMap<String, Vec<ScalarEvent>>,
}

impl SummaryWriter {
    /// Open (or continue) `{dir}/{name}.events.csv`.
    pub fn new(dir: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let dir  = dir.as_ref();
        let name = name.into();
        fs::create_dir_all(dir)?;

        let events_path = dir.join(format!("{name}.events.csv"));
        let is_new      = !events_path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&events_path)
            .with_context(|| format!("Cannot open '{}'", events_path.display()))?;
        let mut events = BufWriter::new(file);

        if is_new {
            writeln!(events, "tag,step,value,wall_time")?;
            tracing::debug!("Created summary log '{}'", events_path.display());
        }

        Ok(Self {
            events_path,
            events: Some(events),
            scalars: BTreeMap::new(),
        })
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Scalars recorded under `tag` since this writer was opened.
    #[cfg(test)]
    pub fn scalars(&self, tag: &str) -> &[ScalarEvent] {
        self.scalars.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Write every tag with its [wall_time, step, value] triples as JSON.
    pub fn export_scalars_to_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let export: BTreeMap<&str, Vec<(f64, usize, f64)>> = self
            .scalars
            .iter()
            .map(|(tag, events)| {
                let triples = events.iter().map(|e| (e.wall_time, e.step, e.value)).collect();
                (tag.as_str(), triples)
            })
            .collect();

        let json = serde_json::to_string_pretty(&export)?;
        fs::write(path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        Ok(())
    }

    /// Flush and release the event log. Further scalars are kept in
    /// memory only.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut events) = self.events.take() {
            events.flush()?;
        }
        Ok(())
    }
}

impl ScalarSink for SummaryWriter {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let wall_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        if let Some(events) = self.events.as_mut() {
            writeln!(events, "{},{},{:.6},{:.3}", tag, step, value, wall_time)?;
        }

        self.scalars
            .entry(tag.to_string())
            .or_default()
            .push(ScalarEvent { wall_time, step, value });
        Ok(())
    }
}

// ─── SummaryWriters ───────────────────────────────────────────────────────────
/// The writers of one run, keyed by split name.
pub struct SummaryWriters {
    dir:     PathBuf,
    writers: BTreeMap<String, SummaryWriter>,
}

impl SummaryWriters {
    pub fn open(dir: impl AsRef<Path>, names: &[&str]) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut writers = BTreeMap::new();
        for &name in names {
            writers.insert(name.to_string(), SummaryWriter::new(&dir, name)?);
        }
        Ok(Self { dir, writers })
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SummaryWriter> {
        self.writers.get_mut(name)
    }

    /// Export every writer to `{dir}/{name}.json` and close it.
    ///
    /// All writers are attempted; the first failure is returned.
    pub fn close_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for (name, writer) in self.writers.iter_mut() {
            let path = self.dir.join(format!("{name}.json"));
            let outcome = writer
                .export_scalars_to_json(&path)
                .and_then(|_| writer.close());
            if let Err(e) = outcome {
                tracing::error!("Closing summary writer '{}' failed: {:#}", name, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_are_logged_and_exported() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SummaryWriter::new(dir.path(), "val").unwrap();
        writer.add_scalar("AUC", 0.75, 128).unwrap();
        writer.add_scalar("AUC", 0.8, 256).unwrap();
        writer.add_scalar("Loss", 0.5, 128).unwrap();

        assert_eq!(writer.scalars("AUC").len(), 2);
        assert_eq!(writer.scalars("AUC")[1].step, 256);
        assert!(writer.scalars("missing").is_empty());

        let export = dir.path().join("val.json");
        writer.export_scalars_to_json(&export).unwrap();
        writer.close().unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&export).unwrap()).unwrap();
        assert_eq!(json["AUC"].as_array().unwrap().len(), 2);
        assert_eq!(json["AUC"][1][1], 256);
        assert_eq!(json["Loss"][0][2], 0.5);

        let csv = fs::read_to_string(writer.events_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "tag,step,value,wall_time");
        assert!(lines[1].starts_with("AUC,128,0.750000,"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_reopening_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut writer = SummaryWriter::new(dir.path(), "train").unwrap();
            writer.add_scalar("Loss", 1.0, 1).unwrap();
            writer.close().unwrap();
        }
        let mut writer = SummaryWriter::new(dir.path(), "train").unwrap();
        writer.add_scalar("Loss", 0.5, 2).unwrap();
        writer.close().unwrap();

        let csv = fs::read_to_string(dir.path().join("train.events.csv")).unwrap();
        assert_eq!(csv.lines().filter(|l| l.starts_with("tag,")).count(), 1);
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_close_all_exports_every_writer() {
        let dir = tempfile::tempdir().unwrap();
        let mut writers = SummaryWriters::open(dir.path(), &["train", "val"]).unwrap();
        writers.get_mut("train").unwrap().add_scalar("Epoch", 0.0, 10).unwrap();
        assert!(writers.get_mut("test").is_none());
        writers.close_all().unwrap();

        assert!(dir.path().join("train.json").exists());
        assert!(dir.path().join("val.json").exists());
    }
}
