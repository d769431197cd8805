// ============================================================
// Layer 4 - Sample Loader
// ============================================================
// Loads labelled samples from a JSON Lines file.
//
// File format: one JSON object per line
//
//   {"id": "plate7-B03-2", "features": [0.1, 2.3, ...], "targets": [1, -1, 0]}
//
// Blank lines are ignored. Every sample in a file must have the
// same number of features and the same number of targets; a
// mismatch is reported with its line number rather than skipped,
// because a silently dropped row would shift the class layout.

use anyhow::{bail, Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::domain::sample::Sample;
use crate::domain::traits::SampleSource;

/// Reads samples from a `.jsonl` file.
pub struct JsonlSampleLoader {
    path: PathBuf,
}

impl JsonlSampleLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl SampleSource for JsonlSampleLoader {
    fn load_all(&self) -> Result<Vec<Sample>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Cannot open sample file '{}'", self.path.display()))?;

        let mut samples: Vec<Sample> = Vec::new();

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line_no = index + 1;
            let line = line.with_context(|| {
                format!("Cannot read line {} of '{}'", line_no, self.path.display())
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let sample: Sample = serde_json::from_str(&line).with_context(|| {
                format!("Malformed sample on line {} of '{}'", line_no, self.path.display())
            })?;

            if let Some(first) = samples.first() {
                if sample.features.len() != first.features.len()
                    || sample.targets.len() != first.targets.len()
                {
                    bail!(
                        "Sample '{}' on line {} of '{}' has {} features / {} targets, expected {} / {}",
                        sample.id,
                        line_no,
                        self.path.display(),
                        sample.features.len(),
                        sample.targets.len(),
                        first.features.len(),
                        first.targets.len(),
                    );
                }
            }
            samples.push(sample);
        }

        tracing::info!(
            "Loaded {} samples from '{}'",
            samples.len(),
            self.path.display()
        );
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_loads_samples_and_skips_blank_lines() {
        let file = write_file(
            "{\"id\":\"p1-A01-1\",\"features\":[0.5,1.0],\"targets\":[1,-1]}\n\
             \n\
             {\"id\":\"p1-A01-2\",\"features\":[0.0,2.0],\"targets\":[1,0]}\n",
        );
        let samples = JsonlSampleLoader::new(file.path()).load_all().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].id, "p1-A01-2");
        assert_eq!(samples[1].targets, vec![1.0, 0.0]);
    }

    #[test]
    fn test_inconsistent_dimensions_are_rejected() {
        let file = write_file(
            "{\"id\":\"a-1\",\"features\":[0.5,1.0],\"targets\":[1]}\n\
             {\"id\":\"a-2\",\"features\":[0.5],\"targets\":[1]}\n",
        );
        let err = JsonlSampleLoader::new(file.path()).load_all().unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let file = write_file("{\"id\":\"a-1\",\"features\":[1.0],\"targets\":[1]}\nnot json\n");
        let err = JsonlSampleLoader::new(file.path()).load_all().unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn test_missing_file() {
        assert!(JsonlSampleLoader::new("/definitely/not/here.jsonl").load_all().is_err());
    }
}
