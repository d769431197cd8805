// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// The seams between the training loop and its collaborators.
//
//   SampleSource - anything that yields labelled samples
//                  (JSONL files today)
//   ScalarSink   - anything that records tagged scalars over
//                  the number of samples seen (summary writers,
//                  in-memory recorders in tests)

use anyhow::Result;

use crate::domain::sample::Sample;

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// A component that can load every sample of one data split.
pub trait SampleSource {
    fn load_all(&self) -> Result<Vec<Sample>>;
}

// ─── ScalarSink ───────────────────────────────────────────────────────────────
/// Receives scalar summaries such as loss, accuracy or AUC.
///
/// `step` is the number of training samples seen so far, so curves
/// from runs with different batch sizes line up.
pub trait ScalarSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()>;
}
