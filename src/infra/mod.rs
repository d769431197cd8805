// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Files and process plumbing shared by training and evaluation:
//
//   workspace.rs   directory layout of a run
//
//   checkpoint.rs  burn CompactRecorder records for model and
//                  optimizer, JSON training state, run config
//
//   metrics.rs     scalar summary writers: CSV event log while
//                  running, JSON export on close
//
//   results.rs     gzipped per-subject prediction dumps
//
//   interrupt.rs   Ctrl-C → shared flag checked by the epoch loop

/// Workspace directory layout
pub mod workspace;

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Scalar summary writers
pub mod metrics;

/// Compressed validation result dumps
pub mod results;

/// Ctrl-C interrupt flag
pub mod interrupt;
