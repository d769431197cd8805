// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// Everything from sample files to tensor batches:
//
//   .jsonl file
//       │
//       ▼
//   JsonlSampleLoader   → parses labelled samples
//       │
//       ▼
//   split_by_subject    → optional subject-aware validation split
//       │
//       ▼
//   Standardizer        → z-scores features with training stats
//       │
//       ▼
//   MultiLabelDataset   → implements Burn's Dataset trait
//       │
//       ▼
//   MultiLabelBatcher   → stacks samples into tensors
//       │
//       ▼
//   DataLoader          → feeds batches to training / validation

/// Reads JSON Lines sample files
pub mod loader;

/// Feature standardisation fitted on the training split
pub mod preprocessor;

/// Implements Burn's Dataset trait for labelled samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Subject-aware train/validation split
pub mod splitter;
