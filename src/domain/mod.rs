// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain Rust types and maths with no burn dependency:
//
//   sample      - labelled samples and subject keys
//   aggregation - per-view → per-subject grouping
//   metrics     - running averages, accuracy, ROC-AUC
//   ensemble    - deep / snapshot ensemble layout
//   schedule    - per-epoch learning rates
//   traits      - seams to data sources and scalar sinks
//
// Everything here is unit tested without a device.

pub mod aggregation;
pub mod ensemble;
pub mod metrics;
pub mod sample;
pub mod schedule;
pub mod traits;
