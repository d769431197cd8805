// ============================================================
// Layer 5 - ML Layer (Burn)
// ============================================================
// All burn model and training code lives here:
//
//   model.rs      feed-forward multi-label classifier, masked
//                 binary cross-entropy on logits and probabilities
//
//   session.rs    model + optimizer + progress counters, with
//                 checkpoint save / resume
//
//   trainer.rs    epoch loop: learning-rate choice, optimisation
//                 steps, validation, ensemble members, abort guard
//
//   evaluator.rs  validation pass: subject aggregation, result
//                 dumps, per-class AUC, summaries
//
//   predictor.rs  single model or averaged ensemble behind one
//                 trait, used by the evaluate command

/// Multi-label classifier and its losses
pub mod model;

/// Mutable training state and checkpointing
pub mod session;

/// Training loop with validation and ensembles
pub mod trainer;

/// Validation loop
pub mod evaluator;

/// Single-model and ensemble predictors
pub mod predictor;
