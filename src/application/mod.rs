// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// Orchestrates the other layers for one command at a time.
//
// Rules for this layer:
//   - No model maths or tensor code here (that's Layer 5)
//   - No argument parsing or printing (that's Layer 1)
//   - Only workflow coordination

// Run configuration and its validation
pub mod config;

// Sample loading, validation split and standardisation
pub mod datasets;

// The training workflow
pub mod train_use_case;

// Validation of saved checkpoints and ensembles
pub mod evaluate_use_case;
