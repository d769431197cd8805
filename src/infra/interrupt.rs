// ============================================================
// Layer 6 - Interrupt Flag
// ============================================================
// Ctrl-C does not kill the process while training. The handler
// only raises a shared flag; the epoch loop checks it between
// batches and unwinds through its normal error path, which
// writes the abort checkpoint and closes the summary writers.

use anyhow::{Context, Result};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT / Ctrl-C into this flag. Call at most once per process.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || flag.raise())
            .context("Cannot install Ctrl-C handler")
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}
