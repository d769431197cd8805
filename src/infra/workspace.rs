// ============================================================
// Layer 6 - Workspace Layout
// ============================================================
// All files of a run live under one root directory:
//
//   workspace/
//     checkpoints/   model + optimizer records, state JSON,
//                    run config, standardiser statistics
//     results/       step-{samples}-{split}.json.gz prediction dumps
//     statistics/    summary event logs and JSON exports

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};

#[derive(Debug, Clone)]
pub struct Workspace {
    pub root:           PathBuf,
    pub checkpoint_dir: PathBuf,
    pub results_dir:    PathBuf,
    pub statistics_dir: PathBuf,
}

impl Workspace {
    /// Lay out the directories under `root` without touching disk.
    pub fn at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            checkpoint_dir: root.join("checkpoints"),
            results_dir:    root.join("results"),
            statistics_dir: root.join("statistics"),
            root,
        }
    }

    /// Lay out and create every directory.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let ws = Self::at(root);
        for dir in [&ws.checkpoint_dir, &ws.results_dir, &ws.statistics_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        }
        tracing::debug!("Workspace ready at '{}'", ws.root.display());
        Ok(ws)
    }
}
