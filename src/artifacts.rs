//! Gathering the framework's result files into one export directory.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::operations::{copy_file, FileOpError};

/// Files a finished training run is expected to contain, relative to its directory
pub const TRAIN_ARTIFACTS: &[&str] = &[
    "weights/best.pt",
    "F1_curve.png",
    "PR_curve.png",
    "confusion_matrix.png",
    "hyp.yaml",
    "opt.yaml",
    "results.png",
    "results.txt",
    "test_batch0_labels.jpg",
    "test_batch0_pred.jpg",
    "test_batch1_labels.jpg",
    "test_batch1_pred.jpg",
    "test_batch2_labels.jpg",
    "test_batch2_pred.jpg",
    "train_batch0.jpg",
    "train_batch1.jpg",
    "train_batch2.jpg",
    "train_batch3.jpg",
    "train_batch4.jpg",
    "train_batch5.jpg",
    "train_batch6.jpg",
    "train_batch7.jpg",
    "train_batch8.jpg",
    "train_batch9.jpg",
];

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to collect {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: FileOpError,
    },
    #[error("{} artifacts missing", .0.len())]
    Missing(Vec<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub source: PathBuf,
    /// Location inside the export directory
    pub dest: PathBuf,
}

/// Every file to export, in order
#[derive(Debug, Clone, Default)]
pub struct ArtifactPlan {
    pub entries: Vec<ArtifactEntry>,
}

impl ArtifactPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed training artifacts of `train_dir`, under `train/`
    pub fn with_training_run(mut self, train_dir: &Path) -> Self {
        for relative in TRAIN_ARTIFACTS {
            self.entries.push(ArtifactEntry {
                source: train_dir.join(relative),
                dest: Path::new("train").join(relative),
            });
        }
        self
    }

    /// Every file the inference run wrote, under `detect/`
    pub fn with_detect_run(mut self, detect_dir: &Path) -> Self {
        let mut outputs: Vec<PathBuf> = match fs::read_dir(detect_dir) {
            Ok(entries) => entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect(),
            Err(e) => {
                warn!("Failed to read detect output {:?}: {}", detect_dir, e);
                Vec::new()
            }
        };
        outputs.sort();

        if outputs.is_empty() {
            // Recorded so the directory shows up as missing
            self.entries.push(ArtifactEntry {
                source: detect_dir.to_path_buf(),
                dest: PathBuf::from("detect"),
            });
        }
        for source in outputs {
            if let Some(name) = source.file_name() {
                let dest = Path::new("detect").join(name);
                self.entries.push(ArtifactEntry { source, dest });
            }
        }
        self
    }

    /// The dataset YAML the run was trained with
    pub fn with_file(mut self, source: &Path) -> Self {
        if let Some(name) = source.file_name() {
            self.entries.push(ArtifactEntry {
                source: source.to_path_buf(),
                dest: PathBuf::from(name),
            });
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectReport {
    pub copied: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub bytes: u64,
}

impl CollectReport {
    /// Fail if anything was missing
    pub fn require_complete(self) -> Result<Self, ArtifactError> {
        if self.missing.is_empty() {
            Ok(self)
        } else {
            Err(ArtifactError::Missing(self.missing))
        }
    }
}

/// Copy every present artifact into `export_dir`; absent ones are listed, not fatal.
pub fn collect(plan: &ArtifactPlan, export_dir: &Path) -> Result<CollectReport, ArtifactError> {
    let mut report = CollectReport::default();
    if plan.is_empty() {
        warn!("Nothing planned for export into {:?}", export_dir);
        return Ok(report);
    }

    for entry in &plan.entries {
        if !entry.source.is_file() {
            warn!("Artifact missing: {:?}", entry.source);
            report.missing.push(entry.source.clone());
            continue;
        }
        let dest = export_dir.join(&entry.dest);
        let bytes = copy_file(&entry.source, &dest).map_err(|source| ArtifactError::Copy {
            path: entry.source.clone(),
            source,
        })?;
        report.bytes += bytes;
        report.copied.push(dest);
    }

    info!(
        "Collected {} of {} artifacts into {:?} ({} bytes, {} missing)",
        report.copied.len(),
        plan.len(),
        export_dir,
        report.bytes,
        report.missing.len()
    );
    Ok(report)
}
