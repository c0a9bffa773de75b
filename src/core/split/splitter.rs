//! Random train/validation split of a flat image + annotation directory.
//!
//! Images are moved (not copied) out of the dataset root into
//! `train/{images,labels}` and `val/{images,labels}`. A missing annotation
//! is reported and skipped; the image move is not rolled back.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::dataset::{list_images, DatasetLayout, DatasetSplit};
use crate::core::operations::{label_path_for_image, move_into_dir, FileOpError};

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("validation ratio must be in [0, 1), got {0}")]
    InvalidRatio(f64),
    #[error("failed to create split directories under {path}: {source}")]
    CreateDirs {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to list images in {path}: {source}")]
    ListImages {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Flat directory holding the images and their annotations
    pub dataset_dir: PathBuf,
    pub val_ratio: f64,
    pub extensions: Vec<String>,
    pub seed: Option<u64>,
}

/// A file that could not be moved for a reason other than a missing annotation
#[derive(Debug, Clone)]
pub struct MoveFailure {
    pub file: String,
    pub split: DatasetSplit,
    pub error: String,
}

/// Outcome of a split, by image file name
#[derive(Debug, Clone, Default)]
pub struct SplitReport {
    pub train: Vec<String>,
    pub val: Vec<String>,
    /// Images moved without an annotation because none was found
    pub missing_labels: Vec<String>,
    pub failures: Vec<MoveFailure>,
}

impl SplitReport {
    pub fn total_images(&self) -> usize {
        self.train.len() + self.val.len()
    }

    pub fn is_clean(&self) -> bool {
        self.missing_labels.is_empty() && self.failures.is_empty()
    }
}

/// `floor(total * ratio)`
pub fn validation_count(total: usize, val_ratio: f64) -> usize {
    (total as f64 * val_ratio).floor() as usize
}

pub struct DatasetSplitter {
    options: SplitOptions,
    layout: DatasetLayout,
}

impl DatasetSplitter {
    pub fn new(options: SplitOptions) -> Result<Self, SplitError> {
        if !(0.0..1.0).contains(&options.val_ratio) {
            return Err(SplitError::InvalidRatio(options.val_ratio));
        }
        let layout = DatasetLayout::new(options.dataset_dir.clone());
        Ok(Self { options, layout })
    }

    /// Sample the validation subset, then move it and the remainder into place.
    pub fn split(&self) -> Result<SplitReport, SplitError> {
        let root = self.layout.root();

        self.layout
            .create_dirs()
            .map_err(|source| SplitError::CreateDirs {
                path: root.to_path_buf(),
                source,
            })?;

        let image_files =
            list_images(root, &self.options.extensions).map_err(|source| SplitError::ListImages {
                path: root.to_path_buf(),
                source,
            })?;

        let num_val = validation_count(image_files.len(), self.options.val_ratio);
        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let val_files: HashSet<&PathBuf> =
            image_files.choose_multiple(&mut rng, num_val).collect();

        info!(
            "Splitting {} images: {} val, {} train (ratio {})",
            image_files.len(),
            val_files.len(),
            image_files.len() - val_files.len(),
            self.options.val_ratio
        );

        let mut report = SplitReport::default();

        // Validation first, in listing order so a seeded run is reproducible
        for image in image_files.iter().filter(|p| val_files.contains(p)) {
            self.move_pair(image, DatasetSplit::Val, &mut report);
        }
        // Only the remainder goes to train; validation images were already moved
        for image in image_files.iter().filter(|p| !val_files.contains(p)) {
            self.move_pair(image, DatasetSplit::Train, &mut report);
        }

        if !report.missing_labels.is_empty() {
            warn!(
                "{} images have no annotation file",
                report.missing_labels.len()
            );
        }
        info!("Data splitting completed!");
        Ok(report)
    }

    fn move_pair(&self, image: &Path, split: DatasetSplit, report: &mut SplitReport) {
        let file_name = image
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let root = self.layout.root();

        if let Err(e) = move_into_dir(image, &self.layout.images_dir(split)) {
            warn!("Failed to move {} into {}: {}", file_name, split.as_str(), e);
            report.failures.push(MoveFailure {
                file: file_name,
                split,
                error: e.to_string(),
            });
            return;
        }

        match split {
            DatasetSplit::Train => report.train.push(file_name.clone()),
            DatasetSplit::Val => report.val.push(file_name.clone()),
        }

        let moved_label = label_path_for_image(image, root)
            .ok_or_else(|| FileOpError::NoFileName(image.to_path_buf()))
            .and_then(|label| move_into_dir(&label, &self.layout.labels_dir(split)));

        match moved_label {
            Ok(_) => {}
            Err(FileOpError::NotFound(path)) => {
                warn!("File not found: {:?} (annotation for {})", path, file_name);
                report.missing_labels.push(file_name);
            }
            Err(e) => {
                warn!("Failed to move annotation for {}: {}", file_name, e);
                report.failures.push(MoveFailure {
                    file: file_name,
                    split,
                    error: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn create_dataset(root: &Path, count: usize, without_labels: &[usize]) {
        fs::create_dir_all(root).unwrap();
        for i in 0..count {
            fs::write(root.join(format!("agri_0_{}.jpeg", i)), b"img").unwrap();
            if !without_labels.contains(&i) {
                fs::write(
                    root.join(format!("agri_0_{}.txt", i)),
                    format!("{} 0.5 0.5 0.1 0.1\n", i % 2),
                )
                .unwrap();
            }
        }
    }

    fn options(root: &Path, seed: Option<u64>) -> SplitOptions {
        SplitOptions {
            dataset_dir: root.to_path_buf(),
            val_ratio: 0.2,
            extensions: vec!["jpeg".to_string()],
            seed,
        }
    }

    fn names_in(dir: &Path) -> HashSet<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect()
    }

    fn stem(name: &str) -> String {
        Path::new(name).file_stem().unwrap().to_string_lossy().to_string()
    }

    #[test]
    fn test_validation_count_floors() {
        assert_eq!(validation_count(0, 0.2), 0);
        assert_eq!(validation_count(4, 0.2), 0);
        assert_eq!(validation_count(10, 0.2), 2);
        assert_eq!(validation_count(14, 0.2), 2);
        assert_eq!(validation_count(1300, 0.2), 260);
    }

    #[test]
    fn test_invalid_ratio_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path(), None);
        opts.val_ratio = 1.0;
        assert!(matches!(
            DatasetSplitter::new(opts),
            Err(SplitError::InvalidRatio(_))
        ));
    }

    #[test]
    fn test_split_sizes_and_disjointness() {
        let dir = tempfile::tempdir().unwrap();
        create_dataset(dir.path(), 23, &[]);

        let splitter = DatasetSplitter::new(options(dir.path(), None)).unwrap();
        let report = splitter.split().unwrap();

        assert_eq!(report.val.len(), 4);
        assert_eq!(report.train.len(), 19);
        assert_eq!(report.total_images(), 23);
        assert!(report.is_clean());

        let layout = DatasetLayout::new(dir.path());
        let train_images = names_in(&layout.images_dir(DatasetSplit::Train));
        let val_images = names_in(&layout.images_dir(DatasetSplit::Val));
        assert_eq!(train_images.len(), 19);
        assert_eq!(val_images.len(), 4);
        assert!(train_images.is_disjoint(&val_images));

        // Nothing left behind in the root
        assert!(list_images(dir.path(), &["jpeg".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn test_every_image_has_paired_label() {
        let dir = tempfile::tempdir().unwrap();
        create_dataset(dir.path(), 15, &[]);

        let splitter = DatasetSplitter::new(options(dir.path(), Some(3))).unwrap();
        splitter.split().unwrap();

        let layout = DatasetLayout::new(dir.path());
        for split in DatasetSplit::all() {
            let images: HashSet<String> = names_in(&layout.images_dir(split))
                .iter()
                .map(|n| stem(n))
                .collect();
            let labels: HashSet<String> = names_in(&layout.labels_dir(split))
                .iter()
                .map(|n| stem(n))
                .collect();
            assert_eq!(images, labels, "split {}", split.as_str());
        }
    }

    #[test]
    fn test_missing_annotation_is_reported_and_image_still_moved() {
        let dir = tempfile::tempdir().unwrap();
        create_dataset(dir.path(), 10, &[3, 7]);

        let splitter = DatasetSplitter::new(options(dir.path(), Some(11))).unwrap();
        let report = splitter.split().unwrap();

        let mut missing = report.missing_labels.clone();
        missing.sort();
        assert_eq!(missing, vec!["agri_0_3.jpeg", "agri_0_7.jpeg"]);
        assert!(report.failures.is_empty());
        assert_eq!(report.total_images(), 10);

        let layout = DatasetLayout::new(dir.path());
        let mut labelled = 0;
        for split in DatasetSplit::all() {
            let labels: HashSet<String> = names_in(&layout.labels_dir(split))
                .iter()
                .map(|n| stem(n))
                .collect();
            for image in names_in(&layout.images_dir(split)) {
                if labels.contains(&stem(&image)) {
                    labelled += 1;
                } else {
                    assert!(report.missing_labels.contains(&image));
                }
            }
        }
        assert_eq!(labelled, 8);
    }

    #[test]
    fn test_same_seed_gives_same_split() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        create_dataset(first.path(), 40, &[]);
        create_dataset(second.path(), 40, &[]);

        let a = DatasetSplitter::new(options(first.path(), Some(42)))
            .unwrap()
            .split()
            .unwrap();
        let b = DatasetSplitter::new(options(second.path(), Some(42)))
            .unwrap()
            .split()
            .unwrap();

        assert_eq!(a.val, b.val);
        assert_eq!(a.train, b.train);
    }

    #[test]
    fn test_val_selection_has_no_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        create_dataset(dir.path(), 50, &[]);

        let report = DatasetSplitter::new(options(dir.path(), None))
            .unwrap()
            .split()
            .unwrap();

        let unique: HashSet<&String> = report.val.iter().collect();
        assert_eq!(unique.len(), report.val.len());
        assert_eq!(report.val.len(), 10);
    }

    #[test]
    fn test_existing_destination_is_a_failure_not_an_abort() {
        let dir = tempfile::tempdir().unwrap();
        create_dataset(dir.path(), 5, &[]);
        let layout = DatasetLayout::new(dir.path());
        layout.create_dirs().unwrap();
        // 5 * 0.2 = 1 val image; pre-seed both train and val with a clash for agri_0_0
        fs::write(layout.images_dir(DatasetSplit::Train).join("agri_0_0.jpeg"), b"old").unwrap();
        fs::write(layout.images_dir(DatasetSplit::Val).join("agri_0_0.jpeg"), b"old").unwrap();

        let report = DatasetSplitter::new(options(dir.path(), Some(1)))
            .unwrap()
            .split()
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].file, "agri_0_0.jpeg");
        assert_eq!(report.total_images(), 4);
        assert!(dir.path().join("agri_0_0.jpeg").exists());
    }

    #[test]
    fn test_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let report = DatasetSplitter::new(options(dir.path(), None))
            .unwrap()
            .split()
            .unwrap();
        assert_eq!(report.total_images(), 0);
        assert!(report.is_clean());
    }
}
