//! Post-split verification: per-split counts, image/label pairing, class balance.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::core::dataset::{has_image_extension, parse_label_file, DatasetLayout, DatasetSplit};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitCounts {
    pub images: usize,
    pub labels: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssueType {
    /// Image file exists but no corresponding label file
    ImageWithoutLabel,
    /// Label file exists but no corresponding image
    LabelWithoutImage,
}

#[derive(Debug, Clone)]
pub struct IntegrityIssue {
    pub issue_type: IntegrityIssueType,
    /// The existing file
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityStats {
    pub images_without_labels: Vec<IntegrityIssue>,
    pub labels_without_images: Vec<IntegrityIssue>,
}

impl IntegrityStats {
    pub fn total_issues(&self) -> usize {
        self.images_without_labels.len() + self.labels_without_images.len()
    }

    pub fn has_issues(&self) -> bool {
        self.total_issues() > 0
    }
}

/// Everything `stats` reports for one split
#[derive(Debug, Clone)]
pub struct SplitStats {
    pub split: DatasetSplit,
    pub counts: SplitCounts,
    pub integrity: IntegrityStats,
    /// Object count per class name; ids beyond the name list appear as `class_<id>`
    pub class_objects: BTreeMap<String, usize>,
    pub malformed_lines: usize,
}

fn files_with<F>(dir: &Path, keep: F) -> Vec<PathBuf>
where
    F: Fn(&Path) -> bool,
{
    let mut files: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && keep(p))
            .collect(),
        Err(e) => {
            warn!("Failed to read directory {:?}: {}", dir, e);
            Vec::new()
        }
    };
    files.sort();
    files
}

fn is_label(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}

fn stems(paths: &[PathBuf]) -> HashSet<String> {
    paths
        .iter()
        .filter_map(|p| p.file_stem())
        .map(|s| s.to_string_lossy().to_string())
        .collect()
}

/// Count images and `.txt` labels in a split
pub fn count_split(layout: &DatasetLayout, split: DatasetSplit, extensions: &[String]) -> SplitCounts {
    SplitCounts {
        images: files_with(&layout.images_dir(split), |p| has_image_extension(p, extensions)).len(),
        labels: files_with(&layout.labels_dir(split), is_label).len(),
    }
}

/// Images without a same-stem label and labels without a same-stem image
pub fn check_integrity(
    layout: &DatasetLayout,
    split: DatasetSplit,
    extensions: &[String],
) -> IntegrityStats {
    let images = files_with(&layout.images_dir(split), |p| has_image_extension(p, extensions));
    let labels = files_with(&layout.labels_dir(split), is_label);
    let image_stems = stems(&images);
    let label_stems = stems(&labels);

    let unmatched = |paths: &[PathBuf], others: &HashSet<String>, issue_type: IntegrityIssueType| {
        paths
            .iter()
            .filter(|p| {
                p.file_stem()
                    .map(|s| !others.contains(&*s.to_string_lossy()))
                    .unwrap_or(false)
            })
            .map(|p| IntegrityIssue {
                issue_type: issue_type.clone(),
                path: p.clone(),
            })
            .collect::<Vec<_>>()
    };

    IntegrityStats {
        images_without_labels: unmatched(&images, &label_stems, IntegrityIssueType::ImageWithoutLabel),
        labels_without_images: unmatched(&labels, &image_stems, IntegrityIssueType::LabelWithoutImage),
    }
}

/// Objects per class across every label file in `labels_dir`.
/// Returns the histogram and the number of malformed lines seen.
pub fn class_histogram(labels_dir: &Path, class_names: &[String]) -> (BTreeMap<String, usize>, usize) {
    let mut histogram: BTreeMap<String, usize> =
        class_names.iter().map(|name| (name.clone(), 0)).collect();
    let mut malformed = 0;

    for label_path in files_with(labels_dir, is_label) {
        let Some(info) = parse_label_file(&label_path) else {
            warn!("Unreadable label file {:?}", label_path);
            continue;
        };
        malformed += info.malformed_lines;
        for detection in &info.detections {
            let name = class_names
                .get(detection.class_id as usize)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", detection.class_id));
            *histogram.entry(name).or_insert(0) += 1;
        }
    }

    (histogram, malformed)
}

pub fn analyze_split(
    layout: &DatasetLayout,
    split: DatasetSplit,
    extensions: &[String],
    class_names: &[String],
) -> SplitStats {
    let counts = count_split(layout, split, extensions);
    let integrity = check_integrity(layout, split, extensions);
    let (class_objects, malformed_lines) = class_histogram(&layout.labels_dir(split), class_names);

    info!(
        "Split {}: {} images, {} labels, {} integrity issues",
        split.as_str(),
        counts.images,
        counts.labels,
        integrity.total_issues()
    );

    SplitStats {
        split,
        counts,
        integrity,
        class_objects,
        malformed_lines,
    }
}
