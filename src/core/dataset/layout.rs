use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetSplit {
    Train,
    Val,
}

impl DatasetSplit {
    pub fn as_str(&self) -> &str {
        match self {
            DatasetSplit::Train => "train",
            DatasetSplit::Val => "val",
        }
    }

    pub fn all() -> [DatasetSplit; 2] {
        [DatasetSplit::Train, DatasetSplit::Val]
    }
}

/// `<root>/{train,val}/{images,labels}` rooted at the flat dataset directory
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn split_dir(&self, split: DatasetSplit) -> PathBuf {
        self.root.join(split.as_str())
    }

    pub fn images_dir(&self, split: DatasetSplit) -> PathBuf {
        self.split_dir(split).join("images")
    }

    pub fn labels_dir(&self, split: DatasetSplit) -> PathBuf {
        self.split_dir(split).join("labels")
    }

    /// Create every split directory. Existing directories are left alone.
    pub fn create_dirs(&self) -> io::Result<()> {
        for split in DatasetSplit::all() {
            for dir in [self.images_dir(split), self.labels_dir(split)] {
                fs::create_dir_all(&dir)?;
                debug!("Ensured directory {:?}", dir);
            }
        }
        Ok(())
    }
}

/// Whether the path's extension (case-insensitive) is one of `extensions`
pub fn has_image_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
        .unwrap_or(false)
}

/// List image files directly inside `dir`, sorted for consistent ordering
pub fn list_images(dir: &Path, extensions: &[String]) -> io::Result<Vec<PathBuf>> {
    let mut image_files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path, extensions) {
            image_files.push(path);
        }
    }
    image_files.sort();
    info!("Found {} images in {:?}", image_files.len(), dir);
    Ok(image_files)
}
