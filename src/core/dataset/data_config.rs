use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use super::layout::{DatasetLayout, DatasetSplit};

#[derive(Debug, Error)]
pub enum DataConfigError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("yaml error at {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("data config declares nc={nc} but lists {names} class names")]
    ClassCountMismatch { nc: usize, names: usize },
    #[error("data config declares no classes")]
    NoClasses,
}

/// The framework's dataset YAML: image directories, class count and names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub train: PathBuf,
    pub val: PathBuf,
    pub nc: usize,
    pub names: Vec<String>,
}

impl DataConfig {
    /// Point train/val at the split image directories of `layout`.
    /// Directories that exist are made absolute so the file works from any cwd.
    pub fn for_layout(layout: &DatasetLayout, names: Vec<String>) -> Self {
        let absolute = |path: PathBuf| fs::canonicalize(&path).unwrap_or(path);
        Self {
            train: absolute(layout.images_dir(DatasetSplit::Train)),
            val: absolute(layout.images_dir(DatasetSplit::Val)),
            nc: names.len(),
            names,
        }
    }

    pub fn validate(&self) -> Result<(), DataConfigError> {
        if self.nc == 0 {
            return Err(DataConfigError::NoClasses);
        }
        if self.nc != self.names.len() {
            return Err(DataConfigError::ClassCountMismatch {
                nc: self.nc,
                names: self.names.len(),
            });
        }
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, DataConfigError> {
        let content = fs::read_to_string(path).map_err(|source| DataConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: DataConfig =
            serde_yaml::from_str(&content).map_err(|source| DataConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate, then write the YAML, replacing any existing file
    pub fn write(&self, path: &Path) -> Result<(), DataConfigError> {
        self.validate()?;
        let yaml = serde_yaml::to_string(self).map_err(|source| DataConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| DataConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, with_section_comments(&yaml)).map_err(|source| DataConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            "Wrote data config {:?} ({} classes: {:?})",
            path, self.nc, self.names
        );
        Ok(())
    }
}

/// Label each top-level key the way the framework's bundled data files do
fn with_section_comments(yaml: &str) -> String {
    let mut text = String::from("# train and val image directories\n");
    for line in yaml.lines() {
        if line.starts_with("nc:") {
            text.push_str("\n# number of classes\n");
        } else if line.starts_with("names:") {
            text.push_str("\n# class names\n");
        }
        text.push_str(line);
        text.push('\n');
    }
    text
}
