use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::launcher::Device;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("config {0} already exists (use --force to overwrite)")]
    AlreadyExists(PathBuf),
}

/// Train/val split parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitSettings {
    /// Fraction of images reserved for validation
    pub val_ratio: f64,
    /// Fixed seed for a reproducible split; entropy when unset
    pub seed: Option<u64>,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            val_ratio: 0.2,
            seed: None,
        }
    }
}

/// Where the framework's dataset YAML goes and what it declares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfigSettings {
    /// Defaults to `<framework.dir>/data/coco.yaml`
    pub path: Option<PathBuf>,
    pub class_names: Vec<String>,
}

impl Default for DataConfigSettings {
    fn default() -> Self {
        Self {
            path: None,
            class_names: vec!["crop".to_string(), "weed".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkSettings {
    pub repo_url: String,
    pub dir: PathBuf,
    pub python: String,
    pub weights_url: String,
}

impl Default for FrameworkSettings {
    fn default() -> Self {
        Self {
            repo_url: "https://github.com/WongKinYiu/yolov7.git".to_string(),
            dir: PathBuf::from("yolov7"),
            python: "python".to_string(),
            weights_url: "https://github.com/WongKinYiu/yolov7/releases/download/v0.1/yolov7x.pt"
                .to_string(),
        }
    }
}

/// Arguments handed to the framework's `train.py`.
/// Relative paths resolve against the framework directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainSettings {
    pub device: Device,
    pub batch_size: u32,
    pub img_size: [u32; 2],
    pub epochs: u32,
    pub weights: PathBuf,
    pub hyp: PathBuf,
    pub name: String,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            device: Device::Cuda(vec![0]),
            batch_size: 16,
            img_size: [640, 640],
            epochs: 64,
            weights: PathBuf::from("yolov7x.pt"),
            hyp: PathBuf::from("data/hyp.scratch.p5.yaml"),
            name: "yolov7x".to_string(),
        }
    }
}

/// Arguments handed to the framework's `detect.py`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectSettings {
    /// Relative to the framework directory. Defaults to
    /// `runs/train/<train.name>/weights/best.pt` of the latest run.
    pub weights: Option<PathBuf>,
    pub conf: f32,
    pub img_size: u32,
    /// Image, video or directory; relative to the working directory
    pub source: PathBuf,
}

impl Default for DetectSettings {
    fn default() -> Self {
        Self {
            weights: None,
            conf: 0.50,
            img_size: 640,
            source: PathBuf::from("test"),
        }
    }
}

/// Every knob of the pipeline. Relative paths resolve against the
/// working directory unless noted otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub archive_path: PathBuf,
    pub extract_dir: PathBuf,
    /// Flat directory of images + annotations, split in place
    pub dataset_dir: PathBuf,
    /// Lowercase extensions (without dot) treated as images
    pub image_extensions: Vec<String>,
    pub split: SplitSettings,
    pub data_config: DataConfigSettings,
    pub framework: FrameworkSettings,
    pub train: TrainSettings,
    pub detect: DetectSettings,
    pub export_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive_path: PathBuf::from("archive.zip"),
            extract_dir: PathBuf::from("."),
            dataset_dir: PathBuf::from("agri_data/data"),
            image_extensions: vec!["jpeg".to_string()],
            split: SplitSettings::default(),
            data_config: DataConfigSettings::default(),
            framework: FrameworkSettings::default(),
            train: TrainSettings::default(),
            detect: DetectSettings::default(),
            export_dir: PathBuf::from("results"),
        }
    }
}

impl PipelineConfig {
    /// Default config location: the platform config dir, else `./pipeline.json`
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "leaf-detect")
            .map(|dirs| dirs.config_dir().join("pipeline.json"))
            .unwrap_or_else(|| PathBuf::from("pipeline.json"))
    }

    /// Load the config from disk. A missing file yields defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config = serde_json::from_str::<PipelineConfig>(&contents).map_err(|source| {
                    ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                info!("Loaded config from: {:?}", path);
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No config file at {:?}. Using defaults.", path);
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Config saved to: {:?}", path);
        Ok(())
    }

    /// Write a config file for editing. With `force`, an existing file is
    /// rewritten in full; one that no longer parses is replaced by defaults.
    pub fn init(path: &Path, force: bool) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }
        if !force {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        let config = match Self::load(path) {
            Ok(config) => config,
            Err(e @ ConfigError::Parse { .. }) => {
                warn!("{}; replacing it with defaults", e);
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.save(path)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.split.val_ratio;
        if !(0.0..1.0).contains(&ratio) {
            return Err(ConfigError::Invalid(format!(
                "split.val_ratio must be in [0, 1), got {}",
                ratio
            )));
        }
        if self.image_extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "image_extensions must not be empty".to_string(),
            ));
        }
        if self.data_config.class_names.is_empty() {
            return Err(ConfigError::Invalid(
                "data_config.class_names must not be empty".to_string(),
            ));
        }
        if self.train.batch_size == 0 || self.train.epochs == 0 {
            return Err(ConfigError::Invalid(
                "train.batch_size and train.epochs must be positive".to_string(),
            ));
        }
        if self.train.img_size.contains(&0) || self.detect.img_size == 0 {
            return Err(ConfigError::Invalid("image sizes must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.detect.conf) {
            return Err(ConfigError::Invalid(format!(
                "detect.conf must be in [0, 1], got {}",
                self.detect.conf
            )));
        }
        Ok(())
    }

    /// Path of the dataset YAML the framework reads
    pub fn data_config_path(&self) -> PathBuf {
        self.data_config
            .path
            .clone()
            .unwrap_or_else(|| self.framework.dir.join("data").join("coco.yaml"))
    }
}
