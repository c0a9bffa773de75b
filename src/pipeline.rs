//! The notebook's steps as functions over a `PipelineConfig`, plus the full run.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, info_span, warn};

use crate::artifacts::{collect, ArtifactError, ArtifactPlan, CollectReport};
use crate::config::{ConfigError, PipelineConfig};
use crate::core::analysis::{analyze_split, SplitStats};
use crate::core::dataset::{DataConfig, DataConfigError, DatasetLayout, DatasetSplit};
use crate::core::operations::{extract_zip, ArchiveError, ExtractSummary};
use crate::core::split::{DatasetSplitter, SplitError, SplitOptions, SplitReport};
use crate::launcher::{
    best_weights, CommandRunner, FrameworkSetup, InferenceJob, InferenceJobLauncher,
    InferenceSource, LaunchError, SetupStatus, TrainingJob, TrainingJobLauncher,
};

pub const MANIFEST_FILE: &str = "pipeline_manifest.json";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    DataConfig(#[from] DataConfigError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("failed to write manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize manifest: {0}")]
    ManifestJson(#[from] serde_json::Error),
    #[error("no framework checkout at {0}; run `setup` before writing a data config inside it")]
    FrameworkNotCloned(PathBuf),
}

/// Which steps `run` executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSteps {
    pub unpack: bool,
    pub split: bool,
    pub data_config: bool,
    pub setup: bool,
    pub train: bool,
    pub detect: bool,
    pub collect: bool,
}

impl Default for PipelineSteps {
    fn default() -> Self {
        Self {
            unpack: true,
            split: true,
            data_config: true,
            setup: true,
            train: true,
            detect: true,
            collect: true,
        }
    }
}

/// Split outcome as recorded in the manifest
#[derive(Debug, Clone, Default, Serialize)]
pub struct SplitSummary {
    pub train_images: usize,
    pub val_images: usize,
    pub missing_labels: Vec<String>,
    pub failures: Vec<String>,
}

impl From<&SplitReport> for SplitSummary {
    fn from(report: &SplitReport) -> Self {
        Self {
            train_images: report.train.len(),
            val_images: report.val.len(),
            missing_labels: report.missing_labels.clone(),
            failures: report
                .failures
                .iter()
                .map(|f| format!("{} ({}): {}", f.file, f.split.as_str(), f.error))
                .collect(),
        }
    }
}

/// What a run did; serialized as the manifest
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub config: PipelineConfig,
    pub extracted_files: Option<usize>,
    pub split: Option<SplitSummary>,
    pub data_config: Option<PathBuf>,
    pub cloned_framework: Option<bool>,
    pub downloaded_weights: Option<bool>,
    pub train_run: Option<PathBuf>,
    pub detect_run: Option<PathBuf>,
    pub artifacts: Option<CollectReport>,
}

/// Step functions bound to one configuration
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn layout(&self) -> DatasetLayout {
        DatasetLayout::new(&self.config.dataset_dir)
    }

    pub fn unpack(&self) -> Result<ExtractSummary, PipelineError> {
        let _span = info_span!("unpack").entered();
        Ok(extract_zip(&self.config.archive_path, &self.config.extract_dir)?)
    }

    pub fn split(&self) -> Result<SplitReport, PipelineError> {
        let _span = info_span!("split").entered();
        let splitter = DatasetSplitter::new(SplitOptions {
            dataset_dir: self.config.dataset_dir.clone(),
            val_ratio: self.config.split.val_ratio,
            extensions: self.config.image_extensions.clone(),
            seed: self.config.split.seed,
        })?;
        let report = splitter.split()?;
        info!(
            "Split {} images: {} train, {} val",
            report.total_images(),
            report.train.len(),
            report.val.len()
        );
        for stats in self.stats() {
            info!(
                "Number of images in {} folder: {}, label files: {}",
                stats.split.as_str(),
                stats.counts.images,
                stats.counts.labels
            );
        }
        Ok(report)
    }

    pub fn stats(&self) -> Vec<SplitStats> {
        let layout = self.layout();
        DatasetSplit::all()
            .into_iter()
            .map(|split| {
                analyze_split(
                    &layout,
                    split,
                    &self.config.image_extensions,
                    &self.config.data_config.class_names,
                )
            })
            .collect()
    }

    pub fn write_data_config(&self) -> Result<PathBuf, PipelineError> {
        let _span = info_span!("data_config").entered();
        let path = self.config.data_config_path();
        // git refuses to clone into the directory this would create
        let framework = self.framework();
        if path.starts_with(&framework.dir) && !framework.is_cloned() {
            return Err(PipelineError::FrameworkNotCloned(framework.dir));
        }
        let data = DataConfig::for_layout(&self.layout(), self.config.data_config.class_names.clone());
        data.write(&path)?;
        Ok(path)
    }

    pub fn framework(&self) -> FrameworkSetup {
        let framework = &self.config.framework;
        FrameworkSetup {
            repo_url: framework.repo_url.clone(),
            dir: framework.dir.clone(),
            weights_url: framework.weights_url.clone(),
            weights: self.config.train.weights.clone(),
        }
    }

    pub fn setup<R: CommandRunner + ?Sized>(&self, runner: &mut R) -> Result<SetupStatus, PipelineError> {
        let _span = info_span!("setup").entered();
        Ok(self.framework().prepare(runner)?)
    }

    pub fn training_launcher(&self) -> TrainingJobLauncher {
        TrainingJobLauncher::new(&self.config.framework.dir, self.config.framework.python.as_str())
    }

    pub fn inference_launcher(&self) -> InferenceJobLauncher {
        InferenceJobLauncher::new(&self.config.framework.dir, self.config.framework.python.as_str())
    }

    pub fn training_job(&self) -> TrainingJob {
        let train = &self.config.train;
        // The framework runs from its own directory, so hand it an absolute data path
        let data_path = self.config.data_config_path();
        let data = fs::canonicalize(&data_path).unwrap_or(data_path);
        TrainingJob {
            device: train.device.clone(),
            batch_size: train.batch_size,
            data,
            img_size: train.img_size,
            epochs: train.epochs,
            weights: train.weights.clone(),
            hyp: train.hyp.clone(),
            name: train.name.clone(),
        }
    }

    pub fn train<R: CommandRunner + ?Sized>(&self, runner: &mut R) -> Result<PathBuf, PipelineError> {
        let _span = info_span!("train").entered();
        Ok(self.training_launcher().launch(&self.training_job(), runner)?)
    }

    /// Weights for inference: the configured file, else `best.pt` of the newest training run
    pub fn detect_weights(&self, train_run: Option<&Path>) -> Result<PathBuf, PipelineError> {
        let weights = match (&self.config.detect.weights, train_run) {
            (Some(weights), _) => self.config.framework.dir.join(weights),
            (None, Some(run)) => best_weights(run),
            (None, None) => {
                best_weights(&self.training_launcher().run_dir(&self.config.train.name)?)
            }
        };
        fs::canonicalize(&weights).map_err(|_| PipelineError::Launch(LaunchError::MissingWeights(weights)))
    }

    pub fn inference_job(&self, train_run: Option<&Path>) -> Result<InferenceJob, PipelineError> {
        let detect = &self.config.detect;
        Ok(InferenceJob {
            weights: self.detect_weights(train_run)?,
            conf: detect.conf,
            img_size: detect.img_size,
            source: InferenceSource::classify(&detect.source)?,
        })
    }

    pub fn detect<R: CommandRunner + ?Sized>(
        &self,
        runner: &mut R,
        train_run: Option<&Path>,
    ) -> Result<PathBuf, PipelineError> {
        let _span = info_span!("detect").entered();
        let job = self.inference_job(train_run)?;
        Ok(self.inference_launcher().launch(&job, runner)?)
    }

    /// Copy results into the export directory. Runs default to the newest ones on disk.
    pub fn collect(
        &self,
        train_run: Option<&Path>,
        detect_run: Option<&Path>,
        allow_missing: bool,
    ) -> Result<CollectReport, PipelineError> {
        let _span = info_span!("collect").entered();
        let train_run = match train_run {
            Some(run) => run.to_path_buf(),
            None => self.training_launcher().run_dir(&self.config.train.name)?,
        };
        let detect_run = match detect_run {
            Some(run) => Some(run.to_path_buf()),
            None => self.inference_launcher().run_dir().ok(),
        };

        let mut plan = ArtifactPlan::new().with_training_run(&train_run);
        match &detect_run {
            Some(run) => plan = plan.with_detect_run(run),
            None => warn!("No inference run found, exporting training artifacts only"),
        }
        plan = plan.with_file(&self.config.data_config_path());

        let report = collect(&plan, &self.config.export_dir)?;
        if allow_missing {
            Ok(report)
        } else {
            Ok(report.require_complete()?)
        }
    }

    pub fn write_manifest(&self, summary: &PipelineSummary) -> Result<PathBuf, PipelineError> {
        let dir = &self.config.export_dir;
        fs::create_dir_all(dir).map_err(|source| PipelineError::Manifest {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(summary)?;
        fs::write(&path, json).map_err(|source| PipelineError::Manifest {
            path: path.clone(),
            source,
        })?;
        info!("Manifest written to {:?}", path);
        Ok(path)
    }

    /// Execute the enabled steps in order, halting on the first failure
    pub fn run<R: CommandRunner + ?Sized>(
        &self,
        runner: &mut R,
        steps: PipelineSteps,
        allow_missing: bool,
    ) -> Result<PipelineSummary, PipelineError> {
        let _span = info_span!("run").entered();
        let mut summary = PipelineSummary {
            started_at: Local::now(),
            finished_at: None,
            config: self.config.clone(),
            extracted_files: None,
            split: None,
            data_config: None,
            cloned_framework: None,
            downloaded_weights: None,
            train_run: None,
            detect_run: None,
            artifacts: None,
        };

        if steps.unpack {
            summary.extracted_files = Some(self.unpack()?.files);
        }
        if steps.split {
            summary.split = Some(SplitSummary::from(&self.split()?));
        }
        // The data YAML lives inside the checkout, so clone first
        if steps.setup {
            let status = self.setup(runner)?;
            summary.cloned_framework = Some(status.cloned);
            summary.downloaded_weights = Some(status.downloaded_weights);
        }
        if steps.data_config {
            summary.data_config = Some(self.write_data_config()?);
        }
        if steps.train {
            summary.train_run = Some(self.train(runner)?);
        }
        if steps.detect {
            summary.detect_run = Some(self.detect(runner, summary.train_run.as_deref())?);
        }
        if steps.collect {
            summary.artifacts = Some(self.collect(
                summary.train_run.as_deref(),
                summary.detect_run.as_deref(),
                allow_missing,
            )?);
        }

        summary.finished_at = Some(Local::now());
        if steps.collect {
            self.write_manifest(&summary)?;
        }
        info!("Pipeline finished");
        Ok(summary)
    }
}
