use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::launcher::Device;
use crate::pipeline::PipelineSteps;

/// Train an object detector with an external framework: unpack, split, train, detect, collect.
#[derive(Parser, Debug)]
#[command(author, version)]
pub struct Cli {
    /// Pipeline config (JSON). Defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory for log files.
    #[arg(long, global = true, default_value = "logs")]
    pub log_dir: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the default config (or the current one) to the config path.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Extract the dataset archive.
    Unpack(UnpackArgs),
    /// Randomly move images and annotations into train/ and val/.
    Split(SplitArgs),
    /// Clone the framework and fetch the initial weights.
    Setup(SetupArgs),
    /// Write the framework's dataset YAML (inside the checkout unless --output is given).
    WriteDataConfig(DataConfigArgs),
    /// Run the framework's training script.
    Train(TrainArgs),
    /// Run the framework's inference script.
    Detect(DetectArgs),
    /// Copy result artifacts into the export directory.
    Collect(CollectArgs),
    /// Report per-split counts, unpaired files and class balance.
    Stats(DatasetArgs),
    /// Run every step in order.
    Run(RunArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct DatasetArgs {
    /// Flat directory of images and annotations.
    #[arg(long)]
    pub dataset_dir: Option<PathBuf>,
    /// Image extension (repeatable), e.g. --ext jpeg --ext jpg.
    #[arg(long = "ext")]
    pub extensions: Vec<String>,
}

impl DatasetArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.dataset_dir {
            config.dataset_dir = dir.clone();
        }
        if !self.extensions.is_empty() {
            config.image_extensions = self
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect();
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct UnpackArgs {
    #[arg(long)]
    pub archive: Option<PathBuf>,
    /// Extract into this directory.
    #[arg(long)]
    pub dest: Option<PathBuf>,
}

impl UnpackArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(archive) = &self.archive {
            config.archive_path = archive.clone();
        }
        if let Some(dest) = &self.dest {
            config.extract_dir = dest.clone();
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct SplitArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,
    /// Fraction of images moved to val/.
    #[arg(long)]
    pub val_ratio: Option<f64>,
    /// Seed for a reproducible split.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl SplitArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        self.dataset.apply(config);
        if let Some(ratio) = self.val_ratio {
            config.split.val_ratio = ratio;
        }
        if self.seed.is_some() {
            config.split.seed = self.seed;
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct DataConfigArgs {
    #[arg(long)]
    pub dataset_dir: Option<PathBuf>,
    /// Output path of the YAML.
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Class names in index order, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub names: Vec<String>,
}

impl DataConfigArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.dataset_dir {
            config.dataset_dir = dir.clone();
        }
        if self.output.is_some() {
            config.data_config.path = self.output.clone();
        }
        if !self.names.is_empty() {
            config.data_config.class_names = self.names.clone();
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct FrameworkArgs {
    /// Framework checkout directory.
    #[arg(long)]
    pub framework_dir: Option<PathBuf>,
    /// Python interpreter used to run the framework.
    #[arg(long)]
    pub python: Option<String>,
}

impl FrameworkArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.framework_dir {
            config.framework.dir = dir.clone();
        }
        if let Some(python) = &self.python {
            config.framework.python = python.clone();
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct SetupArgs {
    #[command(flatten)]
    pub framework: FrameworkArgs,
    #[arg(long)]
    pub repo_url: Option<String>,
    #[arg(long)]
    pub weights_url: Option<String>,
}

impl SetupArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        self.framework.apply(config);
        if let Some(url) = &self.repo_url {
            config.framework.repo_url = url.clone();
        }
        if let Some(url) = &self.weights_url {
            config.framework.weights_url = url.clone();
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct TrainArgs {
    #[command(flatten)]
    pub framework: FrameworkArgs,
    /// `cpu` or CUDA indices such as `0` or `0,1`.
    #[arg(long)]
    pub device: Option<Device>,
    #[arg(long)]
    pub batch_size: Option<u32>,
    /// Image width and height.
    #[arg(long, num_args = 2, value_names = ["W", "H"])]
    pub img: Option<Vec<u32>>,
    #[arg(long)]
    pub epochs: Option<u32>,
    /// Initial weights, relative to the framework directory.
    #[arg(long)]
    pub weights: Option<PathBuf>,
    /// Hyperparameter YAML, relative to the framework directory.
    #[arg(long)]
    pub hyp: Option<PathBuf>,
    /// Run name.
    #[arg(long)]
    pub name: Option<String>,
}

impl TrainArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        self.framework.apply(config);
        let train = &mut config.train;
        if let Some(device) = &self.device {
            train.device = device.clone();
        }
        if let Some(batch_size) = self.batch_size {
            train.batch_size = batch_size;
        }
        if let Some([w, h]) = self.img.as_deref() {
            train.img_size = [*w, *h];
        }
        if let Some(epochs) = self.epochs {
            train.epochs = epochs;
        }
        if let Some(weights) = &self.weights {
            train.weights = weights.clone();
        }
        if let Some(hyp) = &self.hyp {
            train.hyp = hyp.clone();
        }
        if let Some(name) = &self.name {
            train.name = name.clone();
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct DetectArgs {
    #[command(flatten)]
    pub framework: FrameworkArgs,
    /// Trained weights, relative to the framework directory.
    #[arg(long)]
    pub weights: Option<PathBuf>,
    /// Confidence threshold.
    #[arg(long)]
    pub conf: Option<f32>,
    #[arg(long)]
    pub img_size: Option<u32>,
    /// Image, video or directory to run on.
    #[arg(long)]
    pub source: Option<PathBuf>,
}

impl DetectArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        self.framework.apply(config);
        let detect = &mut config.detect;
        if self.weights.is_some() {
            detect.weights = self.weights.clone();
        }
        if let Some(conf) = self.conf {
            detect.conf = conf;
        }
        if let Some(img_size) = self.img_size {
            detect.img_size = img_size;
        }
        if let Some(source) = &self.source {
            detect.source = source.clone();
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct CollectArgs {
    #[command(flatten)]
    pub framework: FrameworkArgs,
    #[arg(long)]
    pub export_dir: Option<PathBuf>,
    /// Training run directory (defaults to the newest run for the configured name).
    #[arg(long)]
    pub train_run: Option<PathBuf>,
    /// Inference run directory (defaults to the newest `exp`).
    #[arg(long)]
    pub detect_run: Option<PathBuf>,
    /// Succeed even when expected artifacts are absent.
    #[arg(long, default_value_t = false)]
    pub allow_missing: bool,
}

impl CollectArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        self.framework.apply(config);
        if let Some(dir) = &self.export_dir {
            config.export_dir = dir.clone();
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub split: SplitArgs,
    #[command(flatten)]
    pub train: TrainArgs,
    /// Confidence threshold for inference.
    #[arg(long)]
    pub conf: Option<f32>,
    /// Image, video or directory to run inference on.
    #[arg(long)]
    pub source: Option<PathBuf>,
    #[arg(long)]
    pub export_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub skip_unpack: bool,
    #[arg(long, default_value_t = false)]
    pub skip_split: bool,
    #[arg(long, default_value_t = false)]
    pub skip_setup: bool,
    #[arg(long, default_value_t = false)]
    pub skip_train: bool,
    #[arg(long, default_value_t = false)]
    pub skip_detect: bool,
    #[arg(long, default_value_t = false)]
    pub skip_collect: bool,
    #[arg(long, default_value_t = false)]
    pub allow_missing: bool,
}

impl RunArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        self.split.apply(config);
        self.train.apply(config);
        if let Some(conf) = self.conf {
            config.detect.conf = conf;
        }
        if let Some(source) = &self.source {
            config.detect.source = source.clone();
        }
        if let Some(dir) = &self.export_dir {
            config.export_dir = dir.clone();
        }
    }

    pub fn steps(&self) -> PipelineSteps {
        PipelineSteps {
            unpack: !self.skip_unpack,
            split: !self.skip_split,
            data_config: true,
            setup: !self.skip_setup,
            train: !self.skip_train,
            detect: !self.skip_detect,
            collect: !self.skip_collect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_train_overrides() {
        let cli = Cli::parse_from([
            "leaf-detect", "train", "--device", "cpu", "--img", "512", "384", "--epochs", "3",
            "--name", "leaf",
        ]);
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        let mut config = PipelineConfig::default();
        args.apply(&mut config);

        assert_eq!(config.train.device, Device::Cpu);
        assert_eq!(config.train.img_size, [512, 384]);
        assert_eq!(config.train.epochs, 3);
        assert_eq!(config.train.name, "leaf");
        assert_eq!(config.train.batch_size, 16);
    }

    #[test]
    fn test_split_overrides_normalize_extensions() {
        let cli = Cli::parse_from([
            "leaf-detect", "split", "--dataset-dir", "d", "--ext", ".JPG", "--ext", "jpeg",
            "--val-ratio", "0.3", "--seed", "9",
        ]);
        let Command::Split(args) = cli.command else {
            panic!("expected split");
        };
        let mut config = PipelineConfig::default();
        args.apply(&mut config);

        assert_eq!(config.dataset_dir, PathBuf::from("d"));
        assert_eq!(config.image_extensions, vec!["jpg", "jpeg"]);
        assert_eq!(config.split.val_ratio, 0.3);
        assert_eq!(config.split.seed, Some(9));
    }

    #[test]
    fn test_run_skip_flags() {
        let cli = Cli::parse_from(["leaf-detect", "run", "--skip-unpack", "--skip-detect"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let steps = args.steps();
        assert!(!steps.unpack);
        assert!(!steps.detect);
        assert!(steps.split && steps.train && steps.collect);
    }

    #[test]
    fn test_data_config_names() {
        let cli = Cli::parse_from(["leaf-detect", "write-data-config", "--names", "crop,weed,soil"]);
        let Command::WriteDataConfig(args) = cli.command else {
            panic!("expected write-data-config");
        };
        let mut config = PipelineConfig::default();
        args.apply(&mut config);
        assert_eq!(config.data_config.class_names, vec!["crop", "weed", "soil"]);
    }
}
