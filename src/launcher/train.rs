use std::path::{Path, PathBuf};
use tracing::info;

use super::command::{CommandRunner, JobCommand, LaunchError};
use super::device::Device;
use super::runs::{latest_run_dir, TRAIN_RUNS_DIR};

/// Arguments of one `train.py` invocation.
/// Relative paths are interpreted by the framework against its own directory.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingJob {
    pub device: Device,
    pub batch_size: u32,
    pub data: PathBuf,
    pub img_size: [u32; 2],
    pub epochs: u32,
    pub weights: PathBuf,
    pub hyp: PathBuf,
    pub name: String,
}

impl TrainingJob {
    pub fn args(&self) -> Vec<String> {
        vec![
            "train.py".to_string(),
            "--device".to_string(),
            self.device.to_string(),
            "--batch-size".to_string(),
            self.batch_size.to_string(),
            "--data".to_string(),
            self.data.to_string_lossy().to_string(),
            "--img".to_string(),
            self.img_size[0].to_string(),
            self.img_size[1].to_string(),
            "--epochs".to_string(),
            self.epochs.to_string(),
            "--weights".to_string(),
            self.weights.to_string_lossy().to_string(),
            "--hyp".to_string(),
            self.hyp.to_string_lossy().to_string(),
            "--name".to_string(),
            self.name.clone(),
        ]
    }
}

/// Runs `train.py` inside the framework checkout
#[derive(Debug, Clone)]
pub struct TrainingJobLauncher {
    pub framework_dir: PathBuf,
    pub python: String,
}

impl TrainingJobLauncher {
    pub fn new(framework_dir: impl Into<PathBuf>, python: impl Into<String>) -> Self {
        Self {
            framework_dir: framework_dir.into(),
            python: python.into(),
        }
    }

    pub fn command(&self, job: &TrainingJob) -> JobCommand {
        JobCommand::new(self.python.as_str())
            .args(job.args())
            .current_dir(&self.framework_dir)
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.framework_dir.join(TRAIN_RUNS_DIR)
    }

    /// Newest run directory for `name`, if the framework produced one
    pub fn run_dir(&self, name: &str) -> Result<PathBuf, LaunchError> {
        let base = self.runs_dir();
        latest_run_dir(&base, name).ok_or_else(|| LaunchError::NoRunDir {
            base,
            name: name.to_string(),
        })
    }

    /// Train and return the run directory holding the artifacts
    pub fn launch<R: CommandRunner + ?Sized>(
        &self,
        job: &TrainingJob,
        runner: &mut R,
    ) -> Result<PathBuf, LaunchError> {
        info!(
            "Training '{}' for {} epochs on device {} (batch {}, img {}x{})",
            job.name, job.epochs, job.device, job.batch_size, job.img_size[0], job.img_size[1]
        );
        runner.run(&self.command(job))?;
        let run_dir = self.run_dir(&job.name)?;
        info!("Training finished, artifacts in {:?}", run_dir);
        Ok(run_dir)
    }
}

/// Trained weights inside a training run directory
pub fn best_weights(run_dir: &Path) -> PathBuf {
    run_dir.join("weights").join("best.pt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::RecordingRunner;
    use std::fs;

    fn job() -> TrainingJob {
        TrainingJob {
            device: Device::Cuda(vec![0]),
            batch_size: 16,
            data: PathBuf::from("data/coco.yaml"),
            img_size: [640, 640],
            epochs: 64,
            weights: PathBuf::from("yolov7x.pt"),
            hyp: PathBuf::from("data/hyp.scratch.p5.yaml"),
            name: "yolov7x".to_string(),
        }
    }

    #[test]
    fn test_args_match_framework_cli() {
        assert_eq!(
            job().args().join(" "),
            "train.py --device 0 --batch-size 16 --data data/coco.yaml --img 640 640 \
             --epochs 64 --weights yolov7x.pt --hyp data/hyp.scratch.p5.yaml --name yolov7x"
        );
    }

    #[test]
    fn test_cpu_device() {
        let job = TrainingJob {
            device: Device::Cpu,
            ..job()
        };
        assert_eq!(job.args()[2], "cpu");
    }

    #[test]
    fn test_launch_runs_in_framework_dir_and_resolves_run() {
        let dir = tempfile::tempdir().unwrap();
        let framework_dir = dir.path().join("yolov7");
        let runs = framework_dir.join(TRAIN_RUNS_DIR);
        fs::create_dir_all(runs.join("yolov7x")).unwrap();

        // The framework increments the name when the run already exists
        let hook_runs = runs.clone();
        let mut runner = RecordingRunner::with_hook(move |_| {
            fs::create_dir_all(hook_runs.join("yolov7x2").join("weights")).unwrap();
        });
        let launcher = TrainingJobLauncher::new(&framework_dir, "python3");

        let run_dir = launcher.launch(&job(), &mut runner).unwrap();

        assert_eq!(run_dir, runs.join("yolov7x2"));
        assert_eq!(best_weights(&run_dir), runs.join("yolov7x2/weights/best.pt"));
        let cmd = &runner.commands[0];
        assert_eq!(cmd.program, "python3");
        assert_eq!(cmd.cwd.as_deref(), Some(framework_dir.as_path()));
        assert_eq!(cmd.args[0], "train.py");
    }

    #[test]
    fn test_launch_without_run_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = TrainingJobLauncher::new(dir.path(), "python");
        let mut runner = RecordingRunner::new();

        assert!(matches!(
            launcher.launch(&job(), &mut runner),
            Err(LaunchError::NoRunDir { .. })
        ));
    }

    #[test]
    fn test_training_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = TrainingJobLauncher::new(dir.path(), "python");
        let mut runner = RecordingRunner::new();
        runner.fail_program = Some("python".to_string());

        assert!(matches!(
            launcher.launch(&job(), &mut runner),
            Err(LaunchError::Failed { .. })
        ));
    }
}
