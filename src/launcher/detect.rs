use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::command::{CommandRunner, JobCommand, LaunchError};
use super::runs::{latest_run_dir, DETECT_RUNS_DIR, DETECT_RUN_NAME};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "mpeg", "mpg", "m4v"];

/// What the framework will read predictions from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceSource {
    Image(PathBuf),
    Video(PathBuf),
    Directory(PathBuf),
}

impl InferenceSource {
    /// Classify an existing path. The result holds an absolute path, since
    /// the framework runs from its own directory.
    pub fn classify(path: &Path) -> Result<Self, LaunchError> {
        let absolute =
            fs::canonicalize(path).map_err(|_| LaunchError::MissingSource(path.to_path_buf()))?;
        if absolute.is_dir() {
            return Ok(InferenceSource::Directory(absolute));
        }
        let is_video = absolute
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);
        if is_video {
            Ok(InferenceSource::Video(absolute))
        } else {
            Ok(InferenceSource::Image(absolute))
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            InferenceSource::Image(p) | InferenceSource::Video(p) | InferenceSource::Directory(p) => p,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            InferenceSource::Image(_) => "image",
            InferenceSource::Video(_) => "video",
            InferenceSource::Directory(_) => "directory",
        }
    }
}

/// Arguments of one `detect.py` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceJob {
    pub weights: PathBuf,
    pub conf: f32,
    pub img_size: u32,
    pub source: InferenceSource,
}

impl InferenceJob {
    pub fn args(&self) -> Vec<String> {
        vec![
            "detect.py".to_string(),
            "--weights".to_string(),
            self.weights.to_string_lossy().to_string(),
            "--conf".to_string(),
            self.conf.to_string(),
            "--img-size".to_string(),
            self.img_size.to_string(),
            "--source".to_string(),
            self.source.path().to_string_lossy().to_string(),
        ]
    }
}

/// Runs `detect.py` inside the framework checkout
#[derive(Debug, Clone)]
pub struct InferenceJobLauncher {
    pub framework_dir: PathBuf,
    pub python: String,
}

impl InferenceJobLauncher {
    pub fn new(framework_dir: impl Into<PathBuf>, python: impl Into<String>) -> Self {
        Self {
            framework_dir: framework_dir.into(),
            python: python.into(),
        }
    }

    pub fn command(&self, job: &InferenceJob) -> JobCommand {
        JobCommand::new(self.python.as_str())
            .args(job.args())
            .current_dir(&self.framework_dir)
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.framework_dir.join(DETECT_RUNS_DIR)
    }

    pub fn run_dir(&self) -> Result<PathBuf, LaunchError> {
        let base = self.runs_dir();
        latest_run_dir(&base, DETECT_RUN_NAME).ok_or_else(|| LaunchError::NoRunDir {
            base,
            name: DETECT_RUN_NAME.to_string(),
        })
    }

    /// Run inference and return the directory with the annotated outputs
    pub fn launch<R: CommandRunner + ?Sized>(
        &self,
        job: &InferenceJob,
        runner: &mut R,
    ) -> Result<PathBuf, LaunchError> {
        if !job.weights.is_file() {
            return Err(LaunchError::MissingWeights(job.weights.clone()));
        }
        info!(
            "Detecting on {} {:?} with {:?} (conf {}, img {})",
            job.source.kind(),
            job.source.path(),
            job.weights,
            job.conf,
            job.img_size
        );
        runner.run(&self.command(job))?;
        let run_dir = self.run_dir()?;
        info!("Detection finished, outputs in {:?}", run_dir);
        Ok(run_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::RecordingRunner;

    #[test]
    fn test_classify_sources() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("agri_0_14.jpeg");
        let video = dir.path().join("field.MP4");
        fs::write(&image, b"x").unwrap();
        fs::write(&video, b"x").unwrap();

        assert_eq!(InferenceSource::classify(&image).unwrap().kind(), "image");
        assert_eq!(InferenceSource::classify(&video).unwrap().kind(), "video");
        assert_eq!(InferenceSource::classify(dir.path()).unwrap().kind(), "directory");
        assert!(matches!(
            InferenceSource::classify(&dir.path().join("missing.jpeg")),
            Err(LaunchError::MissingSource(_))
        ));
    }

    #[test]
    fn test_args_match_framework_cli() {
        let job = InferenceJob {
            weights: PathBuf::from("runs/train/yolov7x/weights/best.pt"),
            conf: 0.5,
            img_size: 640,
            source: InferenceSource::Image(PathBuf::from("/content/test/agri_0_14.jpeg")),
        };
        assert_eq!(
            job.args().join(" "),
            "detect.py --weights runs/train/yolov7x/weights/best.pt --conf 0.5 --img-size 640 \
             --source /content/test/agri_0_14.jpeg"
        );
    }

    #[test]
    fn test_launch_resolves_latest_exp() {
        let dir = tempfile::tempdir().unwrap();
        let framework_dir = dir.path().join("yolov7");
        let weights = dir.path().join("best.pt");
        fs::write(&weights, b"w").unwrap();
        let source = dir.path().join("test");
        fs::create_dir(&source).unwrap();

        let detect_runs = framework_dir.join(DETECT_RUNS_DIR);
        fs::create_dir_all(detect_runs.join("exp")).unwrap();
        let hook_runs = detect_runs.clone();
        let mut runner = RecordingRunner::with_hook(move |_| {
            fs::create_dir_all(hook_runs.join("exp2")).unwrap();
        });

        let launcher = InferenceJobLauncher::new(&framework_dir, "python");
        let job = InferenceJob {
            weights,
            conf: 0.25,
            img_size: 640,
            source: InferenceSource::classify(&source).unwrap(),
        };
        let run_dir = launcher.launch(&job, &mut runner).unwrap();

        assert_eq!(run_dir, detect_runs.join("exp2"));
        assert_eq!(runner.commands[0].args[0], "detect.py");
        assert_eq!(runner.commands[0].cwd.as_deref(), Some(framework_dir.as_path()));
    }

    #[test]
    fn test_launch_requires_weights() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = InferenceJobLauncher::new(dir.path(), "python");
        let job = InferenceJob {
            weights: dir.path().join("missing.pt"),
            conf: 0.5,
            img_size: 640,
            source: InferenceSource::Directory(dir.path().to_path_buf()),
        };
        let mut runner = RecordingRunner::new();

        assert!(matches!(
            launcher.launch(&job, &mut runner),
            Err(LaunchError::MissingWeights(_))
        ));
        assert!(runner.commands.is_empty());
    }
}
