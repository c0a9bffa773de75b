use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::command::{CommandRunner, JobCommand, LaunchError};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// What `prepare` had to do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetupStatus {
    pub cloned: bool,
    pub downloaded_weights: bool,
}

/// A local checkout of the framework plus its initial weights
#[derive(Debug, Clone)]
pub struct FrameworkSetup {
    pub repo_url: String,
    pub dir: PathBuf,
    pub weights_url: String,
    /// Relative paths resolve against `dir`
    pub weights: PathBuf,
}

impl FrameworkSetup {
    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(&self.weights)
    }

    pub fn is_cloned(&self) -> bool {
        self.dir.join(".git").exists()
    }

    pub fn clone_command(&self) -> JobCommand {
        JobCommand::new("git")
            .arg("clone")
            .arg(self.repo_url.as_str())
            .arg(self.dir.to_string_lossy())
    }

    /// Check the checkout exposes the training and inference scripts
    pub fn check_entry_points(&self) -> Result<(), LaunchError> {
        for script in ["train.py", "detect.py"] {
            let path = self.dir.join(script);
            if !path.is_file() {
                return Err(LaunchError::MissingEntryPoint(path));
            }
        }
        Ok(())
    }

    /// Clone the repository unless a checkout already exists
    pub fn ensure_cloned<R: CommandRunner + ?Sized>(&self, runner: &mut R) -> Result<bool, LaunchError> {
        if self.is_cloned() {
            info!("Framework already cloned at {:?}, skipping clone", self.dir);
            return Ok(false);
        }
        info!("Cloning {} into {:?}", self.repo_url, self.dir);
        runner.run(&self.clone_command())?;
        Ok(true)
    }

    /// Download the initial weights unless the file already exists
    pub fn ensure_weights(&self) -> Result<bool, LaunchError> {
        let path = self.weights_path();
        if path.exists() {
            info!("Weights already present at {:?}, not re-downloading", path);
            return Ok(false);
        }
        download_file(&self.weights_url, &path)?;
        Ok(true)
    }

    pub fn prepare<R: CommandRunner + ?Sized>(&self, runner: &mut R) -> Result<SetupStatus, LaunchError> {
        let cloned = self.ensure_cloned(runner)?;
        self.check_entry_points()?;
        let downloaded_weights = self.ensure_weights()?;
        Ok(SetupStatus {
            cloned,
            downloaded_weights,
        })
    }
}

/// Stream `url` into `dest` through a `.part` file, checking Content-Length when sent
fn download_file(url: &str, dest: &Path) -> Result<u64, LaunchError> {
    let io_err = |path: &Path, source: io::Error| LaunchError::Io {
        path: path.to_path_buf(),
        source,
    };

    info!("Downloading {} to {:?}, please wait...", url, dest);

    let resp = ureq::get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .call()
        .map_err(|e| LaunchError::Download {
            url: url.to_string(),
            source: Box::new(e),
        })?;

    let expected = resp
        .header("Content-Length")
        .and_then(|s| s.parse::<u64>().ok());
    if let Some(len) = expected {
        info!("Downloading {} bytes...", len);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let partial = dest.with_extension("part");
    let written = match stream_to_partial(resp.into_reader(), &partial, expected, url) {
        Ok(written) => written,
        Err(e) => {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
    };

    if let Err(e) = fs::rename(&partial, dest) {
        let _ = fs::remove_file(&partial);
        return Err(io_err(dest, e));
    }
    info!("Downloaded {} bytes to {:?}", written, dest);
    Ok(written)
}

/// Write the whole body to `partial` and sync it. The caller removes `partial` on error.
fn stream_to_partial<R: io::Read>(
    mut reader: R,
    partial: &Path,
    expected: Option<u64>,
    url: &str,
) -> Result<u64, LaunchError> {
    let io_err = |source: io::Error| LaunchError::Io {
        path: partial.to_path_buf(),
        source,
    };

    let file = fs::File::create(partial).map_err(io_err)?;
    let mut writer = io::BufWriter::new(file);
    let written = io::copy(&mut reader, &mut writer).map_err(io_err)?;
    let file = writer.into_inner().map_err(|e| io_err(e.into_error()))?;
    file.sync_all().map_err(io_err)?;

    match expected {
        Some(expected) if written != expected => Err(LaunchError::IncompleteDownload {
            url: url.to_string(),
            expected,
            actual: written,
        }),
        _ => Ok(written),
    }
}
