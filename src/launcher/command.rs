use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: String },
    #[error("download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },
    #[error("download of {url} was truncated: expected {expected} bytes, got {actual}")]
    IncompleteDownload {
        url: String,
        expected: u64,
        actual: u64,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("framework entry point missing: {0}")]
    MissingEntryPoint(PathBuf),
    #[error("inference source not found: {0}")]
    MissingSource(PathBuf),
    #[error("weights not found: {0}")]
    MissingWeights(PathBuf),
    #[error("no run directory named {name} under {base}")]
    NoRunDir { base: PathBuf, name: String },
}

/// A process invocation: program, arguments and working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl JobCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Runs a command to completion
pub trait CommandRunner {
    fn run(&mut self, cmd: &JobCommand) -> Result<(), LaunchError>;
}

/// Spawns real processes with inherited stdio and waits for them
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, cmd: &JobCommand) -> Result<(), LaunchError> {
        match &cmd.cwd {
            Some(dir) => info!("Running `{}` in {:?}", cmd, dir),
            None => info!("Running `{}`", cmd),
        }

        let mut process = Command::new(&cmd.program);
        process.args(&cmd.args);
        if let Some(dir) = &cmd.cwd {
            process.current_dir(dir);
        }

        let status = process.status().map_err(|source| LaunchError::Spawn {
            command: cmd.to_string(),
            source,
        })?;
        if !status.success() {
            return Err(LaunchError::Failed {
                command: cmd.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// Records commands instead of running them. The hook lets a test stand in
/// for the framework's side effects (run directories, outputs).
#[cfg(test)]
pub(crate) struct RecordingRunner {
    pub commands: Vec<JobCommand>,
    pub fail_program: Option<String>,
    hook: Option<Box<dyn FnMut(&JobCommand)>>,
}

#[cfg(test)]
impl RecordingRunner {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            fail_program: None,
            hook: None,
        }
    }

    pub fn with_hook(hook: impl FnMut(&JobCommand) + 'static) -> Self {
        Self {
            hook: Some(Box::new(hook)),
            ..Self::new()
        }
    }
}

#[cfg(test)]
impl CommandRunner for RecordingRunner {
    fn run(&mut self, cmd: &JobCommand) -> Result<(), LaunchError> {
        self.commands.push(cmd.clone());
        if self.fail_program.as_deref() == Some(cmd.program.as_str()) {
            return Err(LaunchError::Failed {
                command: cmd.to_string(),
                status: "exit status: 1".to_string(),
            });
        }
        if let Some(hook) = self.hook.as_mut() {
            hook(cmd);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_spaces() {
        let cmd = JobCommand::new("python")
            .arg("detect.py")
            .args(["--source", "my images/a.jpeg"]);
        assert_eq!(cmd.to_string(), "python detect.py --source \"my images/a.jpeg\"");
    }

    #[test]
    fn test_recording_runner_fails_on_request() {
        let mut runner = RecordingRunner::new();
        runner.fail_program = Some("git".to_string());

        assert!(runner.run(&JobCommand::new("python")).is_ok());
        assert!(matches!(
            runner.run(&JobCommand::new("git").arg("clone")),
            Err(LaunchError::Failed { .. })
        ));
        assert_eq!(runner.commands.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_reports_exit_status() {
        let mut runner = SystemRunner;
        assert!(runner.run(&JobCommand::new("true")).is_ok());
        assert!(matches!(
            runner.run(&JobCommand::new("false")),
            Err(LaunchError::Failed { .. })
        ));
        assert!(matches!(
            runner.run(&JobCommand::new("definitely-not-a-real-binary-xyz")),
            Err(LaunchError::Spawn { .. })
        ));
    }
}
