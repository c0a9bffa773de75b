//! Driving the external detection framework through its command-line entry points.
//!
//! Everything that spawns a process goes through [`CommandRunner`], so the
//! launchers can be exercised without a Python environment.

mod command;
mod detect;
mod device;
mod framework;
mod runs;
mod train;

#[cfg(test)]
pub(crate) use command::{JobCommand, RecordingRunner};
#[cfg(test)]
pub(crate) use runs::{DETECT_RUNS_DIR, TRAIN_RUNS_DIR};

pub use command::{CommandRunner, LaunchError, SystemRunner};
pub use detect::{InferenceJob, InferenceJobLauncher, InferenceSource};
pub use device::Device;
pub use framework::{FrameworkSetup, SetupStatus};
pub use train::{best_weights, TrainingJob, TrainingJobLauncher};
