use std::fs;
use std::path::{Path, PathBuf};

/// Where the framework writes training runs, relative to its directory
pub const TRAIN_RUNS_DIR: &str = "runs/train";
/// Where the framework writes inference runs, relative to its directory
pub const DETECT_RUNS_DIR: &str = "runs/detect";
/// Base name of inference runs
pub const DETECT_RUN_NAME: &str = "exp";

/// Suffix rank of `dir_name` for run `name`: `name` is 1, `name2` is 2, ...
fn run_rank(dir_name: &str, name: &str) -> Option<u32> {
    let suffix = dir_name.strip_prefix(name)?;
    if suffix.is_empty() {
        return Some(1);
    }
    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse::<u32>().ok().filter(|n| *n >= 2)
}

/// The framework never overwrites a run: an existing `name` becomes `name2`,
/// `name3`, ... Pick the newest directory for `name` under `base`.
pub fn latest_run_dir(base: &Path, name: &str) -> Option<PathBuf> {
    fs::read_dir(base)
        .ok()?
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let dir_name = entry.file_name().to_string_lossy().to_string();
            run_rank(&dir_name, name).map(|rank| (rank, entry.path()))
        })
        .max_by_key(|(rank, _)| *rank)
        .map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_rank() {
        assert_eq!(run_rank("exp", "exp"), Some(1));
        assert_eq!(run_rank("exp2", "exp"), Some(2));
        assert_eq!(run_rank("exp12", "exp"), Some(12));
        assert_eq!(run_rank("expX", "exp"), None);
        assert_eq!(run_rank("exp1", "exp"), None);
        assert_eq!(run_rank("other", "exp"), None);
    }

    #[test]
    fn test_latest_run_dir_picks_highest_suffix() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["yolov7x", "yolov7x2", "yolov7x10", "yolov7x_old"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("yolov7x11"), b"not a dir").unwrap();

        assert_eq!(
            latest_run_dir(dir.path(), "yolov7x"),
            Some(dir.path().join("yolov7x10"))
        );
    }

    #[test]
    fn test_latest_run_dir_handles_suffixed_names() {
        // "yolov7" must not claim "yolov7x" runs
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("yolov7x")).unwrap();
        assert_eq!(latest_run_dir(dir.path(), "yolov7"), None);
    }

    #[test]
    fn test_latest_run_dir_missing_base() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(latest_run_dir(&dir.path().join("runs"), "exp"), None);
    }
}
