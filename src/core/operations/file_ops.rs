use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error};

pub type FileOpResult<T> = Result<T, FileOpError>;

#[derive(Debug, Error)]
pub enum FileOpError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("destination already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("copy from {src} to {dest} failed: {source}")]
    CopyFailed {
        src: PathBuf,
        dest: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("remove of {path} failed: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("path has no file name: {0}")]
    NoFileName(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Move a file, refusing to overwrite an existing destination.
///
/// Tries a rename first and falls back to copy + remove when the rename
/// fails (for example across drives).
pub fn move_file(src: &Path, dest: &Path) -> FileOpResult<()> {
    if !src.is_file() {
        return Err(FileOpError::NotFound(src.to_path_buf()));
    }
    if dest.exists() {
        return Err(FileOpError::AlreadyExists(dest.to_path_buf()));
    }

    debug!("Moving file from {:?} to {:?}", src, dest);

    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    if let Err(source) = fs::copy(src, dest) {
        error!("Failed to copy file from {:?} to {:?}: {}", src, dest, source);
        return Err(FileOpError::CopyFailed {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            source,
        });
    }

    if let Err(source) = fs::remove_file(src) {
        error!("Failed to remove original file {:?} after copy: {}", src, source);
        let _ = fs::remove_file(dest);
        return Err(FileOpError::RemoveFailed {
            path: src.to_path_buf(),
            source,
        });
    }

    Ok(())
}

/// Move `src` into `dir`, keeping its file name. Returns the new path.
pub fn move_into_dir(src: &Path, dir: &Path) -> FileOpResult<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| FileOpError::NoFileName(src.to_path_buf()))?;
    let dest = dir.join(name);
    move_file(src, &dest)?;
    Ok(dest)
}

/// Copy a file, creating the destination's parent directories
pub fn copy_file(src: &Path, dest: &Path) -> FileOpResult<u64> {
    if !src.is_file() {
        return Err(FileOpError::NotFound(src.to_path_buf()));
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dest).map_err(|source| FileOpError::CopyFailed {
        src: src.to_path_buf(),
        dest: dest.to_path_buf(),
        source,
    })
}

/// Annotation path for an image: `<labels_dir>/<stem>.txt`
pub fn label_path_for_image(image_path: &Path, labels_dir: &Path) -> Option<PathBuf> {
    image_path
        .file_stem()
        .map(|stem| labels_dir.join(format!("{}.txt", stem.to_string_lossy())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_file_moves_content() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.jpeg");
        let dest = dir.path().join("b.jpeg");
        fs::write(&src, b"pixels").unwrap();

        move_file(&src, &dest).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"pixels");
    }

    #[test]
    fn test_move_missing_source_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = move_file(&dir.path().join("gone.txt"), &dir.path().join("x.txt")).unwrap_err();
        assert!(matches!(err, FileOpError::NotFound(_)));
    }

    #[test]
    fn test_move_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dest = dir.path().join("b.txt");
        fs::write(&src, b"new").unwrap();
        fs::write(&dest, b"old").unwrap();

        let err = move_file(&src, &dest).unwrap_err();
        assert!(matches!(err, FileOpError::AlreadyExists(_)));
        assert!(src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"old");
    }

    #[test]
    fn test_move_into_dir_keeps_name() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("images");
        fs::create_dir(&target).unwrap();
        let src = dir.path().join("agri_0_14.jpeg");
        fs::write(&src, b"x").unwrap();

        let moved = move_into_dir(&src, &target).unwrap();
        assert_eq!(moved, target.join("agri_0_14.jpeg"));
        assert!(moved.exists());
    }

    #[test]
    fn test_copy_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("best.pt");
        fs::write(&src, b"weights").unwrap();
        let dest = dir.path().join("out").join("weights").join("best.pt");

        assert_eq!(copy_file(&src, &dest).unwrap(), 7);
        assert!(src.exists());
        assert!(dest.exists());
    }

    #[test]
    fn test_label_path_for_image() {
        let label = label_path_for_image(Path::new("/d/agri_0_14.jpeg"), Path::new("/d/labels"));
        assert_eq!(label, Some(PathBuf::from("/d/labels/agri_0_14.txt")));
    }
}
