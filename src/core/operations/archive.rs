use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive not found: {0}")]
    Missing(PathBuf),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid zip archive {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("archive entry escapes the destination: {0}")]
    UnsafeEntry(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub dirs: usize,
    pub bytes: u64,
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError {
    let path = path.to_path_buf();
    move |source| ArchiveError::Io { path, source }
}

/// Extract every entry of a zip archive under `dest`, overwriting existing files.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<ExtractSummary, ArchiveError> {
    if !archive_path.is_file() {
        return Err(ArchiveError::Missing(archive_path.to_path_buf()));
    }

    let file = fs::File::open(archive_path).map_err(io_err(archive_path))?;
    let mut archive =
        zip::ZipArchive::new(io::BufReader::new(file)).map_err(|source| ArchiveError::Zip {
            path: archive_path.to_path_buf(),
            source,
        })?;

    info!(
        "Extracting {} entries from {:?} into {:?}",
        archive.len(),
        archive_path,
        dest
    );

    let mut summary = ExtractSummary::default();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|source| ArchiveError::Zip {
            path: archive_path.to_path_buf(),
            source,
        })?;

        let relative = entry
            .enclosed_name()
            .map(|p| p.to_owned())
            .ok_or_else(|| ArchiveError::UnsafeEntry(entry.name().to_string()))?;
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(io_err(&out_path))?;
            summary.dirs += 1;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let mut out = fs::File::create(&out_path).map_err(io_err(&out_path))?;
        let written = io::copy(&mut entry, &mut out).map_err(io_err(&out_path))?;
        debug!("Extracted {:?} ({} bytes)", out_path, written);

        summary.files += 1;
        summary.bytes += written;
    }

    info!(
        "Extracted {} files, {} directories ({} bytes)",
        summary.files, summary.dirs, summary.bytes
    );
    Ok(summary)
}
