mod archive;
mod file_ops;

pub use archive::{extract_zip, ArchiveError, ExtractSummary};
pub use file_ops::{copy_file, label_path_for_image, move_into_dir, FileOpError};
