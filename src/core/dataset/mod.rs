mod data_config;
mod label;
mod layout;

pub use data_config::{DataConfig, DataConfigError};
pub use label::parse_label_file;
pub use layout::{has_image_extension, list_images, DatasetLayout, DatasetSplit};
