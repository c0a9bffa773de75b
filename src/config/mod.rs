mod pipeline_config;

pub use pipeline_config::{ConfigError, PipelineConfig};
