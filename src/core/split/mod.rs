mod splitter;

pub use splitter::{DatasetSplitter, SplitError, SplitOptions, SplitReport};
