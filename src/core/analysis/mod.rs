mod split_stats;

pub use split_stats::{analyze_split, SplitStats};
