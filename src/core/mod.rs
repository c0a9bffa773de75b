pub mod analysis;
pub mod dataset;
pub mod operations;
pub mod split;
