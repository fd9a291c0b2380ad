//! Media file analysis.

pub mod probe;

pub use probe::{probe, MediaInfo};
