//! Data sources that do not come from disk.

pub mod sample;

pub use sample::*;
