//! Configuration module for fmcore
//!
//! CLI arguments, the settings file and runtime defaults.

mod settings;

pub use settings::*;
