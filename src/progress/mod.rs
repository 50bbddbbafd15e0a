//! Progress reporting module
//!
//! Byte-level progress bars for chunked transfers.

mod reporter;

pub use reporter::*;
