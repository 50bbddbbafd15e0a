//! Transfer engine module
//!
//! Whole-file atomic copy/move and the chunked, cancellable
//! per-object engine built on top of it.

mod engine;
mod transfer;

pub use engine::*;
pub use transfer::{copy_atomically, make_writable, move_atomically, remove};
