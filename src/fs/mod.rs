//! File system layer
//!
//! File-system-object metadata, the byte-stream abstraction the transfer
//! engine reads and writes through, and the low-level operations behind
//! atomic commits.

mod object;
mod operations;
pub mod stream;

pub use object::*;
pub use operations::*;
pub use stream::{LocalStreams, ReadStream, StreamProvider, WriteStream};
