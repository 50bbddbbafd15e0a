//! Cross-thread notification delivery
//!
//! A tag-coalescing queue that lets worker threads hand deferred work to the
//! thread that owns a component.

mod queue;

pub use queue::*;
