//! Volume enumeration and change notification

mod enumerator;
mod volumes;

pub use enumerator::*;
pub use volumes::*;
