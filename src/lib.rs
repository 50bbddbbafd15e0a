//! # fmcore - file manager transfer core
//!
//! Building blocks for a file manager's copy/move machinery and its live
//! volume list.
//!
//! ## Features
//!
//! - **Atomic transfers**: the destination appears complete or not at all;
//!   data lands in a hidden temporary file that is renamed into place
//! - **Chunked transfers**: advance a copy or move one bounded step at a
//!   time, poll progress and cancel between steps
//! - **Volume watching**: a background enumerator detects mounted volume and
//!   free-space changes and notifies observers on the owner thread
//! - **Coalescing notification queue**: cross-thread task hand-off where
//!   repeated notifications collapse into one
//!
//! ## Quick Start
//!
//! ```no_run
//! use fmcore::core::FileTransferEngine;
//! use fmcore::fs::FileSystemObject;
//! use std::path::Path;
//!
//! let mut engine = FileTransferEngine::new(FileSystemObject::new("/data/report.pdf"));
//! let bytes = engine.copy_atomically(Path::new("/backup"), Some("report-old.pdf")).unwrap();
//! println!("Copied {} bytes", bytes);
//! ```
//!
//! ## Watching Volumes
//!
//! ```no_run
//! use fmcore::system::{DiskListObserver, VolumeEnumerator};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl DiskListObserver for Printer {
//!     fn drives_changed(&self) {
//!         println!("volumes changed");
//!     }
//! }
//!
//! let enumerator = VolumeEnumerator::new().unwrap();
//! enumerator.add_observer(Arc::new(Printer)).unwrap();
//! loop {
//!     enumerator.wait_and_pump().unwrap();
//!     for disk in enumerator.drives().iter() {
//!         println!("{}: {} bytes free", disk.root_path.display(), disk.bytes_available);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod notify;
pub mod progress;
pub mod system;

// Re-export commonly used types
pub use crate::core::{ChunkStatus, FileTransferEngine, TransferMode};
pub use error::{FileOperationError, Result, ResultCode};
pub use fs::{FileSystemObject, TransferOptions};
pub use system::{DiskInfo, DiskListObserver, VolumeEnumerator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use fmcore::prelude::*;
    //! ```

    pub use crate::config::Settings;
    pub use crate::core::{ChunkStatus, FileTransferEngine, TransferMode};
    pub use crate::error::{FileOperationError, Result, ResultCode};
    pub use crate::fs::{FileSystemObject, ObjectType, TransferOptions};
    pub use crate::notify::{NotificationQueue, QueueSender, Tag};
    pub use crate::progress::TransferProgress;
    pub use crate::system::{DiskInfo, DiskListObserver, ObserverId, VolumeEnumerator};
}
