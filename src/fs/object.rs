//! File-system object metadata
//!
//! A [`FileSystemObject`] is a snapshot of what the surrounding file manager
//! knows about one path. The transfer engine consumes it and never changes it
//! except through the writable flag.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kind of object a path refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Anything else (socket, device, dangling link...)
    Other,
    /// Path does not exist
    Missing,
}

/// Metadata snapshot for a single file or directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSystemObject {
    path: PathBuf,
    object_type: ObjectType,
    size: u64,
    read_only: bool,
}

impl FileSystemObject {
    /// Stat `path` and build a snapshot. A missing path is not an error.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let mut object = Self {
            path: path.into(),
            object_type: ObjectType::Missing,
            size: 0,
            read_only: false,
        };
        object.refresh();
        object
    }

    /// Re-read metadata from disk
    pub fn refresh(&mut self) {
        match std::fs::metadata(&self.path) {
            Ok(meta) => {
                self.object_type = if meta.is_file() {
                    ObjectType::File
                } else if meta.is_dir() {
                    ObjectType::Directory
                } else {
                    ObjectType::Other
                };
                self.size = if meta.is_file() { meta.len() } else { 0 };
                self.read_only = meta.permissions().readonly();
            }
            Err(_) => {
                self.object_type = ObjectType::Missing;
                self.size = 0;
                self.read_only = false;
            }
        }
    }

    /// Full path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last path component, as used for the default destination name
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Object type at the time of the last refresh
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    /// Whether the object existed at the time of the last refresh
    pub fn exists(&self) -> bool {
        self.object_type != ObjectType::Missing
    }

    /// Check existence against the file system right now
    pub fn exists_on_disk(&self) -> bool {
        std::fs::symlink_metadata(&self.path).is_ok()
    }

    /// Regular file?
    pub fn is_file(&self) -> bool {
        self.object_type == ObjectType::File
    }

    /// Directory?
    pub fn is_dir(&self) -> bool {
        self.object_type == ObjectType::Directory
    }

    /// File size in bytes (0 for directories)
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read-only flag
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}
