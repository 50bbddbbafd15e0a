//! Mounted volume listing
//!
//! Wraps `sysinfo::Disks` behind the [`VolumeSource`] trait so the enumerator
//! can be driven by a scripted source in tests.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// One mounted volume at snapshot time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    /// Device or volume label
    pub name: String,
    /// Mount point
    pub root_path: PathBuf,
    /// Free space available to the current user
    pub bytes_available: u64,
    /// Filesystem type (ext4, apfs, ntfs...)
    pub file_system: String,
    /// Total capacity in bytes
    pub total_bytes: u64,
    /// Removable media (USB sticks, SD cards)
    pub is_removable: bool,
}

impl DiskInfo {
    /// Minimal entry with the fields change detection looks at
    pub fn new(name: impl Into<String>, root_path: impl Into<PathBuf>, bytes_available: u64) -> Self {
        Self {
            name: name.into(),
            root_path: root_path.into(),
            bytes_available,
            file_system: String::new(),
            total_bytes: 0,
            is_removable: false,
        }
    }

    /// Equal for change-detection purposes (name, root and free space)
    pub fn same_state(&self, other: &DiskInfo) -> bool {
        self.name == other.name
            && self.root_path == other.root_path
            && self.bytes_available == other.bytes_available
    }
}

/// Whether `fresh` differs from `current` in count, order or any entry's state
pub fn drives_changed(fresh: &[DiskInfo], current: &[DiskInfo]) -> bool {
    fresh.len() != current.len()
        || fresh
            .iter()
            .zip(current)
            .any(|(new, old)| !new.same_state(old))
}

/// Something that can list the currently mounted volumes
pub trait VolumeSource: Send {
    /// One full listing; order must be stable between calls
    fn mounted_volumes(&mut self) -> Vec<DiskInfo>;
}

/// Volumes reported by the operating system
pub struct SystemVolumes {
    disks: Disks,
}

impl SystemVolumes {
    /// Create with a freshly refreshed disk list
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SystemVolumes {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeSource for SystemVolumes {
    fn mounted_volumes(&mut self) -> Vec<DiskInfo> {
        self.disks.refresh_list();
        self.disks.iter().map(disk_info).collect()
    }
}

fn disk_info(disk: &sysinfo::Disk) -> DiskInfo {
    DiskInfo {
        name: disk.name().to_string_lossy().to_string(),
        root_path: disk.mount_point().to_path_buf(),
        bytes_available: disk.available_space(),
        file_system: disk.file_system().to_string_lossy().to_string(),
        total_bytes: disk.total_space(),
        is_removable: disk.is_removable(),
    }
}

/// Volume holding `path`
///
/// The longest mount-point prefix wins, but only among mounts on the same
/// device as `path`; when the real mount is missing from the listing the
/// result is `None` rather than an enclosing volume.
pub fn volume_for_path(path: &Path) -> Option<DiskInfo> {
    let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    let volumes: Vec<DiskInfo> = disks.iter().map(disk_info).collect();
    matching_volume(&path, &volumes)
}

fn matching_volume(path: &Path, volumes: &[DiskInfo]) -> Option<DiskInfo> {
    volumes
        .iter()
        .filter(|disk| path.starts_with(&disk.root_path) && same_device(path, &disk.root_path))
        .max_by_key(|disk| disk.root_path.components().count())
        .cloned()
}

#[cfg(unix)]
fn same_device(path: &Path, mount_point: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (std::fs::metadata(path), std::fs::metadata(mount_point)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_device(_path: &Path, _mount_point: &Path) -> bool {
    true
}

/// Free space of the volume holding `path`, if it can be determined
pub fn available_space(path: &Path) -> Option<u64> {
    volume_for_path(path).map(|disk| disk.bytes_available)
}
