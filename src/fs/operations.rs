//! Low-level file operations shared by the transfer paths
//!
//! Temporary naming, the commit rename, attribute preservation, volume
//! identity and space checks.

use crate::error::{FileOperationError, IoResultExt, Result};
use crate::fs::FileSystemObject;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Suffix of in-flight destination files
pub const TEMP_SUFFIX: &str = ".fmpart";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Options for file transfers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
    /// Buffer size for whole-file copies
    pub buffer_size: usize,
    /// Preserve file permissions
    pub preserve_permissions: bool,
    /// Preserve modification and access time
    pub preserve_mtime: bool,
    /// fsync the temporary file before the commit rename
    pub sync_on_commit: bool,
    /// Refuse to start when the destination volume lacks space
    pub check_free_space: bool,
    /// Moves within one volume are a single rename instead of copy + delete
    pub rename_within_volume: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1024 * 1024, // 1MB
            preserve_permissions: true,
            preserve_mtime: true,
            sync_on_commit: true,
            check_free_space: true,
            rename_within_volume: true,
        }
    }
}

/// Resolve the final destination path for `object`
pub fn destination_path(
    object: &FileSystemObject,
    dest_folder: &Path,
    new_name: Option<&str>,
) -> Result<PathBuf> {
    let name = match new_name {
        Some(name) if !name.is_empty() => name,
        Some(_) => return Err(FileOperationError::invalid("empty destination name")),
        None => object.file_name().ok_or_else(|| {
            FileOperationError::invalid(format!("'{}' has no file name", object.path().display()))
        })?,
    };
    Ok(dest_folder.join(name))
}

/// Unique hidden sibling of `final_path` used while bytes are in flight
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let id = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp_name = format!(".{}.{}-{}{}", name, std::process::id(), id, TEMP_SUFFIX);
    final_path.with_file_name(temp_name)
}

/// Fail with `AlreadyExists` if something occupies `path`
pub fn ensure_absent(path: &Path) -> Result<()> {
    if std::fs::symlink_metadata(path).is_ok() {
        return Err(FileOperationError::AlreadyExists(path.to_path_buf()));
    }
    Ok(())
}

/// Rename `from` to `to` without replacing an existing `to`
///
/// On Linux the kernel enforces this (`RENAME_NOREPLACE`); filesystems
/// without support fall back to check-then-rename.
#[cfg(target_os = "linux")]
pub fn rename_no_replace(from: &Path, to: &Path) -> Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = |path: &Path| {
        CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            FileOperationError::invalid(format!("path contains a NUL byte: {}", path.display()))
        })
    };
    let c_from = c_path(from)?;
    let c_to = c_path(to)?;

    let result = unsafe {
        libc::renameat2(
            libc::AT_FDCWD,
            c_from.as_ptr(),
            libc::AT_FDCWD,
            c_to.as_ptr(),
            libc::RENAME_NOREPLACE,
        )
    };
    if result == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EINVAL) | Some(libc::ENOSYS) => rename_checked(from, to),
        _ => Err(FileOperationError::io(to, err)),
    }
}

/// Rename `from` to `to` without replacing an existing `to`
#[cfg(not(target_os = "linux"))]
pub fn rename_no_replace(from: &Path, to: &Path) -> Result<()> {
    rename_checked(from, to)
}

fn rename_checked(from: &Path, to: &Path) -> Result<()> {
    ensure_absent(to)?;
    std::fs::rename(from, to).with_path(to)
}

/// Delete the source of a committed move
///
/// If the source cannot be removed the committed destination is deleted
/// again, so a failed move leaves only the source behind.
pub fn remove_moved_source(source: &Path, committed: &Path) -> Result<()> {
    let Err(e) = std::fs::remove_file(source) else {
        return Ok(());
    };
    tracing::warn!(
        "Could not remove moved source {} ({}); rolling back {}",
        source.display(),
        e,
        committed.display()
    );
    if let Err(rollback) = std::fs::remove_file(committed) {
        tracing::warn!("Rollback of {} failed: {}", committed.display(), rollback);
    }
    Err(FileOperationError::io(source, e))
}

/// Best-effort removal of a temporary file
pub fn discard_temp(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove temporary file {}: {}", path.display(), e);
        }
    }
}

/// Copy permissions and timestamps from `source` onto `dest`
pub fn preserve_attributes(source: &Path, dest: &Path, options: &TransferOptions) -> Result<()> {
    let metadata = std::fs::metadata(source).with_path(source)?;

    if options.preserve_mtime {
        if let Ok(mtime) = metadata.modified() {
            let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(mtime));
        }
        if let Ok(atime) = metadata.accessed() {
            let _ = filetime::set_file_atime(dest, filetime::FileTime::from_system_time(atime));
        }
    }

    // Permissions last: a read-only source makes the copy read-only too
    if options.preserve_permissions {
        std::fs::set_permissions(dest, metadata.permissions()).with_path(dest)?;
    }

    Ok(())
}

/// Whether `source` and `dest_folder` live on the same volume
#[cfg(unix)]
pub fn same_volume(source: &Path, dest_folder: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (std::fs::metadata(source), std::fs::metadata(dest_folder)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev(),
        _ => false,
    }
}

/// Whether `source` and `dest_folder` live on the same volume
#[cfg(not(unix))]
pub fn same_volume(source: &Path, dest_folder: &Path) -> bool {
    use crate::system::volume_for_path;

    match (volume_for_path(source), volume_for_path(dest_folder)) {
        (Some(a), Some(b)) => a.root_path == b.root_path,
        _ => false,
    }
}

/// Check there is room for `required` bytes under `dest_folder`
///
/// An unknown volume passes; only a known shortfall fails.
pub fn check_space(dest_folder: &Path, required: u64) -> Result<()> {
    if required == 0 {
        return Ok(());
    }
    if let Some(available) = crate::system::available_space(dest_folder) {
        if available < required {
            return Err(FileOperationError::InsufficientSpace {
                path: dest_folder.to_path_buf(),
                required,
                available,
            });
        }
    }
    Ok(())
}

/// Remove a file or directory
pub fn remove_path(path: &Path) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path).with_path(path)?;
    if metadata.is_dir() {
        std::fs::remove_dir_all(path).with_path(path)?;
    } else {
        std::fs::remove_file(path).with_path(path)?;
    }
    Ok(())
}

/// Set or clear write permission; returns whether the result matches the request
pub fn set_writable(path: &Path, writable: bool) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    let mut permissions = metadata.permissions();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = permissions.mode();
        let mode = if writable { mode | 0o200 } else { mode & !0o222 };
        permissions.set_mode(mode);
    }
    #[cfg(not(unix))]
    permissions.set_readonly(!writable);

    if let Err(e) = std::fs::set_permissions(path, permissions) {
        tracing::debug!("set_permissions on {} failed: {}", path.display(), e);
    }

    std::fs::metadata(path)
        .map(|m| m.permissions().readonly() != writable)
        .unwrap_or(false)
}
