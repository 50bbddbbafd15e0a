//! Whole-file atomic copy and move
//!
//! Bytes go to a hidden temporary sibling of the destination, which is
//! flushed, synced and then renamed into place. A move removes the source only
//! after that rename has succeeded, and undoes the commit when the source
//! cannot be removed.

use crate::core::TransferMode;
use crate::error::{FileOperationError, IoResultExt, Result};
use crate::fs::{
    check_space, destination_path, discard_temp, ensure_absent, preserve_attributes,
    remove_moved_source, remove_path, rename_no_replace, same_volume, set_writable,
    stream::read_full, temp_path_for, FileSystemObject, LocalStreams, StreamProvider,
    TransferOptions,
};
use std::path::{Path, PathBuf};

/// Copy `object` into `dest_folder` atomically
///
/// Returns the number of bytes written.
pub fn copy_atomically(
    object: &FileSystemObject,
    dest_folder: &Path,
    new_name: Option<&str>,
) -> Result<u64> {
    let options = TransferOptions::default();
    let streams = LocalStreams::new(options.buffer_size);
    transfer_atomically(object, dest_folder, new_name, TransferMode::Copy, &options, &streams)
}

/// Move `object` into `dest_folder` atomically
pub fn move_atomically(
    object: &FileSystemObject,
    dest_folder: &Path,
    new_name: Option<&str>,
) -> Result<u64> {
    let options = TransferOptions::default();
    let streams = LocalStreams::new(options.buffer_size);
    transfer_atomically(object, dest_folder, new_name, TransferMode::Move, &options, &streams)
}

/// Toggle the write permission of `object`
pub fn make_writable(object: &FileSystemObject, writable: bool) -> bool {
    set_writable(object.path(), writable)
}

/// Delete `object` (directories recursively)
pub fn remove(object: &FileSystemObject) -> Result<()> {
    remove_path(object.path())?;
    tracing::debug!("Removed {}", object.path().display());
    Ok(())
}

/// Validated source/destination pair
pub(crate) struct TransferTarget {
    pub source: PathBuf,
    pub dest_folder: PathBuf,
    pub final_path: PathBuf,
}

/// Check the source exists, the folder is a directory and the final path is free
pub(crate) fn resolve_target(
    object: &FileSystemObject,
    dest_folder: &Path,
    new_name: Option<&str>,
) -> Result<TransferTarget> {
    if !object.exists_on_disk() {
        return Err(FileOperationError::NotFound(object.path().to_path_buf()));
    }

    let folder_meta = std::fs::metadata(dest_folder).with_path(dest_folder)?;
    if !folder_meta.is_dir() {
        return Err(FileOperationError::invalid(format!(
            "'{}' is not a directory",
            dest_folder.display()
        )));
    }

    let final_path = destination_path(object, dest_folder, new_name)?;
    if final_path == object.path() {
        return Err(FileOperationError::invalid(format!(
            "source and destination are the same: {}",
            final_path.display()
        )));
    }
    ensure_absent(&final_path)?;

    Ok(TransferTarget {
        source: object.path().to_path_buf(),
        dest_folder: dest_folder.to_path_buf(),
        final_path,
    })
}

/// Atomic copy or move through `streams`
pub(crate) fn transfer_atomically(
    object: &FileSystemObject,
    dest_folder: &Path,
    new_name: Option<&str>,
    mode: TransferMode,
    options: &TransferOptions,
    streams: &dyn StreamProvider,
) -> Result<u64> {
    let target = resolve_target(object, dest_folder, new_name)?;
    let metadata = std::fs::metadata(&target.source).with_path(&target.source)?;

    if metadata.is_dir() {
        transfer_directory(&target, mode)?;
        return Ok(0);
    }
    if !metadata.is_file() {
        return Err(FileOperationError::invalid(format!(
            "'{}' is neither a file nor a directory",
            target.source.display()
        )));
    }

    if mode == TransferMode::Move
        && options.rename_within_volume
        && same_volume(&target.source, &target.dest_folder)
    {
        rename_no_replace(&target.source, &target.final_path)?;
        tracing::info!(
            "Renamed {} -> {}",
            target.source.display(),
            target.final_path.display()
        );
        return Ok(metadata.len());
    }

    if options.check_free_space {
        check_space(&target.dest_folder, metadata.len())?;
    }

    let temp = temp_path_for(&target.final_path);
    let written = match write_temp(&target.source, &temp, options, streams) {
        Ok(written) => written,
        Err(e) => {
            discard_temp(&temp);
            return Err(e);
        }
    };

    if let Err(e) = rename_no_replace(&temp, &target.final_path) {
        discard_temp(&temp);
        return Err(e);
    }
    tracing::info!(
        "Committed {} ({} bytes) -> {}",
        target.source.display(),
        written,
        target.final_path.display()
    );

    if mode == TransferMode::Move {
        remove_moved_source(&target.source, &target.final_path)?;
    }

    Ok(written)
}

/// Stream the whole source into `temp`, then sync and copy attributes
fn write_temp(
    source: &Path,
    temp: &Path,
    options: &TransferOptions,
    streams: &dyn StreamProvider,
) -> Result<u64> {
    let mut reader = streams.open_read(source).with_path(source)?;
    let mut writer = streams.create_write(temp).with_path(temp)?;

    let mut buffer = vec![0u8; options.buffer_size.max(4096)];
    let mut written = 0u64;

    loop {
        let n = read_full(reader.as_mut(), &mut buffer).with_path(source)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n]).with_path(temp)?;
        written += n as u64;
    }

    if options.sync_on_commit {
        writer.sync().with_path(temp)?;
    } else {
        writer.flush().with_path(temp)?;
    }
    drop(writer);
    drop(reader);

    preserve_attributes(source, temp, options)?;
    Ok(written)
}

/// Directories carry no payload: copy creates the folder, move relocates it
fn transfer_directory(target: &TransferTarget, mode: TransferMode) -> Result<()> {
    match mode {
        TransferMode::Copy => {
            std::fs::create_dir(&target.final_path).with_path(&target.final_path)?;
        }
        TransferMode::Move if same_volume(&target.source, &target.dest_folder) => {
            rename_no_replace(&target.source, &target.final_path)?;
        }
        TransferMode::Move => {
            let mut entries = std::fs::read_dir(&target.source).with_path(&target.source)?;
            if entries.next().is_some() {
                return Err(FileOperationError::invalid(format!(
                    "cannot move non-empty directory '{}' across volumes",
                    target.source.display()
                )));
            }
            std::fs::create_dir(&target.final_path).with_path(&target.final_path)?;
            if let Err(e) = std::fs::remove_dir(&target.source) {
                let _ = std::fs::remove_dir(&target.final_path);
                return Err(FileOperationError::io(&target.source, e));
            }
        }
    }
    tracing::debug!(
        "{} directory {} -> {}",
        mode,
        target.source.display(),
        target.final_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResultCode;
    use crate::fs::{ReadStream, WriteStream};
    use std::io;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, size: usize) -> PathBuf {
        let path = dir.join(name);
        let content: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn leftovers(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    /// Provider whose writers fail on every write
    struct BrokenWrites;

    struct BrokenWriter;

    impl WriteStream for BrokenWriter {
        fn write_all(&mut self, _buf: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "injected write failure"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl StreamProvider for BrokenWrites {
        fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadStream>> {
            LocalStreams::default().open_read(path)
        }
        fn create_write(&self, path: &Path) -> io::Result<Box<dyn WriteStream>> {
            // Leave a real file behind so cleanup is observable
            std::fs::File::create(path)?;
            Ok(Box::new(BrokenWriter))
        }
    }

    #[test]
    fn test_copy_atomically() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src = create_test_file(src_dir.path(), "data.bin", 300_000);

        let object = FileSystemObject::new(&src);
        let written = copy_atomically(&object, dst_dir.path(), None).unwrap();

        assert_eq!(written, 300_000);
        assert_eq!(
            std::fs::read(dst_dir.path().join("data.bin")).unwrap(),
            std::fs::read(&src).unwrap()
        );
        assert!(src.exists());
        assert_eq!(leftovers(dst_dir.path()).len(), 1);
    }

    #[test]
    fn test_copy_with_new_name() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src = create_test_file(src_dir.path(), "data.bin", 10);

        let object = FileSystemObject::new(&src);
        copy_atomically(&object, dst_dir.path(), Some("renamed.bin")).unwrap();
        assert!(dst_dir.path().join("renamed.bin").exists());
    }

    #[test]
    fn test_copy_empty_file() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src = create_test_file(src_dir.path(), "empty", 0);

        let written = copy_atomically(&FileSystemObject::new(&src), dst_dir.path(), None).unwrap();
        assert_eq!(written, 0);
        assert!(dst_dir.path().join("empty").exists());
    }

    #[test]
    fn test_copy_refuses_existing_destination() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src = create_test_file(src_dir.path(), "data.bin", 100);
        std::fs::write(dst_dir.path().join("data.bin"), b"keep me").unwrap();

        let err = copy_atomically(&FileSystemObject::new(&src), dst_dir.path(), None).unwrap_err();
        assert_eq!(err.code(), ResultCode::AlreadyExists);
        assert_eq!(std::fs::read(dst_dir.path().join("data.bin")).unwrap(), b"keep me");
    }

    #[test]
    fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let object = FileSystemObject::new(dir.path().join("nope"));
        let err = copy_atomically(&object, dir.path(), Some("x")).unwrap_err();
        assert_eq!(err.code(), ResultCode::NotFound);
    }

    #[test]
    fn test_failed_copy_leaves_no_destination() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src = create_test_file(src_dir.path(), "data.bin", 50_000);

        let err = transfer_atomically(
            &FileSystemObject::new(&src),
            dst_dir.path(),
            None,
            TransferMode::Copy,
            &TransferOptions::default(),
            &BrokenWrites,
        )
        .unwrap_err();

        assert_eq!(err.code(), ResultCode::IoError);
        assert!(leftovers(dst_dir.path()).is_empty());
        assert!(src.exists());
    }

    #[test]
    fn test_failed_move_keeps_source() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src = create_test_file(src_dir.path(), "data.bin", 50_000);
        let before = std::fs::read(&src).unwrap();

        let options = TransferOptions {
            rename_within_volume: false,
            ..Default::default()
        };
        let err = transfer_atomically(
            &FileSystemObject::new(&src),
            dst_dir.path(),
            Some("moved.bin"),
            TransferMode::Move,
            &options,
            &BrokenWrites,
        )
        .unwrap_err();

        assert_eq!(err.code(), ResultCode::IoError);
        assert_eq!(std::fs::read(&src).unwrap(), before);
        assert!(leftovers(dst_dir.path()).is_empty());
    }

    #[test]
    fn test_move_by_copy_and_delete() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src = create_test_file(src_dir.path(), "data.bin", 70_000);
        let before = std::fs::read(&src).unwrap();

        let options = TransferOptions {
            rename_within_volume: false,
            ..Default::default()
        };
        let moved = transfer_atomically(
            &FileSystemObject::new(&src),
            dst_dir.path(),
            None,
            TransferMode::Move,
            &options,
            &LocalStreams::default(),
        )
        .unwrap();

        assert_eq!(moved, 70_000);
        assert!(!src.exists());
        assert_eq!(std::fs::read(dst_dir.path().join("data.bin")).unwrap(), before);
    }

    /// Opens the source, then moves it aside and leaves a non-empty
    /// directory at its path so the final unlink fails
    struct SourceReplacedAfterOpen;

    impl StreamProvider for SourceReplacedAfterOpen {
        fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadStream>> {
            let reader = LocalStreams::default().open_read(path)?;
            std::fs::rename(path, path.with_extension("aside"))?;
            std::fs::create_dir(path)?;
            std::fs::write(path.join("keep"), b"x")?;
            Ok(reader)
        }
        fn create_write(&self, path: &Path) -> io::Result<Box<dyn WriteStream>> {
            LocalStreams::default().create_write(path)
        }
    }

    #[test]
    fn test_move_rolls_back_when_source_cannot_be_removed() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src = create_test_file(src_dir.path(), "data.bin", 70_000);
        let before = std::fs::read(&src).unwrap();

        let options = TransferOptions {
            rename_within_volume: false,
            ..Default::default()
        };
        let result = transfer_atomically(
            &FileSystemObject::new(&src),
            dst_dir.path(),
            None,
            TransferMode::Move,
            &options,
            &SourceReplacedAfterOpen,
        );

        assert!(result.is_err());
        assert!(leftovers(dst_dir.path()).is_empty());
        assert_eq!(std::fs::read(src.with_extension("aside")).unwrap(), before);
    }

    #[test]
    fn test_move_atomically_same_volume() {
        let dir = TempDir::new().unwrap();
        let src = create_test_file(dir.path(), "data.bin", 1234);
        std::fs::create_dir(dir.path().join("out")).unwrap();

        let object = FileSystemObject::new(&src);
        let moved = move_atomically(&object, &dir.path().join("out"), None).unwrap();

        assert_eq!(moved, 1234);
        assert!(!src.exists());
        assert_eq!(std::fs::metadata(dir.path().join("out/data.bin")).unwrap().len(), 1234);
    }

    #[test]
    fn test_copy_directory_creates_folder() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let folder = src_dir.path().join("photos");
        std::fs::create_dir(&folder).unwrap();
        create_test_file(&folder, "a.jpg", 10);

        copy_atomically(&FileSystemObject::new(&folder), dst_dir.path(), None).unwrap();
        let created = dst_dir.path().join("photos");
        assert!(created.is_dir());
        assert!(leftovers(&created).is_empty());
    }

    #[test]
    fn test_remove_and_make_writable() {
        let dir = TempDir::new().unwrap();
        let src = create_test_file(dir.path(), "data.bin", 10);
        let object = FileSystemObject::new(&src);

        assert!(make_writable(&object, false));
        assert!(make_writable(&object, true));
        remove(&object).unwrap();
        assert!(!src.exists());
        assert_eq!(remove(&object).unwrap_err().code(), ResultCode::NotFound);
    }
}
