//! Per-object transfer engine
//!
//! [`FileTransferEngine`] wraps one [`FileSystemObject`] and performs either a
//! whole-file atomic copy/move or a chunked one, where the caller advances
//! the transfer one bounded step at a time and may poll progress or cancel
//! between steps.
//!
//! ```no_run
//! use fmcore::core::FileTransferEngine;
//! use fmcore::fs::FileSystemObject;
//! use std::path::Path;
//!
//! let mut engine = FileTransferEngine::new(FileSystemObject::new("/data/movie.mkv"));
//! loop {
//!     let status = engine.copy_chunk(1024 * 1024, Path::new("/backup"), None).unwrap();
//!     println!("{} bytes so far", engine.bytes_copied());
//!     if status.is_complete() {
//!         break;
//!     }
//! }
//! ```

use crate::core::transfer::{self, resolve_target};
use crate::error::{FileOperationError, IoResultExt, Result};
use crate::fs::{
    check_space, discard_temp, preserve_attributes, remove_moved_source, rename_no_replace,
    stream::read_full, temp_path_for, FileSystemObject, LocalStreams, ReadStream,
    StreamProvider, TransferOptions, WriteStream,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Whether a transfer keeps or removes its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferMode {
    /// Source stays in place
    Copy,
    /// Source is removed once the destination is committed
    Move,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Copy => write!(f, "copy"),
            TransferMode::Move => write!(f, "move"),
        }
    }
}

/// Outcome of one chunk call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// More calls are needed
    InProgress {
        /// Bytes transferred so far in this session
        bytes_copied: u64,
    },
    /// The destination was committed and the session closed
    Completed {
        /// Total bytes transferred
        bytes_copied: u64,
    },
}

impl ChunkStatus {
    /// Whether the transfer finished with this call
    pub fn is_complete(&self) -> bool {
        matches!(self, ChunkStatus::Completed { .. })
    }

    /// Bytes transferred as of this call
    pub fn bytes_copied(&self) -> u64 {
        match *self {
            ChunkStatus::InProgress { bytes_copied } | ChunkStatus::Completed { bytes_copied } => {
                bytes_copied
            }
        }
    }
}

/// An open chunked transfer; both streams live exactly as long as this value
struct TransferSession {
    mode: TransferMode,
    source_path: PathBuf,
    final_path: PathBuf,
    temp_path: PathBuf,
    cursor: u64,
    source: Box<dyn ReadStream>,
    dest: Box<dyn WriteStream>,
}

/// Why a step stopped early
enum StepError {
    /// Session is still consistent; the caller may retry the chunk
    Retryable(FileOperationError),
    /// Destination state is unknown; the session must be torn down
    Fatal(FileOperationError),
}

impl TransferSession {
    /// Move up to `chunk_size` bytes; returns true once the source is exhausted
    fn step(&mut self, chunk_size: u64, buffer: &mut [u8]) -> std::result::Result<bool, StepError> {
        let mut done = 0u64;

        while done < chunk_size {
            let want = (chunk_size - done).min(buffer.len() as u64) as usize;

            let n = match read_full(self.source.as_mut(), &mut buffer[..want]) {
                Ok(n) => n,
                Err(e) => return Err(self.read_failed(e)),
            };
            if n == 0 {
                return Ok(true);
            }

            if let Err(e) = self.dest.write_all(&buffer[..n]) {
                return Err(StepError::Fatal(FileOperationError::io(&self.final_path, e)));
            }
            self.cursor += n as u64;
            done += n as u64;

            if n < want {
                return Ok(true);
            }
        }

        match self.source.at_end() {
            Ok(at_end) => Ok(at_end),
            Err(e) => Err(self.read_failed(e)),
        }
    }

    /// Rewind the source to the cursor so the chunk can be retried
    fn read_failed(&mut self, err: std::io::Error) -> StepError {
        let err = FileOperationError::io(&self.source_path, err);
        match self.source.seek_to(self.cursor) {
            Ok(()) => StepError::Retryable(err),
            Err(_) => StepError::Fatal(err),
        }
    }
}

/// Copy/move engine bound to a single file-system object
pub struct FileTransferEngine {
    object: FileSystemObject,
    options: TransferOptions,
    streams: Arc<dyn StreamProvider>,
    session: Option<TransferSession>,
    buffer: Vec<u8>,
    last_error: String,
}

impl FileTransferEngine {
    /// Create an engine with default options and local streams
    pub fn new(object: FileSystemObject) -> Self {
        let options = TransferOptions::default();
        let streams = Arc::new(LocalStreams::new(options.buffer_size));
        Self {
            object,
            options,
            streams,
            session: None,
            buffer: Vec::new(),
            last_error: String::new(),
        }
    }

    /// Replace the transfer options
    pub fn with_options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    /// Use a different stream backend
    pub fn with_streams(mut self, streams: Arc<dyn StreamProvider>) -> Self {
        self.streams = streams;
        self
    }

    /// The object this engine operates on
    pub fn object(&self) -> &FileSystemObject {
        &self.object
    }

    /// Copy the whole object in one call
    pub fn copy_atomically(&mut self, dest_folder: &Path, new_name: Option<&str>) -> Result<u64> {
        let result = self.atomic(TransferMode::Copy, dest_folder, new_name);
        self.record(result)
    }

    /// Move the whole object in one call
    pub fn move_atomically(&mut self, dest_folder: &Path, new_name: Option<&str>) -> Result<u64> {
        let result = self.atomic(TransferMode::Move, dest_folder, new_name);
        self.record(result)
    }

    fn atomic(&mut self, mode: TransferMode, dest_folder: &Path, new_name: Option<&str>) -> Result<u64> {
        if self.session.is_some() {
            return Err(FileOperationError::invalid(
                "a chunked transfer is in progress; cancel it first",
            ));
        }
        let result = transfer::transfer_atomically(
            &self.object,
            dest_folder,
            new_name,
            mode,
            &self.options,
            self.streams.as_ref(),
        );
        self.object.refresh();
        result
    }

    /// Copy the next chunk of at most `chunk_size` bytes
    ///
    /// The first call opens a session; the call that exhausts the source
    /// commits the destination and closes it.
    pub fn copy_chunk(
        &mut self,
        chunk_size: u64,
        dest_folder: &Path,
        new_name: Option<&str>,
    ) -> Result<ChunkStatus> {
        let result = self.chunk(TransferMode::Copy, chunk_size, dest_folder, new_name);
        self.record(result)
    }

    /// Move the next chunk of at most `chunk_size` bytes
    ///
    /// The source is deleted only after the destination has been committed.
    pub fn move_chunk(
        &mut self,
        chunk_size: u64,
        dest_folder: &Path,
        new_name: Option<&str>,
    ) -> Result<ChunkStatus> {
        let result = self.chunk(TransferMode::Move, chunk_size, dest_folder, new_name);
        self.record(result)
    }

    /// True between the first chunk call of a session and its end
    pub fn copy_operation_in_progress(&self) -> bool {
        self.session.is_some()
    }

    /// Bytes transferred in the current session (0 without one)
    pub fn bytes_copied(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.cursor)
    }

    /// Abort the open session and delete its temporary file
    ///
    /// Succeeds without effect when nothing is in progress. Cancelling an
    /// open session records [`FileOperationError::Cancelled`] as the last
    /// error.
    pub fn cancel_copy(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            tracing::info!(
                "Cancelled {} of {} after {} bytes",
                session.mode,
                session.source_path.display(),
                session.cursor
            );
            Self::teardown(session);
            self.last_error = FileOperationError::Cancelled.to_string();
        }
        Ok(())
    }

    /// Set or clear the write permission; returns whether the result matches
    pub fn make_writable(&mut self, writable: bool) -> bool {
        let matched = transfer::make_writable(&self.object, writable);
        self.object.refresh();
        if !matched {
            self.last_error = format!(
                "Failed to make '{}' {}",
                self.object.path().display(),
                if writable { "writable" } else { "read-only" }
            );
        }
        matched
    }

    /// Delete the underlying object
    pub fn remove(&mut self) -> Result<()> {
        let result = transfer::remove(&self.object);
        self.object.refresh();
        self.record(result)
    }

    /// Human-readable detail of the most recent failure
    pub fn last_error_message(&self) -> &str {
        &self.last_error
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::debug!("{}: {}", self.object.path().display(), e);
            self.last_error = e.to_string();
        }
        result
    }

    fn chunk(
        &mut self,
        mode: TransferMode,
        chunk_size: u64,
        dest_folder: &Path,
        new_name: Option<&str>,
    ) -> Result<ChunkStatus> {
        if chunk_size == 0 {
            return Err(FileOperationError::invalid("chunk size must be positive"));
        }

        match &self.session {
            Some(session) => {
                if session.mode != mode {
                    return Err(FileOperationError::ModeMismatch {
                        open: session.mode,
                        requested: mode,
                    });
                }
                let requested = crate::fs::destination_path(&self.object, dest_folder, new_name)?;
                if requested != session.final_path {
                    return Err(FileOperationError::invalid(format!(
                        "destination changed mid-transfer: {} != {}",
                        requested.display(),
                        session.final_path.display()
                    )));
                }
            }
            None => {
                self.object.refresh();
                if self.object.is_dir() {
                    let result = self.atomic(mode, dest_folder, new_name)?;
                    return Ok(ChunkStatus::Completed { bytes_copied: result });
                }
                self.session = Some(self.open_session(mode, dest_folder, new_name)?);
            }
        }

        self.advance(chunk_size)
    }

    fn open_session(
        &self,
        mode: TransferMode,
        dest_folder: &Path,
        new_name: Option<&str>,
    ) -> Result<TransferSession> {
        let target = resolve_target(&self.object, dest_folder, new_name)?;
        if !self.object.is_file() {
            return Err(FileOperationError::invalid(format!(
                "'{}' is not a regular file",
                target.source.display()
            )));
        }
        if self.options.check_free_space {
            check_space(&target.dest_folder, self.object.size())?;
        }

        let source = self.streams.open_read(&target.source).with_path(&target.source)?;
        let temp_path = temp_path_for(&target.final_path);
        let dest = match self.streams.create_write(&temp_path) {
            Ok(dest) => dest,
            Err(e) => {
                discard_temp(&temp_path);
                return Err(FileOperationError::io(&temp_path, e));
            }
        };

        tracing::debug!(
            "Opened {} session {} -> {}",
            mode,
            target.source.display(),
            target.final_path.display()
        );

        Ok(TransferSession {
            mode,
            source_path: target.source,
            final_path: target.final_path,
            temp_path,
            cursor: 0,
            source,
            dest,
        })
    }

    fn advance(&mut self, chunk_size: u64) -> Result<ChunkStatus> {
        let wanted = chunk_size.min(self.options.buffer_size.max(4096) as u64) as usize;
        if self.buffer.len() < wanted {
            self.buffer.resize(wanted, 0);
        }

        let Some(session) = self.session.as_mut() else {
            return Err(FileOperationError::invalid("no transfer in progress"));
        };

        match session.step(chunk_size, &mut self.buffer[..wanted]) {
            Ok(false) => {
                tracing::debug!("{}: {} bytes", session.source_path.display(), session.cursor);
                Ok(ChunkStatus::InProgress {
                    bytes_copied: session.cursor,
                })
            }
            Ok(true) => {
                let Some(session) = self.session.take() else {
                    return Err(FileOperationError::invalid("no transfer in progress"));
                };
                self.finalize(session)
            }
            Err(StepError::Retryable(e)) => Err(e),
            Err(StepError::Fatal(e)) => {
                if let Some(session) = self.session.take() {
                    Self::teardown(session);
                }
                Err(e)
            }
        }
    }

    /// Commit the temporary file; any failure here removes it
    fn finalize(&mut self, session: TransferSession) -> Result<ChunkStatus> {
        let TransferSession {
            mode,
            source_path,
            final_path,
            temp_path,
            cursor,
            source,
            mut dest,
        } = session;
        drop(source);

        let flushed = if self.options.sync_on_commit {
            dest.sync()
        } else {
            dest.flush()
        };
        drop(dest);

        let committed = flushed
            .with_path(&temp_path)
            .and_then(|_| preserve_attributes(&source_path, &temp_path, &self.options))
            .and_then(|_| rename_no_replace(&temp_path, &final_path));
        if let Err(e) = committed {
            discard_temp(&temp_path);
            return Err(e);
        }

        tracing::info!(
            "Committed {} ({} bytes) -> {}",
            source_path.display(),
            cursor,
            final_path.display()
        );

        if mode == TransferMode::Move {
            let removed = remove_moved_source(&source_path, &final_path);
            self.object.refresh();
            removed?;
        }

        Ok(ChunkStatus::Completed {
            bytes_copied: cursor,
        })
    }

    fn teardown(session: TransferSession) {
        let TransferSession {
            temp_path,
            source,
            dest,
            ..
        } = session;
        drop(source);
        drop(dest);
        discard_temp(&temp_path);
    }
}

impl Drop for FileTransferEngine {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            Self::teardown(session);
        }
    }
}

impl fmt::Debug for FileTransferEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTransferEngine")
            .field("object", &self.object)
            .field("in_progress", &self.session.is_some())
            .field("bytes_copied", &self.bytes_copied())
            .finish()
    }
}
