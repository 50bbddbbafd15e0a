//! Byte-stream handles used by the transfer engine
//!
//! The engine never touches `std::fs::File` directly for payload bytes; it
//! goes through a [`StreamProvider`] so alternative backends (and failure
//! injection in tests) can be plugged in. Closing a stream is dropping it.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Sequential reader over the transfer source
pub trait ReadStream: Send {
    /// Read up to `buf.len()` bytes; `Ok(0)` means end of stream
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Reposition to an absolute offset
    fn seek_to(&mut self, pos: u64) -> io::Result<()>;

    /// Bytes left between the current position and the end of the stream
    fn bytes_remaining(&mut self) -> io::Result<u64>;

    /// Whether the stream is exhausted
    fn at_end(&mut self) -> io::Result<bool> {
        Ok(self.bytes_remaining()? == 0)
    }
}

/// Sequential writer for the temporary destination
pub trait WriteStream: Send {
    /// Write the whole buffer
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Flush user-space buffers
    fn flush(&mut self) -> io::Result<()>;

    /// Flush and force data to stable storage
    fn sync(&mut self) -> io::Result<()>;
}

/// Factory for source and destination streams
pub trait StreamProvider: Send + Sync {
    /// Open `path` for reading
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadStream>>;

    /// Create (or truncate) `path` for writing
    fn create_write(&self, path: &Path) -> io::Result<Box<dyn WriteStream>>;
}

/// Local file system streams with buffered I/O
#[derive(Debug, Clone)]
pub struct LocalStreams {
    buffer_size: usize,
}

impl LocalStreams {
    /// Create a provider using `buffer_size` for reader and writer buffers
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(4096),
        }
    }
}

impl Default for LocalStreams {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl StreamProvider for LocalStreams {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn ReadStream>> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Box::new(LocalReader {
            reader: BufReader::with_capacity(self.buffer_size, file),
            len,
            pos: 0,
        }))
    }

    fn create_write(&self, path: &Path) -> io::Result<Box<dyn WriteStream>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(LocalWriter {
            writer: BufWriter::with_capacity(self.buffer_size, file),
        }))
    }
}

struct LocalReader {
    reader: BufReader<File>,
    len: u64,
    pos: u64,
}

impl ReadStream for LocalReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek_to(&mut self, pos: u64) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    fn bytes_remaining(&mut self) -> io::Result<u64> {
        // The source may grow or shrink while a chunked transfer is paused
        self.len = self.reader.get_ref().metadata()?.len();
        Ok(self.len.saturating_sub(self.pos))
    }
}

struct LocalWriter {
    writer: BufWriter<File>,
}

impl WriteStream for LocalWriter {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read
pub fn read_full(stream: &mut dyn ReadStream, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
