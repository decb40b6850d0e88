//! Offset-tracked tailing of a growing log file.
//!
//! The tailer keeps a byte cursor into the log and hands out complete lines
//! appended since the previous read, each tagged with the absolute offset of
//! its first byte. A file that became shorter than the cursor was rotated or
//! truncated; the cursor then restarts at 0. This can re-deliver lines when a
//! rotated file regrows past the old cursor before the next poll, which the
//! segmenter's dedup guard absorbs.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// One complete line read from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailedLine {
    /// Line text without the trailing newline (lossily decoded).
    pub text: String,
    /// Absolute byte offset of the first byte of the line.
    pub start_offset: u64,
}

/// Size of the file at `path`, or 0 if it doesn't exist.
pub fn file_size(path: &Path) -> io::Result<u64> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(err) => Err(err),
    }
}

/// Incremental reader over an append-only log.
#[derive(Debug)]
pub struct OffsetTailer {
    path: PathBuf,
    position: u64,
}

impl OffsetTailer {
    /// Create a tailer positioned at the start of the file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            position: 0,
        }
    }

    /// Path being tailed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current cursor (offset of the next unread byte).
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Current size of the tailed file (0 if missing).
    pub fn file_size(&self) -> io::Result<u64> {
        file_size(&self.path)
    }

    /// Treat everything currently in the file as already seen.
    pub fn prime_to_end(&mut self) -> io::Result<u64> {
        self.position = self.file_size()?;
        debug!(path = %self.path.display(), offset = self.position, "Tailer primed to end of file");
        Ok(self.position)
    }

    /// Read complete lines appended since the last call.
    ///
    /// A trailing line without `\n` is left unread so it is delivered whole
    /// (with an exact start offset) once the writer finishes it.
    pub fn read_new(&mut self) -> io::Result<Vec<TailedLine>> {
        let size = self.file_size()?;
        if size < self.position {
            warn!(
                path = %self.path.display(),
                previous_offset = self.position,
                current_size = size,
                "Log truncated or rotated; restarting from the beginning"
            );
            self.position = 0;
        }
        if size == self.position {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.position))?;
        let mut buffer = Vec::with_capacity((size - self.position) as usize);
        file.take(size - self.position).read_to_end(&mut buffer)?;

        let base = self.position;
        let mut lines = Vec::new();
        let mut line_start = 0usize;
        for newline in memchr::memchr_iter(b'\n', &buffer) {
            let raw = &buffer[line_start..newline];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            lines.push(TailedLine {
                text: String::from_utf8_lossy(raw).into_owned(),
                start_offset: base + line_start as u64,
            });
            line_start = newline + 1;
        }
        self.position = base + line_start as u64;

        if !lines.is_empty() {
            debug!(
                path = %self.path.display(),
                lines = lines.len(),
                offset = self.position,
                "Read new log lines"
            );
        }
        Ok(lines)
    }
}
