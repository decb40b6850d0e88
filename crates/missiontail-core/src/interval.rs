//! Counting event lines inside a byte range of the log.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memchr::memmem::Finder;

/// Counts lines containing a fixed pattern between two offsets of one file.
#[derive(Debug)]
pub struct IntervalCounter {
    path: PathBuf,
    finder: Finder<'static>,
}

impl IntervalCounter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, pattern: &str) -> Self {
        Self {
            path: path.into(),
            finder: Finder::new(pattern.as_bytes()).into_owned(),
        }
    }

    /// Count lines containing the pattern whose first byte lies in
    /// `[start_offset, end_offset)`.
    ///
    /// `start_offset` is expected to be a line start. A line that begins
    /// before `end_offset` but runs past it is counted in full.
    pub fn count_between(&self, start_offset: u64, end_offset: u64) -> io::Result<u64> {
        if start_offset >= end_offset {
            return Ok(0);
        }

        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(start_offset))?;

        let mut cursor = start_offset;
        let mut count = 0u64;
        let mut line = Vec::new();
        while cursor < end_offset {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            if self.finder.find(&line).is_some() {
                count += 1;
            }
            cursor += read as u64;
        }

        tracing::trace!(start_offset, end_offset, count, "Counted interval events");
        Ok(count)
    }
}

/// One-shot form of [`IntervalCounter::count_between`].
pub fn count_between(
    path: &Path,
    start_offset: u64,
    end_offset: u64,
    pattern: &str,
) -> io::Result<u64> {
    IntervalCounter::new(path, pattern).count_between(start_offset, end_offset)
}
