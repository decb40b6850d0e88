//! Bounded backward search for the most recent start marker.
//!
//! Logs grow large, so the scan walks backward from an end offset in fixed
//! chunks and gives up after `max_scan_bytes`. Each chunk is searched together
//! with the first `carry_bytes` of the chunk after it, which catches markers
//! split across a chunk boundary.
//!
//! ```text
//!   limit                                   end_offset
//!     │◄──────────── max_scan_bytes ─────────────►│
//!     │      [ chunk k ][carry]                   │
//!     │                 [ chunk k-1 ][carry]      │
//!     │                              [ chunk 0 ]  │
//! ```

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memchr::memmem::FinderRev;
use tracing::{debug, trace};

use crate::config::ScanConfig;
use crate::tailer::file_size;
use crate::timestamp::parse_leading_timestamp;

/// Step used while looking for the start of a line that began before the window.
const LOOKBACK_STEP: u64 = 4096;

/// Start-marker line found by a backward scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerMatch {
    /// Leading timestamp of the matching line.
    pub timestamp: f64,
    /// Absolute byte offset where the matching line starts.
    pub offset: u64,
}

/// Backward scanner over one log file for a fixed set of markers.
#[derive(Debug)]
pub struct BackwardMarkerScanner {
    path: PathBuf,
    finders: Vec<FinderRev<'static>>,
    limits: ScanConfig,
}

impl BackwardMarkerScanner {
    /// Empty markers are ignored; with none left every scan returns `Ok(None)`.
    #[must_use]
    pub fn new<S: AsRef<str>>(path: impl Into<PathBuf>, markers: &[S], limits: ScanConfig) -> Self {
        let finders = markers
            .iter()
            .map(AsRef::as_ref)
            .filter(|marker| !marker.is_empty())
            .map(|marker| FinderRev::new(marker.as_bytes()).into_owned())
            .collect();
        Self {
            path: path.into(),
            finders,
            limits,
        }
    }

    /// Find the last line starting before `end_offset` that contains any
    /// marker and has a parsable leading timestamp.
    ///
    /// Returns `Ok(None)` when nothing qualifies within `max_scan_bytes`.
    pub fn find_last_marker_before(&self, end_offset: u64) -> io::Result<Option<MarkerMatch>> {
        let size = file_size(&self.path)?;
        let end = end_offset.min(size);
        let limit = end.saturating_sub(self.limits.max_scan_bytes);
        if end == 0 || self.finders.is_empty() {
            return Ok(None);
        }

        let chunk_size = self.limits.chunk_size.max(1);
        let carry_len = self.limits.carry_bytes as usize;
        let mut file = File::open(&self.path)?;
        let mut pos = end;
        let mut carry: Vec<u8> = Vec::new();

        while pos > limit {
            let read_start = pos.saturating_sub(chunk_size).max(limit);
            let mut window = read_range(&mut file, read_start, pos)?;
            window.extend_from_slice(&carry);
            pos = read_start;

            if let Some(found) = self.search_window(&mut file, &window, read_start, limit)? {
                debug!(
                    path = %self.path.display(),
                    end_offset,
                    offset = found.offset,
                    timestamp = found.timestamp,
                    scanned_bytes = end - read_start,
                    "Found start marker"
                );
                return Ok(Some(found));
            }

            let keep = carry_len.min(window.len());
            window.truncate(keep);
            carry = window;
        }

        trace!(path = %self.path.display(), end_offset, limit, "No start marker within scan bound");
        Ok(None)
    }

    /// Search one window right-to-left, skipping matching lines whose
    /// timestamp does not parse.
    fn search_window(
        &self,
        file: &mut File,
        window: &[u8],
        window_start: u64,
        limit: u64,
    ) -> io::Result<Option<MarkerMatch>> {
        let mut search_end = window.len();
        while let Some(idx) = self.rightmost_marker(&window[..search_end]) {
            let line_end = memchr::memchr(b'\n', &window[idx..]).map_or(window.len(), |i| idx + i);
            let (line_offset, line) = match memchr::memrchr(b'\n', &window[..idx]) {
                Some(nl) => (window_start + nl as u64 + 1, window[nl + 1..line_end].to_vec()),
                None if window_start == 0 => (0, window[..line_end].to_vec()),
                None => {
                    let line_offset = find_line_start(file, window_start, limit)?;
                    let mut line = read_range(file, line_offset, window_start)?;
                    line.extend_from_slice(&window[..line_end]);
                    (line_offset, line)
                }
            };

            let text = String::from_utf8_lossy(&line);
            match parse_leading_timestamp(&text) {
                Ok(timestamp) => {
                    return Ok(Some(MarkerMatch {
                        timestamp,
                        offset: line_offset,
                    }));
                }
                Err(err) => {
                    debug!(offset = line_offset, error = %err, "Skipping marker line without timestamp");
                }
            }

            let line_start_in_window = line_offset.saturating_sub(window_start) as usize;
            if line_start_in_window == 0 {
                break;
            }
            search_end = line_start_in_window;
        }
        Ok(None)
    }

    fn rightmost_marker(&self, haystack: &[u8]) -> Option<usize> {
        self.finders
            .iter()
            .filter_map(|finder| finder.rfind(haystack))
            .max()
    }
}

/// One-shot form of [`BackwardMarkerScanner::find_last_marker_before`] with the
/// default carry size.
pub fn find_last_marker_before<S: AsRef<str>>(
    path: &Path,
    end_offset: u64,
    markers: &[S],
    max_scan_bytes: u64,
    chunk_size: u64,
) -> io::Result<Option<MarkerMatch>> {
    let limits = ScanConfig {
        max_scan_bytes,
        chunk_size,
        ..ScanConfig::default()
    };
    BackwardMarkerScanner::new(path, markers, limits).find_last_marker_before(end_offset)
}

fn read_range(file: &mut File, start: u64, end: u64) -> io::Result<Vec<u8>> {
    let len = end.saturating_sub(start) as usize;
    let mut buf = vec![0u8; len];
    file.seek(SeekFrom::Start(start))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Offset of the first byte of the line containing `before - 1`, never earlier
/// than `floor`.
fn find_line_start(file: &mut File, before: u64, floor: u64) -> io::Result<u64> {
    let mut pos = before;
    while pos > floor {
        let step_start = pos.saturating_sub(LOOKBACK_STEP).max(floor);
        let buf = read_range(file, step_start, pos)?;
        if let Some(nl) = memchr::memrchr(b'\n', &buf) {
            return Ok(step_start + nl as u64 + 1);
        }
        pos = step_start;
    }
    Ok(floor)
}
