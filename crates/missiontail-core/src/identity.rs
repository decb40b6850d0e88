//! Resolving the account identifier from the monitored log.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use regex::Regex;

use crate::error::{ParseError, Result};

/// Compile an identifier pattern, requiring at least one capture group.
pub fn compile_pattern(pattern: &str) -> std::result::Result<Regex, ParseError> {
    let re = Regex::new(pattern).map_err(|e| ParseError::IdentifierPattern(e.to_string()))?;
    if re.captures_len() < 2 {
        return Err(ParseError::IdentifierPattern(format!(
            "{pattern:?} has no capture group"
        )));
    }
    Ok(re)
}

/// Scan the whole log once and return capture group 1 of the last line that
/// matches `pattern`.
///
/// A missing log yields `Ok(None)`; the application may simply not have
/// started yet.
pub fn resolve_identifier(path: &Path, pattern: &str) -> Result<Option<String>> {
    let re = compile_pattern(pattern)?;
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut last = None;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some(id) = re.captures(&line).and_then(|c| c.get(1)) {
            last = Some(id.as_str().to_string());
        }
    }

    tracing::debug!(path = %path.display(), found = last.is_some(), "Identifier resolution finished");
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const PATTERN: &str = r"Sys \[Info\]: Logged in .*\(([0-9a-fA-F]+)\)";

    #[test]
    fn last_login_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(
            &path,
            "1.0 Sys [Info]: Logged in Alpha (aaa111)\n\
             2.0 noise\n\
             3.0 Sys [Info]: Logged in Beta (bbb222)\n\
             4.0 more noise\n",
        )
        .unwrap();
        assert_eq!(resolve_identifier(&path, PATTERN).unwrap().as_deref(), Some("bbb222"));
    }

    #[test]
    fn no_match_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "1.0 nothing here\n").unwrap();
        assert_eq!(resolve_identifier(&path, PATTERN).unwrap(), None);
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.log");
        assert_eq!(resolve_identifier(&path, PATTERN).unwrap(), None);
    }

    #[test]
    fn invalid_bytes_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut bytes = b"1.0 \xff\xfe junk\n".to_vec();
        bytes.extend_from_slice(b"2.0 Sys [Info]: Logged in X (c0ffee)");
        std::fs::write(&path, bytes).unwrap();
        assert_eq!(resolve_identifier(&path, PATTERN).unwrap().as_deref(), Some("c0ffee"));
    }

    #[test]
    fn pattern_without_group_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let err = resolve_identifier(&path, "Logged in").unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::IdentifierPattern(_))));
    }
}
