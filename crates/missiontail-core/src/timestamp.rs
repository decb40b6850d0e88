//! Leading-timestamp parsing for log lines.
//!
//! Every line of the monitored log starts with a float field holding seconds
//! since the application started (or since the epoch; only differences matter).

use crate::error::ParseError;

/// Parse the first whitespace-delimited field of `line` as a finite `f64`.
pub fn parse_leading_timestamp(line: &str) -> Result<f64, ParseError> {
    line.split_whitespace()
        .next()
        .and_then(|token| token.parse::<f64>().ok())
        .filter(|ts| ts.is_finite())
        .ok_or_else(|| ParseError::Timestamp(preview(line)))
}

fn preview(line: &str) -> String {
    const MAX: usize = 64;
    match line.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &line[..idx]),
        None => line.to_string(),
    }
}
