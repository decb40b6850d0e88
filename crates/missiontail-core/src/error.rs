//! Error types for missiontail-core

use std::fmt::Write;
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a diagnostic or fix-up command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for missiontail-core
#[derive(Error, Debug)]
pub enum Error {
    /// Log line or payload parsing errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// External counter errors
    #[error("Counter error: {0}")]
    Counter(#[from] CounterError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Parse(err) => Some(err.remediation()),
            Self::Counter(err) => Some(err.remediation()),
            Self::Config(err) => Some(err.remediation()),
            Self::Io(_) => Some(
                Remediation::new("Check that the monitored log exists and is readable.")
                    .command("Show effective config", "mtail config show")
                    .alternative("Pass the log location explicitly with --log <path>."),
            ),
        }
    }
}

/// Parse failures for individual log lines or payload fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Line has no leading float timestamp
    #[error("no leading timestamp in line: {0:?}")]
    Timestamp(String),

    /// Identifier regex lacks a capture group or failed to compile
    #[error("invalid identifier pattern: {0}")]
    IdentifierPattern(String),
}

impl ParseError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Timestamp(_) => Remediation::new(
                "Log lines must start with a floating-point timestamp field; the line was skipped.",
            )
            .alternative("Confirm the monitored file is the application's own log."),
            Self::IdentifierPattern(_) => Remediation::new(
                "Fix `identity.pattern` so it compiles and has one capture group.",
            )
            .command("Validate config", "mtail config check"),
        }
    }
}

/// Failures fetching the external counter; always transient
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    /// The remote payload could not be retrieved
    #[error("network error: {0}")]
    Network(String),

    /// The payload was retrieved but the counter could not be located
    #[error("payload parse error: {0}")]
    Parse(String),
}

impl CounterError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Network(_) => Remediation::new(
                "The counter service could not be reached. Check connectivity and the URL template.",
            )
            .command("Show effective config", "mtail config show")
            .alternative("Raise `counter.timeout_secs` on slow links."),
            Self::Parse(_) => Remediation::new(
                "The counter payload did not contain the configured entry.",
            )
            .command("Show effective config", "mtail config show")
            .alternative("Check `counter.match_field`, `counter.match_value` and `counter.count_field`."),
        }
    }
}

/// Configuration errors; fatal at startup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(String),

    #[error("Invalid config: {0}")]
    ValidationError(String),

    #[error("Could not resolve an identifier from {0}")]
    IdentifierUnresolved(String),

    #[error("Monitored log is not accessible: {0}")]
    LogUnavailable(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(path) => Remediation::new(format!(
                "Create the config file or point --config elsewhere: {path}"
            ))
            .command("Print defaults", "mtail config show > missiontail.toml"),
            Self::ReadFailed(..) => Remediation::new("Check permissions on the config file.")
                .command("Validate config", "mtail config check"),
            Self::ParseFailed(_) | Self::SerializeFailed(_) => {
                Remediation::new("Fix the TOML syntax in the config file.")
                    .command("Validate config", "mtail config check")
            }
            Self::ValidationError(_) => {
                Remediation::new("Adjust the offending setting and retry.")
                    .command("Validate config", "mtail config check")
            }
            Self::IdentifierUnresolved(_) => Remediation::new(
                "No login line was found in the log. Start the application and log in first.",
            )
            .command("Retry resolution", "mtail resolve-id")
            .alternative("Pass the identifier explicitly with --identifier <id>."),
            Self::LogUnavailable(_) => Remediation::new(
                "The monitored log could not be opened. Check the path and permissions.",
            )
            .alternative("Pass the log location explicitly with --log <path>."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remediation_available_for_error_variants() {
        let errors = vec![
            Error::Parse(ParseError::Timestamp("abc".to_string())),
            Error::Parse(ParseError::IdentifierPattern("(".to_string())),
            Error::Counter(CounterError::Network("refused".to_string())),
            Error::Counter(CounterError::Parse("missing".to_string())),
            Error::Config(ConfigError::FileNotFound("missiontail.toml".to_string())),
            Error::Config(ConfigError::ReadFailed(
                "missiontail.toml".to_string(),
                "io".to_string(),
            )),
            Error::Config(ConfigError::ParseFailed("parse".to_string())),
            Error::Config(ConfigError::SerializeFailed("serialize".to_string())),
            Error::Config(ConfigError::ValidationError("invalid".to_string())),
            Error::Config(ConfigError::IdentifierUnresolved("app.log".to_string())),
            Error::Config(ConfigError::LogUnavailable("app.log".to_string())),
            Error::Io(std::io::Error::other("io")),
        ];

        for error in errors {
            let remediation = error.remediation().expect("missing remediation");
            assert!(!remediation.summary.is_empty());
        }
    }

    #[test]
    fn render_plain_lists_commands_and_alternatives() {
        let text = Remediation::new("Do the thing")
            .command("Check", "mtail config check")
            .alternative("Or not")
            .render_plain();
        assert!(text.contains("To fix:"));
        assert!(text.contains("Check: mtail config check"));
        assert!(text.contains("- Or not"));
    }
}
