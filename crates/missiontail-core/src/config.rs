//! Configuration management for missiontail
//!
//! Handles loading and validation of `missiontail.toml`. Every table and field
//! has a default, so an empty file (or no file at all) yields a working setup
//! for the default application. The loaded [`Config`] is immutable and passed
//! by reference to the components that need it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::{LogConfig, LogLevel};
use crate::policy::EligibilityPolicy;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected pretty or json")),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,

    /// Marker substrings
    #[serde(default)]
    pub markers: MarkerConfig,

    /// Query-eligibility policy
    #[serde(default)]
    pub policy: EligibilityPolicy,

    /// Backward scan bounds
    #[serde(default)]
    pub scan: ScanConfig,

    /// Control loop timing
    #[serde(default)]
    pub watch: WatchConfig,

    /// Counter convergence settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Counter service settings
    #[serde(default)]
    pub counter: CounterConfig,

    /// Identifier resolution settings
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Monitored application log
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Optional file that receives a timestamped copy of every report
    #[serde(default)]
    pub report_file: Option<PathBuf>,

    /// Report skipped missions and other diagnostics to the console
    #[serde(default)]
    pub debug: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            report_file: None,
            debug: false,
        }
    }
}

fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Warframe")
        .join("EE.log")
}

/// Marker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// Any of these substrings marks a mission start
    #[serde(default = "default_start_markers")]
    pub start: Vec<String>,

    /// This substring marks a mission end
    #[serde(default = "default_end_marker")]
    pub end: String,

    /// Lines containing this substring are counted as mission events
    #[serde(default)]
    pub event_pattern: Option<String>,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            start: default_start_markers(),
            end: default_end_marker(),
            event_pattern: None,
        }
    }
}

fn default_start_markers() -> Vec<String> {
    vec![
        "GameRulesImpl::StartRound()".to_string(),
        "OnStateStarted, mission type".to_string(),
    ]
}

fn default_end_marker() -> String {
    "Game [Info]: CommitInventoryChangesToDB".to_string()
}

/// Backward scan configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Upper bound on bytes scanned backward for a start marker
    #[serde(default = "default_max_scan_bytes")]
    pub max_scan_bytes: u64,

    /// Bytes read per backward step
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Bytes carried from the later chunk into the earlier one
    #[serde(default = "default_carry_bytes")]
    pub carry_bytes: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_scan_bytes: default_max_scan_bytes(),
            chunk_size: default_chunk_size(),
            carry_bytes: default_carry_bytes(),
        }
    }
}

fn default_max_scan_bytes() -> u64 {
    32 * 1024 * 1024
}

fn default_chunk_size() -> u64 {
    256 * 1024
}

fn default_carry_bytes() -> u64 {
    8 * 1024
}

/// Control loop configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Log size poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl WatchConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_poll_interval() -> u64 {
    250
}

/// Counter convergence configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Wait before each counter query, in seconds
    #[serde(default = "default_sync_wait")]
    pub wait_secs: u64,

    /// Number of queries before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            wait_secs: default_sync_wait(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}

fn default_sync_wait() -> u64 {
    5 * 60
}

fn default_max_attempts() -> u32 {
    6
}

/// Counter service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterConfig {
    /// Payload URL; `{id}` is replaced with the resolved identifier
    #[serde(default = "default_url_template")]
    pub url_template: String,

    /// Field identifying the payload entry to read
    #[serde(default = "default_match_field")]
    pub match_field: String,

    /// Value `match_field` must equal
    #[serde(default = "default_match_value")]
    pub match_value: String,

    /// Field holding the counter in the matched entry
    #[serde(default = "default_count_field")]
    pub count_field: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            match_field: default_match_field(),
            match_value: default_match_value(),
            count_field: default_count_field(),
            timeout_secs: default_timeout(),
        }
    }
}

impl CounterConfig {
    /// Payload URL for `identifier`.
    #[must_use]
    pub fn url_for(&self, identifier: &str) -> String {
        self.url_template.replace("{id}", identifier)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_url_template() -> String {
    "http://content.warframe.com/dynamic/getProfileViewingData.php?playerId={id}".to_string()
}

fn default_match_field() -> String {
    "type".to_string()
}

fn default_match_value() -> String {
    "/Lotus/Types/Enemies/Corpus/Drones/AIWeek/CorpusEliteShieldDroneAvatar".to_string()
}

fn default_count_field() -> String {
    "kills".to_string()
}

fn default_timeout() -> u64 {
    12
}

/// Identifier resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Regex with one capture group; the last matching log line wins
    #[serde(default = "default_identity_pattern")]
    pub pattern: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            pattern: default_identity_pattern(),
        }
    }
}

fn default_identity_pattern() -> String {
    r"Sys \[Info\]: Logged in .*\(([0-9a-fA-F]+)\)".to_string()
}

/// Default config file location (`<config dir>/missiontail/missiontail.toml`).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("missiontail").join("missiontail.toml"))
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists there.
    pub fn load() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the effective configuration
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeFailed(e.to_string()))
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if let Err(msg) = self.logging.level.parse::<LogLevel>() {
            return invalid(format!("logging.level: {msg}"));
        }

        if self.markers.start.is_empty() {
            return invalid("markers.start must list at least one marker".to_string());
        }
        if self.markers.start.iter().any(String::is_empty) {
            return invalid("markers.start must not contain empty markers".to_string());
        }
        if self.markers.end.is_empty() {
            return invalid("markers.end must not be empty".to_string());
        }
        if self.markers.event_pattern.as_deref() == Some("") {
            return invalid("markers.event_pattern must not be empty when set".to_string());
        }

        if self.scan.chunk_size == 0 {
            return invalid("scan.chunk_size must be greater than zero".to_string());
        }
        if self.scan.max_scan_bytes == 0 {
            return invalid("scan.max_scan_bytes must be greater than zero".to_string());
        }
        let longest_marker = self.markers.start.iter().map(String::len).max().unwrap_or(0) as u64;
        if self.scan.carry_bytes + 1 < longest_marker {
            return invalid(format!(
                "scan.carry_bytes ({}) must be at least the longest start marker length minus one ({})",
                self.scan.carry_bytes,
                longest_marker.saturating_sub(1)
            ));
        }

        if self.watch.poll_interval_ms == 0 {
            return invalid("watch.poll_interval_ms must be greater than zero".to_string());
        }
        if self.sync.max_attempts == 0 {
            return invalid("sync.max_attempts must be at least 1".to_string());
        }

        if !self.counter.url_template.contains("{id}") {
            return invalid("counter.url_template must contain an {id} placeholder".to_string());
        }
        if self.counter.match_field.is_empty() || self.counter.count_field.is_empty() {
            return invalid("counter.match_field and counter.count_field must be set".to_string());
        }

        match regex::Regex::new(&self.identity.pattern) {
            Ok(re) if re.captures_len() >= 2 => {}
            Ok(_) => {
                return invalid("identity.pattern needs one capture group".to_string());
            }
            Err(e) => return invalid(format!("identity.pattern does not compile: {e}")),
        }

        self.policy.validate().map_err(ConfigError::ValidationError)?;

        Ok(())
    }
}
