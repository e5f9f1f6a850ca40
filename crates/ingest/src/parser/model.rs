use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::serde_utils::{deserialize_fields_from_map, serialize_fields_as_map};

/// Declared wire format of a log source.
///
/// Serialized as a plain lowercase string so it can be written directly in
/// TOML source declarations (`format = "cef"`). Names without a dedicated
/// parser are kept verbatim in [`LogFormat::Other`] and handled by the
/// generic fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogFormat {
    /// Syslog format (RFC 3164 / RFC 5424)
    Syslog,
    /// JSON structured logs
    Json,
    /// ArcSight Common Event Format (pipe header + key=value extension)
    Cef,
    /// IBM Log Event Extended Format (pipe header + tab-delimited body)
    Leef,
    /// Apache/Nginx access logs
    HttpLog,
    /// Logfmt key=value format
    Logfmt,
    /// Any other declared format (no dedicated parser)
    Other(String),
}

impl LogFormat {
    pub fn as_str(&self) -> &str {
        match self {
            LogFormat::Syslog => "syslog",
            LogFormat::Json => "json",
            LogFormat::Cef => "cef",
            LogFormat::Leef => "leef",
            LogFormat::HttpLog => "http_log",
            LogFormat::Logfmt => "logfmt",
            LogFormat::Other(name) => name,
        }
    }

    /// True when the declared name is blank (malformed registration).
    pub fn is_blank(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl From<&str> for LogFormat {
    fn from(name: &str) -> Self {
        let normalized = name.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "syslog" | "rfc5424" | "rfc3164" => LogFormat::Syslog,
            "json" | "structured_json" | "ndjson" => LogFormat::Json,
            "cef" => LogFormat::Cef,
            "leef" => LogFormat::Leef,
            "http_log" | "access_log" | "apache" | "nginx" | "combined" => LogFormat::HttpLog,
            "logfmt" => LogFormat::Logfmt,
            _ => LogFormat::Other(normalized),
        }
    }
}

impl From<String> for LogFormat {
    fn from(name: String) -> Self {
        LogFormat::from(name.as_str())
    }
}

impl From<LogFormat> for String {
    fn from(format: LogFormat) -> Self {
        format.as_str().to_string()
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The eight standard severity levels (RFC 5424 §6.2.1), most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

const SEVERITIES: [Severity; 8] = [
    Severity::Emergency,
    Severity::Alert,
    Severity::Critical,
    Severity::Error,
    Severity::Warning,
    Severity::Notice,
    Severity::Info,
    Severity::Debug,
];

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Emergency => "emergency",
            Severity::Alert => "alert",
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }

    /// Syslog numeric code (0 = emergency .. 7 = debug).
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Decode a syslog severity (0-7). Out of range values yield `None`.
    pub fn from_syslog(code: u8) -> Option<Self> {
        SEVERITIES.get(code as usize).copied()
    }

    /// Case-insensitive level name, with the usual abbreviations.
    pub fn from_name(name: &str) -> Option<Self> {
        super::normalize::severity_from_name(name)
    }

    /// Map a vendor 0-10 severity onto the standard scale.
    pub fn from_vendor_scale(score: u8) -> Self {
        match score {
            9.. => Severity::Emergency,
            7..=8 => Severity::Critical,
            4..=6 => Severity::Error,
            1..=3 => Severity::Warning,
            0 => Severity::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = std::convert::Infallible;

    /// Never fails: unknown names resolve to `Info`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(super::normalize::normalize_severity(s))
    }
}

/// Why a dedicated parser rejected a line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Line too large: {0} bytes (max: {1} bytes)")]
    LineTooLarge(usize, usize),

    #[error("Parse failed: {0}")]
    ParseFailed(String),

    #[error("Parser panicked")]
    Panicked,
}

impl ParseError {
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::InvalidFormat(_) => "invalid_format",
            ParseError::LineTooLarge(_, _) => "line_too_large",
            ParseError::ParseFailed(_) => "parse_failed",
            ParseError::Panicked => "panicked",
        }
    }
}

/// Tag added when no timestamp could be recovered from the text.
pub const TAG_CLOCK_UNRELIABLE: &str = "clock_unreliable";
/// Tag added by the generic fallback parser.
pub const TAG_UNPARSED: &str = "unparsed";
/// Tag added when an authentication pattern matched.
pub const TAG_AUTHENTICATION: &str = "authentication";

/// Canonical event record produced by every parser.
///
/// `timestamp`, `level` and `message` are always present; everything else is
/// filled in only when the source text carried it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub timestamp: DateTime<Utc>,
    pub level: Severity,
    pub message: String,

    // Source identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    // Destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_port: Option<u16>,

    // Classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,

    // Actor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    // Transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_out: Option<u64>,

    // Web transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    // File / process references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Syslog facility name, when decoded from a priority value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Keys the format carried that have no canonical slot
    #[serde(
        default,
        serialize_with = "serialize_fields_as_map",
        deserialize_with = "deserialize_fields_from_map"
    )]
    pub fields: Vec<(String, String)>,

    /// Original raw content (always preserved verbatim)
    pub raw: String,

    pub format: LogFormat,
}

impl NormalizedEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        level: Severity,
        message: impl Into<String>,
        raw: impl Into<String>,
        format: LogFormat,
    ) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
            source_ip: None,
            source_port: None,
            hostname: None,
            service: None,
            dest_ip: None,
            dest_port: None,
            category: None,
            action: None,
            outcome: None,
            user_id: None,
            user_name: None,
            protocol: None,
            bytes_in: None,
            bytes_out: None,
            http_method: None,
            http_status: None,
            url: None,
            user_agent: None,
            file_path: None,
            file_hash: None,
            process_name: None,
            pid: None,
            facility: None,
            tags: Vec::new(),
            fields: Vec::new(),
            raw: raw.into(),
            format,
        }
    }

    /// Add a tag unless it is already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.iter().any(|t| *t == tag) {
            self.tags.push(tag);
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn clock_unreliable(&self) -> bool {
        self.has_tag(TAG_CLOCK_UNRELIABLE)
    }
}
