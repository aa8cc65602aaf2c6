/// Modification watermarks and the change detector
///
/// A watermark is the remote `created_time` / `last_edited_time` pair member
/// for a node. When the metadata fetch fails the node is still recorded, with
/// both watermarks set to the unknown sentinel.
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::fmt;

/// Text stored in place of a timestamp when metadata could not be fetched
pub const UNKNOWN_SENTINEL: &str = "NA";

/// A remote timestamp, or the marker for a failed metadata fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Watermark {
    /// ISO-8601 timestamp exactly as returned by the remote API
    At(String),

    /// Metadata fetch failed; stored as the sentinel text
    Unknown,
}

impl Watermark {
    /// Wraps a remote timestamp string
    pub fn at(timestamp: impl Into<String>) -> Self {
        Self::At(timestamp.into())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Converts the watermark to its database representation
    pub fn to_db_string(&self) -> &str {
        match self {
            Self::At(ts) => ts,
            Self::Unknown => UNKNOWN_SENTINEL,
        }
    }

    /// Parses a watermark from its database representation
    ///
    /// The sentinel maps back to `Unknown`; any other text is kept verbatim.
    pub fn from_db_string(s: &str) -> Self {
        if s == UNKNOWN_SENTINEL {
            Self::Unknown
        } else {
            Self::At(s.to_string())
        }
    }

    /// Interprets the watermark as a UTC instant
    ///
    /// Returns None for the unknown sentinel and for malformed timestamps.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At(ts) => parse_timestamp(ts),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC)
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Decides whether a freshly fetched node can be skipped
///
/// A node is unchanged only when a stored modification watermark exists and
/// equals the fresh one. An unknown watermark on either side never matches,
/// so placeholders recorded after a failed fetch are always revisited.
pub fn is_unchanged(stored: Option<&Watermark>, fresh: &Watermark) -> bool {
    match (stored, fresh) {
        (Some(Watermark::At(old)), Watermark::At(new)) => old == new,
        _ => false,
    }
}
