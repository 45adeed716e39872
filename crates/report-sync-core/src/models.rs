//! Core data models used throughout Daily Report Sync.
//!
//! These types represent the chat messages, extracted report lines, and
//! bucket keys that flow from the message source to the document store.

use std::cmp::Ordering;
use std::fmt;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Name used for messages posted by bots or without an author.
pub const UNATTRIBUTED_AUTHOR: &str = "unknown";

/// A message timestamp as fixed-point seconds (`"1733745342.123456"`).
///
/// The fractional part only orders messages posted within the same second;
/// it is kept as microseconds so that ordering is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageTs {
    pub secs: i64,
    pub micros: u32,
}

impl MessageTs {
    pub fn new(secs: i64, micros: u32) -> Self {
        Self { secs, micros }
    }

    /// Parse a fixed-point seconds string. Fractions longer than six digits
    /// are truncated; shorter ones are right-padded.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (whole, frac) = raw.split_once('.').unwrap_or((raw, ""));
        let secs: i64 = whole
            .parse()
            .with_context(|| format!("invalid message timestamp: '{}'", raw))?;
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            bail!("invalid message timestamp: '{}'", raw);
        }
        let mut digits: String = frac.chars().take(6).collect();
        while digits.len() < 6 {
            digits.push('0');
        }
        let micros = digits.parse().unwrap_or(0);
        Ok(Self { secs, micros })
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            secs: dt.timestamp(),
            micros: dt.timestamp_subsec_micros(),
        }
    }

    /// The instant this timestamp denotes, if representable.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.secs, self.micros * 1_000)
    }
}

impl Ord for MessageTs {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.secs, self.micros).cmp(&(other.secs, other.micros))
    }
}

impl PartialOrd for MessageTs {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MessageTs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}

/// A chat message as returned by the message source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Raw timestamp string; doubles as the message id.
    pub ts: String,
    /// Human user id, or the bot id for automated posters.
    pub author_id: Option<String>,
    pub text: String,
}

impl RawMessage {
    pub fn new(ts: impl Into<String>, author_id: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            ts: ts.into(),
            author_id: author_id.map(str::to_string),
            text: text.into(),
        }
    }
}

/// Profile fields returned by a user lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Normalized display name; often empty.
    pub display_name: Option<String>,
    pub real_name: Option<String>,
}

impl UserProfile {
    /// Display name if set, else real name.
    pub fn preferred_name(&self) -> Option<&str> {
        [self.display_name.as_deref(), self.real_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

/// Outcome of resolving a message author to a display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthorName {
    /// Resolved through the profile lookup (after alias remapping).
    Resolved(String),
    /// Lookup failed or returned no usable name; carries the raw user id.
    Fallback(String),
    /// Bot message or no author id at all.
    Unattributed,
}

impl AuthorName {
    pub fn display_name(&self) -> &str {
        match self {
            AuthorName::Resolved(name) | AuthorName::Fallback(name) => name,
            AuthorName::Unattributed => UNATTRIBUTED_AUTHOR,
        }
    }
}

/// Lines extracted from one message, tagged with where they belong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    pub author: String,
    pub date: NaiveDate,
    pub fiscal_year: i32,
    pub lines: Vec<String>,
}

/// Identity of one date section: (author, fiscal year, date).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub author: String,
    pub fiscal_year: i32,
    pub date: NaiveDate,
}

impl BucketKey {
    /// Section title used in the document store (`YYYY-MM-DD`).
    pub fn date_title(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / FY{} / {}",
            self.author,
            self.fiscal_year,
            self.date_title()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ts_pads_fraction() {
        let ts = MessageTs::parse("1733745342.12").unwrap();
        assert_eq!(ts, MessageTs::new(1733745342, 120_000));
        assert_eq!(ts.to_string(), "1733745342.120000");
    }

    #[test]
    fn test_parse_ts_without_fraction() {
        assert_eq!(MessageTs::parse("42").unwrap(), MessageTs::new(42, 0));
    }

    #[test]
    fn test_parse_ts_rejects_garbage() {
        assert!(MessageTs::parse("abc").is_err());
        assert!(MessageTs::parse("12.3x").is_err());
        assert!(MessageTs::parse("").is_err());
    }

    #[test]
    fn test_fraction_breaks_ties() {
        let a = MessageTs::parse("100.000002").unwrap();
        let b = MessageTs::parse("100.000010").unwrap();
        let c = MessageTs::parse("99.999999").unwrap();
        assert!(c < a);
        assert!(a < b);
    }

    #[test]
    fn test_preferred_name_skips_blank_display_name() {
        let profile = UserProfile {
            display_name: Some("  ".to_string()),
            real_name: Some("Hanako Yamada".to_string()),
        };
        assert_eq!(profile.preferred_name(), Some("Hanako Yamada"));
        assert_eq!(UserProfile::default().preferred_name(), None);
    }

    #[test]
    fn test_unattributed_display_name() {
        assert_eq!(AuthorName::Unattributed.display_name(), "unknown");
        assert_eq!(AuthorName::Fallback("U1".into()).display_name(), "U1");
    }
}
