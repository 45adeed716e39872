//! Grouping of extracted report lines by (author, fiscal year, date).
//!
//! [`Bucketer`] is pure accumulation. [`AuthorResolver`] turns raw author ids
//! into the display names used as bucket keys; it never fails, degrading to
//! the raw id when a profile lookup errors.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::models::{AuthorName, BucketKey, ExtractedEntry};
use crate::source::MessageSource;

/// In-memory buckets for one sync run.
///
/// Iteration order is the key order (author, fiscal year, date), so runs
/// over the same input reconcile buckets in the same order.
#[derive(Debug, Default, Clone)]
pub struct Bucketer {
    buckets: BTreeMap<BucketKey, Vec<String>>,
}

impl Bucketer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry's lines to its bucket. Entries without lines are
    /// ignored and do not create a bucket.
    pub fn add(&mut self, entry: ExtractedEntry) {
        if entry.lines.is_empty() {
            return;
        }
        let key = BucketKey {
            author: entry.author,
            fiscal_year: entry.fiscal_year,
            date: entry.date,
        };
        self.buckets.entry(key).or_default().extend(entry.lines);
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, key: &BucketKey) -> Option<&[String]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BucketKey, &[String])> {
        self.buckets.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn into_buckets(self) -> Vec<(BucketKey, Vec<String>)> {
        self.buckets.into_iter().collect()
    }
}

/// Whether a raw author id names a human user rather than a bot.
///
/// Slack user ids start with `U`, or `W` on Enterprise Grid.
pub fn is_human_id(id: &str) -> bool {
    id.starts_with('U') || id.starts_with('W')
}

/// Resolves author ids to display names, caching per user id.
#[derive(Debug, Default)]
pub struct AuthorResolver {
    aliases: HashMap<String, String>,
    cache: HashMap<String, AuthorName>,
}

impl AuthorResolver {
    /// `aliases` remaps resolved display names (e.g. to the names already
    /// used as page titles in the document store).
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self {
            aliases,
            cache: HashMap::new(),
        }
    }

    pub async fn resolve(
        &mut self,
        source: &dyn MessageSource,
        author_id: Option<&str>,
    ) -> AuthorName {
        let Some(id) = author_id.filter(|id| is_human_id(id)) else {
            return AuthorName::Unattributed;
        };
        if let Some(hit) = self.cache.get(id) {
            return hit.clone();
        }

        let name = match source.resolve_user(id).await {
            Ok(profile) => match profile.preferred_name() {
                Some(name) => {
                    let name = self.aliases.get(name).map(String::as_str).unwrap_or(name);
                    AuthorName::Resolved(name.to_string())
                }
                None => {
                    debug!(user_id = id, "profile has no usable name");
                    AuthorName::Fallback(id.to_string())
                }
            },
            Err(e) => {
                warn!(user_id = id, error = %e, "user lookup failed, using raw id");
                AuthorName::Fallback(id.to_string())
            }
        };
        self.cache.insert(id.to_string(), name.clone());
        name
    }

    /// Number of distinct user ids looked up so far.
    pub fn lookups(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserProfile;
    use crate::source::memory::InMemoryMessageSource;
    use chrono::NaiveDate;

    fn entry(author: &str, day: u32, lines: &[&str]) -> ExtractedEntry {
        ExtractedEntry {
            author: author.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 5, day).unwrap(),
            fiscal_year: 2025,
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_same_key_appends_in_arrival_order() {
        let mut b = Bucketer::new();
        b.add(entry("alice", 1, &["a1", "a2"]));
        b.add(entry("bob", 1, &["b1"]));
        b.add(entry("alice", 1, &["a3", "a1"]));
        assert_eq!(b.len(), 2);
        let key = BucketKey {
            author: "alice".into(),
            fiscal_year: 2025,
            date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
        };
        assert_eq!(b.get(&key).unwrap(), ["a1", "a2", "a3", "a1"]);
    }

    #[test]
    fn test_empty_entry_creates_no_bucket() {
        let mut b = Bucketer::new();
        b.add(entry("alice", 1, &[]));
        assert!(b.is_empty());
    }

    #[test]
    fn test_iteration_is_key_ordered() {
        let mut b = Bucketer::new();
        b.add(entry("bob", 2, &["x"]));
        b.add(entry("alice", 3, &["y"]));
        b.add(entry("alice", 1, &["z"]));
        let order: Vec<String> = b.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "alice / FY2025 / 2025-05-01",
                "alice / FY2025 / 2025-05-03",
                "bob / FY2025 / 2025-05-02",
            ]
        );
    }

    #[test]
    fn test_human_ids() {
        assert!(is_human_id("U012ABC"));
        assert!(is_human_id("W012ABC"));
        assert!(!is_human_id("B012ABC"));
        assert!(!is_human_id(""));
    }

    #[tokio::test]
    async fn test_resolver_prefers_display_name_and_applies_alias() {
        let source = InMemoryMessageSource::new(vec![]).with_user(
            "U1",
            UserProfile {
                display_name: Some("hanako".into()),
                real_name: Some("Hanako Yamada".into()),
            },
        );
        let mut aliases = HashMap::new();
        aliases.insert("hanako".to_string(), "山田 花子".to_string());
        let mut resolver = AuthorResolver::new(aliases);
        let name = resolver.resolve(&source, Some("U1")).await;
        assert_eq!(name, AuthorName::Resolved("山田 花子".into()));
    }

    #[tokio::test]
    async fn test_resolver_falls_back_to_real_name() {
        let source = InMemoryMessageSource::new(vec![]).with_user(
            "U2",
            UserProfile {
                display_name: Some(String::new()),
                real_name: Some("Taro Sato".into()),
            },
        );
        let mut resolver = AuthorResolver::default();
        assert_eq!(
            resolver.resolve(&source, Some("U2")).await,
            AuthorName::Resolved("Taro Sato".into())
        );
    }

    #[tokio::test]
    async fn test_resolver_lookup_failure_uses_raw_id() {
        let source = InMemoryMessageSource::new(vec![]);
        let mut resolver = AuthorResolver::default();
        let name = resolver.resolve(&source, Some("U404")).await;
        assert_eq!(name, AuthorName::Fallback("U404".into()));
        assert_eq!(name.display_name(), "U404");
    }

    #[tokio::test]
    async fn test_resolver_bots_and_missing_ids_are_unattributed() {
        let source = InMemoryMessageSource::new(vec![]);
        let mut resolver = AuthorResolver::default();
        assert_eq!(
            resolver.resolve(&source, Some("B123")).await,
            AuthorName::Unattributed
        );
        assert_eq!(resolver.resolve(&source, None).await, AuthorName::Unattributed);
        assert_eq!(resolver.lookups(), 0);
    }

    #[tokio::test]
    async fn test_resolver_caches_lookups() {
        let source = InMemoryMessageSource::new(vec![]).with_user(
            "U1",
            UserProfile {
                display_name: Some("hanako".into()),
                real_name: None,
            },
        );
        let mut resolver = AuthorResolver::default();
        resolver.resolve(&source, Some("U1")).await;
        resolver.resolve(&source, Some("U1")).await;
        assert_eq!(source.user_lookups(), 1);
        assert_eq!(resolver.lookups(), 1);
    }
}
