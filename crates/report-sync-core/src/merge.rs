//! Idempotent merge of one bucket into a [`DocumentStore`].
//!
//! For each bucket the [`Reconciler`] walks three steps:
//!
//! 1. **Find or create the person-year page**: query by exact title and
//!    fiscal year; create the page if the query comes back empty.
//! 2. **Find or create the date section**: scan the page's direct children
//!    for a toggle titled with the date. A new toggle is created together
//!    with the bucket's lines.
//! 3. **De-duplicated append**: for an existing toggle, read its paragraph
//!    texts and append only lines not already there.
//!
//! Lines are compared after trimming, so re-running over the same messages
//! writes nothing. None of this is transactional: if two runs race on the
//! same key, both may create. Running one sync at a time is the caller's
//! responsibility.

use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

use crate::models::BucketKey;
use crate::paginate::{drain, find_map};
use crate::store::{BlockSpec, DocumentStore, PageKey, PageRef};

/// Maximum number of child blocks sent in one append call.
pub const APPEND_BATCH_LIMIT: usize = 100;

/// Result of looking for a date section under a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionLookup {
    Found(String),
    NotFound,
}

/// What a single bucket merge did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub page_created: bool,
    pub section_created: bool,
    pub lines_appended: usize,
    /// Lines dropped because they were blank or already present.
    pub lines_skipped: usize,
}

/// Trim `lines`, dropping blanks, lines in `existing`, and repeats within
/// `lines` itself. Returns the lines to write and how many were dropped.
pub fn fresh_lines(lines: &[String], existing: &HashSet<String>) -> (Vec<String>, usize) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut fresh = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() || existing.contains(line) || !seen.insert(line) {
            continue;
        }
        fresh.push(line.to_string());
    }
    let skipped = lines.len() - fresh.len();
    (fresh, skipped)
}

fn paragraphs(lines: &[String]) -> Vec<BlockSpec> {
    lines.iter().map(BlockSpec::paragraph).collect()
}

/// Applies buckets to one database of a [`DocumentStore`].
pub struct Reconciler<'a> {
    store: &'a dyn DocumentStore,
    database_id: &'a str,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn DocumentStore, database_id: &'a str) -> Self {
        Self { store, database_id }
    }

    /// Return the page for `key`, creating it when missing. The flag is
    /// `true` when the page was created by this call.
    pub async fn ensure_person_page(&self, key: &PageKey) -> Result<(PageRef, bool)> {
        let existing = find_map(
            |cursor| self.store.query_pages(self.database_id, key, cursor),
            Some,
        )
        .await
        .with_context(|| {
            format!(
                "Failed to query page for {} / FY{}",
                key.title, key.fiscal_year
            )
        })?;

        if let Some(page) = existing {
            return Ok((page, false));
        }

        let page = self
            .store
            .create_page(self.database_id, key)
            .await
            .with_context(|| {
                format!(
                    "Failed to create page for {} / FY{}",
                    key.title, key.fiscal_year
                )
            })?;
        info!(
            author = %key.title,
            fiscal_year = key.fiscal_year,
            page_id = %page.id,
            "created page"
        );
        Ok((page, true))
    }

    /// Scan the direct children of `page_id` for a toggle titled `title`.
    pub async fn find_date_section(&self, page_id: &str, title: &str) -> Result<SectionLookup> {
        let found = find_map(
            |cursor| self.store.list_children(page_id, cursor),
            |block| (block.toggle_title() == Some(title)).then_some(block.id),
        )
        .await
        .with_context(|| format!("Failed to list children of page {}", page_id))?;

        Ok(match found {
            Some(id) => SectionLookup::Found(id),
            None => SectionLookup::NotFound,
        })
    }

    /// Trimmed plain text of every paragraph directly under `section_id`.
    pub async fn existing_lines(&self, section_id: &str) -> Result<HashSet<String>> {
        let blocks = drain(|cursor| self.store.list_children(section_id, cursor))
            .await
            .with_context(|| format!("Failed to list paragraphs of section {}", section_id))?;
        Ok(blocks
            .iter()
            .filter_map(|b| b.paragraph_text())
            .map(|t| t.trim().to_string())
            .collect())
    }

    async fn append_paragraphs(&self, section_id: &str, lines: &[String]) -> Result<()> {
        for batch in lines.chunks(APPEND_BATCH_LIMIT) {
            self.store
                .append_children(section_id, &paragraphs(batch))
                .await
                .with_context(|| format!("Failed to append to section {}", section_id))?;
        }
        Ok(())
    }

    /// Merge one bucket. Safe to repeat: a second call with the same lines
    /// performs no writes.
    pub async fn merge_bucket(&self, key: &BucketKey, lines: &[String]) -> Result<MergeOutcome> {
        let page_key = PageKey::new(key.author.clone(), key.fiscal_year);
        let (page, page_created) = self.ensure_person_page(&page_key).await?;
        let title = key.date_title();

        let mut outcome = MergeOutcome {
            page_created,
            ..Default::default()
        };

        match self.find_date_section(&page.id, &title).await? {
            SectionLookup::Found(section_id) => {
                let existing = self.existing_lines(&section_id).await?;
                let (fresh, skipped) = fresh_lines(lines, &existing);
                debug!(
                    bucket = %key,
                    existing = existing.len(),
                    fresh = fresh.len(),
                    "appending to section"
                );
                self.append_paragraphs(&section_id, &fresh).await?;
                outcome.lines_appended = fresh.len();
                outcome.lines_skipped = skipped;
            }
            SectionLookup::NotFound => {
                let (fresh, skipped) = fresh_lines(lines, &HashSet::new());
                let split = fresh.len().min(APPEND_BATCH_LIMIT);
                let (first, rest) = fresh.split_at(split);
                let created = self
                    .store
                    .append_children(
                        &page.id,
                        &[BlockSpec::Toggle {
                            title: title.clone(),
                            children: paragraphs(first),
                        }],
                    )
                    .await
                    .with_context(|| {
                        format!("Failed to create section {} on page {}", title, page.id)
                    })?;
                let section_id = created
                    .into_iter()
                    .next()
                    .map(|b| b.id)
                    .ok_or_else(|| anyhow!("Store returned no block for new section {}", title))?;
                self.append_paragraphs(&section_id, rest).await?;
                debug!(bucket = %key, lines = fresh.len(), "created section");
                outcome.section_created = true;
                outcome.lines_appended = fresh.len();
                outcome.lines_skipped = skipped;
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryDocumentStore;
    use chrono::NaiveDate;

    fn key(author: &str) -> BucketKey {
        BucketKey {
            author: author.to_string(),
            fiscal_year: 2025,
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
        }
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fresh_lines_trims_and_dedups() {
        let existing: HashSet<String> = ["Fixed bug X".to_string()].into_iter().collect();
        let (fresh, skipped) = fresh_lines(
            &lines(&["Fixed bug X", "  Wrote tests ", "", "Wrote tests", " Fixed bug X "]),
            &existing,
        );
        assert_eq!(fresh, vec!["Wrote tests"]);
        assert_eq!(skipped, 4);
    }

    #[tokio::test]
    async fn test_creates_page_and_section_on_first_merge() {
        let store = InMemoryDocumentStore::new();
        let rec = Reconciler::new(&store, "db");
        let outcome = rec.merge_bucket(&key("alice"), &lines(&["A", "B"])).await.unwrap();
        assert_eq!(
            outcome,
            MergeOutcome {
                page_created: true,
                section_created: true,
                lines_appended: 2,
                lines_skipped: 0,
            }
        );
        assert_eq!(store.writes(), 2);
        assert_eq!(
            store.section_lines(&PageKey::new("alice", 2025), "2025-06-02"),
            Some(lines(&["A", "B"]))
        );
    }

    #[tokio::test]
    async fn test_dedup_on_append_to_existing_section() {
        let store = InMemoryDocumentStore::new();
        let page = store.create_page("db", &PageKey::new("alice", 2025)).await.unwrap();
        store
            .seed_children(
                &page.id,
                &[BlockSpec::Toggle {
                    title: "2025-06-02".into(),
                    children: vec![BlockSpec::paragraph("Fixed bug X")],
                }],
            )
            .unwrap();
        let writes_before = store.writes();

        let rec = Reconciler::new(&store, "db");
        let outcome = rec
            .merge_bucket(&key("alice"), &lines(&["Fixed bug X", "Wrote tests"]))
            .await
            .unwrap();

        assert!(!outcome.page_created);
        assert!(!outcome.section_created);
        assert_eq!(outcome.lines_appended, 1);
        assert_eq!(store.writes(), writes_before + 1);
        assert_eq!(
            store.section_lines(&PageKey::new("alice", 2025), "2025-06-02"),
            Some(lines(&["Fixed bug X", "Wrote tests"]))
        );
    }

    #[tokio::test]
    async fn test_second_merge_writes_nothing() {
        let store = InMemoryDocumentStore::new().with_page_size(1);
        let rec = Reconciler::new(&store, "db");
        rec.merge_bucket(&key("bob"), &lines(&["x", "y", "x"])).await.unwrap();
        let writes = store.writes();
        let again = rec.merge_bucket(&key("bob"), &lines(&["x", "y"])).await.unwrap();
        assert_eq!(again.lines_appended, 0);
        assert_eq!(store.writes(), writes);
        assert_eq!(store.page_count(), 1);
        assert_eq!(
            store.outline()[0].sections,
            vec![("2025-06-02".to_string(), lines(&["x", "y"]))]
        );
    }

    #[tokio::test]
    async fn test_finds_section_past_first_page_of_children() {
        let store = InMemoryDocumentStore::new().with_page_size(2);
        let page = store.create_page("db", &PageKey::new("carol", 2025)).await.unwrap();
        let toggles: Vec<BlockSpec> = ["2025-05-30", "2025-05-31", "2025-06-01", "2025-06-02"]
            .iter()
            .map(|t| BlockSpec::Toggle {
                title: t.to_string(),
                children: vec![],
            })
            .collect();
        let seeded = store.seed_children(&page.id, &toggles).unwrap();

        let rec = Reconciler::new(&store, "db");
        assert_eq!(
            rec.find_date_section(&page.id, "2025-06-02").await.unwrap(),
            SectionLookup::Found(seeded[3].id.clone())
        );
        assert_eq!(
            rec.find_date_section(&page.id, "2025-06-03").await.unwrap(),
            SectionLookup::NotFound
        );
    }

    #[tokio::test]
    async fn test_paragraph_with_date_text_is_not_a_section() {
        let store = InMemoryDocumentStore::new();
        let page = store.create_page("db", &PageKey::new("dave", 2025)).await.unwrap();
        store
            .seed_children(&page.id, &[BlockSpec::paragraph("2025-06-02")])
            .unwrap();
        let rec = Reconciler::new(&store, "db");
        assert_eq!(
            rec.find_date_section(&page.id, "2025-06-02").await.unwrap(),
            SectionLookup::NotFound
        );
    }

    #[tokio::test]
    async fn test_large_bucket_is_split_into_batches() {
        let store = InMemoryDocumentStore::new();
        let rec = Reconciler::new(&store, "db");
        let many: Vec<String> = (0..250).map(|i| format!("line {}", i)).collect();
        let outcome = rec.merge_bucket(&key("erin"), &many).await.unwrap();
        assert_eq!(outcome.lines_appended, 250);
        // create page + create section (100) + two appends (100, 50)
        assert_eq!(store.writes(), 4);
        assert_eq!(
            store.section_lines(&PageKey::new("erin", 2025), "2025-06-02"),
            Some(many)
        );
    }

    #[tokio::test]
    async fn test_all_blank_bucket_creates_empty_section() {
        let store = InMemoryDocumentStore::new();
        let rec = Reconciler::new(&store, "db");
        let outcome = rec.merge_bucket(&key("frank"), &lines(&["  "])).await.unwrap();
        assert!(outcome.section_created);
        assert_eq!(outcome.lines_appended, 0);
        assert_eq!(outcome.lines_skipped, 1);
    }

    #[tokio::test]
    async fn test_query_failure_surfaces_with_context() {
        let store = InMemoryDocumentStore::new();
        store.fail_for_title("gina");
        let rec = Reconciler::new(&store, "db");
        let err = rec.merge_bucket(&key("gina"), &lines(&["x"])).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to query page for gina / FY2025"));
        assert_eq!(store.writes(), 0);
    }
}
