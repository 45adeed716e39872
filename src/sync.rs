//! Sync orchestration.
//!
//! Coordinates one run: fetch history → sort → extract + bucket → reconcile.
//! The phases run strictly one after another and remote calls are awaited
//! one at a time.
//!
//! A fetch failure aborts the run. A failure while reconciling one bucket is
//! logged, recorded in [`SyncReport::failures`], and the remaining buckets
//! still run. Only one sync may run against a database at a time; nothing
//! here prevents two concurrent runs from both creating the same page.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use report_sync_core::bucket::{AuthorResolver, Bucketer};
use report_sync_core::extract::{SectionExtractor, SectionLabels};
use report_sync_core::fiscal::{report_date, FiscalYearStart};
use report_sync_core::merge::Reconciler;
use report_sync_core::models::{BucketKey, ExtractedEntry, MessageTs, RawMessage};
use report_sync_core::paginate::drain;
use report_sync_core::source::MessageSource;
use report_sync_core::store::DocumentStore;

use crate::config::Config;
use crate::notion::NotionStore;
use crate::slack::SlackSource;

/// Settings the engine needs, independent of how clients are built.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub channel_id: String,
    pub database_id: String,
    pub lookback_days: u32,
    pub fiscal_year_start: FiscalYearStart,
    pub labels: SectionLabels,
    pub aliases: HashMap<String, String>,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            channel_id: config.slack.channel_id.clone(),
            database_id: config.notion.database_id.clone(),
            lookback_days: config.sync.lookback_days,
            fiscal_year_start: config.sync.fiscal_year_start,
            labels: config.labels.clone(),
            aliases: config.aliases.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Stop after bucketing and report what would be written.
    pub dry_run: bool,
}

/// A bucket that could not be reconciled.
#[derive(Debug, Clone)]
pub struct BucketFailure {
    pub key: BucketKey,
    pub error: String,
}

/// Counts and failures from one run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub messages_fetched: usize,
    /// Messages that contributed at least one line.
    pub messages_with_reports: usize,
    pub buckets: usize,
    pub pages_created: usize,
    pub sections_created: usize,
    pub lines_appended: usize,
    pub lines_skipped: usize,
    pub failures: Vec<BucketFailure>,
    /// Buckets and line counts, filled only on dry runs.
    pub planned: Vec<(BucketKey, usize)>,
}

/// Oldest message timestamp considered by a run at `now`.
pub fn oldest_bound(now: DateTime<Utc>, lookback_days: u32) -> MessageTs {
    MessageTs::from_datetime(now - Duration::days(i64::from(lookback_days)))
}

/// Drives one sync between a [`MessageSource`] and a [`DocumentStore`].
pub struct SyncEngine {
    source: Arc<dyn MessageSource>,
    store: Arc<dyn DocumentStore>,
    settings: SyncSettings,
    extractor: SectionExtractor,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn MessageSource>,
        store: Arc<dyn DocumentStore>,
        settings: SyncSettings,
    ) -> Result<Self> {
        let extractor = SectionExtractor::new(&settings.labels)?;
        Ok(Self {
            source,
            store,
            settings,
            extractor,
        })
    }

    /// Build the Slack and Notion clients from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = SlackSource::new(&config.slack, &config.http)
            .context("Failed to build Slack client")?;
        let store = NotionStore::new(&config.notion, &config.http)
            .context("Failed to build Notion client")?;
        Self::new(
            Arc::new(source),
            Arc::new(store),
            SyncSettings::from_config(config),
        )
    }

    pub async fn run(&self, options: &SyncOptions) -> Result<SyncReport> {
        self.run_at(Utc::now(), options).await
    }

    /// Run with an explicit clock.
    pub async fn run_at(&self, now: DateTime<Utc>, options: &SyncOptions) -> Result<SyncReport> {
        let oldest = oldest_bound(now, self.settings.lookback_days);
        info!(
            channel = %self.settings.channel_id,
            oldest = %oldest,
            lookback_days = self.settings.lookback_days,
            "starting sync"
        );

        let messages = self.fetch_messages(oldest).await?;
        let mut report = SyncReport {
            messages_fetched: messages.len(),
            ..Default::default()
        };

        let (bucketer, with_reports) = self.build_buckets(&messages).await;
        report.messages_with_reports = with_reports;
        report.buckets = bucketer.len();

        if options.dry_run {
            report.planned = bucketer.iter().map(|(k, v)| (k.clone(), v.len())).collect();
            return Ok(report);
        }

        self.reconcile(bucketer, &mut report).await;
        info!(
            buckets = report.buckets,
            appended = report.lines_appended,
            failures = report.failures.len(),
            "sync finished"
        );
        Ok(report)
    }

    /// Fetch every history page newer than `oldest`, sorted ascending by
    /// timestamp. Messages whose timestamp does not parse are dropped.
    pub async fn fetch_messages(&self, oldest: MessageTs) -> Result<Vec<RawMessage>> {
        let channel = self.settings.channel_id.as_str();
        let raw = drain(|cursor| self.source.fetch_history(channel, oldest, cursor))
            .await
            .with_context(|| format!("Failed to fetch history for channel {}", channel))?;

        let mut timed: Vec<(MessageTs, RawMessage)> = raw
            .into_iter()
            .filter_map(|m| match MessageTs::parse(&m.ts) {
                Ok(ts) => Some((ts, m)),
                Err(_) => {
                    debug!(ts = %m.ts, "skipping message with unparsable timestamp");
                    None
                }
            })
            .collect();
        timed.sort_by_key(|(ts, _)| *ts);
        Ok(timed.into_iter().map(|(_, m)| m).collect())
    }

    /// Extract report lines from `messages` (already sorted) and group them.
    /// Returns the buckets and how many messages contributed lines.
    pub async fn build_buckets(&self, messages: &[RawMessage]) -> (Bucketer, usize) {
        let mut bucketer = Bucketer::new();
        let mut resolver = AuthorResolver::new(self.settings.aliases.clone());
        let mut with_reports = 0;

        for message in messages {
            if message.text.trim().is_empty() {
                continue;
            }
            let Some(date) = MessageTs::parse(&message.ts).ok().and_then(report_date) else {
                continue;
            };
            let lines = self.extractor.extract_lines(&message.text);
            if lines.is_empty() {
                continue;
            }

            let author = resolver
                .resolve(self.source.as_ref(), message.author_id.as_deref())
                .await;
            with_reports += 1;
            bucketer.add(ExtractedEntry {
                author: author.display_name().to_string(),
                date,
                fiscal_year: self.settings.fiscal_year_start.fiscal_year(date),
                lines,
            });
        }

        debug!(
            buckets = bucketer.len(),
            user_lookups = resolver.lookups(),
            "bucketed messages"
        );
        (bucketer, with_reports)
    }

    /// Merge every bucket, isolating failures per bucket.
    pub async fn reconcile(&self, bucketer: Bucketer, report: &mut SyncReport) {
        let reconciler = Reconciler::new(self.store.as_ref(), &self.settings.database_id);
        for (key, lines) in bucketer.into_buckets() {
            match reconciler.merge_bucket(&key, &lines).await {
                Ok(outcome) => {
                    debug!(
                        author = %key.author,
                        fiscal_year = key.fiscal_year,
                        date = %key.date,
                        appended = outcome.lines_appended,
                        skipped = outcome.lines_skipped,
                        "bucket merged"
                    );
                    report.pages_created += usize::from(outcome.page_created);
                    report.sections_created += usize::from(outcome.section_created);
                    report.lines_appended += outcome.lines_appended;
                    report.lines_skipped += outcome.lines_skipped;
                }
                Err(e) => {
                    warn!(
                        author = %key.author,
                        fiscal_year = key.fiscal_year,
                        date = %key.date,
                        error = %format!("{:#}", e),
                        "bucket failed"
                    );
                    report.failures.push(BucketFailure {
                        key,
                        error: format!("{:#}", e),
                    });
                }
            }
        }
    }
}

/// Print a run summary to stdout.
pub fn print_report(report: &SyncReport, channel: &str, dry_run: bool) {
    if dry_run {
        println!("sync {} (dry-run)", channel);
    } else {
        println!("sync {}", channel);
    }
    println!("  fetched: {} messages", report.messages_fetched);
    println!("  with reports: {}", report.messages_with_reports);
    println!("  buckets: {}", report.buckets);

    if dry_run {
        for (key, lines) in &report.planned {
            println!("    {} ({} lines)", key, lines);
        }
        return;
    }

    println!("  pages created: {}", report.pages_created);
    println!("  sections created: {}", report.sections_created);
    println!("  lines appended: {}", report.lines_appended);
    println!("  lines skipped: {}", report.lines_skipped);
    if !report.failures.is_empty() {
        println!("  failed buckets: {}", report.failures.len());
        for failure in &report.failures {
            println!("    {}: {}", failure.key, failure.error);
        }
    }
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_oldest_bound() {
        let now = Utc.with_ymd_and_hms(2025, 6, 4, 12, 0, 0).unwrap();
        let oldest = oldest_bound(now, 3);
        assert_eq!(
            oldest,
            MessageTs::from_datetime(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(oldest.micros, 0);
    }
}
