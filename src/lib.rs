//! # Daily Report Sync
//!
//! Copies the "accomplishments" section of daily report messages posted in a
//! Slack channel into a Notion database, organised as one page per person
//! per fiscal year and one toggle per calendar date.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌───────────────┐
//! │    Slack    │──▶│ Extract + Bucket │──▶│ Notion merge  │
//! │  (history)  │   │ author/FY/date   │   │ find-or-create│
//! └─────────────┘   └──────────────────┘   └───────────────┘
//! ```
//!
//! Re-running over the same window writes nothing new: pages and date
//! sections are found before they are created, and lines already present
//! in a section are skipped.
//!
//! ## Quick Start
//!
//! ```bash
//! export SLACK_BOT_TOKEN=xoxb-... SLACK_CHANNEL_ID=C0123456789
//! export NOTION_TOKEN=secret_... NOTION_DB_ID=0123456789abcdef
//! drs sync --dry-run            # show what would be written
//! drs sync                      # write to Notion
//! drs extract report.txt        # preview extraction for one report
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Environment + TOML configuration |
//! | [`http`] | Shared HTTP client and retry policy |
//! | [`slack`] | Slack `MessageSource` |
//! | [`notion`] | Notion `DocumentStore` |
//! | [`sync`] | Run orchestration and reporting |
//!
//! Extraction, fiscal-year rules, bucketing, and the merge itself live in
//! the `report-sync-core` crate.

pub mod config;
pub mod http;
pub mod notion;
pub mod slack;
pub mod sync;
