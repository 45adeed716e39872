//! Configuration loading.
//!
//! Settings come from two layers:
//!
//! 1. An optional TOML file (`--config`) for non-secret settings such as the
//!    lookback window, fiscal-year start, Notion property names, section
//!    labels, and author aliases.
//! 2. Environment variables (a `.env` file is honoured), which override the
//!    file. Credentials are only ever read from the environment.
//!
//! ```toml
//! [slack]
//! channel_id = "C0123456789"
//!
//! [notion]
//! database_id = "0123456789abcdef0123456789abcdef"
//! title_property = "Name"
//! fiscal_year_property = "Fiscal Year"
//!
//! [sync]
//! lookback_days = 3
//! fiscal_year_start_month = 4
//! fiscal_year_start_day = 1
//!
//! [aliases]
//! "hanako" = "山田 花子"
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Required | Default |
//! |----------|----------|---------|
//! | `SLACK_BOT_TOKEN` | yes | |
//! | `SLACK_CHANNEL_ID` | yes (or `slack.channel_id`) | |
//! | `NOTION_TOKEN` | yes | |
//! | `NOTION_DB_ID` | yes (or `notion.database_id`) | |
//! | `LOOKBACK_DAYS` | no | `3` |
//! | `FISCAL_YEAR_START_MONTH` | no | `4` |
//! | `FISCAL_YEAR_START_DAY` | no | `1` |
//! | `NAME_ALIAS_MAP` | no | JSON object, merged over `[aliases]` |

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use report_sync_core::extract::SectionLabels;
use report_sync_core::fiscal::FiscalYearStart;
use serde::Deserialize;

/// Raw contents of the TOML config file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub slack: SlackFileConfig,
    #[serde(default)]
    pub notion: NotionFileConfig,
    #[serde(default)]
    pub sync: SyncFileConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub extract: SectionLabels,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackFileConfig {
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,
}

impl Default for SlackFileConfig {
    fn default() -> Self {
        Self {
            channel_id: None,
            api_base: default_slack_api_base(),
            history_page_size: default_history_page_size(),
        }
    }
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}
fn default_history_page_size() -> u32 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotionFileConfig {
    #[serde(default)]
    pub database_id: Option<String>,
    #[serde(default = "default_title_property")]
    pub title_property: String,
    #[serde(default = "default_fiscal_year_property")]
    pub fiscal_year_property: String,
    #[serde(default = "default_notion_api_base")]
    pub api_base: String,
    #[serde(default = "default_notion_version")]
    pub api_version: String,
}

impl Default for NotionFileConfig {
    fn default() -> Self {
        Self {
            database_id: None,
            title_property: default_title_property(),
            fiscal_year_property: default_fiscal_year_property(),
            api_base: default_notion_api_base(),
            api_version: default_notion_version(),
        }
    }
}

fn default_title_property() -> String {
    "Name".to_string()
}
fn default_fiscal_year_property() -> String {
    "Fiscal Year".to_string()
}
fn default_notion_api_base() -> String {
    "https://api.notion.com/v1".to_string()
}
fn default_notion_version() -> String {
    "2022-06-28".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncFileConfig {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default = "default_fy_month")]
    pub fiscal_year_start_month: u32,
    #[serde(default = "default_fy_day")]
    pub fiscal_year_start_day: u32,
}

impl Default for SyncFileConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            fiscal_year_start_month: default_fy_month(),
            fiscal_year_start_day: default_fy_day(),
        }
    }
}

fn default_lookback_days() -> u32 {
    3
}
fn default_fy_month() -> u32 {
    4
}
fn default_fy_day() -> u32 {
    1
}

/// HTTP client behaviour shared by the Slack and Notion clients.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

/// Resolved Slack settings.
#[derive(Clone)]
pub struct SlackConfig {
    pub bot_token: String,
    pub channel_id: String,
    pub api_base: String,
    pub history_page_size: u32,
}

/// Resolved Notion settings.
#[derive(Clone)]
pub struct NotionConfig {
    pub token: String,
    pub database_id: String,
    pub title_property: String,
    pub fiscal_year_property: String,
    pub api_base: String,
    pub api_version: String,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub lookback_days: u32,
    pub fiscal_year_start: FiscalYearStart,
}

/// Fully resolved, validated configuration.
#[derive(Clone)]
pub struct Config {
    pub slack: SlackConfig,
    pub notion: NotionConfig,
    pub sync: SyncConfig,
    pub http: HttpConfig,
    pub labels: SectionLabels,
    pub aliases: HashMap<String, String>,
}

impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .field("api_base", &self.api_base)
            .field("history_page_size", &self.history_page_size)
            .finish()
    }
}

impl fmt::Debug for NotionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionConfig")
            .field("token", &"<redacted>")
            .field("database_id", &self.database_id)
            .field("title_property", &self.title_property)
            .field("fiscal_year_property", &self.fiscal_year_property)
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("slack", &self.slack)
            .field("notion", &self.notion)
            .field("sync", &self.sync)
            .field("http", &self.http)
            .field("labels", &self.labels)
            .field("aliases", &self.aliases.len())
            .finish()
    }
}

/// Load configuration from an optional TOML file and the process
/// environment.
///
/// # Errors
///
/// Fails before any network access if a required setting is missing, a
/// value does not parse, or the file cannot be read.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let file = match path {
        Some(p) => read_file_config(p)?,
        None => FileConfig::default(),
    };
    resolve(file, |name| std::env::var(name).ok())
}

/// Parse the TOML config file.
pub fn read_file_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| "Failed to parse config file")
}

fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T::Err: fmt::Display,
{
    match env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e)),
        None => Ok(None),
    }
}

/// Combine file settings with environment lookups and validate the result.
///
/// `env` is injected so callers (and tests) control where variables come
/// from.
pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let var = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let bot_token = var("SLACK_BOT_TOKEN");
    let channel_id = var("SLACK_CHANNEL_ID").or(file.slack.channel_id.clone());
    let notion_token = var("NOTION_TOKEN");
    let database_id = var("NOTION_DB_ID").or(file.notion.database_id.clone());

    let missing: Vec<&str> = [
        ("SLACK_BOT_TOKEN", bot_token.is_none()),
        ("SLACK_CHANNEL_ID", channel_id.is_none()),
        ("NOTION_TOKEN", notion_token.is_none()),
        ("NOTION_DB_ID", database_id.is_none()),
    ]
    .into_iter()
    .filter(|(_, absent)| *absent)
    .map(|(name, _)| name)
    .collect();
    if !missing.is_empty() {
        bail!(
            "Missing required configuration: {}. Set them in the environment or a .env file.",
            missing.join(", ")
        );
    }

    let lookback_days = parse_env(&env, "LOOKBACK_DAYS")?.unwrap_or(file.sync.lookback_days);
    if lookback_days == 0 {
        bail!("lookback_days must be >= 1");
    }

    let month = parse_env(&env, "FISCAL_YEAR_START_MONTH")?
        .unwrap_or(file.sync.fiscal_year_start_month);
    let day = parse_env(&env, "FISCAL_YEAR_START_DAY")?.unwrap_or(file.sync.fiscal_year_start_day);
    let fiscal_year_start = FiscalYearStart::new(month, day)?;

    let mut aliases = file.aliases;
    if let Some(raw) = var("NAME_ALIAS_MAP") {
        let extra: HashMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| "NAME_ALIAS_MAP must be a JSON object of name -> name")?;
        aliases.extend(extra);
    }

    if file.http.timeout_secs == 0 {
        bail!("http.timeout_secs must be > 0");
    }
    if !(1..=999).contains(&file.slack.history_page_size) {
        bail!("slack.history_page_size must be in [1, 999]");
    }
    if file.notion.title_property.trim().is_empty()
        || file.notion.fiscal_year_property.trim().is_empty()
    {
        bail!("notion.title_property and notion.fiscal_year_property must not be empty");
    }
    if file.extract.start_label.trim().is_empty() {
        bail!("extract.start_label must not be empty");
    }

    Ok(Config {
        slack: SlackConfig {
            bot_token: bot_token.unwrap_or_default(),
            channel_id: channel_id.unwrap_or_default(),
            api_base: file.slack.api_base.trim_end_matches('/').to_string(),
            history_page_size: file.slack.history_page_size,
        },
        notion: NotionConfig {
            token: notion_token.unwrap_or_default(),
            database_id: database_id.unwrap_or_default(),
            title_property: file.notion.title_property,
            fiscal_year_property: file.notion.fiscal_year_property,
            api_base: file.notion.api_base.trim_end_matches('/').to_string(),
            api_version: file.notion.api_version,
        },
        sync: SyncConfig {
            lookback_days,
            fiscal_year_start,
        },
        http: file.http,
        labels: file.extract,
        aliases,
    })
}
