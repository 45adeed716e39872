//! Slack Web API client.
//!
//! Implements [`MessageSource`] over two endpoints:
//!
//! - `conversations.history`: channel messages newer than `oldest`, paged with
//!   `response_metadata.next_cursor` while `has_more` is set.
//! - `users.info`: profile lookup for author names.
//!
//! Slack reports most failures as HTTP 200 with `"ok": false`; those become
//! errors carrying Slack's error code. Rate limits (HTTP 429) are retried by
//! [`crate::http::send_with_retry`].
//!
//! Required bot scopes: `channels:history` (or `groups:history` for private
//! channels) and `users:read`.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use report_sync_core::models::{MessageTs, RawMessage, UserProfile};
use report_sync_core::paginate::Page;
use report_sync_core::source::{HistoryPage, MessageSource};

use crate::config::{HttpConfig, SlackConfig};
use crate::http::{build_client, send_with_retry, RetryPolicy};

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    ok: bool,
    #[serde(default)]
    messages: Vec<SlackMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackMessage {
    #[serde(default)]
    ts: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    ok: bool,
    #[serde(default)]
    user: Option<SlackUser>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: Option<SlackProfile>,
}

#[derive(Debug, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    display_name_normalized: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

/// [`MessageSource`] backed by the Slack Web API.
#[derive(Clone)]
pub struct SlackSource {
    client: Client,
    token: String,
    api_base: String,
    page_size: u32,
    max_retries: u32,
}

impl SlackSource {
    pub fn new(config: &SlackConfig, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(http)?,
            token: config.bot_token.clone(),
            api_base: config.api_base.clone(),
            page_size: config.history_page_size,
            max_retries: http.max_retries,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }
}

fn slack_error(method: &str, error: Option<String>) -> anyhow::Error {
    anyhow!(
        "slack {} failed: {}",
        method,
        error.unwrap_or_else(|| "unknown_error".to_string())
    )
}

fn parse_history(body: HistoryResponse) -> Result<HistoryPage> {
    if !body.ok {
        return Err(slack_error("conversations.history", body.error));
    }
    let next_cursor = if body.has_more {
        body.response_metadata
            .and_then(|m| m.next_cursor)
            .filter(|c| !c.is_empty())
    } else {
        None
    };
    let messages = body
        .messages
        .into_iter()
        .map(|m| RawMessage {
            ts: m.ts,
            // Bot posts carry a bot_id and usually no user.
            author_id: m.user.or(m.bot_id),
            text: m.text.unwrap_or_default(),
        })
        .collect();
    Ok(Page::new(messages, next_cursor))
}

fn parse_user(user_id: &str, body: UserInfoResponse) -> Result<UserProfile> {
    if !body.ok {
        return Err(slack_error("users.info", body.error));
    }
    let Some(user) = body.user else {
        bail!("slack users.info returned no user for {}", user_id);
    };
    let profile = user.profile;
    let display_name = profile.as_ref().and_then(|p| {
        p.display_name_normalized
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| p.display_name.clone())
    });
    let real_name = user
        .real_name
        .filter(|s| !s.trim().is_empty())
        .or_else(|| profile.and_then(|p| p.real_name));
    Ok(UserProfile {
        display_name,
        real_name,
    })
}

#[async_trait]
impl MessageSource for SlackSource {
    async fn fetch_history(
        &self,
        channel: &str,
        oldest: MessageTs,
        cursor: Option<String>,
    ) -> Result<HistoryPage> {
        let oldest = oldest.to_string();
        let limit = self.page_size.to_string();
        let url = self.url("conversations.history");

        let what = "slack conversations.history";
        let response = send_with_retry(what, RetryPolicy::Idempotent, self.max_retries, || {
            let mut req = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[
                    ("channel", channel),
                    ("oldest", oldest.as_str()),
                    ("limit", limit.as_str()),
                ]);
            if let Some(c) = &cursor {
                req = req.query(&[("cursor", c.as_str())]);
            }
            req
        })
        .await?;

        let body: HistoryResponse = response
            .json()
            .await
            .with_context(|| "Failed to decode conversations.history response")?;
        let page = parse_history(body)?;
        debug!(
            channel,
            messages = page.items.len(),
            has_more = page.next_cursor.is_some(),
            "fetched history page"
        );
        Ok(page)
    }

    async fn resolve_user(&self, user_id: &str) -> Result<UserProfile> {
        let url = self.url("users.info");
        let what = "slack users.info";
        let response = send_with_retry(what, RetryPolicy::Idempotent, self.max_retries, || {
            self.client
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[("user", user_id)])
        })
        .await?;
        let body: UserInfoResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to decode users.info response for {}", user_id))?;
        parse_user(user_id, body)
    }
}
