//! In-memory [`MessageSource`] for tests.
//!
//! Serves messages newest-first in fixed-size pages, the way Slack's
//! `conversations.history` does, with numeric string cursors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{HistoryPage, MessageSource};
use crate::models::{MessageTs, RawMessage, UserProfile};

/// In-memory message source.
pub struct InMemoryMessageSource {
    messages: Vec<RawMessage>,
    users: HashMap<String, UserProfile>,
    page_size: usize,
    fail_history: AtomicBool,
    history_calls: AtomicUsize,
    user_lookups: AtomicUsize,
}

impl InMemoryMessageSource {
    pub fn new(messages: Vec<RawMessage>) -> Self {
        Self {
            messages,
            users: HashMap::new(),
            page_size: 200,
            fail_history: AtomicBool::new(false),
            history_calls: AtomicUsize::new(0),
            user_lookups: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_user(mut self, user_id: &str, profile: UserProfile) -> Self {
        self.users.insert(user_id.to_string(), profile);
        self
    }

    /// Make every subsequent history call fail.
    pub fn fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn user_lookups(&self) -> usize {
        self.user_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSource for InMemoryMessageSource {
    async fn fetch_history(
        &self,
        _channel: &str,
        oldest: MessageTs,
        cursor: Option<String>,
    ) -> Result<HistoryPage> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_history.load(Ordering::SeqCst) {
            bail!("history unavailable");
        }

        // Unparsable timestamps are passed through; filtering them is the
        // caller's job.
        let mut window: Vec<&RawMessage> = self
            .messages
            .iter()
            .filter(|m| MessageTs::parse(&m.ts).map_or(true, |ts| ts > oldest))
            .collect();
        window.sort_by(|a, b| {
            let a = MessageTs::parse(&a.ts).ok();
            let b = MessageTs::parse(&b.ts).ok();
            b.cmp(&a)
        });

        let offset: usize = match cursor {
            Some(c) => c.parse().map_err(|_| anyhow!("invalid cursor '{}'", c))?,
            None => 0,
        };
        let end = (offset + self.page_size).min(window.len());
        let items = window
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .copied()
            .cloned()
            .collect();
        let next_cursor = (end < window.len()).then(|| end.to_string());
        Ok(HistoryPage::new(items, next_cursor))
    }

    async fn resolve_user(&self, user_id: &str) -> Result<UserProfile> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| anyhow!("user_not_found: {}", user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paginate::drain;

    fn msg(ts: &str) -> RawMessage {
        RawMessage::new(ts, Some("U1"), "hi")
    }

    #[tokio::test]
    async fn test_pages_newest_first_and_filters_oldest() {
        let source = InMemoryMessageSource::new(vec![
            msg("100.000001"),
            msg("300.000000"),
            msg("200.000000"),
            msg("50.000000"),
        ])
        .with_page_size(2);

        let first = source
            .fetch_history("C1", MessageTs::new(60, 0), None)
            .await
            .unwrap();
        let ts: Vec<&str> = first.items.iter().map(|m| m.ts.as_str()).collect();
        assert_eq!(ts, vec!["300.000000", "200.000000"]);
        assert_eq!(first.next_cursor.as_deref(), Some("2"));

        let all = drain(|c| source.fetch_history("C1", MessageTs::new(60, 0), c))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(source.history_calls(), 3);
    }

    #[tokio::test]
    async fn test_failing_history() {
        let source = InMemoryMessageSource::new(vec![msg("1.0")]);
        source.fail_history(true);
        assert!(source
            .fetch_history("C1", MessageTs::new(0, 0), None)
            .await
            .is_err());
    }
}
