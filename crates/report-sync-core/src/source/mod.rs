//! Message source abstraction.
//!
//! A [`MessageSource`] gives paginated read access to a channel's history and
//! resolves user ids to profiles. The Slack implementation lives in the
//! `daily-report-sync` crate; [`memory::InMemoryMessageSource`] backs tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{MessageTs, RawMessage, UserProfile};
use crate::paginate::Page;

/// One page of channel history.
pub type HistoryPage = Page<RawMessage>;

/// Read access to chat history and user profiles.
///
/// Implementations must be `Send + Sync` so clients can be shared behind an
/// `Arc` by the sync engine.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch one page of messages posted in `channel` after `oldest`.
    ///
    /// Pages may arrive newest-first; callers must follow `next_cursor`
    /// until it is `None` and sort the result themselves.
    async fn fetch_history(
        &self,
        channel: &str,
        oldest: MessageTs,
        cursor: Option<String>,
    ) -> Result<HistoryPage>;

    /// Look up a user's profile. Errors are expected to be handled by the
    /// caller by falling back to the raw id.
    async fn resolve_user(&self, user_id: &str) -> Result<UserProfile>;
}
