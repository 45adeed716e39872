//! Cursor-based pagination helpers.
//!
//! Both remote APIs page their results with an opaque continuation cursor.
//! [`drain`] follows the cursor until it runs out; [`find_map`] stops at the
//! first item a predicate accepts, so a hit on the first page costs one call.

use std::future::Future;

use anyhow::{bail, Result};

/// One page of results plus the cursor for the next page, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    /// A page with no continuation.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }
}

/// Walk pages until `visit` returns `Some`, or the cursor runs out.
///
/// An empty cursor string counts as "no more pages". A cursor that repeats
/// the one just requested is treated as an error rather than looping.
pub async fn find_map<T, U, F, Fut, V>(mut fetch: F, mut visit: V) -> Result<Option<U>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
    V: FnMut(T) -> Option<U>,
{
    let mut cursor: Option<String> = None;
    loop {
        let page = fetch(cursor.clone()).await?;
        for item in page.items {
            if let Some(found) = visit(item) {
                return Ok(Some(found));
            }
        }
        match page.next_cursor.filter(|c| !c.is_empty()) {
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                bail!("pagination cursor did not advance: '{}'", next);
            }
            Some(next) => cursor = Some(next),
            None => return Ok(None),
        }
    }
}

/// Fetch every page and concatenate the items in page order.
pub async fn drain<T, F, Fut>(fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut all = Vec::new();
    find_map(fetch, |item| {
        all.push(item);
        None::<()>
    })
    .await?;
    Ok(all)
}
