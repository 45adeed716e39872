//! Notion API client.
//!
//! Implements [`DocumentStore`] against a Notion database whose pages carry
//! a title property (the author) and a select property (the fiscal year).
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | `query_pages` | `POST /databases/{id}/query` |
//! | `create_page` | `POST /pages` |
//! | `list_children` | `GET /blocks/{id}/children` |
//! | `append_children` | `PATCH /blocks/{id}/children` |
//!
//! Every request carries the bearer token and the `Notion-Version` header.
//! Listings are paged 100 at a time; `next_cursor` is only followed while
//! `has_more` is set.
//!
//! Page creation and block appends are not idempotent, so they are only
//! re-sent after a 429 (see [`RetryPolicy::RateLimitOnly`]).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use report_sync_core::paginate::Page;
use report_sync_core::store::{Block, BlockKind, BlockSpec, DocumentStore, PageKey, PageRef};

use crate::config::{HttpConfig, NotionConfig};
use crate::http::{build_client, send_with_retry, RetryPolicy};

/// Largest page size Notion accepts for queries and block listings.
const PAGE_SIZE: u32 = 100;

/// Longest `text.content` Notion accepts in one rich text object.
const MAX_TEXT_CONTENT: usize = 2000;

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

impl ListResponse {
    fn into_page<T>(self, mut map: impl FnMut(&Value) -> Option<T>) -> Page<T> {
        let items = self.results.iter().filter_map(&mut map).collect();
        let next = if self.has_more { self.next_cursor } else { None };
        Page::new(items, next)
    }
}

/// [`DocumentStore`] backed by the Notion API.
#[derive(Clone)]
pub struct NotionStore {
    client: Client,
    token: String,
    api_base: String,
    api_version: String,
    title_property: String,
    fiscal_year_property: String,
    max_retries: u32,
}

impl NotionStore {
    pub fn new(config: &NotionConfig, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(http)?,
            token: config.token.clone(),
            api_base: config.api_base.clone(),
            api_version: config.api_version.clone(),
            title_property: config.title_property.clone(),
            fiscal_year_property: config.fiscal_year_property.clone(),
            max_retries: http.max_retries,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.api_base, path))
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.api_version)
    }

    /// Query filter matching `key` by exact title and fiscal-year select.
    pub fn page_filter(&self, key: &PageKey) -> Value {
        json!({
            "and": [
                { "property": self.title_property, "title": { "equals": key.title } },
                {
                    "property": self.fiscal_year_property,
                    "select": { "equals": key.fiscal_year_label() }
                }
            ]
        })
    }

    /// Property values for a new page representing `key`.
    pub fn page_properties(&self, key: &PageKey) -> Value {
        let mut props = serde_json::Map::new();
        props.insert(
            self.title_property.clone(),
            json!({ "title": rich_text(&key.title) }),
        );
        props.insert(
            self.fiscal_year_property.clone(),
            json!({ "select": { "name": key.fiscal_year_label() } }),
        );
        Value::Object(props)
    }

    async fn send_json(
        &self,
        what: &str,
        policy: RetryPolicy,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let response = send_with_retry(what, policy, self.max_retries, || {
            let req = self.request(method.clone(), path);
            match body {
                Some(b) => req.json(b),
                None => req,
            }
        })
        .await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to decode {} response", what))
    }
}

/// Rich text array for `text`, split into objects Notion will accept.
pub fn rich_text(text: &str) -> Value {
    let chars: Vec<char> = text.chars().collect();
    let parts: Vec<Value> = chars
        .chunks(MAX_TEXT_CONTENT)
        .map(|chunk| {
            let content: String = chunk.iter().collect();
            json!({ "type": "text", "text": { "content": content } })
        })
        .collect();
    Value::Array(parts)
}

/// Concatenated `plain_text` of a rich text array.
fn plain_text(rich: Option<&Value>) -> String {
    rich.and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("plain_text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Request JSON for a block to create.
pub fn block_to_json(spec: &BlockSpec) -> Value {
    match spec {
        BlockSpec::Paragraph(text) => json!({
            "object": "block",
            "type": "paragraph",
            "paragraph": { "rich_text": rich_text(text) }
        }),
        BlockSpec::Toggle { title, children } => {
            let mut toggle = json!({ "rich_text": rich_text(title) });
            if !children.is_empty() {
                toggle["children"] = Value::Array(children.iter().map(block_to_json).collect());
            }
            json!({ "object": "block", "type": "toggle", "toggle": toggle })
        }
    }
}

/// Parse a block object from a listing or append response.
pub fn block_from_json(value: &Value) -> Option<Block> {
    let id = value.get("id")?.as_str()?.to_string();
    let kind = value.get("type")?.as_str()?;
    let rich = |field: &str| plain_text(value.get(field).and_then(|b| b.get("rich_text")));
    let kind = match kind {
        "toggle" => BlockKind::Toggle {
            title: rich("toggle"),
        },
        "paragraph" => BlockKind::Paragraph {
            text: rich("paragraph"),
        },
        other => BlockKind::Other(other.to_string()),
    };
    Some(Block { id, kind })
}

fn page_ref(value: &Value) -> Option<PageRef> {
    let id = value.get("id")?.as_str()?;
    Some(PageRef { id: id.to_string() })
}

#[async_trait]
impl DocumentStore for NotionStore {
    async fn query_pages(
        &self,
        database_id: &str,
        filter: &PageKey,
        cursor: Option<String>,
    ) -> Result<Page<PageRef>> {
        let mut body = json!({ "filter": self.page_filter(filter), "page_size": PAGE_SIZE });
        if let Some(c) = cursor {
            body["start_cursor"] = Value::String(c);
        }
        let path = format!("databases/{}/query", database_id);
        let value = self
            .send_json(
                "notion database query",
                RetryPolicy::Idempotent,
                Method::POST,
                &path,
                Some(&body),
            )
            .await?;
        let list: ListResponse =
            serde_json::from_value(value).with_context(|| "Unexpected database query response")?;
        Ok(list.into_page(page_ref))
    }

    async fn create_page(&self, database_id: &str, properties: &PageKey) -> Result<PageRef> {
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": self.page_properties(properties),
        });
        let value = self
            .send_json(
                "notion create page",
                RetryPolicy::RateLimitOnly,
                Method::POST,
                "pages",
                Some(&body),
            )
            .await?;
        page_ref(&value).ok_or_else(|| anyhow!("Notion create page response has no id"))
    }

    async fn list_children(&self, block_id: &str, cursor: Option<String>) -> Result<Page<Block>> {
        let mut path = format!("blocks/{}/children?page_size={}", block_id, PAGE_SIZE);
        if let Some(c) = cursor {
            path.push_str("&start_cursor=");
            path.push_str(&c);
        }
        let value = self
            .send_json(
                "notion list children",
                RetryPolicy::Idempotent,
                Method::GET,
                &path,
                None,
            )
            .await?;
        let list: ListResponse =
            serde_json::from_value(value).with_context(|| "Unexpected block children response")?;
        Ok(list.into_page(block_from_json))
    }

    async fn append_children(&self, block_id: &str, children: &[BlockSpec]) -> Result<Vec<Block>> {
        let body = json!({ "children": children.iter().map(block_to_json).collect::<Vec<_>>() });
        let path = format!("blocks/{}/children", block_id);
        let value = self
            .send_json(
                "notion append children",
                RetryPolicy::RateLimitOnly,
                Method::PATCH,
                &path,
                Some(&body),
            )
            .await?;
        let list: ListResponse =
            serde_json::from_value(value).with_context(|| "Unexpected append response")?;
        debug!(block_id, appended = list.results.len(), "appended blocks");
        Ok(list.results.iter().filter_map(block_from_json).collect())
    }
}
