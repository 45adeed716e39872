//! In-memory [`DocumentStore`] implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Listings are paged
//! with numeric string cursors so pagination paths get exercised. Block ids
//! are random UUIDs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use super::{Block, BlockKind, BlockSpec, DocumentStore, PageKey, PageRef};
use crate::paginate::Page;

struct StoredPage {
    id: String,
    database_id: String,
    key: PageKey,
}

/// Snapshot of one page and its date sections, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOutline {
    pub title: String,
    pub fiscal_year: i32,
    /// (section title, paragraph texts) in append order.
    pub sections: Vec<(String, Vec<String>)>,
}

/// In-memory store for tests.
pub struct InMemoryDocumentStore {
    pages: RwLock<Vec<StoredPage>>,
    children: RwLock<HashMap<String, Vec<Block>>>,
    failing_titles: RwLock<Vec<String>>,
    page_size: usize,
    writes: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            pages: RwLock::new(Vec::new()),
            children: RwLock::new(HashMap::new()),
            failing_titles: RwLock::new(Vec::new()),
            page_size: 100,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make every page query for `title` fail.
    pub fn fail_for_title(&self, title: &str) {
        self.failing_titles.write().unwrap().push(title.to_string());
    }

    /// Number of write calls (page creations plus appends).
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn page_count(&self) -> usize {
        self.pages.read().unwrap().len()
    }

    /// All pages with their toggles and paragraphs, in creation order.
    pub fn outline(&self) -> Vec<PageOutline> {
        let pages = self.pages.read().unwrap();
        let children = self.children.read().unwrap();
        pages
            .iter()
            .map(|page| {
                let sections = children
                    .get(&page.id)
                    .into_iter()
                    .flatten()
                    .filter_map(|block| {
                        let title = block.toggle_title()?.to_string();
                        let lines = children
                            .get(&block.id)
                            .into_iter()
                            .flatten()
                            .filter_map(|b| b.paragraph_text().map(str::to_string))
                            .collect();
                        Some((title, lines))
                    })
                    .collect();
                PageOutline {
                    title: page.key.title.clone(),
                    fiscal_year: page.key.fiscal_year,
                    sections,
                }
            })
            .collect()
    }

    /// Paragraphs under the date section `date_title` of the page `key`.
    pub fn section_lines(&self, key: &PageKey, date_title: &str) -> Option<Vec<String>> {
        self.outline()
            .into_iter()
            .find(|p| p.title == key.title && p.fiscal_year == key.fiscal_year)?
            .sections
            .into_iter()
            .find(|(title, _)| title == date_title)
            .map(|(_, lines)| lines)
    }

    /// Insert a block tree directly, bypassing write counting. Useful for
    /// seeding pre-existing content.
    pub fn seed_children(&self, parent_id: &str, specs: &[BlockSpec]) -> Result<Vec<Block>> {
        let mut children = self.children.write().unwrap();
        insert_blocks(&mut children, parent_id, specs)
    }

    fn page_of<T: Clone>(&self, items: &[T], cursor: Option<String>) -> Result<Page<T>> {
        let offset: usize = match cursor {
            Some(c) => c.parse().map_err(|_| anyhow!("invalid start_cursor '{}'", c))?,
            None => 0,
        };
        let end = (offset + self.page_size).min(items.len());
        let slice = items.get(offset..end).unwrap_or_default().to_vec();
        let next = (end < items.len()).then(|| end.to_string());
        Ok(Page::new(slice, next))
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn insert_blocks(
    children: &mut HashMap<String, Vec<Block>>,
    parent_id: &str,
    specs: &[BlockSpec],
) -> Result<Vec<Block>> {
    if !children.contains_key(parent_id) {
        bail!("block not found: {}", parent_id);
    }
    let mut created = Vec::with_capacity(specs.len());
    for spec in specs {
        let block = match spec {
            BlockSpec::Paragraph(text) => Block {
                id: new_id(),
                kind: BlockKind::Paragraph { text: text.clone() },
            },
            BlockSpec::Toggle { title, .. } => Block {
                id: new_id(),
                kind: BlockKind::Toggle {
                    title: title.clone(),
                },
            },
        };
        children.insert(block.id.clone(), Vec::new());
        if let Some(siblings) = children.get_mut(parent_id) {
            siblings.push(block.clone());
        }
        if let BlockSpec::Toggle {
            children: nested, ..
        } = spec
        {
            insert_blocks(children, &block.id, nested)?;
        }
        created.push(block);
    }
    Ok(created)
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn query_pages(
        &self,
        database_id: &str,
        filter: &PageKey,
        cursor: Option<String>,
    ) -> Result<Page<PageRef>> {
        if self
            .failing_titles
            .read()
            .unwrap()
            .iter()
            .any(|t| *t == filter.title)
        {
            bail!("query failed for '{}'", filter.title);
        }
        let matches: Vec<PageRef> = self
            .pages
            .read()
            .unwrap()
            .iter()
            .filter(|p| p.database_id == database_id && p.key == *filter)
            .map(|p| PageRef { id: p.id.clone() })
            .collect();
        self.page_of(&matches, cursor)
    }

    async fn create_page(&self, database_id: &str, properties: &PageKey) -> Result<PageRef> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let id = new_id();
        self.pages.write().unwrap().push(StoredPage {
            id: id.clone(),
            database_id: database_id.to_string(),
            key: properties.clone(),
        });
        self.children.write().unwrap().insert(id.clone(), Vec::new());
        Ok(PageRef { id })
    }

    async fn list_children(&self, block_id: &str, cursor: Option<String>) -> Result<Page<Block>> {
        let children = self.children.read().unwrap();
        let blocks = children
            .get(block_id)
            .ok_or_else(|| anyhow!("block not found: {}", block_id))?;
        self.page_of(blocks, cursor)
    }

    async fn append_children(&self, block_id: &str, children: &[BlockSpec]) -> Result<Vec<Block>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut tree = self.children.write().unwrap();
        insert_blocks(&mut tree, block_id, children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paginate::drain;

    #[tokio::test]
    async fn test_query_matches_title_and_year() {
        let store = InMemoryDocumentStore::new();
        let a = store.create_page("db", &PageKey::new("alice", 2024)).await.unwrap();
        store.create_page("db", &PageKey::new("alice", 2025)).await.unwrap();
        store.create_page("other", &PageKey::new("alice", 2024)).await.unwrap();

        let hits = store
            .query_pages("db", &PageKey::new("alice", 2024), None)
            .await
            .unwrap();
        assert_eq!(hits.items, vec![a]);
    }

    #[tokio::test]
    async fn test_append_nested_toggle_and_list_paged() {
        let store = InMemoryDocumentStore::new().with_page_size(2);
        let page = store.create_page("db", &PageKey::new("bob", 2025)).await.unwrap();
        let created = store
            .append_children(
                &page.id,
                &[BlockSpec::Toggle {
                    title: "2025-05-01".into(),
                    children: vec![
                        BlockSpec::paragraph("a"),
                        BlockSpec::paragraph("b"),
                        BlockSpec::paragraph("c"),
                    ],
                }],
            )
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].toggle_title(), Some("2025-05-01"));

        let lines = drain(|c| store.list_children(&created[0].id, c)).await.unwrap();
        let texts: Vec<&str> = lines.iter().filter_map(|b| b.paragraph_text()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(
            store.section_lines(&PageKey::new("bob", 2025), "2025-05-01"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[tokio::test]
    async fn test_unknown_parent_is_an_error() {
        let store = InMemoryDocumentStore::new();
        assert!(store
            .append_children("nope", &[BlockSpec::paragraph("x")])
            .await
            .is_err());
        assert!(store.list_children("nope", None).await.is_err());
    }

    #[tokio::test]
    async fn test_failing_title() {
        let store = InMemoryDocumentStore::new();
        store.fail_for_title("carol");
        assert!(store
            .query_pages("db", &PageKey::new("carol", 2025), None)
            .await
            .is_err());
        assert!(store
            .query_pages("db", &PageKey::new("dave", 2025), None)
            .await
            .is_ok());
    }
}
