//! Document store abstraction.
//!
//! The [`DocumentStore`] trait models the small slice of a hierarchical
//! page/block API the sync needs: a database of pages keyed by
//! (title, fiscal year), and blocks nested under pages.
//!
//! ```text
//! database
//! └── page  "Hanako Yamada" / FY 2025      (PersonYearPage)
//!     ├── toggle "2025-05-01"              (DateSection)
//!     │   ├── paragraph "Fixed bug X"      (ParagraphLine)
//!     │   └── paragraph "Wrote tests"
//!     └── toggle "2025-05-02"
//! ```
//!
//! The Notion implementation lives in the `daily-report-sync` crate;
//! [`memory::InMemoryDocumentStore`] backs tests.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::paginate::Page;

/// Identity of a person-year page: exact title plus fiscal-year category.
///
/// Used both as the query filter and as the properties of a created page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub title: String,
    pub fiscal_year: i32,
}

impl PageKey {
    pub fn new(title: impl Into<String>, fiscal_year: i32) -> Self {
        Self {
            title: title.into(),
            fiscal_year,
        }
    }

    /// Category value stored in the fiscal-year property.
    pub fn fiscal_year_label(&self) -> String {
        self.fiscal_year.to_string()
    }
}

/// A page returned by a query or creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef {
    pub id: String,
}

/// The parts of a block the merge cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Toggle { title: String },
    Paragraph { text: String },
    /// Any other block type, by type name.
    Other(String),
}

/// An existing block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: String,
    pub kind: BlockKind,
}

impl Block {
    /// Title of a toggle block, `None` for other kinds.
    pub fn toggle_title(&self) -> Option<&str> {
        match &self.kind {
            BlockKind::Toggle { title } => Some(title),
            _ => None,
        }
    }

    /// Plain text of a paragraph block, `None` for other kinds.
    pub fn paragraph_text(&self) -> Option<&str> {
        match &self.kind {
            BlockKind::Paragraph { text } => Some(text),
            _ => None,
        }
    }
}

/// A block to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSpec {
    /// A toggle created together with its children.
    Toggle {
        title: String,
        children: Vec<BlockSpec>,
    },
    Paragraph(String),
}

impl BlockSpec {
    pub fn paragraph(text: impl Into<String>) -> Self {
        BlockSpec::Paragraph(text.into())
    }
}

/// Hierarchical page/block storage.
///
/// None of the operations are transactional. Two callers racing on the same
/// key can both observe "not found" and both create.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Query pages in `database_id` whose title and fiscal year both match
    /// `filter` exactly.
    async fn query_pages(
        &self,
        database_id: &str,
        filter: &PageKey,
        cursor: Option<String>,
    ) -> Result<Page<PageRef>>;

    /// Create a page in `database_id` with the given title and fiscal year.
    async fn create_page(&self, database_id: &str, properties: &PageKey) -> Result<PageRef>;

    /// List the direct children of a page or block.
    async fn list_children(&self, block_id: &str, cursor: Option<String>) -> Result<Page<Block>>;

    /// Append blocks under a page or block, returning the created top-level
    /// blocks in order.
    async fn append_children(&self, block_id: &str, children: &[BlockSpec]) -> Result<Vec<Block>>;
}
