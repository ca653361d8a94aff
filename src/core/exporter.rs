//! Wiki tree assembly.
//!
//! [`NodeExporter`] walks the flat REST API and rebuilds the
//! shelf → book → chapter → page hierarchy. Parents are always resolved
//! before their children so each node can compute its path at
//! construction.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::adapters::{ApiClient, HttpError};
use crate::config::ApiUrls;
use crate::domain::{Node, NodeError, NodeKind, NodeMap};

/// Errors that abort tree assembly
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Unexpected response from {url}: {source}")]
    Payload {
        url: String,
        #[source]
        source: NodeError,
    },

    #[error("Listing response from {url} has no 'data' array")]
    MissingData { url: String },

    #[error("Chapter {chapter_id} belongs to book {book_id}, which was not fetched")]
    OrphanChapter { chapter_id: u64, book_id: u64 },
}

/// Builds hierarchy nodes from the API
pub struct NodeExporter<'a> {
    client: &'a dyn ApiClient,
    urls: &'a ApiUrls,
}

impl<'a> NodeExporter<'a> {
    pub fn new(client: &'a dyn ApiClient, urls: &'a ApiUrls) -> Self {
        Self { client, urls }
    }

    /// All shelves as root nodes with an empty path prefix
    pub async fn get_all_shelves(&self) -> Result<NodeMap, ExportError> {
        let base_url = self.urls.for_node(NodeKind::Shelf);
        let shelf_ids = get_all_ids(self.client, base_url).await?;
        if shelf_ids.is_empty() {
            warn!("No shelves found in given Bookstack instance");
            return Ok(NodeMap::new());
        }
        self.get_parents(NodeKind::Shelf, &shelf_ids, "").await
    }

    async fn get_parents(
        &self,
        kind: NodeKind,
        ids: &[u64],
        path_prefix: &str,
    ) -> Result<NodeMap, ExportError> {
        let base_url = self.urls.for_node(kind);
        let mut nodes = NodeMap::new();
        for id in ids {
            let url = format!("{}/{}", base_url, id);
            let meta = self.client.get_json(&url).await?;
            let node = build_node(&url, kind, meta, None, path_prefix)?;
            nodes.insert(node.id, Arc::new(node));
        }
        Ok(nodes)
    }

    /// Shelved books followed by books on no shelf.
    ///
    /// Unassigned books become roots under `unassigned_dir`.
    pub async fn get_all_books(
        &self,
        shelf_nodes: &NodeMap,
        unassigned_dir: &str,
    ) -> Result<NodeMap, ExportError> {
        let mut book_nodes = if shelf_nodes.is_empty() {
            NodeMap::new()
        } else {
            self.get_child_nodes(NodeKind::Book, shelf_nodes, false, None)
                .await?
        };

        let unassigned = self
            .get_unassigned_books(&book_nodes, unassigned_dir)
            .await?;
        if !unassigned.is_empty() {
            debug!(count = unassigned.len(), "Books without a shelf");
        }
        // Book ids are global upstream, so nothing here is already present
        book_nodes.extend(unassigned);

        Ok(book_nodes)
    }

    async fn get_unassigned_books(
        &self,
        existing: &NodeMap,
        path_prefix: &str,
    ) -> Result<NodeMap, ExportError> {
        let base_url = self.urls.for_node(NodeKind::Book);
        let all_ids = get_all_ids(self.client, base_url).await?;
        let unassigned: Vec<u64> = all_ids
            .into_iter()
            .filter(|id| !existing.contains_key(id))
            .collect();
        if unassigned.is_empty() {
            return Ok(NodeMap::new());
        }
        self.get_parents(NodeKind::Book, &unassigned, path_prefix)
            .await
    }

    /// All chapters, each attached to its book via `book_id`
    pub async fn get_chapter_nodes(&self, book_nodes: &NodeMap) -> Result<NodeMap, ExportError> {
        let base_url = self.urls.for_node(NodeKind::Chapter);
        let chapter_ids = get_all_ids(self.client, base_url).await?;
        if chapter_ids.is_empty() {
            debug!("No chapters found in given Bookstack instance");
            return Ok(NodeMap::new());
        }

        let mut chapter_nodes = NodeMap::new();
        for chapter_id in chapter_ids {
            let url = format!("{}/{}", base_url, chapter_id);
            let meta = self.client.get_json(&url).await?;
            let book_id = meta
                .get("book_id")
                .and_then(Value::as_u64)
                .ok_or_else(|| ExportError::Payload {
                    url: url.clone(),
                    source: NodeError::MissingField("book_id"),
                })?;
            let book = book_nodes
                .get(&book_id)
                .ok_or(ExportError::OrphanChapter {
                    chapter_id,
                    book_id,
                })?;
            let node = build_node(&url, NodeKind::Chapter, meta, Some(book.clone()), "")?;
            chapter_nodes.insert(chapter_id, Arc::new(node));
        }
        Ok(chapter_nodes)
    }

    /// Expand the raw child descriptors of every parent.
    ///
    /// `child_type` keeps only descriptors whose `type` tag matches;
    /// untagged descriptors always pass.
    pub async fn get_child_nodes(
        &self,
        child_kind: NodeKind,
        parent_nodes: &NodeMap,
        filter_empty: bool,
        child_type: Option<&str>,
    ) -> Result<NodeMap, ExportError> {
        let base_url = self.urls.for_node(child_kind);
        let mut child_nodes = NodeMap::new();

        for parent in parent_nodes.values() {
            for child in parent.children() {
                if let (Some(wanted), Some(kind)) = (child_type, child.kind.as_deref()) {
                    if wanted != kind {
                        continue;
                    }
                }
                let url = format!("{}/{}", base_url, child.id);
                let meta = self.client.get_json(&url).await?;
                let node = build_node(&url, child_kind, meta, Some(parent.clone()), "")?;
                if filter_empty && node.is_empty() {
                    debug!(page_id = node.id, "Skipping empty placeholder page");
                    continue;
                }
                child_nodes.insert(child.id, Arc::new(node));
            }
        }
        Ok(child_nodes)
    }

    /// Every non-empty page, whether it hangs off a book or a chapter
    pub async fn get_all_pages(&self, book_nodes: &NodeMap) -> Result<NodeMap, ExportError> {
        let mut page_nodes = if book_nodes.is_empty() {
            NodeMap::new()
        } else {
            self.get_child_nodes(NodeKind::Page, book_nodes, true, Some("page"))
                .await?
        };

        let chapter_nodes = self.get_chapter_nodes(book_nodes).await?;
        if !chapter_nodes.is_empty() {
            let chapter_pages = self
                .get_child_nodes(NodeKind::Page, &chapter_nodes, true, None)
                .await?;
            // A page has exactly one parent upstream
            page_nodes.extend(chapter_pages);
        }

        info!(
            books = book_nodes.len(),
            chapters = chapter_nodes.len(),
            pages = page_nodes.len(),
            "Wiki tree assembled"
        );
        Ok(page_nodes)
    }
}

fn build_node(
    url: &str,
    kind: NodeKind,
    meta: Value,
    parent: Option<Arc<Node>>,
    path_prefix: &str,
) -> Result<Node, ExportError> {
    Node::from_meta(kind, meta, parent, path_prefix).map_err(|source| ExportError::Payload {
        url: url.to_string(),
        source,
    })
}

/// Ids from a listing response (`data[].id`)
pub async fn get_all_ids(client: &dyn ApiClient, url: &str) -> Result<Vec<u64>, ExportError> {
    let listing = client.get_json(url).await?;
    let data = listing
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ExportError::MissingData {
            url: url.to_string(),
        })?;

    // Listings are not expected to repeat ids; keep first-seen order regardless
    let mut seen = BTreeSet::new();
    Ok(data
        .iter()
        .filter_map(|item| item.get("id").and_then(Value::as_u64))
        .filter(|id| seen.insert(*id))
        .collect())
}
