//! Wiki hierarchy nodes.
//!
//! Every shelf, book, chapter and page fetched from the API becomes a
//! [`Node`]. A node keeps the raw detail payload (used for metadata
//! sidecars), a handle to its parent, and a file path computed once at
//! construction from the parent chain.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// Display name BookStack gives to a page that was created but never saved
pub const EMPTY_PAGE_NAME: &str = "New Page";

/// Child descriptor fields, probed in order: shelf, book, chapter
const CHILD_KEYS: [&str; 3] = ["books", "contents", "pages"];

/// Nodes keyed by upstream id
pub type NodeMap = BTreeMap<u64, Arc<Node>>;

/// Errors raised while reading a resource payload
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("Resource payload is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Kind of wiki resource a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Shelf,
    Book,
    Chapter,
    Page,
}

/// A raw child entry from a detail payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    /// Upstream id of the child
    pub id: u64,

    /// Value of the `type` tag, present on book contents only
    pub kind: Option<String>,
}

/// One wiki resource and its place in the exported tree
#[derive(Debug, Clone)]
pub struct Node {
    /// Upstream id
    pub id: u64,

    /// URL-safe name, empty for untouched placeholder pages
    pub slug: String,

    /// Human title
    pub display_name: String,

    /// Resource kind
    pub kind: NodeKind,

    parent: Option<Arc<Node>>,
    path_prefix: String,
    file_path: String,
    children: Vec<ChildRef>,
    meta: Value,
}

impl Node {
    /// Build a node from a detail payload.
    ///
    /// `path_prefix` is used only for root nodes (no parent).
    pub fn from_meta(
        kind: NodeKind,
        meta: Value,
        parent: Option<Arc<Node>>,
        path_prefix: &str,
    ) -> Result<Self, NodeError> {
        let id = meta
            .get("id")
            .and_then(Value::as_u64)
            .ok_or(NodeError::MissingField("id"))?;
        let slug = meta
            .get("slug")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let display_name = meta
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let file_path = match &parent {
            Some(p) => format!("{}/{}", p.file_path, slug),
            None => format!("{}{}", path_prefix, slug),
        };

        let children = Self::read_children(&meta);

        Ok(Self {
            id,
            slug,
            display_name,
            kind,
            parent,
            path_prefix: path_prefix.to_string(),
            file_path,
            children,
            meta,
        })
    }

    fn read_children(meta: &Value) -> Vec<ChildRef> {
        let Some(entries) = CHILD_KEYS
            .iter()
            .find_map(|key| meta.get(*key).and_then(Value::as_array))
        else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| {
                let id = entry.get("id").and_then(Value::as_u64)?;
                let kind = entry
                    .get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Some(ChildRef { id, kind })
            })
            .collect()
    }

    /// Path of this node relative to the archive root (no extension)
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Directory the node's file lives in.
    ///
    /// The parent's path, or the root prefix without its trailing slash.
    pub fn dir_path(&self) -> &str {
        match &self.parent {
            Some(p) => p.file_path(),
            None => self.path_prefix.trim_end_matches('/'),
        }
    }

    pub fn parent(&self) -> Option<&Arc<Node>> {
        self.parent.as_ref()
    }

    /// Raw child descriptors in upstream order
    pub fn children(&self) -> &[ChildRef] {
        &self.children
    }

    /// Raw upstream detail payload
    pub fn meta(&self) -> &Value {
        &self.meta
    }

    /// True for placeholder pages that were never edited
    pub fn is_empty(&self) -> bool {
        self.kind == NodeKind::Page && self.slug.is_empty() && self.display_name == EMPTY_PAGE_NAME
    }
}
