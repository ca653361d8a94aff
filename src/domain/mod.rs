//! Domain types for the exporter.
//!
//! This module contains the core data structures:
//! - Node: One wiki resource (shelf, book, chapter, page) with its path
//! - AssetNode: An image or attachment owned by a page
//! - ExportFormat: The page formats the upstream export endpoint serves

pub mod asset;
pub mod format;
pub mod node;

// Re-export commonly used types
pub use asset::{extract_markdown_link, AssetKind, AssetMap, AssetNode};
pub use format::{ExportFormat, META_FILE_SUFFIX};
pub use node::{ChildRef, Node, NodeError, NodeKind, NodeMap, EMPTY_PAGE_NAME};
