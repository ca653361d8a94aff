//! Images and attachments owned by pages.
//!
//! Both variants share one struct; they differ only in how the download
//! URL is built and where the detail payload keeps its markdown snippet.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use super::node::NodeError;

/// Assets grouped by the id of the page they were uploaded to
pub type AssetMap = BTreeMap<u64, Vec<AssetNode>>;

/// Asset variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Image,
    Attachment,
}

impl AssetKind {
    /// Directory name used inside the archive and in rewritten links
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Attachment => "attachments",
        }
    }

    /// Object and field holding the rendered markdown in a detail payload
    fn markdown_field(self) -> (&'static str, &'static str) {
        match self {
            Self::Image => ("content", "markdown"),
            Self::Attachment => ("links", "markdown"),
        }
    }
}

/// An image or uploaded attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetNode {
    pub id: u64,

    /// Page the asset was uploaded to
    pub page_id: u64,

    /// Download URL (direct for images, detail endpoint for attachments)
    pub url: String,

    /// File name inside the archive
    pub name: String,

    pub kind: AssetKind,

    markdown_str: String,
}

impl AssetNode {
    /// Build an image node from a gallery listing entry
    pub fn image(meta: &Value) -> Result<Self, NodeError> {
        let id = required_u64(meta, "id")?;
        let page_id = required_u64(meta, "uploaded_to")?;
        let url = meta
            .get("url")
            .and_then(Value::as_str)
            .ok_or(NodeError::MissingField("url"))?
            .to_string();
        let name = url.rsplit('/').next().unwrap_or_default().to_string();

        Ok(Self {
            id,
            page_id,
            url,
            name,
            kind: AssetKind::Image,
            markdown_str: String::new(),
        })
    }

    /// Build an attachment node from a listing entry.
    ///
    /// Attachments have no binary endpoint; `base_url/{id}` returns the
    /// file content base64 encoded.
    pub fn attachment(meta: &Value, base_url: &str) -> Result<Self, NodeError> {
        let id = required_u64(meta, "id")?;
        let page_id = required_u64(meta, "uploaded_to")?;
        let name = meta
            .get("name")
            .and_then(Value::as_str)
            .ok_or(NodeError::MissingField("name"))?
            .to_string();

        Ok(Self {
            id,
            page_id,
            url: format!("{}/{}", base_url, id),
            name,
            kind: AssetKind::Attachment,
            markdown_str: String::new(),
        })
    }

    /// Path of the asset relative to the page's directory
    pub fn relative_path(&self, page_name: &str) -> String {
        format!("{}/{}/{}", self.kind.dir_name(), page_name, self.name)
    }

    /// Take a file name not yet in `taken`, prefixing the id on a clash
    pub fn claim_unique_name(&mut self, taken: &mut HashSet<String>) {
        while !taken.insert(self.name.clone()) {
            self.name = format!("{}_{}", self.id, self.name);
        }
    }

    /// Literal link target to replace in the page markdown (empty if unknown)
    pub fn markdown_str(&self) -> &str {
        &self.markdown_str
    }

    /// Record the link target found in an asset detail payload
    pub fn set_markdown_content(&mut self, detail: &Value) {
        let (object, field) = self.kind.markdown_field();
        let snippet = detail
            .get(object)
            .and_then(|o| o.get(field))
            .and_then(Value::as_str)
            .unwrap_or_default();
        self.markdown_str = extract_markdown_link(snippet).to_string();
    }
}

fn required_u64(meta: &Value, field: &'static str) -> Result<u64, NodeError> {
    meta.get(field)
        .and_then(Value::as_u64)
        .ok_or(NodeError::MissingField(field))
}

/// Text between the first `(` and the first `)` of a markdown snippet.
///
/// Returns an empty string when either is missing or the `)` comes first.
pub fn extract_markdown_link(snippet: &str) -> &str {
    match (snippet.find('('), snippet.find(')')) {
        (Some(open), Some(close)) if close > open => &snippet[open + 1..close],
        _ => "",
    }
}
