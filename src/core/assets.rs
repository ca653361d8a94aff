//! Image and attachment resolution.
//!
//! Listings are fetched once per run and bucketed by page. Markdown
//! snippets come from each asset's detail endpoint, which is also where
//! attachment bytes live (base64 in the `content` field).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use memchr::memmem;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::adapters::{ApiClient, HttpError};
use crate::config::ApiUrls;
use crate::domain::{AssetKind, AssetMap, AssetNode, NodeError};

/// Errors fetching asset metadata or content
#[derive(Debug, Error)]
pub enum AssetError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Unexpected asset entry from {url}: {source}")]
    Payload {
        url: String,
        #[source]
        source: NodeError,
    },

    #[error("Listing response from {url} has no 'data' array")]
    MissingData { url: String },

    #[error("Attachment at {url} has no inline content")]
    MissingContent { url: String },

    #[error("Attachment at {url} is not valid base64: {source}")]
    Decode {
        url: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Fetches asset listings, bytes and markdown references
pub struct AssetResolver<'a> {
    client: &'a dyn ApiClient,
    urls: &'a ApiUrls,
}

impl<'a> AssetResolver<'a> {
    pub fn new(client: &'a dyn ApiClient, urls: &'a ApiUrls) -> Self {
        Self { client, urls }
    }

    /// All assets of one kind, grouped by `uploaded_to`.
    ///
    /// External attachments (links rather than uploads) are skipped.
    pub async fn get_asset_nodes(&self, kind: AssetKind) -> Result<AssetMap, AssetError> {
        let base_url = self.urls.for_asset(kind);
        let listing = self.client.get_json(base_url).await?;
        let entries = listing
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| AssetError::MissingData {
                url: base_url.to_string(),
            })?;

        let mut map = AssetMap::new();
        for entry in entries {
            let node = match kind {
                AssetKind::Image => AssetNode::image(entry),
                AssetKind::Attachment => {
                    if entry.get("external").and_then(Value::as_bool).unwrap_or(false) {
                        continue;
                    }
                    AssetNode::attachment(entry, base_url)
                }
            }
            .map_err(|source| AssetError::Payload {
                url: base_url.to_string(),
                source,
            })?;
            map.entry(node.page_id).or_default().push(node);
        }

        debug!(kind = kind.dir_name(), pages = map.len(), "Asset map built");
        Ok(map)
    }

    /// Detail payload for one asset
    pub async fn get_asset_data(&self, kind: AssetKind, node: &AssetNode) -> Result<Value, AssetError> {
        let url = format!("{}/{}", self.urls.for_asset(kind), node.id);
        Ok(self.client.get_json(&url).await?)
    }

    /// Raw file content for an asset URL
    pub async fn get_asset_bytes(&self, kind: AssetKind, url: &str) -> Result<Vec<u8>, AssetError> {
        match kind {
            AssetKind::Image => Ok(self.client.get_bytes(url).await?),
            AssetKind::Attachment => {
                let detail = self.client.get_json(url).await?;
                let encoded = detail
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| AssetError::MissingContent {
                        url: url.to_string(),
                    })?;
                decode_attachment_data(encoded).map_err(|source| AssetError::Decode {
                    url: url.to_string(),
                    source,
                })
            }
        }
    }

    /// Point each asset's markdown reference at its archive-relative path.
    ///
    /// Assets whose detail cannot be fetched, or whose snippet has no link,
    /// leave the page untouched.
    pub async fn update_asset_links(
        &self,
        kind: AssetKind,
        page_name: &str,
        mut page_data: Vec<u8>,
        asset_nodes: &mut [AssetNode],
    ) -> Vec<u8> {
        for node in asset_nodes.iter_mut() {
            match self.get_asset_data(kind, node).await {
                Ok(detail) => node.set_markdown_content(&detail),
                Err(e) => {
                    warn!(asset_id = node.id, error = %e, "Could not fetch asset detail, link left as is");
                    continue;
                }
            }
            if node.markdown_str().is_empty() {
                continue;
            }
            let replacement = node.relative_path(page_name);
            page_data = replace_all(&page_data, node.markdown_str().as_bytes(), replacement.as_bytes());
        }
        page_data
    }
}

/// Decode an attachment's inline payload
pub fn decode_attachment_data(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded.trim())
}

/// Literal, non-overlapping replacement of every `needle` in `haystack`
pub fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    if needle.is_empty() {
        return haystack.to_vec();
    }

    let mut out = Vec::with_capacity(haystack.len());
    let mut last = 0;
    for pos in memmem::find_iter(haystack, needle) {
        out.extend_from_slice(&haystack[last..pos]);
        out.extend_from_slice(replacement);
        last = pos + needle.len();
    }
    out.extend_from_slice(&haystack[last..]);
    out
}
