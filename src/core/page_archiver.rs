//! Per-page export sequence.
//!
//! For each page: assets first (images, then attachments), then one entry
//! per export format, then the metadata sidecar. Assets that fail to
//! download are dropped before link rewriting so no page points at a file
//! missing from the archive.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::adapters::{ApiClient, HttpError};
use crate::config::{ApiUrls, ExportOptions};
use crate::core::archive::{ArchiveError, ArchiveSummary, ArchiveWriter};
use crate::core::assets::{AssetError, AssetResolver};
use crate::domain::{AssetKind, AssetMap, AssetNode, ExportFormat, Node, NodeMap, META_FILE_SUFFIX};

const EXPORT_API_PATH: &str = "export";

/// Errors that abort archiving
#[derive(Debug, thiserror::Error)]
pub enum ArchiveRunError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Failed to serialise metadata for page {page_id}: {source}")]
    Meta {
        page_id: u64,
        #[source]
        source: serde_json::Error,
    },
}

/// Streams pages and their assets into one archive
pub struct PageArchiver<'a> {
    client: &'a dyn ApiClient,
    urls: &'a ApiUrls,
    options: &'a ExportOptions,
    resolver: AssetResolver<'a>,
    writer: ArchiveWriter,
}

impl<'a> PageArchiver<'a> {
    pub fn new(
        client: &'a dyn ApiClient,
        urls: &'a ApiUrls,
        options: &'a ExportOptions,
        writer: ArchiveWriter,
    ) -> Self {
        Self {
            client,
            urls,
            options,
            resolver: AssetResolver::new(client, urls),
            writer,
        }
    }

    /// Export every page, then finalise the archive
    pub async fn archive_pages(mut self, page_nodes: &NodeMap) -> Result<ArchiveSummary, ArchiveRunError> {
        let mut image_nodes = self.asset_meta(AssetKind::Image).await?;
        let mut attachment_nodes = self.asset_meta(AssetKind::Attachment).await?;

        info!(pages = page_nodes.len(), "Beginning archive of pages");
        for page in page_nodes.values() {
            let page_images = image_nodes.remove(&page.id).unwrap_or_default();
            let page_attachments = attachment_nodes.remove(&page.id).unwrap_or_default();
            self.archive_page(page, page_images, page_attachments).await?;
        }

        Ok(self.writer.finalize()?)
    }

    async fn asset_meta(&self, kind: AssetKind) -> Result<AssetMap, AssetError> {
        if !self.options.exports_asset(kind) {
            return Ok(AssetMap::new());
        }
        self.resolver.get_asset_nodes(kind).await
    }

    async fn archive_page(
        &mut self,
        page: &Node,
        images: Vec<AssetNode>,
        attachments: Vec<AssetNode>,
    ) -> Result<(), ArchiveRunError> {
        let mut images = self.archive_page_assets(AssetKind::Image, page, images).await?;
        let mut attachments = self
            .archive_page_assets(AssetKind::Attachment, page, attachments)
            .await?;

        let options = self.options;
        for format in &options.formats {
            let mut page_data = self.get_page_data(page.id, *format).await?;
            if options.modify_markdown && format.supports_link_rewrite() {
                page_data = self
                    .modify_markdown(AssetKind::Image, &page.slug, page_data, &mut images)
                    .await;
                page_data = self
                    .modify_markdown(AssetKind::Attachment, &page.slug, page_data, &mut attachments)
                    .await;
            }
            let entry = format!("{}{}", page.file_path(), format.extension());
            self.writer.write(&entry, &page_data)?;
        }

        if options.export_meta {
            self.archive_page_meta(page)?;
        }
        debug!(page_id = page.id, path = page.file_path(), "Page archived");
        Ok(())
    }

    /// Download and write one page's assets; returns the ones that made it
    async fn archive_page_assets(
        &mut self,
        kind: AssetKind,
        page: &Node,
        mut asset_nodes: Vec<AssetNode>,
    ) -> Result<Vec<AssetNode>, ArchiveError> {
        if asset_nodes.is_empty() {
            return Ok(asset_nodes);
        }

        let mut failed = HashSet::new();
        let mut taken = HashSet::new();
        for node in asset_nodes.iter_mut() {
            let data = match self.resolver.get_asset_bytes(kind, &node.url).await {
                Ok(data) => data,
                Err(e) => {
                    error!(
                        asset_id = node.id,
                        url = %node.url,
                        error = %e,
                        "Failed to get image or attachment data, skipping"
                    );
                    failed.insert(node.id);
                    continue;
                }
            };
            // Same-named uploads on one page share a directory
            node.claim_unique_name(&mut taken);
            let entry = format!("{}/{}", page.dir_path(), node.relative_path(&page.slug));
            self.writer.write(&entry, &data)?;
        }

        if failed.is_empty() {
            return Ok(asset_nodes);
        }
        Ok(asset_nodes
            .into_iter()
            .filter(|node| !failed.contains(&node.id))
            .collect())
    }

    async fn modify_markdown(
        &self,
        kind: AssetKind,
        page_name: &str,
        page_data: Vec<u8>,
        asset_nodes: &mut [AssetNode],
    ) -> Vec<u8> {
        if asset_nodes.is_empty() {
            return page_data;
        }
        self.resolver
            .update_asset_links(kind, page_name, page_data, asset_nodes)
            .await
    }

    async fn get_page_data(&self, page_id: u64, format: ExportFormat) -> Result<Vec<u8>, HttpError> {
        let url = format!(
            "{}/{}/{}/{}",
            self.urls.pages,
            page_id,
            EXPORT_API_PATH,
            format.api_name()
        );
        self.client.get_bytes(&url).await
    }

    fn archive_page_meta(&mut self, page: &Node) -> Result<(), ArchiveRunError> {
        let data = meta_json_bytes(page.meta()).map_err(|source| ArchiveRunError::Meta {
            page_id: page.id,
            source,
        })?;
        let entry = format!("{}{}", page.file_path(), META_FILE_SUFFIX);
        self.writer.write(&entry, &data)?;
        Ok(())
    }
}

/// Pretty JSON with 4-space indentation
pub fn meta_json_bytes(meta: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    meta.serialize(&mut serializer)?;
    Ok(out)
}
