//! One export run, end to end.
//!
//! Builds the wiki tree, streams it into a timestamped archive, then
//! uploads and prunes. The archive is finalised locally before any
//! upload starts, so a partial archive never leaves the machine.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{info, instrument, warn};

use crate::adapters::{ApiClient, ObjectStore};
use crate::config::ResolvedConfig;
use crate::core::archive::ArchiveWriter;
use crate::core::exporter::NodeExporter;
use crate::core::page_archiver::PageArchiver;
use crate::core::retention;

/// Timestamp appended to the archive base name
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// What a run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Local `.tgz`; `None` when there was nothing to export
    pub archive_path: Option<PathBuf>,
    pub page_count: usize,
    pub entry_count: usize,
    pub size_bytes: u64,
    pub sha256: Option<String>,
    /// Object key of the uploaded archive
    pub uploaded_object: Option<String>,
    pub deleted_local: Vec<PathBuf>,
    pub deleted_remote: Vec<String>,
}

/// Runs exports against one wiki with one configuration
pub struct Orchestrator<'a> {
    config: &'a ResolvedConfig,
    client: &'a dyn ApiClient,
    store: Option<&'a dyn ObjectStore>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a ResolvedConfig,
        client: &'a dyn ApiClient,
        store: Option<&'a dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            client,
            store,
        }
    }

    /// `<base_dir>_<timestamp>`, the archive path without extension
    pub fn archive_dir(&self, timestamp: &str) -> PathBuf {
        PathBuf::from(format!("{}_{}", self.config.base_dir.display(), timestamp))
    }

    /// Execute one export run
    #[instrument(skip(self), fields(base_dir = %self.config.base_dir.display()))]
    pub async fn run(&self) -> Result<RunSummary> {
        info!("Beginning run");
        ensure_output_dir(self.config.output_dir());

        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.run_at(&timestamp).await
    }

    /// Execute one export run with a fixed archive timestamp
    pub async fn run_at(&self, timestamp: &str) -> Result<RunSummary> {
        let exporter = NodeExporter::new(self.client, &self.config.urls);

        info!("Building shelf/book/chapter/page tree");
        let shelves = exporter.get_all_shelves().await?;
        let books = exporter
            .get_all_books(&shelves, &self.config.unassigned_dir)
            .await?;
        let pages = exporter.get_all_pages(&books).await?;

        if pages.is_empty() {
            warn!("No page data available from given Bookstack instance. Nothing to archive");
            return Ok(RunSummary::default());
        }

        let archive_dir = self.archive_dir(timestamp);
        let writer = ArchiveWriter::new(&archive_dir)?;
        let archiver = PageArchiver::new(self.client, &self.config.urls, &self.config.options, writer);
        let archive = archiver.archive_pages(&pages).await?;
        info!(archive = %archive.path.display(), sha256 = %archive.sha256, "Archive complete");

        let mut summary = RunSummary {
            archive_path: Some(archive.path.clone()),
            page_count: pages.len(),
            entry_count: archive.entry_count,
            size_bytes: archive.size_bytes,
            sha256: Some(archive.sha256),
            ..RunSummary::default()
        };

        if let Some(store) = self.store {
            summary.uploaded_object = Some(
                store
                    .upload(&archive.path)
                    .await
                    .context("Failed to upload archive to object storage")?,
            );
            let keep_last = self
                .config
                .object_storage
                .as_ref()
                .and_then(|s| s.keep_last);
            summary.deleted_remote = retention::clean_remote(store, keep_last).await?;
        }

        summary.deleted_local = retention::clean_local(&self.config.base_dir, self.config.keep_last)?;

        info!(
            pages = summary.page_count,
            entries = summary.entry_count,
            "Completed run"
        );
        Ok(summary)
    }
}

/// Create the output directory; failure is tolerated for read-only setups
fn ensure_output_dir(dir: &Path) {
    if dir.as_os_str().is_empty() {
        return;
    }
    info!(dir = %dir.display(), "Creating base directory for archive");
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!(dir = %dir.display(), error = %e, "Failed to create base directory");
    }
}
