//! Export pipeline.
//!
//! - NodeExporter: rebuilds the shelf/book/chapter/page tree
//! - AssetResolver: image and attachment lookup plus link rewriting
//! - ArchiveWriter / PageArchiver: tar assembly and gzip delivery
//! - retention: pruning of old local and remote archives
//! - Orchestrator: one full run

pub mod archive;
pub mod assets;
pub mod exporter;
pub mod orchestrator;
pub mod page_archiver;
pub mod retention;

pub use archive::{ArchiveError, ArchiveSummary, ArchiveWriter};
pub use assets::{AssetError, AssetResolver};
pub use exporter::{get_all_ids, ExportError, NodeExporter};
pub use orchestrator::{Orchestrator, RunSummary, TIMESTAMP_FORMAT};
pub use page_archiver::{ArchiveRunError, PageArchiver};
pub use retention::{clean_local, clean_remote, select_expired};
