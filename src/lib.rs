//! bookstack-export - Archive a BookStack wiki into a tar/gzip bundle
//!
//! Walks the BookStack REST API, rebuilds the shelf → book → chapter →
//! page hierarchy, and writes every page (in the requested formats) plus
//! its images and attachments into one timestamped `.tgz`.
//!
//! # Modules
//!
//! - `adapters`: HTTP client with retry, S3 uploads, notifications
//! - `core`: Tree building, asset resolution, archiving, retention
//! - `domain`: Hierarchy and asset nodes, export formats
//! - `config`: YAML configuration and environment overrides
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Export once
//! bookstack-export -c data/config.yml
//!
//! # Export into a different directory with debug logs
//! bookstack-export -c data/config.yml -o /backups -v debug
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{ApiClient, HttpClient, HttpError, ObjectStore, S3Store};
pub use config::ResolvedConfig;
pub use crate::core::{Orchestrator, RunSummary};
pub use domain::{AssetKind, AssetNode, ExportFormat, Node, NodeKind, NodeMap};
