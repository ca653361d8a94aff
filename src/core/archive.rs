//! Append-only tar assembly with gzip delivery.
//!
//! Entries go into `<archive_dir>.tar` under a top-level folder named
//! after the archive. [`ArchiveWriter::finalize`] consumes the writer,
//! gzips the tar into `<archive_dir>.tgz` and removes the tar.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

pub const TAR_SUFFIX: &str = ".tar";
pub const TAR_GZ_SUFFIX: &str = ".tgz";

/// Errors writing the archive; all of them are fatal for the run
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Archive entry written twice: {0}")]
    DuplicateEntry(String),

    #[error("Archive path has no file name: {0}")]
    InvalidPath(PathBuf),
}

/// Facts about a finished archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub entry_count: usize,
    pub size_bytes: u64,
    /// Hex SHA256 of the .tgz
    pub sha256: String,
}

/// Single-run tar writer
pub struct ArchiveWriter {
    base_path: String,
    tar_path: PathBuf,
    archive_path: PathBuf,
    builder: Option<tar::Builder<BufWriter<File>>>,
    written: HashSet<String>,
}

impl ArchiveWriter {
    /// Writer for `<archive_dir>.tar` / `<archive_dir>.tgz`.
    ///
    /// Nothing touches the disk until the first entry is written.
    pub fn new(archive_dir: &Path) -> Result<Self, ArchiveError> {
        let base_path = archive_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ArchiveError::InvalidPath(archive_dir.to_path_buf()))?;
        let dir = archive_dir.to_string_lossy();

        Ok(Self {
            base_path,
            tar_path: PathBuf::from(format!("{}{}", dir, TAR_SUFFIX)),
            archive_path: PathBuf::from(format!("{}{}", dir, TAR_GZ_SUFFIX)),
            builder: None,
            written: HashSet::new(),
        })
    }

    /// Top-level folder inside the tar
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn tar_path(&self) -> &Path {
        &self.tar_path
    }

    /// Number of entries written so far
    pub fn entry_count(&self) -> usize {
        self.written.len()
    }

    /// Append `data` at `<base_path>/<relative_path>`
    pub fn write(&mut self, relative_path: &str, data: &[u8]) -> Result<(), ArchiveError> {
        let entry_path = format!("{}/{}", self.base_path, relative_path);
        if self.written.contains(&entry_path) {
            return Err(ArchiveError::DuplicateEntry(entry_path));
        }

        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(Utc::now().timestamp().max(0) as u64);

        let tar_path = self.tar_path.clone();
        let builder = self.builder_mut()?;
        builder
            .append_data(&mut header, &entry_path, data)
            .map_err(|source| ArchiveError::Io {
                path: tar_path,
                source,
            })?;

        debug!(entry = %entry_path, bytes = data.len(), "Archived entry");
        self.written.insert(entry_path);
        Ok(())
    }

    fn builder_mut(&mut self) -> Result<&mut tar::Builder<BufWriter<File>>, ArchiveError> {
        let builder = match self.builder.take() {
            Some(builder) => builder,
            None => {
                let file = File::create(&self.tar_path).map_err(|source| ArchiveError::Io {
                    path: self.tar_path.clone(),
                    source,
                })?;
                tar::Builder::new(BufWriter::new(file))
            }
        };
        Ok(self.builder.insert(builder))
    }

    /// Close the tar, gzip it and delete the intermediate file
    pub fn finalize(mut self) -> Result<ArchiveSummary, ArchiveError> {
        let tar_path = self.tar_path.clone();
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ArchiveError::Io { path, source }
        };

        // Creates an empty tar when nothing was written
        self.builder_mut()?;
        if let Some(builder) = self.builder.take() {
            let mut inner = builder.into_inner().map_err(io_err(&tar_path))?;
            inner.flush().map_err(io_err(&tar_path))?;
        }

        compress_file(&tar_path, &self.archive_path).map_err(io_err(&self.archive_path))?;
        std::fs::remove_file(&tar_path).map_err(io_err(&tar_path))?;

        let size_bytes = std::fs::metadata(&self.archive_path)
            .map_err(io_err(&self.archive_path))?
            .len();
        let sha256 = calculate_checksum(&self.archive_path).map_err(io_err(&self.archive_path))?;

        info!(
            archive = %self.archive_path.display(),
            entries = self.written.len(),
            size_bytes,
            "Created archive"
        );

        Ok(ArchiveSummary {
            path: self.archive_path,
            entry_count: self.written.len(),
            size_bytes,
            sha256,
        })
    }
}

/// Gzip `source` into `dest`
fn compress_file(source: &Path, dest: &Path) -> io::Result<()> {
    let mut source_file = File::open(source)?;
    let dest_file = File::create(dest)?;
    let mut encoder = GzEncoder::new(BufWriter::new(dest_file), Compression::default());
    io::copy(&mut source_file, &mut encoder)?;
    encoder.finish()?.flush()
}

/// Calculates SHA256 checksum of a file.
fn calculate_checksum(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
