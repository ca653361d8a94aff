//! Archive retention for local files and remote objects.
//!
//! Both sides share [`select_expired`]: `keep_last` unset or 0 keeps
//! everything, a negative value removes every archive found, and a
//! positive value keeps only the newest `keep_last`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::adapters::{ObjectStore, RemoteObject};
use crate::config::BASE_DIR_NAME;
use crate::core::archive::TAR_GZ_SUFFIX;

/// Items to delete under a retention count.
///
/// Ordering is a stable ascending sort on `timestamp`, so equal
/// timestamps keep listing order.
pub fn select_expired<T, K, F>(mut items: Vec<T>, keep_last: Option<i64>, timestamp: F) -> Vec<T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let keep = match keep_last {
        None | Some(0) => return Vec::new(),
        Some(k) if k < 0 => return items,
        Some(k) => usize::try_from(k).unwrap_or(usize::MAX),
    };
    if items.len() <= keep {
        return Vec::new();
    }

    items.sort_by_key(|item| timestamp(item));
    let expired = items.len() - keep;
    items.truncate(expired);
    items
}

/// One archive found on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArchive {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Archives next to `base_dir` matching `<base_dir>_*.tgz`
pub fn list_local_archives(base_dir: &Path) -> Result<Vec<LocalArchive>> {
    let pattern = format!(
        "{}_*{}",
        glob::Pattern::escape(&base_dir.to_string_lossy()),
        TAR_GZ_SUFFIX
    );

    let mut archives = Vec::new();
    for entry in glob::glob(&pattern).with_context(|| format!("Invalid archive pattern: {}", pattern))? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable archive candidate");
                continue;
            }
        };
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to read modification time: {}", path.display()))?;
        archives.push(LocalArchive { path, modified });
    }
    Ok(archives)
}

/// Delete expired local archives; returns the paths removed
pub fn clean_local(base_dir: &Path, keep_last: Option<i64>) -> Result<Vec<PathBuf>> {
    if matches!(keep_last, None | Some(0)) {
        return Ok(Vec::new());
    }

    let archives = list_local_archives(base_dir)?;
    debug!(found = archives.len(), ?keep_last, "Local archives considered for retention");

    let mut removed = Vec::new();
    for archive in select_expired(archives, keep_last, |a| a.modified) {
        std::fs::remove_file(&archive.path)
            .with_context(|| format!("Failed to delete archive: {}", archive.path.display()))?;
        info!(path = %archive.path.display(), "Deleted local archive");
        removed.push(archive.path);
    }
    Ok(removed)
}

/// Whether a remote object name looks like one of our archives
pub fn is_remote_archive(name: &str) -> bool {
    name.ends_with(TAR_GZ_SUFFIX) && name.contains(&format!("{}_", BASE_DIR_NAME))
}

/// Delete expired remote archives; returns the object names removed
pub async fn clean_remote(store: &dyn ObjectStore, keep_last: Option<i64>) -> Result<Vec<String>> {
    if matches!(keep_last, None | Some(0)) {
        return Ok(Vec::new());
    }

    let objects: Vec<RemoteObject> = store
        .list_objects()
        .await?
        .into_iter()
        .filter(|o| is_remote_archive(&o.name))
        .collect();
    debug!(found = objects.len(), ?keep_last, "Remote archives considered for retention");

    let mut removed = Vec::new();
    for object in select_expired(objects, keep_last, |o| o.last_modified) {
        store.delete_object(&object.name).await?;
        info!(object = %object.name, "Deleted remote archive");
        removed.push(object.name);
    }
    Ok(removed)
}
