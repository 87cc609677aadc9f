//! Local archive recording with count-based retention.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::archive::{Archive, ArchiveError};
use crate::config::format_period;

const ARCHIVE_PREFIX: &str = "insights-";
const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Writes encoded archives into a directory and prunes old ones.
#[derive(Debug, Clone)]
pub struct DiskRecorder {
    dir: PathBuf,
    retain: usize,
}

impl DiskRecorder {
    /// Create a recorder keeping the newest `retain` archives (at least one).
    pub fn new(dir: impl AsRef<Path>, retain: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            retain: retain.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name used for an archive. Zero-padded so names sort by id.
    pub fn file_name(archive: &Archive) -> String {
        format!("{ARCHIVE_PREFIX}{:020}{ARCHIVE_SUFFIX}", archive.id().as_u64())
    }

    /// Write `payload` (the encoded `archive`) to disk.
    ///
    /// The file appears atomically: data goes to a hidden temp file that is
    /// renamed into place.
    pub async fn record(&self, archive: &Archive, payload: &[u8]) -> Result<PathBuf, ArchiveError> {
        let start = Instant::now();
        tokio::fs::create_dir_all(&self.dir).await?;

        let name = Self::file_name(archive);
        let target = self.dir.join(&name);
        let staging = self.dir.join(format!(".{name}.tmp"));

        tokio::fs::write(&staging, payload).await?;
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        tracing::info!(
            archive_id = %archive.id(),
            path = %target.display(),
            bytes = payload.len(),
            "Wrote {} records to disk in {}",
            archive.len(),
            format_period(start.elapsed())
        );

        if let Err(e) = self.prune().await {
            tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to prune old archives");
        }
        Ok(target)
    }

    /// Paths of the archives currently on disk, oldest first.
    pub async fn list(&self) -> Result<Vec<PathBuf>, ArchiveError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut archives = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_SUFFIX) {
                archives.push(entry.path());
            }
        }
        archives.sort();
        Ok(archives)
    }

    async fn prune(&self) -> Result<(), ArchiveError> {
        let archives = self.list().await?;
        let excess = archives.len().saturating_sub(self.retain);
        for path in &archives[..excess] {
            tokio::fs::remove_file(path).await?;
            tracing::debug!(path = %path.display(), "Removed old archive");
        }
        Ok(())
    }
}
