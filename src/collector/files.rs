//! File tree collector.
//!
//! Harvests files below a directory (pod log mounts, event dumps, rendered
//! manifests) into the archive under a fixed path prefix.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::archive::Record;
use crate::collector::traits::DEFAULT_PRIORITY;
use crate::collector::{Collector, CollectorError};
use crate::config::ConfigError;

/// Default cap on bytes taken from a single file (1 MiB, tail kept).
const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;

fn default_priority() -> u32 {
    DEFAULT_PRIORITY
}

fn default_max_file_bytes() -> u64 {
    DEFAULT_MAX_FILE_BYTES
}

/// Configuration for a file tree collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCollectorConfig {
    /// Unique collector name.
    pub name: String,
    /// Directory to harvest.
    pub path: PathBuf,
    /// Archive path prefix (e.g. `config/pod/openshift-monitoring/logs`).
    pub prefix: String,
    /// File extensions to include, without the dot. Empty means all files.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Truncation weight (default: 10).
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Per-file byte cap; larger files keep their tail (default: 1 MiB).
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl FileCollectorConfig {
    pub fn new(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            prefix: prefix.into(),
            extensions: Vec::new(),
            priority: DEFAULT_PRIORITY,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    /// Restrict to the given extensions.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Set the truncation weight.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the per-file byte cap.
    pub fn with_max_file_bytes(mut self, max: u64) -> Self {
        self.max_file_bytes = max;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "collector name must not be empty".to_string(),
            ));
        }
        let prefix = Path::new(&self.prefix);
        let relative = prefix
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if self.prefix.is_empty() || !relative {
            return Err(ConfigError::ValidationError(format!(
                "collector '{}': prefix must be a relative path without '..', got '{}'",
                self.name, self.prefix
            )));
        }
        if self.max_file_bytes == 0 {
            return Err(ConfigError::ValidationError(format!(
                "collector '{}': max_file_bytes must be positive",
                self.name
            )));
        }
        Ok(())
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|want| want == ext))
    }
}

/// Collector reading every matching file below a directory.
#[derive(Debug, Clone)]
pub struct FileCollector {
    config: FileCollectorConfig,
}

impl FileCollector {
    pub fn new(config: FileCollectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FileCollectorConfig {
        &self.config
    }

    /// Read at most `max_file_bytes` from the end of the file.
    async fn read_capped(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        let mut file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let cap = self.config.max_file_bytes;
        if size > cap {
            tracing::debug!(
                collector = %self.config.name,
                path = %path.display(),
                size,
                cap,
                "File exceeds cap, keeping tail"
            );
            file.seek(SeekFrom::Start(size - cap)).await?;
        }

        let mut data = Vec::with_capacity(usize::try_from(size.min(cap)).unwrap_or_default());
        file.take(cap).read_to_end(&mut data).await?;
        Ok(data)
    }

    fn archive_path(&self, relative: &Path) -> String {
        let parts: Vec<_> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect();
        format!("{}/{}", self.config.prefix.trim_end_matches('/'), parts.join("/"))
    }
}

#[async_trait::async_trait]
impl Collector for FileCollector {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn priority(&self) -> u32 {
        self.config.priority
    }

    async fn gather(&self) -> Result<Vec<Record>, CollectorError> {
        let root = &self.config.path;
        match tokio::fs::metadata(root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(CollectorError::Unavailable(format!(
                    "{} is not a directory",
                    root.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CollectorError::Unavailable(format!(
                    "{} does not exist",
                    root.display()
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let mut records = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if dir == *root => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(
                        collector = %self.config.name,
                        path = %dir.display(),
                        error = %e,
                        "Skipping unreadable directory"
                    );
                    continue;
                }
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                // Symlinked files are followed; symlinked directories are not,
                // so a link cycle cannot trap the walk.
                let is_file = if file_type.is_symlink() {
                    tokio::fs::metadata(&path).await.map(|m| m.is_file())
                } else {
                    Ok(file_type.is_file())
                };
                let data = match is_file {
                    Ok(true) if self.config.accepts(&path) => self.read_capped(&path).await,
                    Ok(_) => continue,
                    Err(e) => Err(e),
                };
                match data {
                    Ok(data) => {
                        let relative = path.strip_prefix(root).unwrap_or(&path);
                        records.push(Record::new(self.archive_path(relative), data));
                    }
                    Err(e) => tracing::warn!(
                        collector = %self.config.name,
                        path = %path.display(),
                        error = %e,
                        "Skipping unreadable file"
                    ),
                }
            }
        }

        records.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(records)
    }
}
