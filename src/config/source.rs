//! Sources of the support configuration bundle.
//!
//! A source is read once per gather cycle; nothing is cached between reads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::support::ConfigBundle;
use super::validation::ConfigError;

/// Capability to read the current support configuration bundle.
#[async_trait::async_trait]
pub trait SupportSource: Send + Sync + 'static {
    /// Read a fresh snapshot.
    ///
    /// - `Ok(None)`: no bundle exists, every field takes its default
    /// - `Ok(Some(_))`: the current bundle
    /// - `Err(_)`: the source could not be read this time
    async fn load(&self) -> Result<Option<ConfigBundle>, ConfigError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Reads a bundle laid out as one file per key, the way a mounted secret is.
///
/// Hidden entries (names starting with `.`) are skipped, which also skips the
/// `..data` indirection of projected volumes. A missing directory means no
/// bundle.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    path: PathBuf,
}

impl DirectorySource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl SupportSource for DirectorySource {
    async fn load(&self) -> Result<Option<ConfigBundle>, ConfigError> {
        let mut entries = match tokio::fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut bundle = ConfigBundle::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            // Follows symlinks so projected keys resolve to their data file.
            let metadata = tokio::fs::metadata(entry.path()).await?;
            if !metadata.is_file() {
                continue;
            }
            let value = tokio::fs::read(entry.path()).await?;
            bundle.insert(name, value);
        }

        tracing::trace!(path = %self.path.display(), keys = bundle.len(), "Read support bundle");
        Ok(Some(bundle))
    }

    fn describe(&self) -> String {
        format!("directory {}", self.path.display())
    }
}

/// In-process bundle holder that can be replaced at runtime.
///
/// Clones share the same bundle.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    bundle: Arc<RwLock<Option<ConfigBundle>>>,
}

impl MemorySource {
    /// Create an empty source (no bundle).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source holding `entries`.
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let bundle = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            bundle: Arc::new(RwLock::new(Some(bundle))),
        }
    }

    /// Replace the whole bundle.
    pub async fn replace(&self, bundle: ConfigBundle) {
        *self.bundle.write().await = Some(bundle);
    }

    /// Set a single key, creating the bundle if needed.
    pub async fn set(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.bundle
            .write()
            .await
            .get_or_insert_with(ConfigBundle::new)
            .insert(key.into(), value.into());
    }

    /// Remove the bundle entirely.
    pub async fn clear(&self) {
        *self.bundle.write().await = None;
    }
}

#[async_trait::async_trait]
impl SupportSource for MemorySource {
    async fn load(&self) -> Result<Option<ConfigBundle>, ConfigError> {
        Ok(self.bundle.read().await.clone())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
