//! A single archive entry.

use serde::Serialize;

/// One file in an archive: a relative path and its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Relative path inside the archive (e.g. `events/openshift-monitoring.json`).
    pub path: String,
    /// Raw contents.
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }

    /// Build a record holding `value` as pretty-printed JSON.
    pub fn json<T: Serialize + ?Sized>(
        path: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(path, serde_json::to_vec_pretty(value)?))
    }

    /// Size of the contents in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
