//! Archive Layer
//!
//! Packages one cycle's collector output into an immutable [`Archive`],
//! encodes it as a gzip-compressed tarball and records it on disk.
//!
//! # Components
//!
//! - [`Record`]: a single `(path, bytes)` entry
//! - [`ArchiveBuilder`]: assembly, limits and truncation, monotonic ids
//! - [`DiskRecorder`]: atomic writes and retention

mod builder;
mod record;
mod recorder;

pub use builder::{
    Archive, ArchiveBuilder, ArchiveError, ArchiveId, ArchiveLimits, DEFAULT_MAX_BYTES,
    DEFAULT_MAX_RECORDS, GatherReport, GatherStatus, MANIFEST_PATH,
};
pub use record::Record;
pub use recorder::DiskRecorder;
