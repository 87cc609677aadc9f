//! Archive assembly from collector output.

use std::cmp::Reverse;
use std::path::{Component, Path};
use std::time::Duration;

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::archive::Record;
use crate::collector::CollectorOutput;

/// Archive path of the per-collector gather manifest.
pub const MANIFEST_PATH: &str = "insights-operator/gathers.json";

/// Default maximum records per archive.
pub const DEFAULT_MAX_RECORDS: usize = 10_000;

/// Default maximum uncompressed bytes per archive (16 MiB).
pub const DEFAULT_MAX_BYTES: usize = 16 * 1024 * 1024;

/// Errors produced while encoding an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Writing the tarball or the archive file failed.
    #[error("archive io error: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest could not be serialized.
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Archive identifier, strictly increasing within a process.
///
/// Derived from the creation time in milliseconds, bumped when two archives
/// land in the same millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ArchiveId(u64);

impl ArchiveId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one collector as recorded in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum GatherStatus {
    /// All records included.
    Ok,
    /// Collector failed, no records included.
    Failed,
    /// Some records dropped to respect archive limits.
    Truncated,
}

/// Manifest entry for one collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatherReport {
    /// Collector name.
    pub source: String,
    /// Outcome.
    pub status: GatherStatus,
    /// Records included in the archive.
    pub records: usize,
    /// Records dropped by truncation.
    pub dropped: usize,
    /// Time spent gathering, in milliseconds.
    pub duration_ms: u64,
    /// Collector error, for failed collectors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Record count and size caps for one archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    pub max_records: usize,
    pub max_bytes: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// One packaged unit of gathered data. Immutable once built.
#[derive(Debug, Clone)]
pub struct Archive {
    id: ArchiveId,
    created_at: DateTime<Utc>,
    records: Vec<Record>,
    reports: Vec<GatherReport>,
}

#[derive(Serialize)]
struct Manifest<'a> {
    id: ArchiveId,
    created_at: DateTime<Utc>,
    gathers: &'a [GatherReport],
}

impl Archive {
    pub fn id(&self) -> ArchiveId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Collector records, grouped by source name in lexicographic order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// One manifest entry per collector, ordered by source name.
    pub fn reports(&self) -> &[GatherReport] {
        &self.reports
    }

    /// Diagnostic entries of the collectors that failed.
    pub fn failures(&self) -> impl Iterator<Item = &GatherReport> {
        self.reports
            .iter()
            .filter(|r| r.status == GatherStatus::Failed)
    }

    /// Look up a record by exact path.
    pub fn get(&self, path: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.path == path)
    }

    /// True when no collector contributed records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of collector records (the manifest is not counted).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Uncompressed size of all collector records.
    pub fn total_bytes(&self) -> usize {
        self.records.iter().map(Record::len).sum()
    }

    /// The manifest as an archive record.
    pub fn manifest(&self) -> Result<Record, ArchiveError> {
        let manifest = Manifest {
            id: self.id,
            created_at: self.created_at,
            gathers: &self.reports,
        };
        Ok(Record::json(MANIFEST_PATH, &manifest)?)
    }

    /// Encode the archive, manifest included, as a gzip-compressed tarball.
    pub fn encode(&self) -> Result<Vec<u8>, ArchiveError> {
        let mtime = u64::try_from(self.created_at.timestamp()).unwrap_or(0);
        let manifest = self.manifest()?;

        let mut tar = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for record in self.records.iter().chain(std::iter::once(&manifest)) {
            let mut header = tar::Header::new_gnu();
            header.set_size(record.data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(mtime);
            header.set_cksum();
            tar.append_data(&mut header, &record.path, record.data.as_slice())?;
        }
        Ok(tar.into_inner()?.finish()?)
    }
}

/// A record path must be relative, non-empty and free of `.`/`..` segments.
fn is_valid_record_path(path: &str) -> bool {
    !path.is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

struct SourceGroup {
    source: String,
    priority: u32,
    duration: Duration,
    records: Vec<Record>,
    dropped: usize,
    error: Option<String>,
}

/// Assembles collector output into archives.
///
/// Keeps the last issued id so ids stay strictly increasing.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    limits: ArchiveLimits,
    last_id: Option<ArchiveId>,
}

impl ArchiveBuilder {
    pub fn new(limits: ArchiveLimits) -> Self {
        Self {
            limits,
            last_id: None,
        }
    }

    pub fn limits(&self) -> ArchiveLimits {
        self.limits
    }

    /// Package the outputs of one gather into an archive.
    ///
    /// Failed collectors contribute only a manifest entry. A collector that
    /// emits a record path which cannot be stored in the tarball is treated
    /// as failed. When the archive
    /// would exceed its limits, records are dropped from the lowest-priority
    /// source first (ties broken against the later source name).
    pub fn build(&mut self, outputs: Vec<CollectorOutput>) -> Archive {
        let mut groups: Vec<SourceGroup> = outputs
            .into_iter()
            .map(|output| {
                let (records, error) = match output.result {
                    Ok(records) => match records.iter().find(|r| !is_valid_record_path(&r.path)) {
                        Some(bad) => {
                            tracing::warn!(
                                collector = %output.source,
                                path = %bad.path,
                                "Collector produced an invalid record path, dropping its records"
                            );
                            (Vec::new(), Some(format!("invalid record path '{}'", bad.path)))
                        }
                        None => (records, None),
                    },
                    Err(e) => (Vec::new(), Some(e.to_string())),
                };
                SourceGroup {
                    source: output.source,
                    priority: output.priority,
                    duration: output.duration,
                    records,
                    dropped: 0,
                    error,
                }
            })
            .collect();
        groups.sort_by(|a, b| a.source.cmp(&b.source));

        self.truncate(&mut groups);

        let created_at = Utc::now();
        let id = self.next_id(created_at);

        let reports = groups
            .iter()
            .map(|g| GatherReport {
                source: g.source.clone(),
                status: match (&g.error, g.dropped) {
                    (Some(_), _) => GatherStatus::Failed,
                    (None, 0) => GatherStatus::Ok,
                    (None, _) => GatherStatus::Truncated,
                },
                records: g.records.len(),
                dropped: g.dropped,
                duration_ms: u64::try_from(g.duration.as_millis()).unwrap_or(u64::MAX),
                error: g.error.clone(),
            })
            .collect();
        let records = groups.into_iter().flat_map(|g| g.records).collect();

        Archive {
            id,
            created_at,
            records,
            reports,
        }
    }

    fn next_id(&mut self, created_at: DateTime<Utc>) -> ArchiveId {
        let millis = u64::try_from(created_at.timestamp_millis()).unwrap_or(0);
        let id = match self.last_id {
            Some(ArchiveId(last)) if last >= millis => ArchiveId(last + 1),
            _ => ArchiveId(millis),
        };
        self.last_id = Some(id);
        id
    }

    fn truncate(&self, groups: &mut [SourceGroup]) {
        let mut count: usize = groups.iter().map(|g| g.records.len()).sum();
        let mut bytes: usize = groups
            .iter()
            .flat_map(|g| g.records.iter())
            .map(Record::len)
            .sum();

        if count <= self.limits.max_records && bytes <= self.limits.max_bytes {
            return;
        }

        let (before_count, before_bytes) = (count, bytes);
        while count > self.limits.max_records || bytes > self.limits.max_bytes {
            let Some(victim) = groups
                .iter_mut()
                .filter(|g| !g.records.is_empty())
                .min_by_key(|g| (g.priority, Reverse(g.source.clone())))
            else {
                break;
            };
            if let Some(record) = victim.records.pop() {
                count -= 1;
                bytes -= record.len();
                victim.dropped += 1;
            }
        }

        let truncated: Vec<&str> = groups
            .iter()
            .filter(|g| g.dropped > 0)
            .map(|g| g.source.as_str())
            .collect();
        tracing::warn!(
            max_records = self.limits.max_records,
            max_bytes = self.limits.max_bytes,
            records_before = before_count,
            bytes_before = before_bytes,
            records_after = count,
            bytes_after = bytes,
            sources = ?truncated,
            "Archive exceeded limits, truncated lowest-priority sources"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::collector::CollectorError;

    fn ok(source: &str, priority: u32, paths: &[&str]) -> CollectorOutput {
        CollectorOutput {
            source: source.to_string(),
            priority,
            duration: Duration::from_millis(5),
            result: Ok(paths.iter().map(|p| Record::new(*p, "0123456789")).collect()),
        }
    }

    fn failed(source: &str) -> CollectorOutput {
        CollectorOutput {
            source: source.to_string(),
            priority: 10,
            duration: Duration::from_millis(1),
            result: Err(CollectorError::Unavailable("prometheus unreachable".into())),
        }
    }

    #[test]
    fn test_failed_collectors_become_diagnostics() {
        let mut builder = ArchiveBuilder::default();
        let archive = builder.build(vec![
            ok("pod-logs", 10, &["config/pod/openshift-monitoring/logs/a.log"]),
            failed("metrics"),
            ok("events", 10, &["events/openshift-monitoring.json"]),
            failed("alerts"),
        ]);

        assert_eq!(archive.len(), 2);
        let failures: Vec<_> = archive.failures().map(|r| r.source.as_str()).collect();
        assert_eq!(failures, vec!["alerts", "metrics"]);
        assert!(
            archive
                .failures()
                .all(|r| r.error.as_deref().unwrap().contains("prometheus unreachable"))
        );
        assert!(archive.get("events/openshift-monitoring.json").is_some());
    }

    #[test]
    fn test_invalid_record_path_fails_only_its_collector() {
        let mut builder = ArchiveBuilder::default();
        let archive = builder.build(vec![
            ok("events", 10, &["events/openshift-monitoring.json"]),
            ok("escaper", 10, &["escaper/ok.json", "../escape.json"]),
            ok("absolute", 10, &["/etc/passwd"]),
            ok("blank", 10, &[""]),
        ]);

        let payload = archive.encode().expect("encode should succeed");
        assert!(!payload.is_empty());
        assert_eq!(archive.len(), 1);
        assert!(archive.get("events/openshift-monitoring.json").is_some());
        assert!(archive.get("escaper/ok.json").is_none());

        let failures: Vec<_> = archive.failures().map(|r| r.source.as_str()).collect();
        assert_eq!(failures, vec!["absolute", "blank", "escaper"]);
        assert!(
            archive
                .failures()
                .all(|r| r.error.as_deref().unwrap().contains("invalid record path"))
        );
    }

    #[test]
    fn test_record_path_validation() {
        assert!(is_valid_record_path("config/pod/a.log"));
        assert!(is_valid_record_path("events"));
        assert!(!is_valid_record_path(""));
        assert!(!is_valid_record_path("../escape.json"));
        assert!(!is_valid_record_path("a/../../b"));
        assert!(!is_valid_record_path("/abs/path"));
        assert!(!is_valid_record_path("./relative"));
    }

    #[test]
    fn test_records_ordered_by_source() {
        let mut builder = ArchiveBuilder::default();
        let archive = builder.build(vec![ok("zeta", 10, &["z/1"]), ok("alpha", 10, &["a/1", "a/0"])]);
        let paths: Vec<_> = archive.records().iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a/1", "a/0", "z/1"]);
    }

    #[test]
    fn test_all_failed_is_empty() {
        let mut builder = ArchiveBuilder::default();
        let archive = builder.build(vec![failed("a"), failed("b")]);
        assert!(archive.is_empty());
        assert_eq!(archive.failures().count(), 2);
    }

    #[test]
    fn test_ids_strictly_increase() {
        let mut builder = ArchiveBuilder::default();
        let mut previous = builder.build(vec![]).id();
        for _ in 0..50 {
            let id = builder.build(vec![]).id();
            assert!(id > previous);
            previous = id;
        }
    }

    #[test]
    fn test_truncates_lowest_priority_first() {
        let mut builder = ArchiveBuilder::new(ArchiveLimits {
            max_records: 4,
            max_bytes: usize::MAX,
        });
        let archive = builder.build(vec![
            ok("events", 50, &["e/1", "e/2"]),
            ok("logs", 5, &["l/1", "l/2", "l/3"]),
            ok("info", 100, &["i/1"]),
        ]);

        assert_eq!(archive.len(), 4);
        let logs = archive.reports().iter().find(|r| r.source == "logs").unwrap();
        assert_eq!(logs.status, GatherStatus::Truncated);
        assert_eq!(logs.records, 1);
        assert_eq!(logs.dropped, 2);
        assert!(archive.get("l/1").is_some());
        assert!(archive.get("l/3").is_none());

        let events = archive.reports().iter().find(|r| r.source == "events").unwrap();
        assert_eq!(events.status, GatherStatus::Ok);
    }

    #[test]
    fn test_truncates_by_bytes() {
        let mut builder = ArchiveBuilder::new(ArchiveLimits {
            max_records: 100,
            max_bytes: 25,
        });
        let archive = builder.build(vec![ok("a", 10, &["a/1", "a/2"]), ok("b", 10, &["b/1", "b/2"])]);
        assert!(archive.total_bytes() <= 25);
        // Equal priority: the later source name is cut first.
        assert_eq!(archive.reports()[0].dropped, 0);
        assert_eq!(archive.reports()[1].dropped, 2);
    }

    #[test]
    fn test_encode_contains_records_and_manifest() {
        let mut builder = ArchiveBuilder::default();
        let archive = builder.build(vec![
            ok("events", 10, &["events/openshift-monitoring.json"]),
            failed("broken"),
        ]);
        let bytes = archive.encode().unwrap();

        let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(bytes.as_slice()));
        let mut entries = Vec::new();
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            entries.push((path, body));
        }

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "events/openshift-monitoring.json");
        assert_eq!(entries[1].0, MANIFEST_PATH);

        let manifest: serde_json::Value = serde_json::from_str(&entries[1].1).unwrap();
        assert_eq!(manifest["id"], archive.id().as_u64());
        assert_eq!(manifest["gathers"][0]["source"], "broken");
        assert_eq!(manifest["gathers"][0]["status"], "failed");
        assert_eq!(manifest["gathers"][1]["status"], "ok");

        let status: GatherStatus = manifest["gathers"][0]["status"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(status, GatherStatus::Failed);
        assert_eq!("TRUNCATED".parse::<GatherStatus>().unwrap(), GatherStatus::Truncated);
    }
}
