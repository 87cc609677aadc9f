//! Self-description of the running agent.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::archive::Record;
use crate::collector::{Collector, CollectorError};

/// Archive path of the agent metadata record.
pub const OPERATOR_INFO_PATH: &str = "insights-operator/operator.json";

/// Priority above every default, the record is tiny and identifies the archive.
const OPERATOR_INFO_PRIORITY: u32 = 100;

#[derive(Debug, Serialize)]
struct OperatorInfo<'a> {
    version: &'a str,
    pod: Option<String>,
    started_at: DateTime<Utc>,
    gathered_at: DateTime<Utc>,
    uptime_seconds: i64,
}

/// Emits the agent version, pod name and uptime.
#[derive(Debug, Clone)]
pub struct OperatorInfoCollector {
    started_at: DateTime<Utc>,
}

impl Default for OperatorInfoCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorInfoCollector {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
        }
    }
}

#[async_trait::async_trait]
impl Collector for OperatorInfoCollector {
    fn name(&self) -> &str {
        "operator-info"
    }

    fn priority(&self) -> u32 {
        OPERATOR_INFO_PRIORITY
    }

    async fn gather(&self) -> Result<Vec<Record>, CollectorError> {
        let now = Utc::now();
        let info = OperatorInfo {
            version: env!("CARGO_PKG_VERSION"),
            pod: std::env::var("POD_NAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .ok(),
            started_at: self.started_at,
            gathered_at: now,
            uptime_seconds: (now - self.started_at).num_seconds(),
        };
        Ok(vec![Record::json(OPERATOR_INFO_PATH, &info)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_operator_info_record() {
        let records = OperatorInfoCollector::new().gather().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, OPERATOR_INFO_PATH);

        let value: serde_json::Value = serde_json::from_slice(&records[0].data).unwrap();
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
        assert!(value["uptime_seconds"].as_i64().unwrap() >= 0);
    }
}
