//! Archive upload and outcome classification.
//!
//! The uploader makes exactly one attempt per call. Retrying is the
//! scheduler's job: a failed archive is superseded by the next cycle's.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode, Url, multipart};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tokio::time::timeout;

use crate::archive::{Archive, ArchiveId, DiskRecorder};
use crate::config::SupportConfig;

/// Default upload timeout (1 minute).
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Content type announced for the archive part.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/vnd.redhat.openshift.periodic+tar";

/// Longest response body excerpt kept in an attempt's detail.
const MAX_DETAIL_LEN: usize = 256;

/// Classified result of one upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
pub enum UploadOutcome {
    /// The endpoint acknowledged the archive.
    Success,
    /// Transport failure or transient server condition.
    RetryableFailure,
    /// The endpoint rejected the archive or the request cannot be made.
    FatalFailure,
}

impl UploadOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Classify an HTTP response status.
    ///
    /// 2xx succeeds. 408, 429 and 5xx are transient. Every other status is a
    /// rejection of the payload or the credential.
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_success() {
            Self::Success
        } else if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            Self::RetryableFailure
        } else {
            Self::FatalFailure
        }
    }

    /// Classify a transport error.
    pub fn from_error(error: &reqwest::Error) -> Self {
        if error.is_builder() || error.is_redirect() {
            Self::FatalFailure
        } else {
            Self::RetryableFailure
        }
    }
}

/// Record of one upload attempt, consumed by the health tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadAttempt {
    /// Uploaded archive.
    pub archive_id: ArchiveId,
    /// When the attempt finished.
    pub timestamp: DateTime<Utc>,
    /// Classified outcome.
    pub outcome: UploadOutcome,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Human-readable description of the result.
    pub detail: String,
    /// Wall time of the attempt, in milliseconds.
    pub duration_ms: u64,
}

impl UploadAttempt {
    /// An attempt that failed before anything was sent.
    ///
    /// Counts against upload health like a transport failure.
    pub fn local_failure(archive_id: ArchiveId, detail: impl Into<String>) -> Self {
        Self {
            archive_id,
            timestamp: Utc::now(),
            outcome: UploadOutcome::RetryableFailure,
            status: None,
            detail: detail.into(),
            duration_ms: 0,
        }
    }
}

/// Sends archives to the configured endpoint.
#[derive(Debug, Clone)]
pub struct Uploader {
    client: Client,
    timeout: Duration,
}

impl Uploader {
    /// Create an uploader whose attempts are bounded by `timeout`.
    ///
    /// # Errors
    /// Returns the client build error if TLS initialization fails.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self { client, timeout })
    }

    /// Configured per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Upload with the configured timeout.
    pub async fn upload(
        &self,
        archive: &Archive,
        payload: &[u8],
        config: &SupportConfig,
    ) -> UploadAttempt {
        self.upload_within(archive, payload, config, self.timeout)
            .await
    }

    /// Make one upload attempt bounded by `limit`.
    pub async fn upload_within(
        &self,
        archive: &Archive,
        payload: &[u8],
        config: &SupportConfig,
        limit: Duration,
    ) -> UploadAttempt {
        let start = Instant::now();
        let (outcome, status, detail) = self.send(archive, payload, config, limit).await;

        let attempt = UploadAttempt {
            archive_id: archive.id(),
            timestamp: Utc::now(),
            outcome,
            status,
            detail,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        match attempt.outcome {
            UploadOutcome::Success => tracing::info!(
                archive_id = %attempt.archive_id,
                endpoint = %config.endpoint,
                status = ?attempt.status,
                duration_ms = attempt.duration_ms,
                "Uploaded report successfully"
            ),
            UploadOutcome::RetryableFailure => tracing::warn!(
                archive_id = %attempt.archive_id,
                endpoint = %config.endpoint,
                status = ?attempt.status,
                detail = %attempt.detail,
                "Unable to upload report, will retry next cycle"
            ),
            UploadOutcome::FatalFailure => tracing::error!(
                archive_id = %attempt.archive_id,
                endpoint = %config.endpoint,
                status = ?attempt.status,
                detail = %attempt.detail,
                "Report rejected by upload endpoint, check endpoint and credentials"
            ),
        }

        attempt
    }

    async fn send(
        &self,
        archive: &Archive,
        payload: &[u8],
        config: &SupportConfig,
        limit: Duration,
    ) -> (UploadOutcome, Option<u16>, String) {
        let url = match Url::parse(&config.endpoint) {
            Ok(url) => url,
            Err(e) => {
                return (
                    UploadOutcome::FatalFailure,
                    None,
                    format!("invalid endpoint '{}': {}", config.endpoint, e),
                );
            }
        };

        let part = match multipart::Part::bytes(payload.to_vec())
            .file_name(DiskRecorder::file_name(archive))
            .mime_str(ARCHIVE_CONTENT_TYPE)
        {
            Ok(part) => part,
            Err(e) => return (UploadOutcome::from_error(&e), None, e.to_string()),
        };

        let mut request = self
            .client
            .post(url)
            .header(
                USER_AGENT,
                concat!("insights-operator/", env!("CARGO_PKG_VERSION")),
            )
            .multipart(multipart::Form::new().part("file", part));
        if let Some(credential) = &config.credential {
            request = request.header(AUTHORIZATION, format!("Bearer {}", credential.expose()));
        }

        let start = Instant::now();
        match timeout(limit, request.send()).await {
            Ok(Ok(response)) => {
                let status = response.status();
                let outcome = UploadOutcome::from_status(status);
                let detail = if outcome.is_success() {
                    status.to_string()
                } else {
                    // The body read shares the attempt's budget.
                    let remaining = limit.saturating_sub(start.elapsed());
                    let body = match timeout(remaining, response.text()).await {
                        Ok(body) => body.unwrap_or_default(),
                        Err(_) => format!("response body not received within {limit:?}"),
                    };
                    let excerpt: String = body.chars().take(MAX_DETAIL_LEN).collect();
                    format!("{status}: {}", excerpt.trim())
                };
                (outcome, Some(status.as_u16()), detail)
            }
            Ok(Err(e)) => (UploadOutcome::from_error(&e), None, e.to_string()),
            Err(_) => (
                UploadOutcome::RetryableFailure,
                None,
                format!("timed out after {limit:?}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(UploadOutcome::from_status(StatusCode::OK), UploadOutcome::Success);
        assert_eq!(UploadOutcome::from_status(StatusCode::ACCEPTED), UploadOutcome::Success);
        assert_eq!(
            UploadOutcome::from_status(StatusCode::UNAUTHORIZED),
            UploadOutcome::FatalFailure
        );
        assert_eq!(
            UploadOutcome::from_status(StatusCode::FORBIDDEN),
            UploadOutcome::FatalFailure
        );
        assert_eq!(
            UploadOutcome::from_status(StatusCode::PAYLOAD_TOO_LARGE),
            UploadOutcome::FatalFailure
        );
        assert_eq!(
            UploadOutcome::from_status(StatusCode::SERVICE_UNAVAILABLE),
            UploadOutcome::RetryableFailure
        );
        assert_eq!(
            UploadOutcome::from_status(StatusCode::TOO_MANY_REQUESTS),
            UploadOutcome::RetryableFailure
        );
        assert_eq!(
            UploadOutcome::from_status(StatusCode::REQUEST_TIMEOUT),
            UploadOutcome::RetryableFailure
        );
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(UploadOutcome::RetryableFailure.to_string(), "RetryableFailure");
        assert!(UploadOutcome::Success.is_success());
        assert!(!UploadOutcome::FatalFailure.is_success());
    }
}
