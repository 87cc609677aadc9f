//! Support configuration: where and how often gathered archives are uploaded.
//!
//! The values arrive as a loose key-value bundle (the layout of a mounted
//! secret). Every field is optional and falls back to its built-in default on
//! its own, so a bad `interval` never discards a good `endpoint`.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Url;

use super::validation::{expand_env_vars, parse_duration};

/// Built-in upload endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://cloud.redhat.com/api/ingress/v1/upload";

/// Built-in gather period (2 hours).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);

/// Bundle key holding the upload endpoint.
pub const ENDPOINT_KEY: &str = "endpoint";
/// Bundle key holding the gather period.
pub const INTERVAL_KEY: &str = "interval";
/// Bundle keys holding the upload credential, in lookup order.
pub const CREDENTIAL_KEYS: [&str; 2] = ["token", "credential"];

/// Raw key-value bundle as delivered by a [`SupportSource`](super::SupportSource).
pub type ConfigBundle = BTreeMap<String, Vec<u8>>;

/// Opaque upload credential.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building the authorization header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// A bundle field that was present but unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFallback {
    /// Bundle key.
    pub field: &'static str,
    /// Why the value was rejected.
    pub reason: String,
}

/// Effective support configuration for one gather cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportConfig {
    /// Upload destination.
    pub endpoint: String,
    /// Gather period, always positive.
    pub interval: Duration,
    /// Upload credential, if any.
    pub credential: Option<Credential>,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            interval: DEFAULT_INTERVAL,
            credential: None,
        }
    }
}

impl SupportConfig {
    /// Set the upload endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the gather period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the upload credential.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Build a configuration from a bundle, substituting defaults per field.
    ///
    /// Missing keys silently take their default. Keys that are present but
    /// malformed also take their default and are reported in the returned list.
    pub fn from_bundle(bundle: &ConfigBundle) -> (Self, Vec<FieldFallback>) {
        let mut config = Self::default();
        let mut fallbacks = Vec::new();

        if let Some(raw) = bundle.get(ENDPOINT_KEY) {
            match parse_endpoint(raw) {
                Ok(endpoint) => config.endpoint = endpoint,
                Err(reason) => fallbacks.push(FieldFallback {
                    field: ENDPOINT_KEY,
                    reason,
                }),
            }
        }

        if let Some(raw) = bundle.get(INTERVAL_KEY) {
            match parse_interval(raw) {
                Ok(interval) => config.interval = interval,
                Err(reason) => fallbacks.push(FieldFallback {
                    field: INTERVAL_KEY,
                    reason,
                }),
            }
        }

        if let Some(raw) = CREDENTIAL_KEYS.iter().find_map(|key| bundle.get(*key)) {
            match String::from_utf8(raw.clone()) {
                Ok(token) => {
                    let token = expand_env_vars(token.trim());
                    if !token.is_empty() {
                        config.credential = Some(Credential::new(token));
                    }
                }
                Err(_) => fallbacks.push(FieldFallback {
                    field: CREDENTIAL_KEYS[0],
                    reason: "value is not valid UTF-8".to_string(),
                }),
            }
        }

        (config, fallbacks)
    }
}

fn utf8_value(raw: &[u8]) -> Result<&str, String> {
    std::str::from_utf8(raw)
        .map(str::trim)
        .map_err(|_| "value is not valid UTF-8".to_string())
}

fn parse_endpoint(raw: &[u8]) -> Result<String, String> {
    let value = utf8_value(raw)?;
    let url = Url::parse(value).map_err(|e| format!("invalid URL '{value}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(value.to_string()),
        other => Err(format!("unsupported URL scheme '{other}'")),
    }
}

fn parse_interval(raw: &[u8]) -> Result<Duration, String> {
    let value = utf8_value(raw)?;
    let interval = parse_duration(value)?;
    if interval.is_zero() {
        return Err("interval must be positive".to_string());
    }
    Ok(interval)
}
