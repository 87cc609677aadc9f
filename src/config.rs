//! Configuration for the insights agent.
//!
//! Two layers:
//! - [`AppConfig`]: process settings from a YAML file (server, storage, limits, collectors)
//! - [`SupportConfig`]: upload endpoint, gather period and credential, re-read
//!   from a [`SupportSource`] at the start of every gather cycle

mod app;
mod source;
mod support;
mod validation;

pub use app::{
    AppConfig, DEFAULT_RETAIN, DEFAULT_STORAGE_PATH, DEFAULT_SUPPORT_PATH, GatherConfig,
    ServerConfig, StorageConfig, SupportSourceConfig,
};
pub use source::{DirectorySource, MemorySource, SupportSource};
pub use support::{
    ConfigBundle, Credential, DEFAULT_ENDPOINT, DEFAULT_INTERVAL, FieldFallback, SupportConfig,
};
pub use validation::{ConfigError, expand_env_vars, format_period, parse_duration};
