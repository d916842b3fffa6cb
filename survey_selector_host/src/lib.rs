//! survey_selector_host
//!
//! Outside-world facing layer for `survey_selector_core`.
//!
//! Responsibilities:
//! - load host configuration and survey registries from JSON
//! - back the durable quarantine tier with a file
//! - end sessions and snapshot / restore quarantine state
//!
//! Non-goals:
//! - no async
//! - no page-to-survey mapping, no rendering (the caller owns both)

pub mod adapter;
pub mod config;
pub mod error;
pub mod file_store;
pub mod host;

pub use adapter::{registry_from_json_str, registry_from_path, registry_from_value};
pub use config::HostConfig;
pub use error::{HostError, HostResult};
pub use file_store::JsonFileStore;
pub use host::{QuarantineSnapshot, RestoreStats, SelectorHost, SnapshotEntry};
