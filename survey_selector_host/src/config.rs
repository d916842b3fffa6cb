use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use survey_selector_core::SelectorCfg;

use crate::error::{HostError, HostResult};

/// Host-level configuration document.
///
/// ```json
/// { "selector": { "userSampling": true, "quarantineKeyPrefix": "neb_" },
///   "durablePath": "/var/lib/app/quarantine.json" }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    pub selector: SelectorCfg,
    /// File backing the durable tier. `None` keeps durable state in memory.
    pub durable_path: Option<PathBuf>,
}

impl HostConfig {
    pub fn from_json_str(text: &str) -> HostResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> HostResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| HostError::io(path, e))?;
        Self::from_json_str(&text)
    }
}
