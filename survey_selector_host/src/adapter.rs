//! Registry adapters: turn host documents into a normalized `SurveyRegistry`.
//!
//! Accepted shapes:
//! - `{ "<id>": { "priority": .., "percentage": .., "quarantineDays": .., ... } }`
//! - `[ { "id": .., "priority": .., ... }, ... ]`
//! - either of the above wrapped as `{ "surveys": ... }`
//!
//! Numbers may arrive as strings; coercion happens here, once.

use std::path::Path;

use serde_json::Value;
use survey_selector_core::SurveyRegistry;

use crate::error::{HostError, HostResult};

pub fn registry_from_value(doc: &Value) -> HostResult<SurveyRegistry> {
    let doc = match doc.get("surveys") {
        Some(inner @ (Value::Object(_) | Value::Array(_))) => inner,
        _ => doc,
    };
    Ok(SurveyRegistry::from_json_value(doc)?)
}

pub fn registry_from_json_str(text: &str) -> HostResult<SurveyRegistry> {
    let doc: Value = serde_json::from_str(text)?;
    registry_from_value(&doc)
}

pub fn registry_from_path(path: &Path) -> HostResult<SurveyRegistry> {
    let text = std::fs::read_to_string(path).map_err(|e| HostError::io(path, e))?;
    registry_from_json_str(&text)
}
