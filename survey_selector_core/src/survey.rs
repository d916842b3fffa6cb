//! Survey definitions and the registry the engine selects from.
//!
//! Hosts hand over loosely typed documents (ids and numbers may arrive as strings or
//! numbers). Everything is coerced once, when a definition is built, so the installed
//! registry is immutable and the engine never re-parses fields during selection.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::RegistryError;

/// Integer coercion with leading-number semantics: `12`, `12.9`, `"12"`, `" 12px"` all
/// yield 12; `"abc"`, `null`, booleans, arrays and objects yield `None`.
pub fn coerce_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(i);
            }
            let f = n.as_f64()?;
            if f.is_finite() && f.abs() < i64::MAX as f64 {
                Some(f.trunc() as i64)
            } else {
                None
            }
        }
        Value::String(s) => parse_leading_int(s),
        _ => None,
    }
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (neg, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let n: i64 = rest[..digits].parse().ok()?;
    Some(if neg { -n } else { n })
}

/// String form of an identifier. Numbers keep their JSON rendering (`7` -> `"7"`).
pub fn id_string(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyDefinition {
    pub id: String,
    /// `None` when the source value could not be read as an integer; such a survey
    /// never wins a selection.
    pub priority: Option<i64>,
    /// Sampling threshold; 0 when the source value was unreadable.
    pub percentage: i64,
    /// 0 means a session-scoped quarantine.
    pub quarantine_days: u32,
    /// Host-only fields (display name, template key, delay, ...). Never interpreted here.
    #[serde(flatten)]
    pub passthrough: Map<String, Value>,
}

impl SurveyDefinition {
    pub fn new(id: impl Into<String>, priority: i64, percentage: i64, quarantine_days: u32) -> Self {
        Self {
            id: id.into(),
            priority: Some(priority),
            percentage,
            quarantine_days,
            passthrough: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.passthrough.insert(key.into(), value);
        self
    }

    /// Build a definition from a loosely typed JSON object.
    ///
    /// `id` overrides any `id` key inside the object (registry documents keyed by id).
    pub fn from_value(id: &str, value: &Value) -> Result<Self, RegistryError> {
        let obj = value.as_object().ok_or_else(|| RegistryError::NotAnObject {
            id: id.to_string(),
        })?;

        let mut passthrough = Map::new();
        let mut priority = None;
        let mut percentage = 0;
        let mut quarantine_days = 0;

        for (k, v) in obj {
            match k.as_str() {
                "id" => {}
                "priority" => priority = coerce_int(v),
                "percentage" => percentage = coerce_int(v).unwrap_or(0),
                "quarantineDays" => {
                    quarantine_days = coerce_int(v)
                        .map(|d| d.clamp(0, u32::MAX as i64) as u32)
                        .unwrap_or(0)
                }
                _ => {
                    passthrough.insert(k.clone(), v.clone());
                }
            }
        }

        Ok(Self {
            id: id.to_string(),
            priority,
            percentage,
            quarantine_days,
            passthrough,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.passthrough.get("name").and_then(Value::as_str)
    }

    pub fn template(&self) -> Option<&str> {
        self.passthrough.get("template").and_then(Value::as_str)
    }

    pub fn delay(&self) -> Option<&Value> {
        self.passthrough.get("delay")
    }
}

/// Identifier -> definition. Replaced wholesale by the host; read-only once installed.
#[derive(Clone, Debug, Default)]
pub struct SurveyRegistry {
    surveys: HashMap<String, SurveyDefinition>,
}

impl SurveyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions<I>(defs: I) -> Self
    where
        I: IntoIterator<Item = SurveyDefinition>,
    {
        let mut reg = Self::new();
        for d in defs {
            reg.insert(d);
        }
        reg
    }

    /// Accepts either `{ "<id>": {...}, ... }` or `[ {"id": ..., ...}, ... ]`.
    pub fn from_json_value(doc: &Value) -> Result<Self, RegistryError> {
        let mut reg = Self::new();
        match doc {
            Value::Object(map) => {
                for (id, v) in map {
                    let id = id.trim();
                    if id.is_empty() {
                        return Err(RegistryError::MissingId);
                    }
                    reg.insert(SurveyDefinition::from_value(id, v)?);
                }
            }
            Value::Array(items) => {
                for v in items {
                    let id = v
                        .get("id")
                        .and_then(id_string)
                        .ok_or(RegistryError::MissingId)?;
                    reg.insert(SurveyDefinition::from_value(&id, v)?);
                }
            }
            _ => return Err(RegistryError::UnsupportedShape),
        }
        Ok(reg)
    }

    pub fn insert(&mut self, def: SurveyDefinition) -> Option<SurveyDefinition> {
        self.surveys.insert(def.id.clone(), def)
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&SurveyDefinition> {
        self.surveys.get(id)
    }

    pub fn len(&self) -> usize {
        self.surveys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surveys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SurveyDefinition> {
        self.surveys.values()
    }
}
