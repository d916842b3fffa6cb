use serde_json::Value;

/// Candidate identifiers as a host supplies them.
#[derive(Clone, Debug, PartialEq)]
pub enum Candidates {
    /// Comma-separated, e.g. `"A, B,C"`.
    Text(String),
    List(Vec<Value>),
    Scalar(Value),
}

impl Candidates {
    /// Ordered, trimmed, non-empty identifiers. Falsy input (empty text, `null`,
    /// `false`, `0`) yields nothing.
    pub fn normalize(&self) -> Vec<String> {
        match self {
            Candidates::Text(s) => split_ids(s),
            Candidates::List(items) => items.iter().filter_map(item_id).collect(),
            Candidates::Scalar(v) => {
                if is_falsy(v) {
                    Vec::new()
                } else if let Value::String(s) = v {
                    split_ids(s)
                } else {
                    item_id(v).into_iter().collect()
                }
            }
        }
    }
}

fn split_ids(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn item_id(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "true".to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn is_falsy(v: &Value) -> bool {
    match v {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64().map_or(false, |f| f == 0.0 || f.is_nan()),
        _ => false,
    }
}

impl From<&str> for Candidates {
    fn from(s: &str) -> Self {
        Candidates::Text(s.to_string())
    }
}

impl From<String> for Candidates {
    fn from(s: String) -> Self {
        Candidates::Text(s)
    }
}

impl From<&String> for Candidates {
    fn from(s: &String) -> Self {
        Candidates::Text(s.clone())
    }
}

impl From<Vec<String>> for Candidates {
    fn from(v: Vec<String>) -> Self {
        Candidates::List(v.into_iter().map(Value::String).collect())
    }
}

impl From<Vec<&str>> for Candidates {
    fn from(v: Vec<&str>) -> Self {
        Candidates::List(v.into_iter().map(|s| Value::String(s.to_string())).collect())
    }
}

impl From<&[&str]> for Candidates {
    fn from(v: &[&str]) -> Self {
        Candidates::List(v.iter().map(|s| Value::String(s.to_string())).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Candidates {
    fn from(v: [&str; N]) -> Self {
        Candidates::List(v.iter().map(|s| Value::String(s.to_string())).collect())
    }
}

impl From<Vec<Value>> for Candidates {
    fn from(v: Vec<Value>) -> Self {
        Candidates::List(v)
    }
}

impl From<Value> for Candidates {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => Candidates::Text(s),
            Value::Array(items) => Candidates::List(items),
            other => Candidates::Scalar(other),
        }
    }
}

impl From<i64> for Candidates {
    fn from(n: i64) -> Self {
        Candidates::Scalar(Value::from(n))
    }
}

impl From<u32> for Candidates {
    fn from(n: u32) -> Self {
        Candidates::Scalar(Value::from(n))
    }
}

impl<T: Into<Candidates>> From<Option<T>> for Candidates {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Candidates::Scalar(Value::Null))
    }
}
