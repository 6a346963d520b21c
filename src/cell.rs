use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Content of a single worksheet cell as the spreadsheet client reports it.
///
/// The client sends empty cells either as `null` or as `""`; both decode to
/// [`CellValue::Empty`]. On the way out `Empty` is written as `""`, which the
/// client interprets as "clear this cell".
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text form of the value, `None` for empty cells.
    ///
    /// Integral numbers are rendered without a fractional part so that an
    /// identifier typed as `1234` round-trips as `"1234"` rather than `"1234.0"`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) if s.trim().is_empty() => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            CellValue::Number(n) => Some(format_number(*n)),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Binary coercion used for flag columns.
    ///
    /// `1`, `true`, `"1"`, `"true"` and `"yes"` (any case) map to 1. Every
    /// other value, including an empty cell, maps to 0.
    pub fn as_flag(&self) -> i64 {
        let truthy = match self {
            CellValue::Bool(b) => *b,
            CellValue::Number(n) => *n == 1.0,
            CellValue::Text(s) => {
                let s = s.trim().to_ascii_lowercase();
                s == "1" || s == "true" || s == "yes"
            }
            CellValue::Empty => false,
        };
        i64::from(truthy)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text().unwrap_or_default())
    }
}

impl From<Value> for CellValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CellValue::Empty,
            Value::Bool(b) => CellValue::Bool(b),
            Value::Number(n) => n.as_f64().map_or(CellValue::Empty, CellValue::Number),
            Value::String(s) => CellValue::text(s),
            // Nested structures never appear in a value grid; keep their text
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl From<CellValue> for Value {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Empty => Value::String(String::new()),
            CellValue::Bool(b) => Value::Bool(b),
            CellValue::Number(n) => serde_json::Number::from_f64(n)
                .map_or(Value::String(String::new()), Value::Number),
            CellValue::Text(s) => Value::String(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::text(s)
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}
