use serde::{Deserialize, Serialize};
use std::fmt;

/// The stored (cached) value of a cell.
///
/// Uses an explicit `{type, value}` tagged layout so the model can be dumped as JSON in tests
/// and diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    /// Empty / unset cell value.
    #[default]
    Empty,
    /// IEEE-754 double precision number. Dates are stored as serial numbers.
    Number(f64),
    String(String),
    Boolean(bool),
    /// Excel error literal such as `#N/A` or `#REF!`.
    Error(String),
}

impl CellValue {
    /// Returns true if the value is [`CellValue::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::String(s) => f.write_str(s),
            CellValue::Boolean(true) => f.write_str("TRUE"),
            CellValue::Boolean(false) => f.write_str("FALSE"),
            CellValue::Error(e) => f.write_str(e),
        }
    }
}
