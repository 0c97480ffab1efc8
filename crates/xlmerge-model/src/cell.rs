use serde::{Deserialize, Serialize};

use crate::CellValue;

/// Excel-compatible maximum rows per worksheet (1,048,576).
pub const EXCEL_MAX_ROWS: u32 = 1_048_576;

/// Excel-compatible maximum columns per worksheet (16,384).
pub const EXCEL_MAX_COLS: u32 = 16_384;

/// A single cell: a cached value, an optional formula and a style index.
///
/// `formula` is stored without the leading `=`, matching SpreadsheetML `<f>` text. When a
/// formula is present, `value` holds the last cached result (possibly [`CellValue::Empty`]
/// after cached results have been cleared).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub value: CellValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Index into the workbook's `cellXfs` table (0 = default style).
    #[serde(default)]
    pub style_id: u32,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            formula: None,
            style_id: 0,
        }
    }

    pub fn with_style(mut self, style_id: u32) -> Self {
        self.style_id = style_id;
        self
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.set_formula(formula);
        self
    }

    /// The text of a plain string cell. Formula cells never count as string cells, even when
    /// their cached result is text.
    pub fn string_value(&self) -> Option<&str> {
        if self.formula.is_some() {
            return None;
        }
        self.value.as_str()
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }

    /// A cell with no value and no formula. It may still carry a style.
    pub fn is_blank(&self) -> bool {
        self.value.is_empty() && self.formula.is_none()
    }

    /// Replace the value and drop any formula.
    pub fn set_value(&mut self, value: impl Into<CellValue>) {
        self.value = value.into();
        self.formula = None;
    }

    pub fn set_blank(&mut self) {
        self.set_value(CellValue::Empty);
    }

    /// Set a formula; a leading `=` is stripped. The cached value is left alone.
    pub fn set_formula(&mut self, formula: impl Into<String>) {
        let formula = formula.into();
        let formula = match formula.strip_prefix('=') {
            Some(rest) => rest.to_string(),
            None => formula,
        };
        self.formula = Some(formula);
    }

    pub fn clear_cached_value(&mut self) {
        if self.formula.is_some() {
            self.value = CellValue::Empty;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_cells_are_not_string_cells() {
        let mut cell = Cell::new(CellValue::from("{name}"));
        assert_eq!(cell.string_value(), Some("{name}"));

        cell.set_formula("=A1&\"x\"");
        assert_eq!(cell.formula.as_deref(), Some("A1&\"x\""));
        assert_eq!(cell.string_value(), None);

        cell.set_value(3.0);
        assert!(!cell.is_formula());
        assert_eq!(cell.value.as_number(), Some(3.0));
    }
}
