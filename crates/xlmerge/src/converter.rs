//! Writing data values into template cells.
//!
//! A converter receives the cell that holds a placeholder, the placeholder text it matched and
//! the value to write. When the cell text is exactly the placeholder, typed converters store a
//! typed value (number, boolean, date serial). Otherwise every occurrence of the placeholder
//! inside the text is replaced with a rendered string.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use xlmerge_model::{CellRef, CellValue, Color, Row, StyleTable};

use crate::error::{ConvertError, Mismatch};
use crate::value::Value;

pub const DEFAULT_DATE_FORMAT: &str = "%d.%m.%Y";
pub const DEFAULT_DATETIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Day number of 1899-12-30 counted from 0001-01-01 (day 1). Excel serial 0.
const EXCEL_EPOCH_DAYS_FROM_CE: i32 = 693_594;

/// The cell a converter writes to, with access to its row and the workbook styles.
pub struct CellSlot<'a> {
    row: &'a mut Row,
    row_index: u32,
    col: u32,
    styles: &'a mut StyleTable,
}

impl<'a> CellSlot<'a> {
    pub fn new(row: &'a mut Row, row_index: u32, col: u32, styles: &'a mut StyleTable) -> Self {
        Self {
            row,
            row_index,
            col,
            styles,
        }
    }

    pub fn cell_ref(&self) -> CellRef {
        CellRef::new(self.row_index, self.col)
    }

    /// Current text of the cell; empty for anything but a plain string cell.
    pub fn text(&self) -> &str {
        self.row
            .cell(self.col)
            .and_then(|c| c.string_value())
            .unwrap_or("")
    }

    /// True when the cell text is exactly `pattern`.
    pub fn is_whole(&self, pattern: &str) -> bool {
        self.text() == pattern
    }

    /// Replace every occurrence of `pattern` in the cell text.
    pub fn replace(&mut self, pattern: &str, with: &str) {
        let text = self.text().replace(pattern, with);
        self.set_value(CellValue::String(text));
    }

    /// Store `value`, keeping the cell style.
    pub fn set_value(&mut self, value: CellValue) {
        self.row.get_or_create_cell(self.col).set_value(value);
    }

    /// Recolour the cell on top of its current style.
    pub fn recolor(&mut self, fill: Option<Color>, font_color: Option<Color>) {
        let cell = self.row.get_or_create_cell(self.col);
        cell.style_id = self.styles.derive(cell.style_id, fill, font_color);
    }

    pub fn set_auto_height(&mut self) {
        self.row.set_auto_height();
    }
}

type ConvertFn = dyn Fn(&mut CellSlot<'_>, &str, &Value) -> Result<(), Mismatch> + Send + Sync;

/// A shared value-to-cell writer.
#[derive(Clone)]
pub struct Converter(Arc<ConvertFn>);

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Converter")
    }
}

impl Converter {
    /// A converter from a closure taking the cell, the matched placeholder text and the value.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&mut CellSlot<'_>, &str, &Value) -> Result<(), Mismatch> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(
        &self,
        slot: &mut CellSlot<'_>,
        pattern: &str,
        value: &Value,
    ) -> Result<(), ConvertError> {
        (self.0)(slot, pattern, value).map_err(|source| {
            let cell = slot.cell_ref();
            ConvertError {
                row: cell.row,
                col: cell.col,
                pattern: pattern.to_string(),
                value: format!("{value:?}"),
                source,
            }
        })
    }

    pub fn noop() -> Self {
        Self::custom(|_, _, _| Ok(()))
    }

    pub fn string() -> Self {
        Self::custom(|slot, pattern, value| {
            let text = match value {
                Value::Null => "",
                Value::String(s) => s.as_str(),
                other => return Err(mismatch("string", other)),
            };
            slot.replace(pattern, text);
            Ok(())
        })
    }

    pub fn integer() -> Self {
        Self::custom(|slot, pattern, value| match value {
            Value::Integer(n) => {
                write_number(slot, pattern, *n as f64, &n.to_string());
                Ok(())
            }
            Value::Null => {
                write_null(slot, pattern);
                Ok(())
            }
            other => Err(mismatch("integer", other)),
        })
    }

    pub fn number() -> Self {
        Self::custom(|slot, pattern, value| {
            let n = match value {
                Value::Number(n) => *n,
                Value::Integer(n) => *n as f64,
                Value::Null => {
                    write_null(slot, pattern);
                    return Ok(());
                }
                other => return Err(mismatch("number", other)),
            };
            if !n.is_finite() {
                return Err(Mismatch {
                    expected: "finite number",
                    found: "number",
                });
            }
            write_number(slot, pattern, n, &render_number(n));
            Ok(())
        })
    }

    /// Percent values given as `12.5` for 12.5%. A whole cell stores the fraction, so the
    /// template's percent number format displays it.
    pub fn percent() -> Self {
        Self::custom(|slot, pattern, value| {
            let n = match value {
                Value::Number(n) => *n,
                Value::Integer(n) => *n as f64,
                Value::Null => {
                    write_null(slot, pattern);
                    return Ok(());
                }
                other => return Err(mismatch("number", other)),
            };
            if !n.is_finite() {
                return Err(Mismatch {
                    expected: "finite number",
                    found: "number",
                });
            }
            if slot.is_whole(pattern) {
                slot.set_value(CellValue::Number(round_half_up(n / 100.0, 6)));
            } else {
                slot.replace(pattern, &format!("{}%", render_number(n)));
            }
            Ok(())
        })
    }

    pub fn boolean() -> Self {
        Self::custom(|slot, pattern, value| {
            let b = match value {
                Value::Boolean(b) => *b,
                Value::Null => false,
                other => return Err(mismatch("boolean", other)),
            };
            if slot.is_whole(pattern) {
                slot.set_value(CellValue::Boolean(b));
            } else {
                slot.replace(pattern, if b { "true" } else { "false" });
            }
            Ok(())
        })
    }

    /// `X` for true, nothing otherwise.
    pub fn boolean_x() -> Self {
        Self::custom(|slot, pattern, value| {
            let b = match value {
                Value::Boolean(b) => *b,
                Value::Null => false,
                other => return Err(mismatch("boolean", other)),
            };
            slot.replace(pattern, if b { "X" } else { "" });
            Ok(())
        })
    }

    pub fn date(format: impl Into<String>) -> Self {
        let format = format.into();
        Self::custom(move |slot, pattern, value| match value {
            Value::Date(date) => {
                if slot.is_whole(pattern) {
                    slot.set_value(CellValue::Number(date_serial(*date)));
                } else {
                    slot.replace(pattern, &render_chrono(date.format(&format))?);
                }
                Ok(())
            }
            Value::Null => {
                write_null(slot, pattern);
                Ok(())
            }
            other => Err(mismatch("date", other)),
        })
    }

    pub fn default_date() -> Self {
        Self::date(DEFAULT_DATE_FORMAT)
    }

    /// Date-time values; plain dates are written as midnight.
    pub fn datetime(format: impl Into<String>) -> Self {
        let format = format.into();
        Self::custom(move |slot, pattern, value| {
            let at = match value {
                Value::DateTime(at) => *at,
                Value::Date(date) => date.and_time(NaiveTime::default()),
                Value::Null => {
                    write_null(slot, pattern);
                    return Ok(());
                }
                other => return Err(mismatch("date-time", other)),
            };
            if slot.is_whole(pattern) {
                slot.set_value(CellValue::Number(datetime_serial(at)));
            } else {
                slot.replace(pattern, &render_chrono(at.format(&format))?);
            }
            Ok(())
        })
    }

    pub fn default_datetime() -> Self {
        Self::datetime(DEFAULT_DATETIME_FORMAT)
    }

    /// Text with optional fill and font colours. Plain strings are accepted too.
    pub fn colored_string() -> Self {
        Self::custom(|slot, pattern, value| match value {
            Value::Null => Ok(()),
            Value::String(s) => {
                slot.replace(pattern, s);
                Ok(())
            }
            Value::ColoredString(colored) => {
                slot.replace(pattern, &colored.value);
                if colored.fill.is_some() || colored.font_color.is_some() {
                    slot.recolor(colored.fill, colored.font_color);
                }
                Ok(())
            }
            other => Err(mismatch("coloured string", other)),
        })
    }

    /// Clears the placeholder and fills the cell with `color` when the value is true.
    pub fn cell_coloring(color: Color) -> Self {
        Self::custom(move |slot, pattern, value| {
            let paint = match value {
                Value::Boolean(b) => *b,
                Value::Null => false,
                other => return Err(mismatch("boolean", other)),
            };
            slot.replace(pattern, "");
            if paint {
                slot.recolor(Some(color), None);
            }
            Ok(())
        })
    }

    /// Marks the row for automatic height, then runs `inner`.
    pub fn auto_height(inner: Converter) -> Self {
        Self::custom(move |slot, pattern, value| {
            slot.set_auto_height();
            (inner.0)(slot, pattern, value)
        })
    }
}

fn mismatch(expected: &'static str, value: &Value) -> Mismatch {
    Mismatch {
        expected,
        found: value.type_name(),
    }
}

/// Renders a chrono format, reporting patterns chrono cannot interpret instead of panicking.
fn render_chrono(formatted: impl fmt::Display) -> Result<String, Mismatch> {
    let mut out = String::new();
    write!(out, "{formatted}").map_err(|_| Mismatch {
        expected: "valid date format",
        found: "date",
    })?;
    Ok(out)
}

/// Significant digits shown for numbers rendered into text, as Excel displays them.
const RENDERED_DIGITS: i32 = 15;

/// Decimal text for `n` rounded to 15 significant digits, without trailing zeros.
fn render_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs().log10().floor() as i32;
    let decimals = (RENDERED_DIGITS - 1 - magnitude).clamp(0, 17) as usize;
    let mut text = format!("{n:.decimals$}");
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

fn write_number(slot: &mut CellSlot<'_>, pattern: &str, n: f64, rendered: &str) {
    if slot.is_whole(pattern) {
        slot.set_value(CellValue::Number(n));
    } else {
        slot.replace(pattern, rendered);
    }
}

fn write_null(slot: &mut CellSlot<'_>, pattern: &str) {
    slot.replace(pattern, "");
}

fn round_half_up(n: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (n * scale).round() / scale
}

/// Excel serial number of a date in the 1900 date system.
pub fn date_serial(date: NaiveDate) -> f64 {
    use chrono::Datelike;
    f64::from(date.num_days_from_ce() - EXCEL_EPOCH_DAYS_FROM_CE)
}

pub fn datetime_serial(at: NaiveDateTime) -> f64 {
    let time = at.time();
    let seconds = f64::from(time.num_seconds_from_midnight())
        + f64::from(time.nanosecond()) / 1_000_000_000.0;
    date_serial(at.date()) + seconds / 86_400.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StringColorCell;
    use pretty_assertions::assert_eq;
    use xlmerge_model::Cell;

    fn run(converter: &Converter, text: &str, pattern: &str, value: Value) -> (Row, StyleTable) {
        let mut row = Row::new();
        row.set_cell(2, Cell::new(CellValue::from(text)).with_style(1));
        row.height = Some(20.0);
        let mut styles = StyleTable::new(2);
        let mut slot = CellSlot::new(&mut row, 4, 2, &mut styles);
        converter.apply(&mut slot, pattern, &value).unwrap();
        (row, styles)
    }

    fn value_of(row: &Row) -> CellValue {
        row.cell(2).map(|c| c.value.clone()).unwrap_or_default()
    }

    #[test]
    fn typed_values_fill_whole_cells() {
        let (row, _) = run(&Converter::integer(), "{qty}", "{qty}", Value::Integer(42));
        assert_eq!(value_of(&row), CellValue::Number(42.0));
        assert_eq!(row.cell(2).map(|c| c.style_id), Some(1));

        let (row, _) = run(&Converter::boolean(), "{ok}", "{ok}", Value::Null);
        assert_eq!(value_of(&row), CellValue::Boolean(false));

        let (row, _) = run(&Converter::percent(), "{p}", "{p}", Value::Number(12.3456789));
        assert_eq!(value_of(&row), CellValue::Number(0.123457));

        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let (row, _) = run(&Converter::default_date(), "{d}", "{d}", Value::Date(date));
        assert_eq!(value_of(&row), CellValue::Number(45306.0));
    }

    #[test]
    fn partial_cells_get_rendered_text() {
        let (row, _) = run(&Converter::number(), "Total: {sum} EUR", "{sum}", Value::Number(12.5));
        assert_eq!(value_of(&row), CellValue::from("Total: 12.5 EUR"));

        let (row, _) = run(&Converter::percent(), "{p} done", "{p}", Value::Integer(80));
        assert_eq!(value_of(&row), CellValue::from("80% done"));

        let (row, _) = run(&Converter::integer(), "n={n}", "{n}", Value::Null);
        assert_eq!(value_of(&row), CellValue::from("n="));

        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap();
        let (row, _) = run(&Converter::default_datetime(), "at {t}", "{t}", Value::DateTime(at));
        assert_eq!(value_of(&row), CellValue::from("at 09.03.2024 18:30:00"));

        let (row, _) = run(&Converter::boolean_x(), "[{b}]", "{b}", Value::Boolean(true));
        assert_eq!(value_of(&row), CellValue::from("[X]"));
    }

    #[test]
    fn rendered_numbers_hide_binary_noise() {
        let (row, _) = run(&Converter::number(), "= {x}", "{x}", Value::Number(0.1 + 0.2));
        assert_eq!(value_of(&row), CellValue::from("= 0.3"));

        let (row, _) = run(&Converter::number(), "{x} m", "{x}", Value::Number(-1234.5));
        assert_eq!(value_of(&row), CellValue::from("-1234.5 m"));

        let (row, _) = run(&Converter::number(), "{x} m", "{x}", Value::Number(1e20));
        assert_eq!(value_of(&row), CellValue::from("100000000000000000000 m"));

        let (row, _) = run(&Converter::percent(), "{p} off", "{p}", Value::Number(1.1 * 3.0));
        assert_eq!(value_of(&row), CellValue::from("3.3% off"));
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let mut row = Row::new();
        row.set_cell(0, Cell::new(CellValue::from("{x}")));
        let mut styles = StyleTable::new(1);
        let mut slot = CellSlot::new(&mut row, 0, 0, &mut styles);
        let err = Converter::number()
            .apply(&mut slot, "{x}", &Value::Number(f64::NAN))
            .unwrap_err();
        assert_eq!(err.source.expected, "finite number");
        assert_eq!(row.cell(0).map(|c| c.value.clone()), Some(CellValue::from("{x}")));
    }

    #[test]
    fn unknown_date_format_is_an_error() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let mut row = Row::new();
        row.set_cell(0, Cell::new(CellValue::from("on {d}")));
        let mut styles = StyleTable::new(1);
        let mut slot = CellSlot::new(&mut row, 3, 0, &mut styles);
        let err = Converter::date("%Q")
            .apply(&mut slot, "{d}", &Value::Date(date))
            .unwrap_err();
        assert_eq!(err.source.expected, "valid date format");
        assert_eq!(err.row, 3);

        let mut slot = CellSlot::new(&mut row, 3, 0, &mut styles);
        let at = date.and_hms_opt(8, 0, 0).unwrap();
        assert!(Converter::datetime("%Y %Q")
            .apply(&mut slot, "{d}", &Value::DateTime(at))
            .is_err());
    }

    #[test]
    fn datetime_serial_carries_the_time_of_day() {
        let at = NaiveDate::from_ymd_opt(1900, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(datetime_serial(at), 61.5);
    }

    #[test]
    fn colours_derive_styles() {
        let red = Color::rgb(0xFF, 0, 0);
        let value = StringColorCell::new("late").with_fill(red);
        let (row, styles) = run(&Converter::colored_string(), "{s}", "{s}", value.into());
        assert_eq!(value_of(&row), CellValue::from("late"));
        assert_eq!(row.cell(2).map(|c| c.style_id), Some(2));
        assert_eq!(styles.derived().len(), 1);

        let (row, styles) = run(&Converter::cell_coloring(red), "{flag}", "{flag}", false.into());
        assert_eq!(value_of(&row), CellValue::from(""));
        assert!(styles.derived().is_empty());
    }

    #[test]
    fn auto_height_marks_the_row() {
        let converter = Converter::auto_height(Converter::string());
        let (row, _) = run(&converter, "{note}", "{note}", "long text".into());
        assert_eq!(row.height, None);
        assert_eq!(value_of(&row), CellValue::from("long text"));
    }

    #[test]
    fn wrong_variant_reports_the_location() {
        let mut row = Row::new();
        row.set_cell(1, Cell::new(CellValue::from("{qty}")));
        let mut styles = StyleTable::new(1);
        let mut slot = CellSlot::new(&mut row, 7, 1, &mut styles);
        let err = Converter::integer()
            .apply(&mut slot, "{qty}", &Value::from("many"))
            .unwrap_err();
        assert_eq!((err.row, err.col), (7, 1));
        assert_eq!(err.pattern, "{qty}");
        assert_eq!(err.source.found, "string");
    }
}
