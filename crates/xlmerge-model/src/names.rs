use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CellRef, Range};

fn is_false(v: &bool) -> bool {
    !*v
}

/// A workbook- or sheet-scoped defined name (named range / constant / formula).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefinedName {
    pub name: String,
    /// XLSX `localSheetId` (0-based sheet position) for sheet-scoped names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_sheet_id: Option<u32>,
    /// Definition formula, stored **without** leading `=`.
    pub refers_to: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl DefinedName {
    pub fn new(name: impl Into<String>, refers_to: impl Into<String>) -> Self {
        let refers_to = refers_to.into();
        let refers_to = refers_to
            .strip_prefix('=')
            .map(str::to_string)
            .unwrap_or(refers_to);
        Self {
            name: name.into(),
            local_sheet_id: None,
            refers_to,
            hidden: false,
            comment: None,
        }
    }

    pub fn refers_to(&self) -> &str {
        &self.refers_to
    }

    pub fn set_refers_to(&mut self, refers_to: impl Into<String>) {
        let refers_to = refers_to.into();
        self.refers_to = match refers_to.strip_prefix('=') {
            Some(rest) => rest.to_string(),
            None => refers_to,
        };
    }

    /// The single rectangular area this name points at, if it is one.
    pub fn area(&self) -> Option<AreaRef> {
        AreaRef::parse(&self.refers_to).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AreaRefParseError {
    #[error("empty area reference")]
    Empty,
    #[error("unterminated quoted sheet name in `{0}`")]
    UnterminatedSheetName(String),
    #[error("`{0}` is not a single area reference")]
    NotAnArea(String),
}

/// A sheet-qualified rectangular area such as `'Sales 2024'!$A$1:$C$9`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AreaRef {
    /// Unquoted sheet name, if the reference is qualified.
    pub sheet: Option<String>,
    pub range: Range,
}

impl AreaRef {
    pub fn new(sheet: Option<String>, range: Range) -> Self {
        Self { sheet, range }
    }

    pub fn parse(text: &str) -> Result<Self, AreaRefParseError> {
        let s = text.trim();
        let s = s.strip_prefix('=').unwrap_or(s);
        if s.is_empty() {
            return Err(AreaRefParseError::Empty);
        }

        let (sheet, rest) = if let Some(quoted) = s.strip_prefix('\'') {
            let mut name = String::new();
            let mut chars = quoted.char_indices();
            let mut end = None;
            while let Some((idx, ch)) = chars.next() {
                if ch == '\'' {
                    if quoted[idx + 1..].starts_with('\'') {
                        name.push('\'');
                        chars.next();
                        continue;
                    }
                    end = Some(idx + 1);
                    break;
                }
                name.push(ch);
            }
            let end = end.ok_or_else(|| AreaRefParseError::UnterminatedSheetName(s.to_string()))?;
            let rest = quoted[end..]
                .strip_prefix('!')
                .ok_or_else(|| AreaRefParseError::NotAnArea(s.to_string()))?;
            (Some(name), rest)
        } else {
            match s.split_once('!') {
                Some((sheet, rest)) => (Some(sheet.to_string()), rest),
                None => (None, s),
            }
        };

        let range =
            Range::from_a1(rest).map_err(|_| AreaRefParseError::NotAnArea(s.to_string()))?;
        Ok(Self { sheet, range })
    }

    /// Returns true when the reference is qualified with `sheet_name` (case-insensitive, the
    /// way spreadsheet applications compare sheet names).
    pub fn is_on_sheet(&self, sheet_name: &str) -> bool {
        self.sheet
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(sheet_name))
    }
}

impl fmt::Display for AreaRef {
    /// Formats as an absolute reference, quoting the sheet name where required.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}!", quote_sheet_name(sheet))?;
        }
        if self.range.is_single_cell() {
            f.write_str(&self.range.start.to_absolute_a1())
        } else {
            write!(
                f,
                "{}:{}",
                self.range.start.to_absolute_a1(),
                self.range.end.to_absolute_a1()
            )
        }
    }
}

/// Quote a sheet name for use in a formula when it is not a plain identifier.
pub fn quote_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && !name.as_bytes()[0].is_ascii_digit()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && CellRef::from_a1(name).is_err();
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_quoted_and_plain_areas() {
        let area = AreaRef::parse("'My ''Data'''!$A$2:$C$4").unwrap();
        assert_eq!(area.sheet.as_deref(), Some("My 'Data'"));
        assert_eq!(area.range, Range::from_a1("A2:C4").unwrap());

        let area = AreaRef::parse("=Sheet1!B3").unwrap();
        assert!(area.is_on_sheet("sheet1"));
        assert_eq!(area.to_string(), "Sheet1!$B$3");

        assert!(AreaRef::parse("SUM(Sheet1!A1:A3)").is_err());
        assert!(AreaRef::parse("Sheet1!$A$1,Sheet1!$B$1").is_err());
    }

    #[test]
    fn formats_with_quoting_only_when_needed() {
        let area = AreaRef::new(Some("Q3 Report".into()), Range::from_a1("A1:B9").unwrap());
        assert_eq!(area.to_string(), "'Q3 Report'!$A$1:$B$9");
        assert_eq!(quote_sheet_name("Data_1"), "Data_1");
        assert_eq!(quote_sheet_name("2024"), "'2024'");
        assert_eq!(quote_sheet_name("AB12"), "'AB12'");
    }
}
