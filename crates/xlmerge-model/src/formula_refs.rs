//! Lexical scanning of A1 cell references inside formula text.
//!
//! This is not a formula parser. It recognises just enough structure to find cell reference
//! tokens and leave everything else byte-for-byte intact:
//!
//! - `"..."` string literals (with `""` escapes) are skipped
//! - `'quoted sheet'!` and `Sheet1!` prefixes qualify the reference that follows; the qualifier
//!   carries across `:` so both ends of `Sheet1!A1:B2` see it
//! - identifiers followed by `(` are function names
//! - `[...]` structured/external reference parts and `#ERROR!` literals are skipped
//! - a reference token must be exactly `$?[A-Za-z]{1,3}$?[0-9]+` within the grid bounds, so
//!   `A1B1` or `LOG10(` are never touched

use crate::address::{col_to_name, name_to_col};
use crate::cell::EXCEL_MAX_ROWS;
use crate::CellRef;

/// A cell reference found in a formula.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellToken {
    /// Unquoted sheet qualifier, if any.
    pub sheet: Option<String>,
    pub cell: CellRef,
    pub col_absolute: bool,
    pub row_absolute: bool,
}

impl CellToken {
    /// True when the token is unqualified or qualified with `sheet_name`.
    pub fn targets_sheet(&self, sheet_name: &str) -> bool {
        self.sheet
            .as_deref()
            .map_or(true, |s| s.eq_ignore_ascii_case(sheet_name))
    }

    fn render_a1(&self) -> String {
        let mut out = String::with_capacity(8);
        if self.col_absolute {
            out.push('$');
        }
        out.push_str(&col_to_name(self.cell.col));
        if self.row_absolute {
            out.push('$');
        }
        out.push_str(&(self.cell.row + 1).to_string());
        out
    }
}

fn parse_a1_token(token: &str) -> Option<(CellRef, bool, bool)> {
    let bytes = token.as_bytes();
    let mut idx = 0;
    let col_absolute = bytes.first() == Some(&b'$');
    if col_absolute {
        idx += 1;
    }
    let col_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
        idx += 1;
    }
    if idx == col_start || idx - col_start > 3 {
        return None;
    }
    let col = name_to_col(&token[col_start..idx]).ok()?;
    let row_absolute = bytes.get(idx) == Some(&b'$');
    if row_absolute {
        idx += 1;
    }
    let row_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == row_start || idx != bytes.len() {
        return None;
    }
    let row: u32 = token[row_start..].parse().ok()?;
    if row == 0 || row > EXCEL_MAX_ROWS {
        return None;
    }
    Some((CellRef::new(row - 1, col), col_absolute, row_absolute))
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'$' | b'_' | b'.' | b'\\')
}

/// Visit every cell reference in `formula`, letting `f` modify it in place.
///
/// Tokens that `f` leaves unchanged are copied verbatim; modified tokens are re-rendered
/// keeping their `$` anchors. The sheet qualifier text is never rewritten.
pub fn rewrite_cell_refs<F>(formula: &str, mut f: F) -> String
where
    F: FnMut(&mut CellToken),
{
    let bytes = formula.as_bytes();
    let mut out = String::with_capacity(formula.len());
    let mut copied = 0usize;
    let mut i = 0usize;
    let mut pending_sheet: Option<String> = None;
    let mut range_sheet: Option<String> = None;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'"' {
                        if bytes.get(i + 1) == Some(&b'"') {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
                pending_sheet = None;
                range_sheet = None;
            }
            b'\'' => {
                let mut name = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < bytes.len() {
                    if bytes[j] == b'\'' {
                        if bytes.get(j + 1) == Some(&b'\'') {
                            name.push('\'');
                            j += 2;
                            continue;
                        }
                        closed = true;
                        break;
                    }
                    // Non-ASCII bytes are copied through the `char` boundary below.
                    let ch_len = utf8_len(bytes[j]);
                    name.push_str(&formula[j..j + ch_len]);
                    j += ch_len;
                }
                if closed && bytes.get(j + 1) == Some(&b'!') {
                    pending_sheet = Some(name);
                    i = j + 2;
                } else {
                    pending_sheet = None;
                    i = if closed { j + 1 } else { bytes.len() };
                }
                range_sheet = None;
            }
            b'[' => {
                let mut depth = 0usize;
                while i < bytes.len() {
                    match bytes[i] {
                        b'[' => depth += 1,
                        b']' => {
                            depth -= 1;
                            if depth == 0 {
                                i += 1;
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                pending_sheet = None;
                range_sheet = None;
            }
            b'#' => {
                i += 1;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'/' | b'!' | b'?' | b'_'))
                {
                    i += 1;
                }
                pending_sheet = None;
                range_sheet = None;
            }
            _ if is_ident_byte(b) => {
                let start = i;
                let mut end = i;
                while end < bytes.len() && is_ident_byte(bytes[end]) {
                    end += 1;
                }
                let token = &formula[start..end];
                let next = bytes.get(end).copied();
                i = end;

                if next == Some(b'!') {
                    pending_sheet = Some(token.to_string());
                    range_sheet = None;
                    i = end + 1;
                    continue;
                }
                if next == Some(b'(') || b.is_ascii_digit() {
                    pending_sheet = None;
                    range_sheet = None;
                    continue;
                }

                match parse_a1_token(token) {
                    Some((cell, col_absolute, row_absolute)) => {
                        let sheet = pending_sheet.take().or_else(|| range_sheet.take());
                        let original = CellToken {
                            sheet,
                            cell,
                            col_absolute,
                            row_absolute,
                        };
                        let mut token_ref = original.clone();
                        f(&mut token_ref);
                        if token_ref.cell != original.cell
                            || token_ref.col_absolute != original.col_absolute
                            || token_ref.row_absolute != original.row_absolute
                        {
                            out.push_str(&formula[copied..start]);
                            out.push_str(&token_ref.render_a1());
                            copied = end;
                        }
                        range_sheet = if next == Some(b':') {
                            original.sheet
                        } else {
                            None
                        };
                    }
                    None => {
                        pending_sheet = None;
                        range_sheet = None;
                    }
                }
            }
            _ => {
                if b != b':' {
                    range_sheet = None;
                }
                pending_sheet = None;
                i += utf8_len(b);
            }
        }
    }

    out.push_str(&formula[copied..]);
    out
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

/// Collect every reference in `formula` without modifying it.
pub fn cell_refs(formula: &str) -> Vec<CellToken> {
    let mut found = Vec::new();
    rewrite_cell_refs(formula, |token| found.push(token.clone()));
    found
}

/// Move the relative parts of every reference by `(drow, dcol)`.
///
/// This is how a shared formula's master text is expanded for the other cells of its range.
/// Components that would leave the grid are kept as they were.
pub fn offset_relative_refs(formula: &str, drow: i64, dcol: i64) -> String {
    rewrite_cell_refs(formula, |token| {
        if !token.row_absolute {
            let row = i64::from(token.cell.row) + drow;
            if (0..i64::from(EXCEL_MAX_ROWS)).contains(&row) {
                token.cell.row = row as u32;
            }
        }
        if !token.col_absolute {
            let col = i64::from(token.cell.col) + dcol;
            if (0..i64::from(crate::cell::EXCEL_MAX_COLS)).contains(&col) {
                token.cell.col = col as u32;
            }
        }
    })
}

/// Move references to rows `first..=last` of `sheet_name` down by `n` rows.
///
/// `formula_on_sheet` tells whether the formula itself lives on `sheet_name`, in which case
/// unqualified references count too. Both anchored and relative references move: this is a
/// structural edit, not a copy.
pub fn shift_row_refs(
    formula: &str,
    sheet_name: &str,
    formula_on_sheet: bool,
    first: u32,
    last: u32,
    n: u32,
) -> String {
    rewrite_cell_refs(formula, |token| {
        let applies = match token.sheet.as_deref() {
            Some(sheet) => sheet.eq_ignore_ascii_case(sheet_name),
            None => formula_on_sheet,
        };
        if applies && token.cell.row >= first && token.cell.row <= last {
            let row = token.cell.row.saturating_add(n);
            if row < EXCEL_MAX_ROWS {
                token.cell.row = row;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows_plus(formula: &str, n: u32) -> String {
        rewrite_cell_refs(formula, |t| t.cell.row += n)
    }

    #[test]
    fn skips_strings_functions_and_malformed_tokens() {
        assert_eq!(rows_plus("SUM(A1:B1)", 1), "SUM(A2:B2)");
        assert_eq!(rows_plus("LOG10(A1)", 1), "LOG10(A2)");
        assert_eq!(rows_plus("A1B1+1.5E3", 1), "A1B1+1.5E3");
        assert_eq!(rows_plus("CONCAT(A1; \"A1\")", 1), "CONCAT(A2; \"A1\")");
        assert_eq!(rows_plus("\"say \"\"A1\"\"\"&B2", 1), "\"say \"\"A1\"\"\"&B3");
        assert_eq!(rows_plus("Table1[[#This Row],[A1]]", 1), "Table1[[#This Row],[A1]]");
        assert_eq!(rows_plus("IF(ISERROR(#REF!),0,C3)", 1), "IF(ISERROR(#REF!),0,C4)");
    }

    #[test]
    fn keeps_anchor_markers() {
        assert_eq!(rows_plus("$A$1+A$1+$A1", 2), "$A$3+A$3+$A3");
    }

    #[test]
    fn sheet_qualifier_carries_across_range_colon() {
        let refs = cell_refs("SUM('Q1 Data'!A1:B2)+Other!C3+D4");
        let sheets: Vec<_> = refs.iter().map(|t| t.sheet.as_deref()).collect();
        assert_eq!(
            sheets,
            vec![Some("Q1 Data"), Some("Q1 Data"), Some("Other"), None]
        );
    }

    #[test]
    fn shared_formula_offsets_only_relative_parts() {
        assert_eq!(offset_relative_refs("A1*$B$1+C$2", 3, 1), "B4*$B$1+D$2");
        assert_eq!(offset_relative_refs("A1", -1, 0), "A1");
    }

    #[test]
    fn row_shift_respects_sheet_scope() {
        let on_sheet = shift_row_refs("A2+Data!A2+Other!A2", "Data", true, 1, 10, 5);
        assert_eq!(on_sheet, "A7+Data!A7+Other!A2");
        let elsewhere = shift_row_refs("A2+Data!A2", "Data", false, 1, 10, 5);
        assert_eq!(elsewhere, "A2+Data!A7");
    }
}
