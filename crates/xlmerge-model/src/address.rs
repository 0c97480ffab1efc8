use core::fmt;

use serde::{Deserialize, Serialize};

use crate::cell::{EXCEL_MAX_COLS, EXCEL_MAX_ROWS};

/// A cell coordinate within a worksheet.
///
/// Rows and columns are **0-indexed**, so `CellRef::new(0, 0)` is `A1`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    /// 0-indexed row.
    pub row: u32,
    /// 0-indexed column.
    pub col: u32,
}

impl CellRef {
    #[inline]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Render as A1 notation without `$` anchors (e.g. `BC32`).
    pub fn to_a1(self) -> String {
        format!("{}{}", col_to_name(self.col), self.row + 1)
    }

    /// Render as a fully anchored reference (e.g. `$BC$32`).
    pub fn to_absolute_a1(self) -> String {
        format!("${}${}", col_to_name(self.col), self.row + 1)
    }

    /// Parse an A1-style reference. `$` anchors are accepted and discarded.
    pub fn from_a1(a1: &str) -> Result<Self, A1ParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(A1ParseError::Empty);
        }

        let bytes = s.as_bytes();
        let mut idx = 0usize;
        if bytes.get(idx) == Some(&b'$') {
            idx += 1;
        }

        let col_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
            idx += 1;
        }
        if idx == col_start {
            return Err(A1ParseError::MissingColumn);
        }
        let col_str = &s[col_start..idx];

        if bytes.get(idx) == Some(&b'$') {
            idx += 1;
        }

        let row_start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        if idx == row_start {
            return Err(A1ParseError::MissingRow);
        }
        if idx != bytes.len() {
            return Err(A1ParseError::TrailingCharacters);
        }

        let col = name_to_col(col_str)?;
        let row_1_based: u32 = s[row_start..idx]
            .parse()
            .map_err(|_| A1ParseError::InvalidRow)?;
        if row_1_based == 0 || row_1_based > EXCEL_MAX_ROWS {
            return Err(A1ParseError::InvalidRow);
        }

        Ok(Self {
            row: row_1_based - 1,
            col,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// An inclusive rectangular block of cells, always normalized so that `start` is the
/// top-left corner.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: CellRef,
    pub end: CellRef,
}

impl Range {
    /// Construct a new range, normalizing coordinates if needed.
    pub const fn new(a: CellRef, b: CellRef) -> Self {
        let start_row = if a.row <= b.row { a.row } else { b.row };
        let end_row = if a.row <= b.row { b.row } else { a.row };
        let start_col = if a.col <= b.col { a.col } else { b.col };
        let end_col = if a.col <= b.col { b.col } else { a.col };
        Self {
            start: CellRef::new(start_row, start_col),
            end: CellRef::new(end_row, end_col),
        }
    }

    #[inline]
    pub const fn contains(&self, cell: CellRef) -> bool {
        cell.row >= self.start.row
            && cell.row <= self.end.row
            && cell.col >= self.start.col
            && cell.col <= self.end.col
    }

    #[inline]
    pub const fn width(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    #[inline]
    pub const fn height(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    #[inline]
    pub const fn is_single_cell(&self) -> bool {
        self.start.row == self.end.row && self.start.col == self.end.col
    }

    /// Returns true if the two ranges share at least one cell.
    pub const fn intersects(&self, other: &Range) -> bool {
        self.start.row <= other.end.row
            && other.start.row <= self.end.row
            && self.start.col <= other.end.col
            && other.start.col <= self.end.col
    }

    /// Returns true if every row of this range lies within `first..=last`.
    #[inline]
    pub const fn within_rows(&self, first: u32, last: u32) -> bool {
        self.start.row >= first && self.end.row <= last
    }

    /// Returns true if any row of this range lies within `first..=last`.
    #[inline]
    pub const fn touches_rows(&self, first: u32, last: u32) -> bool {
        self.start.row <= last && self.end.row >= first
    }

    /// The same range moved `n` rows down, or `None` when that would leave the grid.
    pub fn offset_rows(&self, n: u32) -> Option<Range> {
        let end_row = self.end.row.checked_add(n)?;
        if end_row >= EXCEL_MAX_ROWS {
            return None;
        }
        Some(Range::new(
            CellRef::new(self.start.row + n, self.start.col),
            CellRef::new(end_row, self.end.col),
        ))
    }

    /// Parse `A1:B2` or a single-cell reference like `C3`.
    pub fn from_a1(a1: &str) -> Result<Self, RangeParseError> {
        let s = a1.trim();
        if s.is_empty() {
            return Err(RangeParseError::Empty);
        }

        match s.split_once(':') {
            None => {
                let cell = CellRef::from_a1(s).map_err(RangeParseError::Cell)?;
                Ok(Range::new(cell, cell))
            }
            Some((a, b)) => {
                let start = CellRef::from_a1(a).map_err(RangeParseError::Cell)?;
                let end = CellRef::from_a1(b).map_err(RangeParseError::Cell)?;
                Ok(Range::new(start, end))
            }
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// Parse a space separated `sqref` list such as `A1:A5 C3`.
pub fn parse_sqref(sqref: &str) -> Result<Vec<Range>, RangeParseError> {
    let ranges = sqref
        .split_ascii_whitespace()
        .map(Range::from_a1)
        .collect::<Result<Vec<_>, _>>()?;
    if ranges.is_empty() {
        return Err(RangeParseError::Empty);
    }
    Ok(ranges)
}

/// Render ranges back into `sqref` form.
pub fn format_sqref(ranges: &[Range]) -> String {
    ranges
        .iter()
        .map(Range::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Errors that can occur when parsing an A1 cell reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum A1ParseError {
    Empty,
    MissingColumn,
    MissingRow,
    InvalidColumn,
    InvalidRow,
    TrailingCharacters,
}

impl fmt::Display for A1ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            A1ParseError::Empty => "empty A1 reference",
            A1ParseError::MissingColumn => "missing column in A1 reference",
            A1ParseError::MissingRow => "missing row in A1 reference",
            A1ParseError::InvalidColumn => "invalid column in A1 reference",
            A1ParseError::InvalidRow => "invalid row in A1 reference",
            A1ParseError::TrailingCharacters => "trailing characters in A1 reference",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for A1ParseError {}

/// Errors that can occur when parsing an A1 range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RangeParseError {
    Empty,
    Cell(A1ParseError),
}

impl fmt::Display for RangeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeParseError::Empty => f.write_str("empty range reference"),
            RangeParseError::Cell(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RangeParseError {}

/// Convert a 0-indexed column number into its letter name (`0 -> A`, `27 -> AB`).
pub fn col_to_name(col: u32) -> String {
    let mut n = col + 1;
    let mut out = Vec::<u8>::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Convert a column letter name into a 0-indexed column number.
pub fn name_to_col(name: &str) -> Result<u32, A1ParseError> {
    if name.is_empty() || name.len() > 3 {
        return Err(A1ParseError::InvalidColumn);
    }
    let mut col: u32 = 0;
    for b in name.bytes() {
        if !b.is_ascii_alphabetic() {
            return Err(A1ParseError::InvalidColumn);
        }
        col = col * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1);
    }
    let col = col - 1;
    if col >= EXCEL_MAX_COLS {
        return Err(A1ParseError::InvalidColumn);
    }
    Ok(col)
}
