use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::formula_refs::shift_row_refs;
use crate::{Cell, CellRef, CellValue, DataValidationAssignment, MergedRegions, Row, EXCEL_MAX_ROWS};

/// Column formatting from `<cols>`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_id: Option<u32>,
}

impl ColProperties {
    pub fn is_default(&self) -> bool {
        self.width.is_none() && !self.hidden && self.style_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShiftError {
    #[error("cannot shift rows {first}..={last} by {n}: the sheet would exceed {max} rows")]
    OutOfBounds { first: u32, last: u32, n: u32, max: u32 },
    #[error("invalid row span {first}..={last}")]
    InvalidSpan { first: u32, last: u32 },
}

/// A worksheet: sparse rows plus the sheet-level structures a template merge maintains.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub name: String,
    #[serde(default)]
    rows: BTreeMap<u32, Row>,
    #[serde(default)]
    merged_regions: MergedRegions,
    #[serde(default)]
    data_validations: Vec<DataValidationAssignment>,
    #[serde(default)]
    columns: BTreeMap<u32, ColProperties>,
    /// Manual page breaks, stored as the 0-based row *after which* the page breaks.
    #[serde(default)]
    row_breaks: BTreeSet<u32>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    // -- rows --------------------------------------------------------------------------------

    pub fn row(&self, idx: u32) -> Option<&Row> {
        self.rows.get(&idx)
    }

    pub fn row_mut(&mut self, idx: u32) -> Option<&mut Row> {
        self.rows.get_mut(&idx)
    }

    pub fn get_or_create_row(&mut self, idx: u32) -> &mut Row {
        self.rows.entry(idx).or_default()
    }

    pub fn insert_row(&mut self, idx: u32, row: Row) -> Option<Row> {
        self.rows.insert(idx, row)
    }

    pub fn remove_row(&mut self, idx: u32) -> Option<Row> {
        self.rows.remove(&idx)
    }

    pub fn rows(&self) -> impl Iterator<Item = (u32, &Row)> {
        self.rows.iter().map(|(idx, row)| (*idx, row))
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = (u32, &mut Row)> {
        self.rows.iter_mut().map(|(idx, row)| (*idx, row))
    }

    pub fn first_row_index(&self) -> Option<u32> {
        self.rows.keys().next().copied()
    }

    pub fn last_row_index(&self) -> Option<u32> {
        self.rows.keys().next_back().copied()
    }

    /// Number of rows physically stored (i.e. written as `<row>` elements).
    pub fn physical_row_count(&self) -> usize {
        self.rows.len()
    }

    // -- cells -------------------------------------------------------------------------------

    pub fn cell(&self, cell: CellRef) -> Option<&Cell> {
        self.rows.get(&cell.row)?.cell(cell.col)
    }

    pub fn cell_mut(&mut self, cell: CellRef) -> Option<&mut Cell> {
        self.rows.get_mut(&cell.row)?.cell_mut(cell.col)
    }

    pub fn get_or_create_cell(&mut self, cell: CellRef) -> &mut Cell {
        self.get_or_create_row(cell.row).get_or_create_cell(cell.col)
    }

    /// Set a cell value, keeping the cell's style.
    pub fn set_value(&mut self, cell: CellRef, value: impl Into<CellValue>) -> &mut Cell {
        let target = self.get_or_create_cell(cell);
        target.set_value(value);
        target
    }

    /// The cell's value, or [`CellValue::Empty`] when the cell does not exist.
    pub fn value(&self, cell: CellRef) -> CellValue {
        self.cell(cell).map(|c| c.value.clone()).unwrap_or_default()
    }

    pub fn iter_cells(&self) -> impl Iterator<Item = (CellRef, &Cell)> {
        self.rows.iter().flat_map(|(row_idx, row)| {
            row.cells
                .iter()
                .map(move |(col, cell)| (CellRef::new(*row_idx, *col), cell))
        })
    }

    pub fn has_formulas(&self) -> bool {
        self.iter_cells().any(|(_, cell)| cell.is_formula())
    }

    // -- merged regions / validations --------------------------------------------------------

    pub fn merged_regions(&self) -> &MergedRegions {
        &self.merged_regions
    }

    pub fn merged_regions_mut(&mut self) -> &mut MergedRegions {
        &mut self.merged_regions
    }

    pub fn data_validations(&self) -> &[DataValidationAssignment] {
        &self.data_validations
    }

    pub fn add_data_validation(&mut self, validation: DataValidationAssignment) {
        self.data_validations.push(validation);
    }

    /// Replace the sheet's whole validation set.
    pub fn replace_data_validations(&mut self, validations: Vec<DataValidationAssignment>) {
        self.data_validations = validations;
    }

    // -- columns / breaks --------------------------------------------------------------------

    pub fn column(&self, col: u32) -> Option<&ColProperties> {
        self.columns.get(&col)
    }

    pub fn columns(&self) -> impl Iterator<Item = (u32, &ColProperties)> {
        self.columns.iter().map(|(col, props)| (*col, props))
    }

    pub fn set_column_properties(&mut self, col: u32, props: ColProperties) {
        if props.is_default() {
            self.columns.remove(&col);
        } else {
            self.columns.insert(col, props);
        }
    }

    pub fn set_column_hidden(&mut self, col: u32, hidden: bool) {
        let mut props = self.columns.get(&col).cloned().unwrap_or_default();
        props.hidden = hidden;
        self.set_column_properties(col, props);
    }

    pub fn is_column_hidden(&self, col: u32) -> bool {
        self.columns.get(&col).is_some_and(|c| c.hidden)
    }

    /// Insert a manual page break below `row`.
    pub fn set_row_break(&mut self, row: u32) {
        self.row_breaks.insert(row);
    }

    pub fn remove_row_break(&mut self, row: u32) -> bool {
        self.row_breaks.remove(&row)
    }

    pub fn has_row_break(&self, row: u32) -> bool {
        self.row_breaks.contains(&row)
    }

    pub fn row_breaks(&self) -> impl Iterator<Item = u32> + '_ {
        self.row_breaks.iter().copied()
    }

    // -- structural edits --------------------------------------------------------------------

    /// Move rows `first..=last` down by `n`, overwriting whatever occupied the destination.
    ///
    /// Moves, with the rows: merged regions lying entirely inside the band, manual row breaks,
    /// and references in this sheet's formulas that point into the band. Merged regions that
    /// are not inside the band but intersect the destination are dropped. Validations and
    /// defined names are left alone; formulas on other sheets are handled by
    /// [`crate::Workbook::shift_rows`].
    pub fn shift_rows(&mut self, first: u32, last: u32, n: u32) -> Result<(), ShiftError> {
        if first > last {
            return Err(ShiftError::InvalidSpan { first, last });
        }
        if n == 0 {
            return Ok(());
        }
        if last.checked_add(n).map_or(true, |end| end >= EXCEL_MAX_ROWS) {
            return Err(ShiftError::OutOfBounds {
                first,
                last,
                n,
                max: EXCEL_MAX_ROWS,
            });
        }

        let dest_first = first + n;
        let dest_last = last + n;

        let mut moved = self.rows.split_off(&first);
        let mut tail = moved.split_off(&(last + 1));
        // Rows below the band that fall into the destination are overwritten.
        tail.retain(|idx, _| *idx > dest_last);
        for (idx, row) in moved {
            self.rows.insert(idx + n, row);
        }
        self.rows.append(&mut tail);

        let mut regions = Vec::with_capacity(self.merged_regions.len());
        for region in self.merged_regions.iter() {
            if region.within_rows(first, last) {
                if let Some(shifted) = region.offset_rows(n) {
                    regions.push(shifted);
                }
            } else if !region.touches_rows(dest_first, dest_last) {
                regions.push(*region);
            }
        }
        self.merged_regions.replace_all(regions);

        let breaks = std::mem::take(&mut self.row_breaks);
        self.row_breaks = breaks
            .into_iter()
            .filter_map(|row| {
                if row >= first && row <= last {
                    Some(row + n)
                } else if row >= dest_first && row <= dest_last {
                    None
                } else {
                    Some(row)
                }
            })
            .collect();

        let name = self.name.clone();
        for row in self.rows.values_mut() {
            for cell in row.cells.values_mut() {
                if let Some(formula) = cell.formula.as_mut() {
                    *formula = shift_row_refs(formula, &name, true, first, last, n);
                }
            }
        }

        Ok(())
    }
}
