use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::formula_refs::shift_row_refs;
use crate::{CalcSettings, DefinedName, ShiftError, StyleTable, Worksheet};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkbookError {
    #[error("duplicate sheet name: {0}")]
    DuplicateSheetName(String),
    #[error("sheet index out of range: {0}")]
    SheetIndexOutOfRange(usize),
    #[error(transparent)]
    Shift(#[from] ShiftError),
}

/// An in-memory workbook.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<Worksheet>,
    #[serde(default)]
    pub defined_names: Vec<DefinedName>,
    #[serde(default)]
    pub styles: StyleTable,
    #[serde(default)]
    pub calc_settings: CalcSettings,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sheet and return its index. Sheet names are unique, ignoring ASCII case.
    pub fn add_sheet(&mut self, name: impl Into<String>) -> Result<usize, WorkbookError> {
        let name = name.into();
        if self.sheet_index(&name).is_some() {
            return Err(WorkbookError::DuplicateSheetName(name));
        }
        self.sheets.push(Worksheet::new(name));
        Ok(self.sheets.len() - 1)
    }

    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheet_index(name).map(|idx| &self.sheets[idx])
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Worksheet> {
        let idx = self.sheet_index(name)?;
        self.sheets.get_mut(idx)
    }

    pub fn sheet_by_index(&self, idx: usize) -> Option<&Worksheet> {
        self.sheets.get(idx)
    }

    pub fn sheet_by_index_mut(&mut self, idx: usize) -> Option<&mut Worksheet> {
        self.sheets.get_mut(idx)
    }

    pub fn defined_name(&self, name: &str) -> Option<&DefinedName> {
        self.defined_names
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
    }

    pub fn add_defined_name(&mut self, name: DefinedName) {
        self.defined_names.push(name);
    }

    pub fn has_formulas(&self) -> bool {
        self.sheets.iter().any(Worksheet::has_formulas)
    }

    /// Move rows `first..=last` of one sheet down by `n` rows.
    ///
    /// Applies [`Worksheet::shift_rows`] to the sheet and rewrites references to the moved band
    /// in formulas on every other sheet that qualify it by name.
    pub fn shift_rows(
        &mut self,
        sheet_index: usize,
        first: u32,
        last: u32,
        n: u32,
    ) -> Result<(), WorkbookError> {
        let sheet = self
            .sheets
            .get_mut(sheet_index)
            .ok_or(WorkbookError::SheetIndexOutOfRange(sheet_index))?;
        sheet.shift_rows(first, last, n)?;
        let name = sheet.name.clone();

        for (idx, other) in self.sheets.iter_mut().enumerate() {
            if idx == sheet_index {
                continue;
            }
            for (_, row) in other.rows_mut() {
                for cell in row.cells.values_mut() {
                    if let Some(formula) = cell.formula.as_mut() {
                        *formula = shift_row_refs(formula, &name, false, first, last, n);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CellRef;

    #[test]
    fn shift_rewrites_qualified_references_on_other_sheets() {
        let mut wb = Workbook::new();
        let data = wb.add_sheet("Data").unwrap();
        let summary = wb.add_sheet("Summary").unwrap();
        assert!(wb.add_sheet("data").is_err());

        wb.sheets[data].set_value(CellRef::new(4, 0), 10.0);
        wb.sheets[summary]
            .get_or_create_cell(CellRef::new(0, 0))
            .set_formula("Data!A5*2+A5");

        wb.shift_rows(data, 2, 10, 3).unwrap();

        let formula = wb.sheets[summary]
            .cell(CellRef::new(0, 0))
            .and_then(|c| c.formula.clone());
        assert_eq!(formula.as_deref(), Some("Data!A8*2+A5"));
        assert_eq!(wb.sheets[data].value(CellRef::new(7, 0)).as_number(), Some(10.0));
    }
}
