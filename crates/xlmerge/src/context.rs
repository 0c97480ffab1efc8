use crate::field::FieldCatalog;
use crate::options::MergeOptions;

/// The cursor of one merge: which sheet and row the walk is on, and what it merges with.
#[derive(Debug)]
pub struct Context<'a> {
    pub sheet_index: usize,
    pub sheet_name: String,
    row: u32,
    pub catalog: &'a FieldCatalog,
    pub options: &'a MergeOptions,
}

impl<'a> Context<'a> {
    pub fn new(
        sheet_index: usize,
        sheet_name: impl Into<String>,
        start_row: u32,
        catalog: &'a FieldCatalog,
        options: &'a MergeOptions,
    ) -> Self {
        Self {
            sheet_index,
            sheet_name: sheet_name.into(),
            row: start_row,
            catalog,
            options,
        }
    }

    pub fn current_row(&self) -> u32 {
        self.row
    }

    pub fn advance(&mut self, rows: u32) {
        self.row = self.row.saturating_add(rows);
    }
}
