use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Cell;

/// A physical worksheet row. Cells are stored sparsely by 0-indexed column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default)]
    pub cells: BTreeMap<u32, Cell>,
    /// Explicit row height in points. `None` lets the spreadsheet application size the row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default)]
    pub hidden: bool,
    /// Row-level default style (`<row s=".." customFormat="1">`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_id: Option<u32>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(&self, col: u32) -> Option<&Cell> {
        self.cells.get(&col)
    }

    pub fn cell_mut(&mut self, col: u32) -> Option<&mut Cell> {
        self.cells.get_mut(&col)
    }

    pub fn get_or_create_cell(&mut self, col: u32) -> &mut Cell {
        self.cells.entry(col).or_default()
    }

    pub fn set_cell(&mut self, col: u32, cell: Cell) {
        self.cells.insert(col, cell);
    }

    pub fn remove_cell(&mut self, col: u32) -> Option<Cell> {
        self.cells.remove(&col)
    }

    pub fn first_cell_index(&self) -> Option<u32> {
        self.cells.keys().next().copied()
    }

    pub fn last_cell_index(&self) -> Option<u32> {
        self.cells.keys().next_back().copied()
    }

    /// Column indexes of all stored cells, left to right.
    pub fn cell_indexes(&self) -> Vec<u32> {
        self.cells.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Mark the row for automatic height.
    pub fn set_auto_height(&mut self) {
        self.height = None;
    }
}
