use serde::{Deserialize, Serialize};
use xlmerge_xlsx::DEFAULT_STREAMING_WINDOW;

/// What is copied when a template block is duplicated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellCopyPolicy {
    pub copy_value: bool,
    pub copy_style: bool,
    /// Formulas are copied with same-row references moved to the destination row.
    pub copy_formula: bool,
    pub copy_merged_regions: bool,
    pub copy_row_height: bool,
}

impl Default for CellCopyPolicy {
    fn default() -> Self {
        Self {
            copy_value: true,
            copy_style: true,
            copy_formula: true,
            copy_merged_regions: true,
            copy_row_height: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Upper bound on substitutions per cell. Guards against values that reproduce their own
    /// placeholder.
    pub max_placeholders_per_cell: usize,
    pub copy_policy: CellCopyPolicy,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            max_placeholders_per_cell: 10,
            copy_policy: CellCopyPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowFillerOptions {
    /// Rows kept in memory before older ones are spilled to disk.
    pub window_size: usize,
    pub merge: MergeOptions,
}

impl Default for RowFillerOptions {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_STREAMING_WINDOW,
            merge: MergeOptions::default(),
        }
    }
}
