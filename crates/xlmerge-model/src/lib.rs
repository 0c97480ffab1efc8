//! In-memory spreadsheet model for template merging.
//!
//! The model covers what a template merge reads and rewrites: sparse rows and cells with
//! values, formulas and style indexes; merged regions; data validations; column properties;
//! manual row breaks; defined names; and derived styles. Everything else in a template
//! package is carried through untouched by the XLSX layer.

mod address;
mod calc_settings;
mod cell;
mod data_validation;
pub mod formula_refs;
mod merge;
mod names;
mod row;
mod style;
mod value;
mod workbook;
mod worksheet;

pub use address::{
    col_to_name, format_sqref, name_to_col, parse_sqref, A1ParseError, CellRef, Range,
    RangeParseError,
};
pub use calc_settings::{CalcSettings, CalculationMode};
pub use cell::{Cell, EXCEL_MAX_COLS, EXCEL_MAX_ROWS};
pub use data_validation::{
    DataValidation, DataValidationAssignment, DataValidationKind, DataValidationMessage,
    DataValidationOperator,
};
pub use merge::{MergeRegionError, MergedRegions};
pub use names::{quote_sheet_name, AreaRef, AreaRefParseError, DefinedName};
pub use row::Row;
pub use style::{Color, ColorParseError, DerivedStyle, StyleTable};
pub use value::CellValue;
pub use workbook::{Workbook, WorkbookError};
pub use worksheet::{ColProperties, ShiftError, Worksheet};
