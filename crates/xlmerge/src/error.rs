use thiserror::Error;
use xlmerge_model::{MergeRegionError, WorkbookError};
use xlmerge_xlsx::XlsxError;

/// The template bytes could not be read as a spreadsheet package.
#[derive(Debug, Error)]
#[error("failed to parse template: {0}")]
pub struct TemplateParseError(#[from] pub XlsxError);

#[derive(Debug, Error)]
pub enum MergeError {
    /// A fault while walking a sheet. The sheet is left partially merged.
    #[error("merge failed on sheet `{sheet}` at row {}: {source}", row + 1)]
    Sheet {
        sheet: String,
        /// 0-indexed row the walk was on.
        row: u32,
        #[source]
        source: MergeFault,
    },
    #[error("sheet not found: {0}")]
    SheetNotFound(String),
    #[error("sheet `{0}` has no row group marker")]
    NoGroupMarker(String),
    #[error("row filler needs a one-row group, the marker spans {rows} rows")]
    UnsupportedGroupSpan { rows: u32 },
    #[error("more rows filled than the {row_count} announced")]
    TooManyRows { row_count: usize },
    #[error("{filled} of {expected} announced rows were filled")]
    IncompleteFill { expected: usize, filled: usize },
}

/// What went wrong inside a sheet walk.
#[derive(Debug, Error)]
pub enum MergeFault {
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error(transparent)]
    MergedRegion(#[from] MergeRegionError),
    #[error(transparent)]
    Shift(#[from] WorkbookError),
    #[error(transparent)]
    Stream(#[from] XlsxError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("duplicate field key: {0}")]
    DuplicateKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("field `{0}` is not a row group")]
    NotAGroupField(String),
    #[error("row group field `{0}` cannot hold values")]
    GroupFieldHasNoValues(String),
}

/// A converter was handed a value it cannot write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, got {found}")]
pub struct Mismatch {
    pub expected: &'static str,
    pub found: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot write {value} for `{pattern}` at row {}, column {}: {source}", row + 1, col + 1)]
pub struct ConvertError {
    pub row: u32,
    pub col: u32,
    pub pattern: String,
    /// Debug rendering of the offending value.
    pub value: String,
    #[source]
    pub source: Mismatch,
}
