//! Fill spreadsheet templates with hierarchical data.
//!
//! A template is an ordinary `.xlsx` file whose cells contain placeholders such as `{name}`.
//! Callers register the placeholders they support in a [`FieldCatalog`], build a tree of
//! [`DataNode`]s and call [`merge_data`]:
//!
//! - `{key}` of a [`FieldKind::Simple`] field is replaced with its value
//! - [`FieldKind::RepeatCol`] and [`FieldKind::RepeatVal`] fields hand out successive values to
//!   successive placeholders in a row; columns left without a value are hidden for `RepeatCol`
//! - `{key:N}` of a [`FieldKind::RepeatRow`] field marks a block of `N` rows repeated once per
//!   child data node, recursively
//! - [`FieldKind::PageBreak`] sets a manual page break on its row
//!
//! Repeating a block moves everything below it and repairs merged regions, data validations,
//! defined names and formula references along the way. For very large flat outputs,
//! [`init_row_filler`] streams records below a one-row template instead.

mod context;
mod converter;
mod data;
mod error;
mod field;
mod formula;
mod merger;
mod mutator;
mod options;
pub mod placeholder;
mod recalc;
mod row_filler;
mod value;

use std::io::Read;

use xlmerge_xlsx::{XlsxDocument, XlsxError};

pub use context::Context;
pub use converter::{
    date_serial, datetime_serial, CellSlot, Converter, DEFAULT_DATETIME_FORMAT,
    DEFAULT_DATE_FORMAT,
};
pub use data::DataNode;
pub use error::{
    CatalogError, ConvertError, DataError, MergeError, MergeFault, Mismatch, TemplateParseError,
};
pub use field::{Capabilities, FieldCatalog, FieldKind, MergeField};
pub use formula::rewrite_same_row_refs;
pub use merger::{merge_data, Merger};
pub use options::{CellCopyPolicy, MergeOptions, RowFillerOptions};
pub use recalc::{FormulaEvaluator, RecalcOnLoad};
pub use row_filler::{init_row_filler, RowFiller};
pub use value::{StringColorCell, Value};

pub use xlmerge_model as model;
pub use xlmerge_xlsx as xlsx;

/// Load a template from `.xlsx` bytes.
pub fn create_document_from_template(bytes: &[u8]) -> Result<XlsxDocument, TemplateParseError> {
    Ok(XlsxDocument::from_bytes(bytes)?)
}

/// Load a template from a reader. The input is buffered in memory first, since the package
/// directory sits at the end of the file.
pub fn create_document_from_reader(mut reader: impl Read) -> Result<XlsxDocument, TemplateParseError> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(XlsxError::from)?;
    create_document_from_template(&bytes)
}
