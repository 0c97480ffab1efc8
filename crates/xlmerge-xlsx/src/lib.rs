//! XLSX template I/O for xlmerge.
//!
//! [`XlsxDocument`] loads a template package into an [`xlmerge_model::Workbook`] and writes it
//! back by patching only the parts a merge changes: worksheet row data and the sheet-level
//! sections derived from the model (`dimension`, `cols`, `sheetData`, `mergeCells`,
//! `dataValidations`, `rowBreaks`), defined names and calculation flags in `workbook.xml`, and
//! appended styles in `styles.xml`. All other package parts are copied byte-for-byte.
//!
//! [`StreamingSheetWriter`] is a windowed row sink for very large outputs: rows beyond the
//! in-memory window are spilled to an anonymous temporary file and spliced into the worksheet
//! when the document is saved.

mod document;
mod minimal;
mod read;
mod recalc_policy;
mod relationships;
mod shared_strings;
mod streaming;
mod styles;
mod write;
mod zip_util;

use thiserror::Error;

pub use document::XlsxDocument;
pub use recalc_policy::RecalcPolicy;
pub use streaming::{StreamedSheet, StreamingSheetWriter, DEFAULT_STREAMING_WINDOW};

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml error: {0}")]
    RoXml(#[from] roxmltree::Error),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("utf-8 error: {0}")]
    Utf8Str(#[from] std::str::Utf8Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("row spill error: {0}")]
    Spill(#[from] serde_json::Error),
    #[error("missing required attribute: {0}")]
    MissingAttr(&'static str),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error("invalid cell reference in worksheet xml: {0}")]
    InvalidCellRef(String),
    #[error(
        "xlsx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)"
    )]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("xlsx package is too large to load safely: {total} bytes uncompressed (max {max})")]
    PackageTooLarge { total: u64, max: u64 },
    #[error("sheet `{0}` has no worksheet part in this package")]
    SheetPartMissing(String),
    #[error("streamed rows must be created in ascending order: row {row} after row {previous}")]
    RowOutOfOrder { row: u32, previous: u32 },
    #[error("streamed sheet index {0} does not exist in the workbook")]
    StreamedSheetMissing(usize),
}
