use std::io::{Cursor, Read, Seek, Write};

use xlmerge_model::Workbook;

use crate::read::{read_package, read_parts, LoadedPackage};
use crate::streaming::StreamedSheet;
use crate::write::write_package;
use crate::{minimal, RecalcPolicy, XlsxError};

/// A workbook loaded from a template package, together with the raw package parts needed to
/// write it back.
///
/// Saving regenerates worksheet row data and the structures held in the model; every part the
/// model does not cover (drawings, themes, printer settings, custom XML...) is copied unchanged.
pub struct XlsxDocument {
    package: LoadedPackage,
    recalc_policy: RecalcPolicy,
}

impl XlsxDocument {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::from_reader(Cursor::new(bytes))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, XlsxError> {
        let package = read_package(reader)?;
        log::debug!(
            "loaded template with {} sheets and {} parts",
            package.workbook.sheets.len(),
            package.parts.len()
        );
        Ok(Self {
            package,
            recalc_policy: RecalcPolicy::default(),
        })
    }

    /// Wrap a workbook built in memory in a minimal package.
    pub fn from_workbook(mut workbook: Workbook) -> Result<Self, XlsxError> {
        let parts = minimal::minimal_parts(&mut workbook);
        let mut package = read_parts(parts)?;
        package.workbook = workbook;
        Ok(Self {
            package,
            recalc_policy: RecalcPolicy::default(),
        })
    }

    pub fn workbook(&self) -> &Workbook {
        &self.package.workbook
    }

    pub fn workbook_mut(&mut self) -> &mut Workbook {
        &mut self.package.workbook
    }

    pub fn into_workbook(self) -> Workbook {
        self.package.workbook
    }

    /// Raw bytes of a package part, e.g. `xl/theme/theme1.xml`.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.package
            .parts
            .get(name.trim_start_matches('/'))
            .map(Vec::as_slice)
    }

    pub fn recalc_policy(&self) -> RecalcPolicy {
        self.recalc_policy
    }

    pub fn set_recalc_policy(&mut self, policy: RecalcPolicy) {
        self.recalc_policy = policy;
    }

    pub fn save_to_vec(&self) -> Result<Vec<u8>, XlsxError> {
        self.save_with_streamed(Vec::new())
    }

    /// Save, splicing rows produced by [`crate::StreamingSheetWriter`]s into their sheets.
    ///
    /// A streamed row replaces the model row with the same index.
    pub fn save_with_streamed(&self, streamed: Vec<StreamedSheet>) -> Result<Vec<u8>, XlsxError> {
        let cursor = self.save_to(streamed, Cursor::new(Vec::new()))?;
        Ok(cursor.into_inner())
    }

    /// Write the package to `out`, e.g. a file, so large streamed outputs never sit in memory
    /// as a whole. Returns the writer once the archive is finished.
    pub fn save_to<W: Write + Seek>(
        &self,
        streamed: Vec<StreamedSheet>,
        out: W,
    ) -> Result<W, XlsxError> {
        write_package(&self.package, self.recalc_policy, streamed, out)
    }
}
