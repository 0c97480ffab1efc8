//! Filling a one-row template with many records without holding them all in memory.
//!
//! The template row is the row carrying a row group marker. Records after the first are
//! written to a [`StreamingSheetWriter`] below it; the first record is merged into the template
//! row itself once all records are in, so the template styling is kept.

use xlmerge_model::{Row, Workbook, EXCEL_MAX_ROWS};
use xlmerge_xlsx::{StreamedSheet, StreamingSheetWriter};

use crate::data::DataNode;
use crate::error::{MergeError, MergeFault};
use crate::field::FieldCatalog;
use crate::merger::{clear_group_marker, substitute_row};
use crate::mutator::copy_row;
use crate::options::RowFillerOptions;
use crate::placeholder::detect_group;

/// Prepare `sheet_name` for `row_count` records with the default options.
pub fn init_row_filler<'a>(
    workbook: &'a mut Workbook,
    sheet_name: &str,
    catalog: &'a FieldCatalog,
    row_count: usize,
) -> Result<RowFiller<'a>, MergeError> {
    RowFiller::new(
        workbook,
        sheet_name,
        catalog,
        row_count,
        RowFillerOptions::default(),
    )
}

pub struct RowFiller<'a> {
    workbook: &'a mut Workbook,
    catalog: &'a FieldCatalog,
    options: RowFillerOptions,
    sheet_index: usize,
    sheet_name: String,
    source_row: u32,
    template: Row,
    row_count: usize,
    filled: usize,
    held_back: Option<DataNode>,
    sink: StreamingSheetWriter,
}

fn fault(sheet: &str, row: u32, source: impl Into<MergeFault>) -> MergeError {
    MergeError::Sheet {
        sheet: sheet.to_string(),
        row,
        source: source.into(),
    }
}

impl<'a> RowFiller<'a> {
    pub fn new(
        workbook: &'a mut Workbook,
        sheet_name: &str,
        catalog: &'a FieldCatalog,
        row_count: usize,
        options: RowFillerOptions,
    ) -> Result<Self, MergeError> {
        let sheet_index = workbook
            .sheet_index(sheet_name)
            .ok_or_else(|| MergeError::SheetNotFound(sheet_name.to_string()))?;
        let sheet = &workbook.sheets[sheet_index];
        let sheet_name = sheet.name.clone();
        let group = sheet
            .rows()
            .find_map(|(idx, _)| detect_group(catalog, sheet, idx))
            .ok_or_else(|| MergeError::NoGroupMarker(sheet_name.clone()))?;
        if group.rows != 1 {
            return Err(MergeError::UnsupportedGroupSpan { rows: group.rows });
        }
        let source_row = group.placeholder.cell.row;
        if source_row as u64 + row_count as u64 > u64::from(EXCEL_MAX_ROWS) {
            return Err(MergeError::TooManyRows { row_count });
        }

        clear_group_marker(workbook, sheet_index, &group)
            .map_err(|err| fault(&sheet_name, source_row, err))?;
        workbook.calc_settings.full_calc_on_load = true;
        let template = workbook.sheets[sheet_index]
            .row(source_row)
            .cloned()
            .unwrap_or_default();
        log::debug!(
            "row filler on `{sheet_name}` row {}: {row_count} records, window {}",
            source_row + 1,
            options.window_size
        );

        Ok(Self {
            workbook,
            catalog,
            sink: StreamingSheetWriter::new(sheet_index, options.window_size),
            options,
            sheet_index,
            sheet_name,
            source_row,
            template,
            row_count,
            filled: 0,
            held_back: None,
        })
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    /// 0-indexed template row.
    pub fn source_row(&self) -> u32 {
        self.source_row
    }

    /// Add the next record.
    pub fn fill_row(&mut self, data: DataNode) -> Result<(), MergeError> {
        if self.filled >= self.row_count {
            return Err(MergeError::TooManyRows {
                row_count: self.row_count,
            });
        }

        if self.filled == 0 {
            self.held_back = Some(data);
        } else {
            // `filled` is below `row_count`, which was checked against the sheet size.
            let dest = self.source_row + self.filled as u32;
            let row = self
                .sink
                .create_row(dest)
                .map_err(|err| fault(&self.sheet_name, dest, err))?;
            *row = copy_row(
                &self.template,
                &self.sheet_name,
                self.source_row,
                dest,
                &self.options.merge.copy_policy,
            );
            let effects = substitute_row(
                row,
                dest,
                &data,
                self.catalog,
                self.options.merge.max_placeholders_per_cell,
                &mut self.workbook.styles,
            )
            .map_err(|err| fault(&self.sheet_name, dest, err))?;
            effects.apply(&mut self.workbook.sheets[self.sheet_index], dest);
        }

        self.filled += 1;
        if self.filled == self.row_count {
            self.merge_held_back()?;
        }
        Ok(())
    }

    fn merge_held_back(&mut self) -> Result<(), MergeError> {
        let data = self.held_back.take().unwrap_or_default();
        let Workbook { sheets, styles, .. } = &mut *self.workbook;
        let sheet = &mut sheets[self.sheet_index];
        let Some(row) = sheet.row_mut(self.source_row) else {
            return Ok(());
        };
        let effects = substitute_row(
            row,
            self.source_row,
            &data,
            self.catalog,
            self.options.merge.max_placeholders_per_cell,
            styles,
        )
        .map_err(|err| fault(&self.sheet_name, self.source_row, err))?;
        effects.apply(sheet, self.source_row);
        Ok(())
    }

    /// Check that every announced record was filled and hand over the streamed rows.
    ///
    /// With no records announced, the template row is merged with empty data.
    pub fn finish(mut self) -> Result<StreamedSheet, MergeError> {
        if self.filled != self.row_count {
            return Err(MergeError::IncompleteFill {
                expected: self.row_count,
                filled: self.filled,
            });
        }
        if self.row_count == 0 {
            self.merge_held_back()?;
        }
        log::debug!(
            "row filler on `{}` finished: {} rows streamed, {} spilled",
            self.sheet_name,
            self.sink.physical_row_count(),
            self.sink.flushed_row_count()
        );
        let source_row = self.source_row;
        self.sink
            .finish()
            .map_err(|err| fault(&self.sheet_name, source_row, err))
    }
}
