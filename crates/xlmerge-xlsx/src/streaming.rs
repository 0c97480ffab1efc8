//! Windowed row sink for sheets too large to hold in memory.
//!
//! [`StreamingSheetWriter`] keeps the most recent `window` rows editable. Older rows are
//! serialized as JSON lines into an anonymous temporary file, which the operating system
//! reclaims as soon as the handle is dropped, whether the merge finishes or fails.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};

use xlmerge_model::Row;

use crate::XlsxError;

/// Rows kept in memory when no window size is configured.
pub const DEFAULT_STREAMING_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Bounds {
    pub rows: Option<(u32, u32)>,
    pub cols: Option<(u32, u32)>,
}

impl Bounds {
    pub(crate) fn include(&mut self, idx: u32, row: &Row) {
        self.rows = Some(match self.rows {
            Some((first, last)) => (first.min(idx), last.max(idx)),
            None => (idx, idx),
        });
        if let (Some(first), Some(last)) = (row.first_cell_index(), row.last_cell_index()) {
            self.cols = Some(match self.cols {
                Some((lo, hi)) => (lo.min(first), hi.max(last)),
                None => (first, last),
            });
        }
    }

    pub(crate) fn union(self, other: Bounds) -> Bounds {
        fn merge(a: Option<(u32, u32)>, b: Option<(u32, u32)>) -> Option<(u32, u32)> {
            match (a, b) {
                (Some((a0, a1)), Some((b0, b1))) => Some((a0.min(b0), a1.max(b1))),
                (a, None) => a,
                (None, b) => b,
            }
        }
        Bounds {
            rows: merge(self.rows, other.rows),
            cols: merge(self.cols, other.cols),
        }
    }
}

/// Rows written through a bounded in-memory window.
///
/// Rows must be created in strictly ascending order. Only rows still inside the window can be
/// edited; `row_mut` returns `None` for rows that were already flushed.
pub struct StreamingSheetWriter {
    sheet_index: usize,
    window: usize,
    rows: VecDeque<(u32, Row)>,
    spill: Option<BufWriter<File>>,
    spilled: usize,
    last_created: Option<u32>,
    bounds: Bounds,
    has_formulas: bool,
}

impl StreamingSheetWriter {
    /// A sink for the sheet at `sheet_index`. A window of 0 is treated as 1.
    pub fn new(sheet_index: usize, window: usize) -> Self {
        Self {
            sheet_index,
            window: window.max(1),
            rows: VecDeque::new(),
            spill: None,
            spilled: 0,
            last_created: None,
            bounds: Bounds::default(),
            has_formulas: false,
        }
    }

    pub fn sheet_index(&self) -> usize {
        self.sheet_index
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Create row `idx` and return it for editing.
    pub fn create_row(&mut self, idx: u32) -> Result<&mut Row, XlsxError> {
        if let Some(previous) = self.last_created {
            if idx <= previous {
                return Err(XlsxError::RowOutOfOrder { row: idx, previous });
            }
        }
        self.last_created = Some(idx);
        self.rows.push_back((idx, Row::new()));
        while self.rows.len() > self.window {
            if let Some((old_idx, old_row)) = self.rows.pop_front() {
                self.spill_row(old_idx, &old_row)?;
            }
        }
        let last = self.rows.len() - 1;
        Ok(&mut self.rows[last].1)
    }

    /// A row still inside the in-memory window.
    pub fn row_mut(&mut self, idx: u32) -> Option<&mut Row> {
        self.rows
            .iter_mut()
            .find(|(row_idx, _)| *row_idx == idx)
            .map(|(_, row)| row)
    }

    /// Number of rows created so far, flushed or not.
    pub fn physical_row_count(&self) -> usize {
        self.spilled + self.rows.len()
    }

    /// Number of rows flushed to the spill file.
    pub fn flushed_row_count(&self) -> usize {
        self.spilled
    }

    fn spill_row(&mut self, idx: u32, row: &Row) -> Result<(), XlsxError> {
        self.note(idx, row);
        let mut spill = match self.spill.take() {
            Some(spill) => spill,
            None => BufWriter::new(tempfile::tempfile()?),
        };
        serde_json::to_writer(&mut spill, &(idx, row))?;
        spill.write_all(b"\n")?;
        self.spill = Some(spill);
        self.spilled += 1;
        log::debug!(
            "sheet #{}: flushed row {} ({} rows flushed)",
            self.sheet_index,
            idx + 1,
            self.spilled
        );
        Ok(())
    }

    fn note(&mut self, idx: u32, row: &Row) {
        self.bounds.include(idx, row);
        self.has_formulas |= row.cells.values().any(|c| c.is_formula());
    }

    /// Close the sink. The returned sheet is spliced into the package on save.
    pub fn finish(mut self) -> Result<StreamedSheet, XlsxError> {
        let tail: Vec<(u32, Row)> = self.rows.drain(..).collect();
        for (idx, row) in &tail {
            self.note(*idx, row);
        }
        let spill = match self.spill.take() {
            Some(writer) => {
                let mut file = writer.into_inner().map_err(|err| err.into_error())?;
                file.seek(SeekFrom::Start(0))?;
                Some(file)
            }
            None => None,
        };
        Ok(StreamedSheet {
            sheet_index: self.sheet_index,
            spill,
            tail,
            spilled_count: self.spilled,
            bounds: self.bounds,
            has_formulas: self.has_formulas,
        })
    }
}

/// The finished output of a [`StreamingSheetWriter`].
#[derive(Debug)]
pub struct StreamedSheet {
    sheet_index: usize,
    spill: Option<File>,
    tail: Vec<(u32, Row)>,
    spilled_count: usize,
    pub(crate) bounds: Bounds,
    pub(crate) has_formulas: bool,
}

impl StreamedSheet {
    pub fn sheet_index(&self) -> usize {
        self.sheet_index
    }

    /// Number of streamed rows.
    pub fn row_count(&self) -> usize {
        self.spilled_count + self.tail.len()
    }

    /// The streamed rows in ascending order. The spill file is consumed.
    pub(crate) fn into_rows(self) -> StreamedRows {
        StreamedRows {
            spilled: self.spill.map(|file| BufReader::new(file).lines()),
            tail: self.tail.into_iter(),
        }
    }
}

pub(crate) struct StreamedRows {
    spilled: Option<std::io::Lines<BufReader<File>>>,
    tail: std::vec::IntoIter<(u32, Row)>,
}

impl Iterator for StreamedRows {
    type Item = Result<(u32, Row), XlsxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(lines) = self.spilled.as_mut() {
            match lines.next() {
                Some(Ok(line)) => return Some(serde_json::from_str(&line).map_err(Into::into)),
                Some(Err(err)) => return Some(Err(err.into())),
                None => self.spilled = None,
            }
        }
        self.tail.next().map(Ok)
    }
}
