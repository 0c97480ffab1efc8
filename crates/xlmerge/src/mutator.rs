//! Making room for repeated row blocks.
//!
//! Expanding a block of `height` rows into `copies` copies moves everything below the block
//! down, then repairs what the raw row shift leaves behind: merged regions it dropped, data
//! validations and defined names (which it never touches). Finally the block's rows are copied
//! into the freed slots.

use xlmerge_model::{
    AreaRef, Cell, CellRef, Range, Row, ShiftError, Workbook, WorkbookError, Worksheet,
    EXCEL_MAX_ROWS,
};

use crate::error::MergeFault;
use crate::formula::rewrite_same_row_refs;
use crate::options::CellCopyPolicy;

/// Expand the block `start..start + height` of sheet `sheet_index` into `copies` copies.
///
/// Not transactional: a failure part way leaves the sheet partially expanded.
pub(crate) fn duplicate_block(
    workbook: &mut Workbook,
    sheet_index: usize,
    start: u32,
    height: u32,
    copies: usize,
    policy: &CellCopyPolicy,
) -> Result<(), MergeFault> {
    if copies <= 1 || height == 0 {
        return Ok(());
    }
    let sheet = workbook
        .sheet_by_index(sheet_index)
        .ok_or(WorkbookError::SheetIndexOutOfRange(sheet_index))?;
    let sheet_name = sheet.name.clone();
    let first_moved = start.saturating_add(height);
    let last_row = sheet.last_row_index().map_or(0, |r| r + 1);

    let inserted = u64::from(height) * (copies as u64 - 1);
    let block_end = u64::from(start) + u64::from(height) * copies as u64;
    let sheet_end = u64::from(last_row) + inserted;
    let n = match u32::try_from(inserted) {
        Ok(n) if block_end <= u64::from(EXCEL_MAX_ROWS) && sheet_end < u64::from(EXCEL_MAX_ROWS) => n,
        _ => {
            return Err(WorkbookError::Shift(ShiftError::OutOfBounds {
                first: first_moved,
                last: last_row,
                n: u32::try_from(inserted).unwrap_or(u32::MAX),
                max: EXCEL_MAX_ROWS,
            })
            .into())
        }
    };

    if first_moved <= last_row {
        shift_rows_and_merged_regions(workbook, sheet_index, first_moved, last_row, n)?;
        if let Some(sheet) = workbook.sheet_by_index_mut(sheet_index) {
            shift_data_validations(sheet, first_moved, last_row + n, n);
        }
        shift_defined_names(workbook, &sheet_name, start, first_moved, last_row, n);
    }

    copy_block(workbook, sheet_index, start, height, copies, policy)
}

fn shift_rows_and_merged_regions(
    workbook: &mut Workbook,
    sheet_index: usize,
    first: u32,
    last: u32,
    n: u32,
) -> Result<(), MergeFault> {
    let (before, contained) = match workbook.sheet_by_index(sheet_index) {
        Some(sheet) => (
            sheet.merged_regions().len(),
            sheet.merged_regions().within_rows(first, last),
        ),
        None => return Err(WorkbookError::SheetIndexOutOfRange(sheet_index).into()),
    };
    workbook.shift_rows(sheet_index, first, last, n)?;
    let Some(sheet) = workbook.sheet_by_index_mut(sheet_index) else {
        return Ok(());
    };

    for region in contained {
        let Some(moved) = region.offset_rows(n) else {
            log::warn!("merged region {region} cannot move {n} rows down, dropped");
            continue;
        };
        if sheet.merged_regions().contains(&moved) {
            continue;
        }
        if let Err(err) = sheet.merged_regions_mut().add(moved) {
            log::warn!("merged region {region} lost while shifting rows: {err}");
        }
    }

    let after = sheet.merged_regions().len();
    if after != before {
        log::warn!(
            "sheet `{}` had {before} merged regions before shifting rows {}..={} and {after} after",
            sheet.name,
            first + 1,
            last + 1
        );
    }
    Ok(())
}

fn shift_data_validations(sheet: &mut Worksheet, first: u32, last: u32, n: u32) {
    let mut validations = sheet.data_validations().to_vec();
    let mut moved = 0usize;
    for assignment in &mut validations {
        for range in &mut assignment.ranges {
            if !range.within_rows(first, last) {
                continue;
            }
            if let Some(shifted) = range.offset_rows(n) {
                *range = shifted;
                moved += 1;
            }
        }
    }
    if moved > 0 {
        sheet.replace_data_validations(validations);
    }
}

/// Names on `sheet_name` that overlap `block_start..=last`: names below the block move with
/// it, names reaching into the block grow at their trailing row.
fn shift_defined_names(
    workbook: &mut Workbook,
    sheet_name: &str,
    block_start: u32,
    first_moved: u32,
    last: u32,
    n: u32,
) {
    for name in &mut workbook.defined_names {
        let Some(area) = name.area() else {
            log::debug!(
                "defined name `{}` is not a single area, left as `{}`",
                name.name,
                name.refers_to()
            );
            continue;
        };
        if !area.is_on_sheet(sheet_name) {
            continue;
        }
        let Range { start, end } = area.range;
        if end.row < block_start || start.row > last {
            continue;
        }
        let top = if start.row >= first_moved {
            start.row.saturating_add(n)
        } else {
            start.row
        };
        let bottom = end.row.saturating_add(n).min(EXCEL_MAX_ROWS - 1);
        let shifted = AreaRef::new(
            area.sheet,
            Range::new(
                CellRef::new(top.min(bottom), start.col),
                CellRef::new(bottom, end.col),
            ),
        );
        log::debug!(
            "defined name `{}`: {} -> {shifted}",
            name.name,
            name.refers_to()
        );
        name.set_refers_to(shifted.to_string());
    }
}

fn copy_block(
    workbook: &mut Workbook,
    sheet_index: usize,
    start: u32,
    height: u32,
    copies: usize,
    policy: &CellCopyPolicy,
) -> Result<(), MergeFault> {
    let sheet = workbook
        .sheet_by_index_mut(sheet_index)
        .ok_or(WorkbookError::SheetIndexOutOfRange(sheet_index))?;
    let sheet_name = sheet.name.clone();
    let block_last = start + height - 1;

    for offset in 0..height {
        let src = start + offset;
        let Some(template) = sheet.row(src).cloned() else {
            continue;
        };
        let regions: Vec<Range> = if policy.copy_merged_regions {
            sheet
                .merged_regions()
                .iter()
                .filter(|r| r.start.row == src && r.end.row <= block_last)
                .copied()
                .collect()
        } else {
            Vec::new()
        };

        for copy in 1..copies as u32 {
            let dest = src + height * copy;
            sheet.insert_row(dest, copy_row(&template, &sheet_name, src, dest, policy));
            for region in &regions {
                if let Some(moved) = region.offset_rows(dest - src) {
                    sheet.merged_regions_mut().add(moved)?;
                }
            }
        }
    }
    Ok(())
}

/// A copy of `template` (row `src`) for row `dest`.
pub(crate) fn copy_row(
    template: &Row,
    sheet_name: &str,
    src: u32,
    dest: u32,
    policy: &CellCopyPolicy,
) -> Row {
    let mut row = Row::new();
    if policy.copy_row_height {
        row.height = template.height;
        row.hidden = template.hidden;
    }
    if policy.copy_style {
        row.style_id = template.style_id;
    }
    for (&col, cell) in &template.cells {
        let mut copy = Cell::default();
        if policy.copy_value {
            copy.value = cell.value.clone();
        }
        if policy.copy_style {
            copy.style_id = cell.style_id;
        }
        if policy.copy_formula {
            copy.formula = cell
                .formula
                .as_deref()
                .map(|f| rewrite_same_row_refs(f, sheet_name, src, dest));
        }
        row.set_cell(col, copy);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use xlmerge_model::{CellValue, DataValidationAssignment, DefinedName};

    fn a1(text: &str) -> CellRef {
        CellRef::from_a1(text).unwrap()
    }

    fn range(text: &str) -> Range {
        Range::from_a1(text).unwrap()
    }

    /// Header on row 1, a two-row block on rows 2-3, a total on row 5.
    fn template() -> Workbook {
        let mut workbook = Workbook::new();
        workbook.add_sheet("Sales Data").unwrap();
        let sheet = &mut workbook.sheets[0];
        sheet.set_value(a1("A1"), "Item");
        sheet.set_value(a1("A2"), "name");
        sheet.get_or_create_cell(a1("C2")).set_formula("A2&B2&$A$2&A3");
        sheet.get_or_create_row(1).height = Some(25.0);
        sheet.set_value(a1("A3"), "detail");
        sheet.set_value(a1("A5"), "Total");
        sheet.get_or_create_cell(a1("B5")).set_formula("SUM(B2:B3)");
        sheet.merged_regions_mut().add(range("A2:B2")).unwrap();
        sheet.merged_regions_mut().add(range("A5:B5")).unwrap();
        sheet.add_data_validation(DataValidationAssignment::explicit_list(
            vec![range("D5:D6")],
            &["a", "b"],
        ));
        workbook.add_defined_name(DefinedName::new("Body", "'Sales Data'!$A$2:$B$3"));
        workbook.add_defined_name(DefinedName::new("Footer", "'Sales Data'!$A$5"));
        workbook.add_defined_name(DefinedName::new("Header", "'Sales Data'!$A$1"));
        workbook
    }

    #[test]
    fn block_expansion_shifts_and_repairs_structures() {
        let mut workbook = template();
        duplicate_block(&mut workbook, 0, 1, 2, 3, &CellCopyPolicy::default()).unwrap();
        let sheet = &workbook.sheets[0];

        assert_eq!(sheet.value(a1("A9")), CellValue::from("Total"));
        assert_eq!(
            sheet.cell(a1("B9")).and_then(|c| c.formula.as_deref()),
            Some("SUM(B2:B3)")
        );
        for (name_row, detail_row) in [(2, 3), (4, 5), (6, 7)] {
            assert_eq!(sheet.value(CellRef::new(name_row - 1, 0)), CellValue::from("name"));
            assert_eq!(sheet.value(CellRef::new(detail_row - 1, 0)), CellValue::from("detail"));
            assert_eq!(sheet.row(name_row - 1).and_then(|r| r.height), Some(25.0));
        }
        assert_eq!(
            sheet.cell(a1("C4")).and_then(|c| c.formula.as_deref()),
            Some("A4&B4&$A$2&A3")
        );
        assert_eq!(
            sheet.merged_regions().as_slice(),
            &[range("A2:B2"), range("A9:B9"), range("A4:B4"), range("A6:B6")]
        );
        assert_eq!(sheet.data_validations()[0].ranges, vec![range("D9:D10")]);

        let refers = |name: &str| workbook.defined_name(name).map(|n| n.refers_to().to_string());
        assert_eq!(refers("Body").as_deref(), Some("'Sales Data'!$A$2:$B$7"));
        assert_eq!(refers("Footer").as_deref(), Some("'Sales Data'!$A$9"));
        assert_eq!(refers("Header").as_deref(), Some("'Sales Data'!$A$1"));
    }

    #[test]
    fn validations_move_only_when_inside_the_shifted_rows() {
        let mut workbook = template();
        let sheet = &mut workbook.sheets[0];
        for sqref in ["E3:E4", "F4:F10", "G4:G11"] {
            sheet.add_data_validation(DataValidationAssignment::explicit_list(
                vec![range(sqref)],
                &["x"],
            ));
        }

        // Rows 4..=6 (last used row plus one) move down by 4; the window ends at row 10.
        duplicate_block(&mut workbook, 0, 1, 2, 3, &CellCopyPolicy::default()).unwrap();
        let ranges: Vec<Range> = workbook.sheets[0]
            .data_validations()
            .iter()
            .flat_map(|v| v.ranges.iter().copied())
            .collect();
        assert_eq!(
            ranges,
            vec![range("D9:D10"), range("E3:E4"), range("F8:F14"), range("G4:G11")]
        );
    }

    #[test]
    fn a_single_copy_changes_nothing() {
        let mut workbook = template();
        let before = workbook.clone();
        duplicate_block(&mut workbook, 0, 1, 2, 1, &CellCopyPolicy::default()).unwrap();
        assert_eq!(workbook, before);
    }

    #[test]
    fn copy_policy_limits_what_is_copied() {
        let policy = CellCopyPolicy {
            copy_value: false,
            copy_merged_regions: false,
            ..CellCopyPolicy::default()
        };
        let mut workbook = template();
        duplicate_block(&mut workbook, 0, 1, 1, 2, &policy).unwrap();
        let sheet = &workbook.sheets[0];
        let copied = sheet.cell(a1("A3")).unwrap();
        assert!(copied.is_blank());
        assert_eq!(
            sheet.cell(a1("C3")).and_then(|c| c.formula.as_deref()),
            Some("A3&B3&$A$2&A4")
        );
        assert!(!sheet.merged_regions().contains(&range("A3:B3")));
    }

    #[test]
    fn overlapping_copied_region_is_an_error() {
        let mut workbook = Workbook::new();
        workbook.add_sheet("S").unwrap();
        let sheet = &mut workbook.sheets[0];
        sheet.set_value(a1("A2"), "block");
        sheet.set_value(a1("A3"), "block, second row");
        sheet.merged_regions_mut().add(range("A2:B2")).unwrap();
        // Starts inside the block and hangs out of it, into the first copy.
        sheet.merged_regions_mut().add(range("A3:A4")).unwrap();

        let err = duplicate_block(&mut workbook, 0, 1, 2, 2, &CellCopyPolicy::default()).unwrap_err();
        assert!(matches!(err, MergeFault::MergedRegion(_)), "{err}");
    }
}
