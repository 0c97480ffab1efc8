//! The recursive walk that fills a template sheet.

use std::collections::HashMap;
use std::fmt;

use xlmerge_model::{CellRef, Row, StyleTable, Workbook, Worksheet};

use crate::context::Context;
use crate::converter::CellSlot;
use crate::data::DataNode;
use crate::error::{ConvertError, MergeError, MergeFault};
use crate::field::{FieldCatalog, FieldKind};
use crate::mutator::duplicate_block;
use crate::options::MergeOptions;
use crate::placeholder::{self, detect_group, GroupPlaceholder};
use crate::recalc::{FormulaEvaluator, RecalcOnLoad};
use crate::value::Value;

/// Fill `sheet_name` with `root` using the default options.
pub fn merge_data(
    workbook: &mut Workbook,
    sheet_name: &str,
    catalog: &FieldCatalog,
    root: &DataNode,
) -> Result<(), MergeError> {
    Merger::default().merge(workbook, sheet_name, catalog, root)
}

/// A configured merge run.
pub struct Merger {
    options: MergeOptions,
    evaluator: Box<dyn FormulaEvaluator>,
}

impl fmt::Debug for Merger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Merger")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for Merger {
    fn default() -> Self {
        Self::new(MergeOptions::default())
    }
}

impl Merger {
    pub fn new(options: MergeOptions) -> Self {
        Self {
            options,
            evaluator: Box::new(RecalcOnLoad),
        }
    }

    /// Replace the hook that runs once the sheet is filled.
    pub fn with_evaluator(mut self, evaluator: impl FormulaEvaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Walk `sheet_name` from its first to its last row, expanding row groups and
    /// substituting placeholders from `root`.
    pub fn merge(
        &self,
        workbook: &mut Workbook,
        sheet_name: &str,
        catalog: &FieldCatalog,
        root: &DataNode,
    ) -> Result<(), MergeError> {
        let sheet_index = workbook
            .sheet_index(sheet_name)
            .ok_or_else(|| MergeError::SheetNotFound(sheet_name.to_string()))?;
        let sheet = &workbook.sheets[sheet_index];
        if let (Some(first), Some(last)) = (sheet.first_row_index(), sheet.last_row_index()) {
            let mut ctx = Context::new(sheet_index, sheet.name.clone(), first, catalog, &self.options);
            merge_group(&mut ctx, workbook, std::slice::from_ref(root), last - first + 1)?;
            log::debug!(
                "merged sheet `{sheet_name}`: template rows {}..={}, now {} rows",
                first + 1,
                last + 1,
                workbook.sheets[sheet_index].physical_row_count()
            );
        }
        self.evaluator.evaluate_all(workbook);
        Ok(())
    }
}

fn fault(ctx: &Context<'_>, row: u32, source: impl Into<MergeFault>) -> MergeError {
    MergeError::Sheet {
        sheet: ctx.sheet_name.clone(),
        row,
        source: source.into(),
    }
}

/// Merge each node of `nodes` over the next `window` template rows.
fn merge_group(
    ctx: &mut Context<'_>,
    workbook: &mut Workbook,
    nodes: &[DataNode],
    window: u32,
) -> Result<(), MergeError> {
    for node in nodes {
        let mut scanned = 0u32;
        while scanned < window {
            let row = ctx.current_row();
            let sheet = &workbook.sheets[ctx.sheet_index];
            if sheet.row(row).is_none() {
                ctx.advance(1);
                scanned += 1;
                continue;
            }

            let Some(group) = detect_group(ctx.catalog, sheet, row) else {
                merge_row(ctx, workbook, node, row)?;
                ctx.advance(1);
                scanned += 1;
                continue;
            };

            clear_group_marker(workbook, ctx.sheet_index, &group)
                .map_err(|err| fault(ctx, row, err))?;
            let children = node.groups(&group.placeholder.field).unwrap_or_default();
            if children.is_empty() {
                merge_row(ctx, workbook, node, row)?;
                ctx.advance(1);
                scanned += 1;
                continue;
            }

            duplicate_block(
                workbook,
                ctx.sheet_index,
                row,
                group.rows,
                children.len(),
                &ctx.options.copy_policy,
            )
            .map_err(|err| fault(ctx, row, err))?;
            merge_group(ctx, workbook, children, group.rows)?;
            scanned = scanned.saturating_add(group.rows);
        }
    }
    Ok(())
}

fn merge_row(
    ctx: &Context<'_>,
    workbook: &mut Workbook,
    node: &DataNode,
    row: u32,
) -> Result<(), MergeError> {
    let Workbook { sheets, styles, .. } = workbook;
    let sheet = &mut sheets[ctx.sheet_index];
    let Some(cells) = sheet.row_mut(row) else {
        return Ok(());
    };
    let effects = substitute_row(
        cells,
        row,
        node,
        ctx.catalog,
        ctx.options.max_placeholders_per_cell,
        styles,
    )
    .map_err(|err| fault(ctx, row, err))?;
    effects.apply(sheet, row);
    Ok(())
}

/// Remove a group marker from its cell and let the field's converter see the row once, so
/// row-level converters (automatic height) take effect.
pub(crate) fn clear_group_marker(
    workbook: &mut Workbook,
    sheet_index: usize,
    group: &GroupPlaceholder,
) -> Result<(), ConvertError> {
    let Workbook { sheets, styles, .. } = workbook;
    let sheet = &mut sheets[sheet_index];
    let placeholder = &group.placeholder;
    placeholder::clear(sheet, placeholder);
    let Some(row) = sheet.row_mut(placeholder.cell.row) else {
        return Ok(());
    };
    let mut slot = CellSlot::new(row, placeholder.cell.row, placeholder.cell.col, styles);
    placeholder
        .field
        .converter()
        .apply(&mut slot, &placeholder.pattern, &Value::Null)
}

/// Sheet-level changes requested while substituting a row.
#[derive(Debug, Default)]
pub(crate) struct RowEffects {
    pub hidden_columns: Vec<u32>,
    pub page_break: bool,
}

impl RowEffects {
    pub fn apply(&self, sheet: &mut Worksheet, row: u32) {
        for &col in &self.hidden_columns {
            sheet.set_column_hidden(col, true);
        }
        if self.page_break {
            sheet.set_row_break(row);
        }
    }
}

/// Substitute every placeholder of `row` with values from `node`, cells left to right.
///
/// Consuming fields take their values in order of appearance across the whole row.
pub(crate) fn substitute_row(
    row: &mut Row,
    row_index: u32,
    node: &DataNode,
    catalog: &FieldCatalog,
    max_per_cell: usize,
    styles: &mut StyleTable,
) -> Result<RowEffects, ConvertError> {
    let mut effects = RowEffects::default();
    let mut offsets: HashMap<String, usize> = HashMap::new();

    for col in row.cell_indexes() {
        for _ in 0..max_per_cell {
            let Some(parsed) = row
                .cell(col)
                .and_then(|cell| placeholder::parse(catalog, CellRef::new(row_index, col), cell))
            else {
                break;
            };
            let placeholder = parsed.placeholder();
            let field = &placeholder.field;
            let kind = field.kind();
            let mut slot = CellSlot::new(row, row_index, col, styles);

            if kind == FieldKind::PageBreak {
                field
                    .converter()
                    .apply(&mut slot, &placeholder.pattern, &Value::Null)?;
                effects.page_break = true;
                break;
            }
            if !kind.merges_value() {
                break;
            }

            let offset = if kind.consumes_value() {
                let next = offsets.entry(field.key().to_string()).or_insert(0);
                *next += 1;
                *next - 1
            } else {
                0
            };
            match node.value(field, offset) {
                Some(value) => field.converter().apply(&mut slot, &placeholder.pattern, value)?,
                None => {
                    field
                        .converter()
                        .apply(&mut slot, &placeholder.pattern, &Value::Null)?;
                    if kind.hides_column_on_empty() {
                        effects.hidden_columns.push(col);
                    }
                }
            }
        }
    }
    Ok(effects)
}
