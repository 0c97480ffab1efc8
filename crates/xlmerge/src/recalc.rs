use xlmerge_model::Workbook;

/// Runs after a merge, once the sheet holds its final formulas.
pub trait FormulaEvaluator {
    fn evaluate_all(&self, workbook: &mut Workbook);
}

/// Leaves evaluation to the spreadsheet application: cached formula results are cleared and
/// a full recalculation on load is requested.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecalcOnLoad;

impl FormulaEvaluator for RecalcOnLoad {
    fn evaluate_all(&self, workbook: &mut Workbook) {
        let mut cleared = 0usize;
        for sheet in &mut workbook.sheets {
            for (_, row) in sheet.rows_mut() {
                for cell in row.cells.values_mut().filter(|c| c.is_formula()) {
                    cell.clear_cached_value();
                    cleared += 1;
                }
            }
        }
        workbook.calc_settings.full_calc_on_load = true;
        log::debug!("cleared {cleared} cached formula results");
    }
}
