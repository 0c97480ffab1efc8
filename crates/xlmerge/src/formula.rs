use xlmerge_model::formula_refs::rewrite_cell_refs;

/// Rewrite the formula of a cell copied from row `src` of `sheet` to row `dest`.
///
/// Only references to row `src` with a relative row part move; `$A$1`, `A$1` and references to
/// other rows or other sheets keep their text.
pub fn rewrite_same_row_refs(formula: &str, sheet: &str, src: u32, dest: u32) -> String {
    if src == dest {
        return formula.to_string();
    }
    rewrite_cell_refs(formula, |token| {
        if !token.row_absolute && token.cell.row == src && token.targets_sheet(sheet) {
            token.cell.row = dest;
        }
    })
}
