use proptest::prelude::*;
use xlmerge_model::formula_refs::{cell_refs, rewrite_cell_refs, shift_row_refs};
use xlmerge_model::CellRef;

#[test]
fn same_row_references_in_typical_template_formulas() {
    // Row 1 (index 0) references rewritten to row 100.
    let to_row_100 = |formula: &str| {
        rewrite_cell_refs(formula, |t| {
            if !t.row_absolute && t.cell.row == 0 {
                t.cell.row = 99;
            }
        })
    };
    assert_eq!(to_row_100("SUM(A1:B1)"), "SUM(A100:B100)");
    assert_eq!(to_row_100("A1+A1*3"), "A100+A100*3");
    assert_eq!(to_row_100("$A$1"), "$A$1");
    assert_eq!(to_row_100("$A1"), "$A100");
    assert_eq!(to_row_100("ABD1+A1"), "ABD100+A100");
    assert_eq!(to_row_100("A1B1"), "A1B1");
    assert_eq!(to_row_100("CONCAT(A1; \"A1\")"), "CONCAT(A100; \"A1\")");
}

#[test]
fn shift_only_touches_the_moved_band() {
    assert_eq!(
        shift_row_refs("SUM(B2:B9)+$C$12", "Sheet1", true, 4, 20, 3),
        "SUM(B2:B12)+$C$15"
    );
    let refs = cell_refs("'Other Sheet'!A1+B2");
    assert_eq!(refs[0].cell, CellRef::new(0, 0));
    assert_eq!(refs[1].cell, CellRef::new(1, 1));
}

proptest! {
    #[test]
    fn identity_rewrite_preserves_text(formula in "[ -~]{0,40}") {
        let rewritten = rewrite_cell_refs(&formula, |_| {});
        prop_assert_eq!(rewritten, formula);
    }

    #[test]
    fn row_offset_is_reversible_for_plain_refs(col in 0u32..100, row in 0u32..1000, n in 1u32..500) {
        let a1 = CellRef::new(row, col).to_a1();
        let down = rewrite_cell_refs(&a1, |t| t.cell.row += n);
        let up = rewrite_cell_refs(&down, |t| t.cell.row -= n);
        prop_assert_eq!(up, a1);
    }
}
