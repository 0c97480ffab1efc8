use std::io::Seek;

use pretty_assertions::assert_eq;
use xlmerge::model::{CellRef, CellValue, StyleTable, Workbook};
use xlmerge::xlsx::XlsxDocument;
use xlmerge::{
    init_row_filler, Converter, DataNode, FieldCatalog, MergeError, MergeField, RowFiller,
    RowFillerOptions,
};

struct Fields {
    rows: MergeField,
    name: MergeField,
    amount: MergeField,
}

impl Fields {
    fn new() -> Self {
        Self {
            rows: MergeField::repeat_row("rows"),
            name: MergeField::simple("name", Converter::string()),
            amount: MergeField::simple("amount", Converter::integer()),
        }
    }

    fn catalog(&self) -> FieldCatalog {
        [self.rows.clone(), self.name.clone(), self.amount.clone()]
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    fn record(&self, idx: i64) -> DataNode {
        let mut node = DataNode::new();
        node.add_value(&self.name, format!("n{idx}")).unwrap();
        node.add_value(&self.amount, idx).unwrap();
        node
    }
}

/// Header on row 1, the streamed template on row 2.
fn template(marker: &str) -> Workbook {
    let mut workbook = Workbook::new();
    workbook.add_sheet("Data").unwrap();
    workbook.styles = StyleTable::new(3);
    let sheet = &mut workbook.sheets[0];
    sheet.set_value(CellRef::new(0, 0), "Name");
    sheet.set_value(CellRef::new(0, 1), "Amount");
    sheet.set_value(CellRef::new(1, 0), "{name}").style_id = 2;
    sheet.set_value(CellRef::new(1, 1), "{amount}");
    sheet
        .get_or_create_cell(CellRef::new(1, 2))
        .set_formula("B2*2");
    sheet.set_value(CellRef::new(1, 3), marker);
    workbook
}

#[test]
fn single_record_fills_the_template_row_only() -> Result<(), Box<dyn std::error::Error>> {
    let fields = Fields::new();
    let catalog = fields.catalog();
    let mut doc = XlsxDocument::from_workbook(template("{rows}"))?;
    let template_rows = doc.workbook().sheets[0].physical_row_count();

    let mut filler = init_row_filler(doc.workbook_mut(), "Data", &catalog, 1)?;
    filler.fill_row(fields.record(7))?;
    let streamed = filler.finish()?;
    assert_eq!(streamed.row_count(), 0);

    let loaded = XlsxDocument::from_bytes(&doc.save_with_streamed(vec![streamed])?)?;
    let sheet = &loaded.workbook().sheets[0];
    assert_eq!(sheet.physical_row_count(), template_rows);
    assert_eq!(sheet.value(CellRef::new(1, 0)), CellValue::from("n7"));
    assert_eq!(sheet.value(CellRef::new(1, 1)), CellValue::Number(7.0));
    assert_eq!(sheet.cell(CellRef::new(1, 0)).map(|c| c.style_id), Some(2));
    assert!(sheet.cell(CellRef::new(1, 3)).map_or(true, |c| c.is_blank()));
    assert!(loaded.workbook().calc_settings.full_calc_on_load);
    Ok(())
}

#[test]
fn records_stream_below_the_template_row() -> Result<(), Box<dyn std::error::Error>> {
    let fields = Fields::new();
    let catalog = fields.catalog();
    let mut doc = XlsxDocument::from_workbook(template("{rows}"))?;

    let options = RowFillerOptions {
        window_size: 4,
        ..RowFillerOptions::default()
    };
    let mut filler = RowFiller::new(doc.workbook_mut(), "Data", &catalog, 25, options)?;
    assert_eq!(filler.source_row(), 1);
    for idx in 0..25 {
        filler.fill_row(fields.record(idx))?;
    }
    assert_eq!(filler.filled(), 25);
    let streamed = filler.finish()?;
    assert_eq!(streamed.row_count(), 24);

    let mut file = doc.save_to(vec![streamed], tempfile::tempfile()?)?;
    file.rewind()?;
    let loaded = XlsxDocument::from_reader(file)?;
    let sheet = &loaded.workbook().sheets[0];
    assert_eq!(sheet.physical_row_count(), 26);
    assert_eq!(sheet.value(CellRef::new(0, 0)), CellValue::from("Name"));
    for idx in 0..25u32 {
        let row = idx + 1;
        assert_eq!(
            sheet.value(CellRef::new(row, 0)),
            CellValue::from(format!("n{idx}"))
        );
        assert_eq!(sheet.value(CellRef::new(row, 1)), CellValue::Number(f64::from(idx)));
        assert_eq!(sheet.cell(CellRef::new(row, 0)).map(|c| c.style_id), Some(2));
        assert_eq!(
            sheet
                .cell(CellRef::new(row, 2))
                .and_then(|c| c.formula.clone()),
            Some(format!("B{}*2", row + 1))
        );
    }
    Ok(())
}

#[test]
fn fill_count_is_enforced() -> Result<(), Box<dyn std::error::Error>> {
    let fields = Fields::new();
    let catalog = fields.catalog();

    let mut workbook = template("{rows}");
    let mut filler = init_row_filler(&mut workbook, "Data", &catalog, 2)?;
    filler.fill_row(fields.record(0))?;
    let err = filler.finish().unwrap_err();
    assert!(matches!(
        err,
        MergeError::IncompleteFill {
            expected: 2,
            filled: 1
        }
    ));

    let mut workbook = template("{rows}");
    let mut filler = init_row_filler(&mut workbook, "Data", &catalog, 1)?;
    filler.fill_row(fields.record(0))?;
    let err = filler.fill_row(fields.record(1)).unwrap_err();
    assert!(matches!(err, MergeError::TooManyRows { row_count: 1 }));
    Ok(())
}

#[test]
fn template_must_hold_a_one_row_group() {
    let fields = Fields::new();
    let catalog = fields.catalog();

    let mut workbook = template("");
    let err = init_row_filler(&mut workbook, "Data", &catalog, 3).err();
    assert!(matches!(err, Some(MergeError::NoGroupMarker(sheet)) if sheet == "Data"));

    let mut workbook = template("{rows:2}");
    let err = init_row_filler(&mut workbook, "Data", &catalog, 3).err();
    assert!(matches!(err, Some(MergeError::UnsupportedGroupSpan { rows: 2 })));

    let mut workbook = template("{rows}");
    let err = init_row_filler(&mut workbook, "Nope", &catalog, 3).err();
    assert!(matches!(err, Some(MergeError::SheetNotFound(_))));
}

#[test]
fn no_records_clear_the_template_row() -> Result<(), Box<dyn std::error::Error>> {
    let fields = Fields::new();
    let catalog = fields.catalog();
    let mut workbook = template("{rows}");
    let streamed = init_row_filler(&mut workbook, "Data", &catalog, 0)?.finish()?;
    assert_eq!(streamed.row_count(), 0);
    assert_eq!(workbook.sheets[0].value(CellRef::new(1, 0)), CellValue::from(""));
    Ok(())
}
