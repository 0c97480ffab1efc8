use std::fmt::Write as _;
use std::io::Write;

use quick_xml::escape::escape;
use quick_xml::events::BytesStart;
use xlmerge_model::{
    format_sqref, Cell, CellRef, CellValue, ColProperties, Range, Row, Worksheet, EXCEL_MAX_COLS,
};

use super::sections::SectionWriter;
use crate::streaming::{Bounds, StreamedRows, StreamedSheet};
use crate::XlsxError;

/// Children of `<worksheet>` in schema order.
pub(crate) const WORKSHEET_ORDER: &[&str] = &[
    "sheetPr",
    "dimension",
    "sheetViews",
    "sheetFormatPr",
    "cols",
    "sheetData",
    "sheetCalcPr",
    "sheetProtection",
    "protectedRanges",
    "scenarios",
    "autoFilter",
    "sortState",
    "dataConsolidate",
    "customSheetViews",
    "mergeCells",
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

/// Regenerates the row data and sheet structures of one worksheet from the model.
pub(crate) struct WorksheetSections<'a> {
    sheet: &'a Worksheet,
    streamed: Option<StreamedSheet>,
}

impl<'a> WorksheetSections<'a> {
    pub(crate) fn new(sheet: &'a Worksheet, streamed: Option<StreamedSheet>) -> Self {
        Self { sheet, streamed }
    }

    fn bounds(&self) -> Bounds {
        let mut bounds = Bounds::default();
        for (idx, row) in self.sheet.rows() {
            bounds.include(idx, row);
        }
        match &self.streamed {
            Some(streamed) => bounds.union(streamed.bounds),
            None => bounds,
        }
    }

    fn write_dimension(&self, out: &mut dyn Write, p: &str) -> Result<(), XlsxError> {
        let bounds = self.bounds();
        let (first_row, last_row) = bounds.rows.unwrap_or((0, 0));
        let (first_col, last_col) = bounds.cols.unwrap_or((0, 0));
        let range = Range::new(
            CellRef::new(first_row, first_col),
            CellRef::new(last_row, last_col),
        );
        write!(out, r#"<{p}dimension ref="{range}"/>"#)?;
        Ok(())
    }

    fn write_sheet_data(&mut self, out: &mut dyn Write, p: &str) -> Result<(), XlsxError> {
        let mut streamed = self.streamed.take().map(StreamedSheet::into_rows);
        let mut line = String::new();

        write!(out, "<{p}sheetData>")?;
        let mut pending = next_streamed(&mut streamed)?;
        for (idx, row) in self.sheet.rows() {
            let mut replaced = false;
            while let Some((s_idx, s_row)) = pending.take() {
                if s_idx > idx {
                    pending = Some((s_idx, s_row));
                    break;
                }
                write_row(out, &mut line, p, s_idx, &s_row)?;
                replaced |= s_idx == idx;
                pending = next_streamed(&mut streamed)?;
            }
            if !replaced {
                write_row(out, &mut line, p, idx, row)?;
            }
        }
        while let Some((s_idx, s_row)) = pending.take() {
            write_row(out, &mut line, p, s_idx, &s_row)?;
            pending = next_streamed(&mut streamed)?;
        }
        write!(out, "</{p}sheetData>")?;
        Ok(())
    }

    fn write_cols(&self, out: &mut dyn Write, p: &str) -> Result<(), XlsxError> {
        let mut runs: Vec<(u32, u32, &ColProperties)> = Vec::new();
        for (col, props) in self.sheet.columns() {
            match runs.last_mut() {
                Some((_, last, run_props)) if *last + 1 == col && *run_props == props => {
                    *last = col;
                }
                _ => runs.push((col, col, props)),
            }
        }
        if runs.is_empty() {
            return Ok(());
        }

        let mut s = format!("<{p}cols>");
        for (first, last, props) in runs {
            let _ = write!(
                s,
                r#"<{p}col min="{}" max="{}""#,
                first + 1,
                (last + 1).min(EXCEL_MAX_COLS)
            );
            if let Some(width) = props.width {
                let _ = write!(s, r#" width="{width}" customWidth="1""#);
            }
            if let Some(style) = props.style_id {
                let _ = write!(s, r#" style="{style}""#);
            }
            if props.hidden {
                s.push_str(r#" hidden="1""#);
            }
            s.push_str("/>");
        }
        let _ = write!(s, "</{p}cols>");
        out.write_all(s.as_bytes())?;
        Ok(())
    }

    fn write_merge_cells(&self, out: &mut dyn Write, p: &str) -> Result<(), XlsxError> {
        let regions = self.sheet.merged_regions();
        if regions.is_empty() {
            return Ok(());
        }
        let mut s = format!(r#"<{p}mergeCells count="{}">"#, regions.len());
        for region in regions.iter() {
            let _ = write!(s, r#"<{p}mergeCell ref="{region}"/>"#);
        }
        let _ = write!(s, "</{p}mergeCells>");
        out.write_all(s.as_bytes())?;
        Ok(())
    }

    fn write_data_validations(&self, out: &mut dyn Write, p: &str) -> Result<(), XlsxError> {
        let validations: Vec<_> = self
            .sheet
            .data_validations()
            .iter()
            .filter(|dv| !dv.ranges.is_empty())
            .collect();
        if validations.is_empty() {
            return Ok(());
        }

        let mut s = format!(r#"<{p}dataValidations count="{}">"#, validations.len());
        for assignment in validations {
            let dv = &assignment.validation;
            let _ = write!(s, "<{p}dataValidation");
            if dv.kind != Default::default() {
                let _ = write!(s, r#" type="{}""#, dv.kind.as_ooxml());
            }
            if let Some(style) = &dv.error_style {
                let _ = write!(s, r#" errorStyle="{}""#, escape(style.as_str()));
            }
            if let Some(op) = dv.operator {
                let _ = write!(s, r#" operator="{}""#, op.as_ooxml());
            }
            for (flag, name) in [
                (dv.allow_blank, "allowBlank"),
                (dv.hide_drop_down, "showDropDown"),
                (dv.show_input_message, "showInputMessage"),
                (dv.show_error_message, "showErrorMessage"),
            ] {
                if flag {
                    let _ = write!(s, r#" {name}="1""#);
                }
            }
            if let Some(error) = &dv.error {
                push_opt_attr(&mut s, "errorTitle", error.title.as_deref());
                push_opt_attr(&mut s, "error", error.body.as_deref());
            }
            if let Some(prompt) = &dv.prompt {
                push_opt_attr(&mut s, "promptTitle", prompt.title.as_deref());
                push_opt_attr(&mut s, "prompt", prompt.body.as_deref());
            }
            let _ = write!(s, r#" sqref="{}""#, format_sqref(&assignment.ranges));

            if dv.formula1.is_none() && dv.formula2.is_none() {
                s.push_str("/>");
                continue;
            }
            s.push('>');
            if let Some(f) = &dv.formula1 {
                let _ = write!(s, "<{p}formula1>{}</{p}formula1>", escape(f.as_str()));
            }
            if let Some(f) = &dv.formula2 {
                let _ = write!(s, "<{p}formula2>{}</{p}formula2>", escape(f.as_str()));
            }
            let _ = write!(s, "</{p}dataValidation>");
        }
        let _ = write!(s, "</{p}dataValidations>");
        out.write_all(s.as_bytes())?;
        Ok(())
    }

    fn write_row_breaks(&self, out: &mut dyn Write, p: &str) -> Result<(), XlsxError> {
        let breaks: Vec<u32> = self.sheet.row_breaks().collect();
        if breaks.is_empty() {
            return Ok(());
        }
        let mut s = format!(
            r#"<{p}rowBreaks count="{0}" manualBreakCount="{0}">"#,
            breaks.len()
        );
        for row in breaks {
            let _ = write!(
                s,
                r#"<{p}brk id="{}" max="{}" man="1"/>"#,
                row + 1,
                EXCEL_MAX_COLS - 1
            );
        }
        let _ = write!(s, "</{p}rowBreaks>");
        out.write_all(s.as_bytes())?;
        Ok(())
    }
}

impl SectionWriter for WorksheetSections<'_> {
    fn managed(&self) -> &'static [&'static str] {
        &[
            "dimension",
            "cols",
            "sheetData",
            "mergeCells",
            "dataValidations",
            "rowBreaks",
        ]
    }

    fn write_section(
        &mut self,
        out: &mut dyn Write,
        name: &str,
        _original: Option<&BytesStart<'_>>,
        prefix: &str,
    ) -> Result<(), XlsxError> {
        match name {
            "dimension" => self.write_dimension(out, prefix),
            "cols" => self.write_cols(out, prefix),
            "sheetData" => self.write_sheet_data(out, prefix),
            "mergeCells" => self.write_merge_cells(out, prefix),
            "dataValidations" => self.write_data_validations(out, prefix),
            "rowBreaks" => self.write_row_breaks(out, prefix),
            _ => Ok(()),
        }
    }
}

fn push_opt_attr(s: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        let _ = write!(s, r#" {name}="{}""#, escape(value));
    }
}

fn next_streamed(rows: &mut Option<StreamedRows>) -> Result<Option<(u32, Row)>, XlsxError> {
    rows.as_mut().and_then(Iterator::next).transpose()
}

fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) || s.contains('\n')
}

fn write_row(
    out: &mut dyn Write,
    line: &mut String,
    p: &str,
    idx: u32,
    row: &Row,
) -> Result<(), XlsxError> {
    line.clear();
    let _ = write!(line, r#"<{p}row r="{}""#, idx + 1);
    if let Some(style) = row.style_id {
        let _ = write!(line, r#" s="{style}" customFormat="1""#);
    }
    if let Some(height) = row.height {
        let _ = write!(line, r#" ht="{height}" customHeight="1""#);
    }
    if row.hidden {
        line.push_str(r#" hidden="1""#);
    }
    if row.is_empty() {
        line.push_str("/>");
    } else {
        line.push('>');
        for (col, cell) in &row.cells {
            push_cell(line, p, CellRef::new(idx, *col), cell);
        }
        let _ = write!(line, "</{p}row>");
    }
    out.write_all(line.as_bytes())?;
    Ok(())
}

fn push_cell(s: &mut String, p: &str, at: CellRef, cell: &Cell) {
    let _ = write!(s, r#"<{p}c r="{}""#, at.to_a1());
    if cell.style_id != 0 {
        let _ = write!(s, r#" s="{}""#, cell.style_id);
    }
    let type_ = match (&cell.value, cell.formula.is_some()) {
        (CellValue::String(_), false) => Some("inlineStr"),
        (CellValue::String(_), true) => Some("str"),
        (CellValue::Boolean(_), _) => Some("b"),
        (CellValue::Error(_), _) => Some("e"),
        (CellValue::Number(n), _) if !n.is_finite() => Some("e"),
        _ => None,
    };
    if let Some(t) = type_ {
        let _ = write!(s, r#" t="{t}""#);
    }
    if cell.formula.is_none() && cell.value.is_empty() {
        s.push_str("/>");
        return;
    }
    s.push('>');

    if let Some(formula) = &cell.formula {
        let _ = write!(s, "<{p}f>{}</{p}f>", escape(formula.as_str()));
    }
    match &cell.value {
        CellValue::String(text) if cell.formula.is_none() => {
            let _ = write!(s, "<{p}is><{p}t");
            if needs_space_preserve(text) {
                s.push_str(r#" xml:space="preserve""#);
            }
            let _ = write!(s, ">{}</{p}t></{p}is>", escape(text.as_str()));
        }
        CellValue::String(text) | CellValue::Error(text) => {
            let _ = write!(s, "<{p}v>{}</{p}v>", escape(text.as_str()));
        }
        CellValue::Number(n) if n.is_finite() => {
            let _ = write!(s, "<{p}v>{n}</{p}v>");
        }
        CellValue::Number(_) => {
            let _ = write!(s, "<{p}v>#NUM!</{p}v>");
        }
        CellValue::Boolean(b) => {
            let _ = write!(s, "<{p}v>{}</{p}v>", if *b { 1 } else { 0 });
        }
        _ => {}
    }
    let _ = write!(s, "</{p}c>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::sections::patch_sections;
    use pretty_assertions::assert_eq;
    use xlmerge_model::DataValidationAssignment;

    const TEMPLATE: &str = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1"/><sheetViews><sheetView workbookViewId="0"/></sheetViews><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c></row></sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#;

    fn render(sheet: &Worksheet) -> String {
        let mut sections = WorksheetSections::new(sheet, None);
        let out = patch_sections(TEMPLATE.as_bytes(), WORKSHEET_ORDER, &mut sections, Vec::new())
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn writes_cells_inline_and_keeps_foreign_sections() {
        let mut sheet = Worksheet::new("S");
        sheet.set_value(CellRef::new(0, 0), " Name & Co ").style_id = 3;
        sheet.set_value(CellRef::new(1, 1), 2.5);
        sheet.set_value(CellRef::new(1, 2), true);
        sheet
            .get_or_create_cell(CellRef::new(1, 3))
            .set_formula("B2*2");
        sheet.get_or_create_row(2).hidden = true;

        let xml = render(&sheet);
        assert_eq!(
            xml,
            concat!(
                r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
                r#"<dimension ref="A1:D3"/>"#,
                r#"<sheetViews><sheetView workbookViewId="0"/></sheetViews>"#,
                r#"<sheetData>"#,
                r#"<row r="1"><c r="A1" s="3" t="inlineStr"><is><t xml:space="preserve"> Name &amp; Co </t></is></c></row>"#,
                r#"<row r="2"><c r="B2"><v>2.5</v></c><c r="C2" t="b"><v>1</v></c><c r="D2"><f>B2*2</f></c></row>"#,
                r#"<row r="3" hidden="1"/>"#,
                r#"</sheetData>"#,
                r#"<pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>"#,
                r#"</worksheet>"#
            )
        );
    }

    #[test]
    fn non_finite_numbers_become_num_errors() {
        let mut sheet = Worksheet::new("S");
        sheet.set_value(CellRef::new(0, 0), f64::NAN);
        sheet.set_value(CellRef::new(0, 1), f64::INFINITY);

        let xml = render(&sheet);
        assert!(
            xml.contains(r#"<row r="1"><c r="A1" t="e"><v>#NUM!</v></c><c r="B1" t="e"><v>#NUM!</v></c></row>"#),
            "{xml}"
        );
    }

    #[test]
    fn inserts_structures_in_schema_order() {
        let mut sheet = Worksheet::new("S");
        sheet.set_value(CellRef::new(0, 0), "x");
        sheet.set_column_hidden(2, true);
        sheet.set_column_hidden(3, true);
        sheet
            .merged_regions_mut()
            .add(Range::from_a1("A2:B2").unwrap())
            .unwrap();
        sheet.add_data_validation(DataValidationAssignment::explicit_list(
            vec![Range::from_a1("A3:A5").unwrap()],
            &["a", "b"],
        ));
        sheet.set_row_break(4);

        let xml = render(&sheet);
        let order: Vec<usize> = [
            "<cols>",
            "<sheetData>",
            "<mergeCells",
            "<dataValidations",
            "<pageMargins",
            "<rowBreaks",
        ]
        .iter()
        .map(|tag| xml.find(tag).unwrap_or_else(|| panic!("{tag} missing in {xml}")))
        .collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(order, sorted);

        assert!(xml.contains(r#"<col min="3" max="4" hidden="1"/>"#), "{xml}");
        assert!(xml.contains(r#"<mergeCell ref="A2:B2"/>"#), "{xml}");
        assert!(
            xml.contains(r#"<dataValidation type="list" allowBlank="1" showInputMessage="1" showErrorMessage="1" sqref="A3:A5"><formula1>&quot;a,b&quot;</formula1></dataValidation>"#),
            "{xml}"
        );
        assert!(xml.contains(r#"<brk id="5" max="16383" man="1"/>"#), "{xml}");
    }
}
