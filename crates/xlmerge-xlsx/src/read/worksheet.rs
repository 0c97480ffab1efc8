use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use xlmerge_model::formula_refs::offset_relative_refs;
use xlmerge_model::{
    parse_sqref, Cell, CellRef, CellValue, ColProperties, DataValidation,
    DataValidationAssignment, DataValidationKind, DataValidationMessage, DataValidationOperator,
    Range, Worksheet, EXCEL_MAX_COLS,
};

use super::parse_xml_bool;
use crate::shared_strings::{read_string_item, read_text};
use crate::XlsxError;

/// Parse one worksheet part into the model.
///
/// Reads `cols`, `sheetData`, `mergeCells`, `dataValidations` and `rowBreaks`. Everything else
/// stays in the original XML and is carried through by the writer.
pub(crate) fn parse_worksheet_xml(
    name: &str,
    xml: &[u8],
    shared_strings: &[String],
) -> Result<Worksheet, XlsxError> {
    let mut sheet = Worksheet::new(name);
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut in_sheet_data = false;
    let mut in_cols = false;
    let mut in_data_validations = false;
    let mut in_row_breaks = false;

    let mut current_row: Option<u32> = None;
    let mut next_col: u32 = 0;
    let mut shared_formulas: HashMap<u32, (CellRef, String)> = HashMap::new();
    let mut pending_validation: Option<DataValidationAssignment> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            // Extension lists hold x14 copies of validations and other features we don't model.
            Event::Start(e) if e.local_name().as_ref() == b"extLst" => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }

            Event::Start(e) if e.local_name().as_ref() == b"cols" => in_cols = true,
            Event::End(e) if e.local_name().as_ref() == b"cols" => in_cols = false,
            Event::Start(e) | Event::Empty(e) if in_cols && e.local_name().as_ref() == b"col" => {
                read_col(&mut sheet, &e)?;
            }

            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => in_sheet_data = true,
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => in_sheet_data = false,

            Event::Start(e) | Event::Empty(e)
                if in_sheet_data && e.local_name().as_ref() == b"row" =>
            {
                let idx = read_row_start(&mut sheet, &e, current_row)?;
                current_row = Some(idx);
                next_col = 0;
            }

            Event::Start(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let row = current_row.unwrap_or(0);
                let attrs = CellAttrs::parse(&e, row, next_col)?;
                let content = read_cell_content(&mut reader)?;
                next_col = attrs.cell.col + 1;
                store_cell(&mut sheet, attrs, content, shared_strings, &mut shared_formulas)?;
            }
            Event::Empty(e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                let row = current_row.unwrap_or(0);
                let attrs = CellAttrs::parse(&e, row, next_col)?;
                next_col = attrs.cell.col + 1;
                store_cell(
                    &mut sheet,
                    attrs,
                    CellContent::default(),
                    shared_strings,
                    &mut shared_formulas,
                )?;
            }

            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"mergeCell" => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() != b"ref" {
                        continue;
                    }
                    let value = attr.unescape_value()?;
                    let range = Range::from_a1(&value)
                        .map_err(|_| XlsxError::InvalidCellRef(value.to_string()))?;
                    if let Err(err) = sheet.merged_regions_mut().add(range) {
                        log::warn!("sheet `{name}`: ignoring merged region {range}: {err}");
                    }
                }
            }

            Event::Start(e) if e.local_name().as_ref() == b"dataValidations" => {
                in_data_validations = true
            }
            Event::End(e) if e.local_name().as_ref() == b"dataValidations" => {
                in_data_validations = false
            }
            Event::Start(e) if in_data_validations && e.local_name().as_ref() == b"dataValidation" => {
                pending_validation = Some(read_data_validation(&e)?);
            }
            Event::Empty(e) if in_data_validations && e.local_name().as_ref() == b"dataValidation" => {
                sheet.add_data_validation(read_data_validation(&e)?);
            }
            Event::Start(e) if e.local_name().as_ref() == b"formula1" => {
                let text = read_text(&mut reader, b"formula1")?;
                if let Some(dv) = pending_validation.as_mut() {
                    dv.validation.formula1 = Some(text);
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"formula2" => {
                let text = read_text(&mut reader, b"formula2")?;
                if let Some(dv) = pending_validation.as_mut() {
                    dv.validation.formula2 = Some(text);
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"dataValidation" => {
                if let Some(dv) = pending_validation.take() {
                    sheet.add_data_validation(dv);
                }
            }

            Event::Start(e) if e.local_name().as_ref() == b"rowBreaks" => in_row_breaks = true,
            Event::End(e) if e.local_name().as_ref() == b"rowBreaks" => in_row_breaks = false,
            Event::Start(e) | Event::Empty(e)
                if in_row_breaks && e.local_name().as_ref() == b"brk" =>
            {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"id" {
                        // `id` is the first row of the next page.
                        let id: u32 = attr.unescape_value()?.trim().parse().unwrap_or(0);
                        if let Some(row) = id.checked_sub(1) {
                            sheet.set_row_break(row);
                        }
                    }
                }
            }

            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(sheet)
}

fn read_col(sheet: &mut Worksheet, e: &BytesStart<'_>) -> Result<(), XlsxError> {
    let mut min: Option<u32> = None;
    let mut max: Option<u32> = None;
    let mut props = ColProperties::default();
    let mut custom_width = true;

    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"min" => min = value.trim().parse().ok(),
            b"max" => max = value.trim().parse().ok(),
            b"width" => props.width = value.trim().parse().ok(),
            b"customWidth" => custom_width = parse_xml_bool(&value),
            b"hidden" => props.hidden = parse_xml_bool(&value),
            b"style" => props.style_id = value.trim().parse().ok(),
            _ => {}
        }
    }
    if !custom_width && !props.hidden {
        props.width = None;
    }

    let Some(min) = min.filter(|m| *m > 0) else {
        return Ok(());
    };
    let max = max.unwrap_or(min).min(EXCEL_MAX_COLS);
    if props.is_default() {
        return Ok(());
    }
    for col in min..=max {
        sheet.set_column_properties(col - 1, props.clone());
    }
    Ok(())
}

fn read_row_start(
    sheet: &mut Worksheet,
    e: &BytesStart<'_>,
    previous: Option<u32>,
) -> Result<u32, XlsxError> {
    let mut idx = previous.map_or(0, |p| p + 1);
    let mut height: Option<f64> = None;
    let mut custom_height = false;
    let mut hidden = false;
    let mut style: Option<u32> = None;
    let mut custom_format = false;

    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"r" => {
                let r: u32 = value
                    .trim()
                    .parse()
                    .map_err(|_| XlsxError::InvalidCellRef(value.to_string()))?;
                idx = r
                    .checked_sub(1)
                    .ok_or_else(|| XlsxError::InvalidCellRef(value.to_string()))?;
            }
            b"ht" => height = value.trim().parse().ok(),
            b"customHeight" => custom_height = parse_xml_bool(&value),
            b"hidden" => hidden = parse_xml_bool(&value),
            b"s" => style = value.trim().parse().ok(),
            b"customFormat" => custom_format = parse_xml_bool(&value),
            _ => {}
        }
    }

    let row = sheet.get_or_create_row(idx);
    if custom_height {
        row.height = height;
    }
    row.hidden = hidden;
    if custom_format {
        row.style_id = style;
    }
    Ok(idx)
}

struct CellAttrs {
    cell: CellRef,
    style_id: u32,
    type_: Option<String>,
}

impl CellAttrs {
    fn parse(e: &BytesStart<'_>, row: u32, next_col: u32) -> Result<Self, XlsxError> {
        let mut cell = CellRef::new(row, next_col);
        let mut style_id = 0;
        let mut type_ = None;
        for attr in e.attributes() {
            let attr = attr?;
            let value = attr.unescape_value()?;
            match attr.key.as_ref() {
                b"r" => {
                    cell = CellRef::from_a1(&value)
                        .map_err(|_| XlsxError::InvalidCellRef(value.to_string()))?;
                }
                b"s" => style_id = value.trim().parse().unwrap_or(0),
                b"t" => type_ = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(Self {
            cell,
            style_id,
            type_,
        })
    }
}

#[derive(Default)]
struct CellContent {
    value: Option<String>,
    inline: Option<String>,
    formula: Option<FormulaText>,
}

struct FormulaText {
    text: String,
    shared_index: Option<u32>,
}

fn read_cell_content(reader: &mut Reader<&[u8]>) -> Result<CellContent, XlsxError> {
    let mut content = CellContent::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"v" => {
                content.value = Some(read_text(reader, b"v")?);
            }
            Event::Start(e) if e.local_name().as_ref() == b"is" => {
                content.inline = Some(read_string_item(reader, b"is")?);
            }
            Event::Start(e) if e.local_name().as_ref() == b"f" => {
                let shared_index = shared_formula_index(&e)?;
                let text = read_text(reader, b"f")?;
                content.formula = Some(FormulaText { text, shared_index });
            }
            Event::Empty(e) if e.local_name().as_ref() == b"f" => {
                let shared_index = shared_formula_index(&e)?;
                content.formula = Some(FormulaText {
                    text: String::new(),
                    shared_index,
                });
            }
            Event::Start(e) => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if e.local_name().as_ref() == b"c" => break,
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected end of document inside <c>".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(content)
}

fn shared_formula_index(e: &BytesStart<'_>) -> Result<Option<u32>, XlsxError> {
    let mut shared = false;
    let mut si = None;
    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"t" => shared = value.as_ref() == "shared",
            b"si" => si = value.trim().parse().ok(),
            _ => {}
        }
    }
    Ok(si.filter(|_| shared))
}

fn store_cell(
    sheet: &mut Worksheet,
    attrs: CellAttrs,
    content: CellContent,
    shared_strings: &[String],
    shared_formulas: &mut HashMap<u32, (CellRef, String)>,
) -> Result<(), XlsxError> {
    let value = match (attrs.type_.as_deref(), content.value) {
        (Some("inlineStr"), v) => content
            .inline
            .or(v)
            .map_or(CellValue::Empty, CellValue::String),
        (_, None) => CellValue::Empty,
        (Some("s"), Some(v)) => {
            let idx: usize = v
                .trim()
                .parse()
                .map_err(|_| XlsxError::Invalid(format!("invalid shared string index `{v}`")))?;
            let text = shared_strings.get(idx).ok_or_else(|| {
                XlsxError::Invalid(format!("shared string index {idx} out of range"))
            })?;
            CellValue::String(text.clone())
        }
        (Some("str"), Some(v)) | (Some("d"), Some(v)) => CellValue::String(v),
        (Some("b"), Some(v)) => CellValue::Boolean(parse_xml_bool(&v)),
        (Some("e"), Some(v)) => CellValue::Error(v),
        (_, Some(v)) => {
            let n: f64 = v.trim().parse().map_err(|_| {
                XlsxError::Invalid(format!("invalid numeric value `{v}` in {}", attrs.cell))
            })?;
            CellValue::Number(n)
        }
    };

    let formula = match content.formula {
        Some(FormulaText {
            text,
            shared_index: Some(si),
        }) => {
            if text.is_empty() {
                match shared_formulas.get(&si) {
                    Some((master, master_text)) => Some(offset_relative_refs(
                        master_text,
                        i64::from(attrs.cell.row) - i64::from(master.row),
                        i64::from(attrs.cell.col) - i64::from(master.col),
                    )),
                    None => {
                        log::warn!(
                            "sheet `{}`: shared formula {si} at {} has no master cell",
                            sheet.name,
                            attrs.cell
                        );
                        None
                    }
                }
            } else {
                shared_formulas.insert(si, (attrs.cell, text.clone()));
                Some(text)
            }
        }
        Some(FormulaText { text, .. }) if !text.is_empty() => Some(text),
        _ => None,
    };

    if value.is_empty() && formula.is_none() && attrs.style_id == 0 {
        return Ok(());
    }
    let mut cell = Cell::new(value).with_style(attrs.style_id);
    cell.formula = formula;
    sheet
        .get_or_create_row(attrs.cell.row)
        .set_cell(attrs.cell.col, cell);
    Ok(())
}

fn read_data_validation(e: &BytesStart<'_>) -> Result<DataValidationAssignment, XlsxError> {
    let mut dv = DataValidation::default();
    let mut ranges = Vec::new();
    let mut prompt = DataValidationMessage::default();
    let mut error = DataValidationMessage::default();

    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"type" => dv.kind = DataValidationKind::from_ooxml(&value).unwrap_or_default(),
            b"operator" => dv.operator = DataValidationOperator::from_ooxml(&value),
            b"allowBlank" => dv.allow_blank = parse_xml_bool(&value),
            b"showInputMessage" => dv.show_input_message = parse_xml_bool(&value),
            b"showErrorMessage" => dv.show_error_message = parse_xml_bool(&value),
            b"showDropDown" => dv.hide_drop_down = parse_xml_bool(&value),
            b"errorStyle" => dv.error_style = Some(value.into_owned()),
            b"promptTitle" => prompt.title = Some(value.into_owned()),
            b"prompt" => prompt.body = Some(value.into_owned()),
            b"errorTitle" => error.title = Some(value.into_owned()),
            b"error" => error.body = Some(value.into_owned()),
            b"sqref" => {
                ranges = parse_sqref(&value)
                    .map_err(|_| XlsxError::InvalidCellRef(value.to_string()))?;
            }
            _ => {}
        }
    }

    if prompt.title.is_some() || prompt.body.is_some() {
        dv.prompt = Some(prompt);
    }
    if error.title.is_some() || error.body.is_some() {
        dv.error = Some(error);
    }
    Ok(DataValidationAssignment::new(ranges, dv))
}
