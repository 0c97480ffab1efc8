//! Loading a template package into the workbook model.

mod worksheet;

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Seek};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use xlmerge_model::{CalcSettings, CalculationMode, DefinedName, StyleTable, Workbook};
use zip::ZipArchive;

use crate::relationships::{
    parse_relationships, rels_for_part, resolve_target, REL_TYPE_CALC_CHAIN,
    REL_TYPE_OFFICE_DOCUMENT, REL_TYPE_SHARED_STRINGS, REL_TYPE_STYLES,
};
use crate::shared_strings::{parse_shared_strings_xml, read_text};
use crate::styles::count_cell_xfs;
use crate::zip_util::{
    read_zip_file_bytes_with_budget, ZipInflateBudget, DEFAULT_MAX_ZIP_PART_BYTES,
    DEFAULT_MAX_ZIP_TOTAL_BYTES,
};
use crate::XlsxError;

pub(crate) use worksheet::parse_worksheet_xml;

const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";

/// A template package after parsing: the model plus everything needed to write it back.
pub(crate) struct LoadedPackage {
    pub workbook: Workbook,
    pub parts: BTreeMap<String, Vec<u8>>,
    pub workbook_part: String,
    pub sheet_parts: Vec<String>,
    pub styles_part: Option<String>,
    pub calc_chain_part: Option<String>,
}

pub(crate) fn parse_xml_bool(value: &str) -> bool {
    matches!(value.trim(), "1" | "true")
}

pub(crate) fn read_package<R: Read + Seek>(reader: R) -> Result<LoadedPackage, XlsxError> {
    let mut archive = ZipArchive::new(reader)?;
    let mut budget = ZipInflateBudget::new(DEFAULT_MAX_ZIP_TOTAL_BYTES);
    let mut parts = BTreeMap::new();

    for idx in 0..archive.len() {
        let mut file = archive.by_index(idx)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().trim_start_matches('/').to_string();
        let size = file.size();
        let bytes = read_zip_file_bytes_with_budget(
            &mut file,
            size,
            &name,
            DEFAULT_MAX_ZIP_PART_BYTES,
            &mut budget,
        )?;
        parts.insert(name, bytes);
    }

    read_parts(parts)
}

pub(crate) fn read_parts(parts: BTreeMap<String, Vec<u8>>) -> Result<LoadedPackage, XlsxError> {
    let workbook_part = match parts.get("_rels/.rels") {
        Some(root_rels) => parse_relationships(root_rels)?
            .into_iter()
            .find(|rel| rel.type_ == REL_TYPE_OFFICE_DOCUMENT)
            .map(|rel| resolve_target("", &rel.target))
            .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string()),
        None => DEFAULT_WORKBOOK_PART.to_string(),
    };
    let workbook_xml = parts
        .get(&workbook_part)
        .ok_or_else(|| XlsxError::MissingPart(workbook_part.clone()))?;

    let workbook_rels = match parts.get(&rels_for_part(&workbook_part)) {
        Some(xml) => parse_relationships(xml)?,
        None => Vec::new(),
    };
    let targets: HashMap<&str, String> = workbook_rels
        .iter()
        .map(|rel| (rel.id.as_str(), resolve_target(&workbook_part, &rel.target)))
        .collect();
    let part_of_type = |type_: &str| {
        workbook_rels
            .iter()
            .find(|rel| rel.type_ == type_)
            .map(|rel| resolve_target(&workbook_part, &rel.target))
    };
    let styles_part = part_of_type(REL_TYPE_STYLES).filter(|p| parts.contains_key(p));
    let shared_strings_part = part_of_type(REL_TYPE_SHARED_STRINGS);
    let calc_chain_part = part_of_type(REL_TYPE_CALC_CHAIN);

    let info = parse_workbook_xml(workbook_xml)?;

    let shared_strings = match shared_strings_part.as_ref().and_then(|p| parts.get(p)) {
        Some(xml) => parse_shared_strings_xml(std::str::from_utf8(xml)?)?,
        None => Vec::new(),
    };

    let mut workbook = Workbook::new();
    workbook.calc_settings = info.calc_settings;
    workbook.defined_names = info.defined_names;
    if let Some(xml) = styles_part.as_ref().and_then(|p| parts.get(p)) {
        workbook.styles = StyleTable::new(count_cell_xfs(xml)?);
    }

    let mut sheet_parts = Vec::with_capacity(info.sheets.len());
    for sheet in info.sheets {
        let part = targets
            .get(sheet.rel_id.as_str())
            .cloned()
            .ok_or_else(|| XlsxError::SheetPartMissing(sheet.name.clone()))?;
        let xml = parts
            .get(&part)
            .ok_or_else(|| XlsxError::SheetPartMissing(sheet.name.clone()))?;
        let parsed = parse_worksheet_xml(&sheet.name, xml, &shared_strings)?;
        workbook.sheets.push(parsed);
        sheet_parts.push(part);
    }

    Ok(LoadedPackage {
        workbook,
        parts,
        workbook_part,
        sheet_parts,
        styles_part,
        calc_chain_part,
    })
}

struct SheetEntry {
    name: String,
    rel_id: String,
}

struct WorkbookInfo {
    sheets: Vec<SheetEntry>,
    defined_names: Vec<DefinedName>,
    calc_settings: CalcSettings,
}

fn parse_workbook_xml(xml: &[u8]) -> Result<WorkbookInfo, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut info = WorkbookInfo {
        sheets: Vec::new(),
        defined_names: Vec::new(),
        calc_settings: CalcSettings::default(),
    };

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rel_id = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.local_name().as_ref() {
                        b"name" => name = Some(attr.unescape_value()?.into_owned()),
                        // `r:id`; the prefix varies between producers.
                        b"id" => rel_id = Some(attr.unescape_value()?.into_owned()),
                        _ => {}
                    }
                }
                info.sheets.push(SheetEntry {
                    name: name.ok_or(XlsxError::MissingAttr("name"))?,
                    rel_id: rel_id.ok_or(XlsxError::MissingAttr("r:id"))?,
                });
            }
            Event::Start(e) if e.local_name().as_ref() == b"definedName" => {
                let mut name = defined_name_from_attrs(&e)?;
                let text = read_text(&mut reader, b"definedName")?;
                name.set_refers_to(text);
                info.defined_names.push(name);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"definedName" => {
                info.defined_names.push(defined_name_from_attrs(&e)?);
            }
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"calcPr" => {
                for attr in e.attributes() {
                    let attr = attr?;
                    let value = attr.unescape_value()?;
                    match attr.key.as_ref() {
                        b"calcMode" => {
                            if let Some(mode) = CalculationMode::from_calc_mode_attr(&value) {
                                info.calc_settings.calculation_mode = mode;
                            }
                        }
                        b"fullCalcOnLoad" => {
                            info.calc_settings.full_calc_on_load = parse_xml_bool(&value)
                        }
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(info)
}

fn defined_name_from_attrs(e: &BytesStart<'_>) -> Result<DefinedName, XlsxError> {
    let mut name = DefinedName::new(String::new(), String::new());
    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"name" => name.name = value.into_owned(),
            b"localSheetId" => name.local_sheet_id = value.trim().parse().ok(),
            b"hidden" => name.hidden = parse_xml_bool(&value),
            b"comment" => name.comment = Some(value.into_owned()),
            _ => {}
        }
    }
    if name.name.is_empty() {
        return Err(XlsxError::MissingAttr("name"));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn workbook_xml_yields_sheets_names_and_calc_flags() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"
          xmlns:rel="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Report" sheetId="1" rel:id="rId1"/>
    <sheet name="Lists &amp; Codes" sheetId="2" rel:id="rId2"/>
  </sheets>
  <definedNames>
    <definedName name="Items" localSheetId="0">Report!$A$2:$C$4</definedName>
    <definedName name="_xlnm.Print_Area" hidden="1">'Lists &amp; Codes'!$A$1:$B$9</definedName>
  </definedNames>
  <calcPr calcId="191029" calcMode="manual"/>
</workbook>"#;
        let info = parse_workbook_xml(xml).unwrap();
        let sheets: Vec<_> = info
            .sheets
            .iter()
            .map(|s| (s.name.as_str(), s.rel_id.as_str()))
            .collect();
        assert_eq!(sheets, vec![("Report", "rId1"), ("Lists & Codes", "rId2")]);

        assert_eq!(info.defined_names.len(), 2);
        assert_eq!(info.defined_names[0].local_sheet_id, Some(0));
        assert_eq!(info.defined_names[0].refers_to(), "Report!$A$2:$C$4");
        assert!(info.defined_names[1].hidden);
        assert_eq!(
            info.defined_names[1].area().and_then(|a| a.sheet),
            Some("Lists & Codes".to_string())
        );

        assert!(info.calc_settings.is_manual());
        assert!(!info.calc_settings.full_calc_on_load);
    }
}
