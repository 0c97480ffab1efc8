//! The smallest package that can carry a workbook built in memory.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use quick_xml::escape::escape;
use xlmerge_model::{StyleTable, Workbook};

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Package parts for `workbook`: one empty worksheet part per sheet and a stylesheet with as
/// many default cell formats as the workbook's template style count.
///
/// A workbook without template styles gets the single default format.
pub(crate) fn minimal_parts(workbook: &mut Workbook) -> BTreeMap<String, Vec<u8>> {
    if workbook.styles.base_count == 0 {
        if workbook.styles.derived().is_empty() {
            workbook.styles = StyleTable::new(1);
        } else {
            log::warn!("derived styles without template styles: their indexes are offset by the default format");
        }
    }
    let sheet_count = workbook.sheets.len();
    let mut parts = BTreeMap::new();

    let mut content_types = format!(
        r#"{XML_DECL}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#
    );
    for n in 1..=sheet_count {
        let _ = write!(
            content_types,
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        );
    }
    content_types.push_str("</Types>");
    parts.insert("[Content_Types].xml".to_string(), content_types.into_bytes());

    parts.insert(
        "_rels/.rels".to_string(),
        format!(
            r#"{XML_DECL}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
        )
        .into_bytes(),
    );

    let mut workbook_xml =
        format!(r#"{XML_DECL}<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets>"#);
    let mut workbook_rels = format!(
        r#"{XML_DECL}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#
    );
    for (idx, sheet) in workbook.sheets.iter().enumerate() {
        let n = idx + 1;
        let _ = write!(
            workbook_xml,
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            escape(sheet.name.as_str())
        );
        let _ = write!(
            workbook_rels,
            r#"<Relationship Id="rId{n}" Type="{REL_NS}/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        );
        parts.insert(
            format!("xl/worksheets/sheet{n}.xml"),
            format!(r#"{XML_DECL}<worksheet xmlns="{MAIN_NS}"><sheetData/></worksheet>"#)
                .into_bytes(),
        );
    }
    workbook_xml.push_str("</sheets></workbook>");
    let _ = write!(
        workbook_rels,
        r#"<Relationship Id="rId{}" Type="{REL_NS}/styles" Target="styles.xml"/></Relationships>"#,
        sheet_count + 1
    );
    parts.insert("xl/workbook.xml".to_string(), workbook_xml.into_bytes());
    parts.insert(
        "xl/_rels/workbook.xml.rels".to_string(),
        workbook_rels.into_bytes(),
    );
    parts.insert(
        "xl/styles.xml".to_string(),
        styles_xml(workbook.styles.base_count.max(1)).into_bytes(),
    );
    parts
}

fn styles_xml(xf_count: u32) -> String {
    let mut xml = format!(
        r#"{XML_DECL}<styleSheet xmlns="{MAIN_NS}"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="{xf_count}">"#
    );
    for _ in 0..xf_count {
        xml.push_str(r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#);
    }
    xml.push_str(r#"</cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#);
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::read_parts;

    #[test]
    fn minimal_parts_load_back() {
        let mut workbook = Workbook::new();
        workbook.add_sheet("Data & Notes").unwrap();
        workbook.add_sheet("Second").unwrap();
        workbook.styles = StyleTable::new(3);

        let parts = minimal_parts(&mut workbook);
        let loaded = read_parts(parts).unwrap();
        let names: Vec<_> = loaded.workbook.sheets.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["Data & Notes", "Second"]);
        assert_eq!(loaded.workbook.styles.base_count, 3);
        assert_eq!(loaded.styles_part.as_deref(), Some("xl/styles.xml"));
        assert_eq!(
            loaded.sheet_parts,
            vec!["xl/worksheets/sheet1.xml", "xl/worksheets/sheet2.xml"]
        );
    }
}
