use std::fmt::Write as _;
use std::io::Write;

use quick_xml::escape::escape;
use quick_xml::events::BytesStart;
use xlmerge_model::{CalcSettings, DefinedName};

use super::sections::SectionWriter;
use crate::XlsxError;

/// Children of `<workbook>` in schema order.
pub(crate) const WORKBOOK_ORDER: &[&str] = &[
    "fileVersion",
    "fileSharing",
    "workbookPr",
    "workbookProtection",
    "bookViews",
    "sheets",
    "functionGroups",
    "externalReferences",
    "definedNames",
    "calcPr",
    "oleSize",
    "customWorkbookViews",
    "pivotCaches",
    "smartTagPr",
    "smartTagTypes",
    "webPublishing",
    "fileRecoveryPr",
    "webPublishObjects",
    "extLst",
];

/// Regenerates `<definedNames>` and `<calcPr>` from the model.
pub(crate) struct WorkbookSections<'a> {
    pub names: &'a [DefinedName],
    pub calc: &'a CalcSettings,
}

impl WorkbookSections<'_> {
    fn write_defined_names(&self, out: &mut dyn Write, p: &str) -> Result<(), XlsxError> {
        if self.names.is_empty() {
            return Ok(());
        }
        let mut s = format!("<{p}definedNames>");
        for name in self.names {
            let _ = write!(s, r#"<{p}definedName name="{}""#, escape(name.name.as_str()));
            if let Some(comment) = &name.comment {
                let _ = write!(s, r#" comment="{}""#, escape(comment.as_str()));
            }
            if let Some(sheet) = name.local_sheet_id {
                let _ = write!(s, r#" localSheetId="{sheet}""#);
            }
            if name.hidden {
                s.push_str(r#" hidden="1""#);
            }
            let _ = write!(
                s,
                ">{}</{p}definedName>",
                escape(name.refers_to())
            );
        }
        let _ = write!(s, "</{p}definedNames>");
        out.write_all(s.as_bytes())?;
        Ok(())
    }

    fn write_calc_pr(
        &self,
        out: &mut dyn Write,
        original: Option<&BytesStart<'_>>,
        p: &str,
    ) -> Result<(), XlsxError> {
        if original.is_none() && *self.calc == CalcSettings::default() {
            return Ok(());
        }

        let mut s = format!("<{p}calcPr");
        if let Some(original) = original {
            for attr in original.attributes() {
                let attr = attr?;
                if matches!(attr.key.as_ref(), b"calcMode" | b"fullCalcOnLoad") {
                    continue;
                }
                let _ = write!(
                    s,
                    r#" {}="{}""#,
                    String::from_utf8_lossy(attr.key.as_ref()),
                    escape(attr.unescape_value()?.as_ref())
                );
            }
        }
        let mode = self.calc.calculation_mode;
        if mode != Default::default() {
            let _ = write!(s, r#" calcMode="{}""#, mode.as_calc_mode_attr());
        }
        if self.calc.full_calc_on_load {
            s.push_str(r#" fullCalcOnLoad="1""#);
        }
        s.push_str("/>");
        out.write_all(s.as_bytes())?;
        Ok(())
    }
}

impl SectionWriter for WorkbookSections<'_> {
    fn managed(&self) -> &'static [&'static str] {
        &["definedNames", "calcPr"]
    }

    fn write_section(
        &mut self,
        out: &mut dyn Write,
        name: &str,
        original: Option<&BytesStart<'_>>,
        prefix: &str,
    ) -> Result<(), XlsxError> {
        match name {
            "definedNames" => self.write_defined_names(out, prefix),
            "calcPr" => self.write_calc_pr(out, original, prefix),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::sections::patch_sections;
    use pretty_assertions::assert_eq;
    use xlmerge_model::CalculationMode;

    fn render(xml: &str, names: &[DefinedName], calc: &CalcSettings) -> String {
        let mut sections = WorkbookSections { names, calc };
        let out =
            patch_sections(xml.as_bytes(), WORKBOOK_ORDER, &mut sections, Vec::new()).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn rewrites_names_and_keeps_other_calc_attributes() {
        let xml = r#"<workbook><sheets><sheet name="S" sheetId="1" r:id="rId1"/></sheets><definedNames><definedName name="Old">S!$A$1</definedName></definedNames><calcPr calcId="191029" calcMode="manual"/><extLst/></workbook>"#;
        let mut name = DefinedName::new("Items", "S!$A$2:$B$9");
        name.local_sheet_id = Some(0);
        let calc = CalcSettings {
            calculation_mode: CalculationMode::Manual,
            full_calc_on_load: true,
        };

        assert_eq!(
            render(xml, &[name], &calc),
            concat!(
                r#"<workbook><sheets><sheet name="S" sheetId="1" r:id="rId1"/></sheets>"#,
                r#"<definedNames><definedName name="Items" localSheetId="0">S!$A$2:$B$9</definedName></definedNames>"#,
                r#"<calcPr calcId="191029" calcMode="manual" fullCalcOnLoad="1"/>"#,
                r#"<extLst/></workbook>"#
            )
        );
    }

    #[test]
    fn inserts_calc_pr_only_when_needed() {
        let xml = r#"<workbook><sheets/></workbook>"#;
        assert_eq!(render(xml, &[], &CalcSettings::default()), xml);

        let calc = CalcSettings {
            full_calc_on_load: true,
            ..CalcSettings::default()
        };
        assert_eq!(
            render(xml, &[], &calc),
            r#"<workbook><sheets/><calcPr fullCalcOnLoad="1"/></workbook>"#
        );
    }
}
