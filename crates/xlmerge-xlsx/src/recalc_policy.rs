use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::relationships::REL_TYPE_CALC_CHAIN;
use crate::XlsxError;

/// How a saved workbook makes Excel recalculate formulas that a merge moved or copied.
///
/// Cached `<v>` results and `xl/calcChain.xml` describe the template, not the merged output.
/// By default both are invalidated whenever the workbook contains formulas: the calc chain is
/// dropped from the package and `<calcPr fullCalcOnLoad="1"/>` is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalcPolicy {
    /// Set `fullCalcOnLoad="1"` on `<calcPr>` when formulas are present.
    pub force_full_calc_on_load: bool,
    /// Remove `calcChain.xml` with its relationship and content-type override when formulas are
    /// present.
    pub drop_calc_chain: bool,
}

impl RecalcPolicy {
    /// Keep the template's calculation metadata as it is.
    pub const PRESERVE: Self = Self {
        force_full_calc_on_load: false,
        drop_calc_chain: false,
    };
}

impl Default for RecalcPolicy {
    fn default() -> Self {
        Self {
            force_full_calc_on_load: true,
            drop_calc_chain: true,
        }
    }
}

/// Copy `xml`, leaving out every `element` (with its subtree) for which `should_drop` returns
/// true.
fn filter_elements(
    xml: &[u8],
    element: &[u8],
    mut should_drop: impl FnMut(&BytesStart<'_>) -> Result<bool, XlsxError>,
) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            _ if skip_depth > 0 => match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                _ => {}
            },
            Event::Start(ref e) if e.local_name().as_ref() == element && should_drop(e)? => {
                skip_depth = 1;
            }
            Event::Empty(ref e) if e.local_name().as_ref() == element && should_drop(e)? => {}
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

fn attr_string(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Remove the calc chain relationship from a workbook `.rels` part.
pub(crate) fn remove_calc_chain_relationship(rels_xml: &[u8]) -> Result<Vec<u8>, XlsxError> {
    filter_elements(rels_xml, b"Relationship", |e| {
        if attr_string(e, b"Type")?.as_deref() == Some(REL_TYPE_CALC_CHAIN) {
            return Ok(true);
        }
        Ok(attr_string(e, b"Target")?.is_some_and(|t| t.ends_with("calcChain.xml")))
    })
}

/// Remove the calc chain override from `[Content_Types].xml`.
pub(crate) fn remove_calc_chain_content_type(ct_xml: &[u8]) -> Result<Vec<u8>, XlsxError> {
    filter_elements(ct_xml, b"Override", |e| {
        Ok(attr_string(e, b"PartName")?.is_some_and(|p| p.ends_with("calcChain.xml")))
    })
}
