//! `styles.xml` support: counting template cell formats and appending derived ones.

use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use xlmerge_model::{Color, DerivedStyle};

use crate::XlsxError;

/// Number of `<xf>` records in `<cellXfs>`.
pub(crate) fn count_cell_xfs(xml: &[u8]) -> Result<u32, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_cell_xfs = false;
    let mut count = 0u32;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = true,
            Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Event::Start(e) | Event::Empty(e)
                if in_cell_xfs && e.local_name().as_ref() == b"xf" =>
            {
                count += 1;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(count)
}

type Element = Vec<Event<'static>>;

/// The pieces of a stylesheet a derived style is built from.
#[derive(Default)]
struct StyleSheetIndex {
    fonts: Vec<Element>,
    fill_count: usize,
    cell_xfs: Vec<Element>,
}

/// Collect the element starting with `start` and everything up to its matching end tag.
fn capture_element(
    reader: &mut Reader<&[u8]>,
    start: BytesStart<'static>,
) -> Result<Element, XlsxError> {
    let mut events = vec![Event::Start(start)];
    let mut buf = Vec::new();
    let mut depth = 1usize;
    loop {
        let event = reader.read_event_into(&mut buf)?.into_owned();
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected end of styles.xml".to_string(),
                ))
            }
            _ => {}
        }
        events.push(event);
        if depth == 0 {
            break;
        }
        buf.clear();
    }
    Ok(events)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Fonts,
    Fills,
    CellXfs,
}

fn section_of(local: &[u8]) -> Option<Section> {
    match local {
        b"fonts" => Some(Section::Fonts),
        b"fills" => Some(Section::Fills),
        b"cellXfs" => Some(Section::CellXfs),
        _ => None,
    }
}

fn index_style_sheet(xml: &[u8]) -> Result<StyleSheetIndex, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut index = StyleSheetIndex::default();
    let mut section: Option<Section> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let is_record = |name: &[u8]| e.local_name().as_ref() == name;
                let current = section;
                match current {
                    None => section = section_of(e.local_name().as_ref()),
                    Some(Section::Fonts) if is_record(b"font") => {
                        let start = e.to_owned();
                        index.fonts.push(capture_element(&mut reader, start)?);
                    }
                    Some(Section::Fills) if is_record(b"fill") => {
                        index.fill_count += 1;
                        reader.read_to_end_into(e.name(), &mut Vec::new())?;
                    }
                    Some(Section::CellXfs) if is_record(b"xf") => {
                        let start = e.to_owned();
                        index.cell_xfs.push(capture_element(&mut reader, start)?);
                    }
                    Some(_) => {}
                }
            }
            Event::Empty(e) => match (section, e.local_name().as_ref()) {
                (Some(Section::Fonts), b"font") => {
                    index.fonts.push(vec![Event::Empty(e.to_owned())])
                }
                (Some(Section::Fills), b"fill") => index.fill_count += 1,
                (Some(Section::CellXfs), b"xf") => {
                    index.cell_xfs.push(vec![Event::Empty(e.to_owned())])
                }
                _ => {}
            },
            Event::End(e) => {
                if section.is_some() && section == section_of(e.local_name().as_ref()) {
                    section = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(index)
}

fn attr_u32(start: &BytesStart<'_>, key: &[u8]) -> Result<Option<u32>, XlsxError> {
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(attr.unescape_value()?.trim().parse().ok());
        }
    }
    Ok(None)
}

/// A copy of `start` with the given attributes overwritten or added.
fn with_attrs(
    start: &BytesStart<'_>,
    overrides: &[(&str, String)],
) -> Result<BytesStart<'static>, XlsxError> {
    let mut kept: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        if overrides.iter().any(|(k, _)| k.as_bytes() == attr.key.as_ref()) {
            continue;
        }
        kept.push((attr.key.as_ref().to_vec(), attr.value.to_vec()));
    }
    let mut out = start.to_owned();
    out.clear_attributes();
    for (key, value) in &kept {
        out.push_attribute((key.as_slice(), value.as_slice()));
    }
    for (key, value) in overrides {
        out.push_attribute((*key, value.as_str()));
    }
    Ok(out)
}

fn first_start(element: &Element) -> Option<&BytesStart<'static>> {
    match element.first() {
        Some(Event::Start(e)) | Some(Event::Empty(e)) => Some(e),
        _ => None,
    }
}

/// Children of `<font>` that must come after `<color>`.
fn font_child_after_color(local: &[u8]) -> bool {
    matches!(local, b"name" | b"family" | b"charset" | b"scheme")
}

/// Clone a `<font>` element, replacing its colour.
fn recolor_font(font: &Element, color: Color) -> Result<Element, XlsxError> {
    let color_el = {
        let mut e = BytesStart::new(qualified(font, "color"));
        e.push_attribute(("rgb", color.to_argb_hex().as_str()));
        Event::Empty(e)
    };

    let Some(start) = first_start(font) else {
        return Ok(font.clone());
    };
    if matches!(font.first(), Some(Event::Empty(_))) {
        let end_name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        return Ok(vec![
            Event::Start(start.clone()),
            color_el,
            Event::End(BytesEnd::new(end_name)),
        ]);
    }

    let mut out = Vec::with_capacity(font.len() + 1);
    let mut inserted = false;
    let mut skip_depth = 0usize;
    let last = font.len().saturating_sub(1);
    for (idx, event) in font.iter().enumerate() {
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                _ => {}
            }
            continue;
        }
        match event {
            Event::Start(e) if idx > 0 && e.local_name().as_ref() == b"color" => {
                skip_depth = 1;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"color" => {}
            Event::Start(e) | Event::Empty(e)
                if idx > 0 && !inserted && font_child_after_color(e.local_name().as_ref()) =>
            {
                out.push(color_el.clone());
                inserted = true;
                out.push(event.clone());
            }
            Event::End(_) if idx == last => {
                if !inserted {
                    out.push(color_el.clone());
                    inserted = true;
                }
                out.push(event.clone());
            }
            other => out.push(other.clone()),
        }
    }
    Ok(out)
}

/// The name for a child element using the same namespace prefix as `element`.
fn qualified(element: &Element, local: &str) -> String {
    let prefix = first_start(element).and_then(|start| {
        let name = start.name();
        name.prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
    });
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn solid_fill(prefix: Option<&str>, color: Color) -> String {
    let p = prefix.map(|p| format!("{p}:")).unwrap_or_default();
    format!(
        r#"<{p}fill><{p}patternFill patternType="solid"><{p}fgColor rgb="{}"/><{p}bgColor indexed="64"/></{p}patternFill></{p}fill>"#,
        color.to_argb_hex()
    )
}

/// Appended records, ready to be written.
struct Additions {
    fonts: Vec<Element>,
    fills: Vec<Color>,
    cell_xfs: Vec<Element>,
}

fn build_additions(index: &StyleSheetIndex, derived: &[DerivedStyle]) -> Result<Additions, XlsxError> {
    let mut additions = Additions {
        fonts: Vec::new(),
        fills: Vec::new(),
        cell_xfs: Vec::new(),
    };
    let mut fill_ids: HashMap<Color, usize> = HashMap::new();
    let mut font_ids: HashMap<(u32, Color), usize> = HashMap::new();

    for style in derived {
        let Some(base) = index
            .cell_xfs
            .get(style.base as usize)
            .or_else(|| index.cell_xfs.first())
        else {
            return Err(XlsxError::Invalid(
                "styles.xml has no cellXfs to derive styles from".to_string(),
            ));
        };
        let Some(base_start) = first_start(base) else {
            continue;
        };

        let mut overrides: Vec<(&str, String)> = Vec::new();
        if let Some(fill) = style.fill {
            let id = *fill_ids.entry(fill).or_insert_with(|| {
                additions.fills.push(fill);
                index.fill_count + additions.fills.len() - 1
            });
            overrides.push(("fillId", id.to_string()));
            overrides.push(("applyFill", "1".to_string()));
        }
        if let Some(font_color) = style.font_color {
            let base_font = attr_u32(base_start, b"fontId")?.unwrap_or(0);
            let id = match font_ids.get(&(base_font, font_color)) {
                Some(id) => *id,
                None => {
                    let font = match index.fonts.get(base_font as usize) {
                        Some(font) => recolor_font(font, font_color)?,
                        None => {
                            recolor_font(&vec![Event::Empty(BytesStart::new("font"))], font_color)?
                        }
                    };
                    additions.fonts.push(font);
                    let id = index.fonts.len() + additions.fonts.len() - 1;
                    font_ids.insert((base_font, font_color), id);
                    id
                }
            };
            overrides.push(("fontId", id.to_string()));
            overrides.push(("applyFont", "1".to_string()));
        }

        let mut xf = base.clone();
        if let Some(first) = xf.first_mut() {
            let patched = match &*first {
                Event::Start(e) => Some(Event::Start(with_attrs(e, &overrides)?)),
                Event::Empty(e) => Some(Event::Empty(with_attrs(e, &overrides)?)),
                _ => None,
            };
            if let Some(patched) = patched {
                *first = patched;
            }
        }
        additions.cell_xfs.push(xf);
    }
    Ok(additions)
}

/// Rewrite `styles.xml`, appending one `<xf>` per derived style (plus the fills and fonts they
/// need) and updating the section counts.
pub(crate) fn append_derived_styles(
    xml: &[u8],
    derived: &[DerivedStyle],
) -> Result<Vec<u8>, XlsxError> {
    if derived.is_empty() {
        return Ok(xml.to_vec());
    }
    let index = index_style_sheet(xml)?;
    let additions = build_additions(&index, derived)?;

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 512 * derived.len()));
    let mut buf = Vec::new();
    let mut depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) if depth == 1 => {
                depth += 1;
                let local = e.local_name();
                let total = match local.as_ref() {
                    b"fonts" => Some(index.fonts.len() + additions.fonts.len()),
                    b"fills" => Some(index.fill_count + additions.fills.len()),
                    b"cellXfs" => Some(index.cell_xfs.len() + additions.cell_xfs.len()),
                    _ => None,
                };
                match total {
                    Some(total) => writer
                        .write_event(Event::Start(with_attrs(e, &[("count", total.to_string())])?))?,
                    None => writer.write_event(Event::Start(e.to_owned()))?,
                }
            }
            Event::End(ref e) if depth == 2 => {
                depth -= 1;
                let prefix = e
                    .name()
                    .prefix()
                    .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
                match e.local_name().as_ref() {
                    b"fonts" => {
                        for font in &additions.fonts {
                            for ev in font {
                                writer.write_event(ev.clone())?;
                            }
                        }
                    }
                    b"fills" => {
                        for fill in &additions.fills {
                            writer
                                .get_mut()
                                .extend_from_slice(solid_fill(prefix.as_deref(), *fill).as_bytes());
                        }
                    }
                    b"cellXfs" => {
                        for xf in &additions.cell_xfs {
                            for ev in xf {
                                writer.write_event(ev.clone())?;
                            }
                        }
                    }
                    _ => {}
                }
                writer.write_event(Event::End(e.to_owned()))?;
            }
            Event::Start(ref e) => {
                depth += 1;
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e.to_owned()))?;
            }
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <fonts count="1"><font><sz val="11"/><color theme="1"/><name val="Calibri"/></font></fonts>
  <fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
  <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
  <cellXfs count="2">
    <xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
    <xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"><alignment horizontal="center"/></xf>
  </cellXfs>
</styleSheet>"#;

    #[test]
    fn counts_template_cell_formats() {
        assert_eq!(count_cell_xfs(STYLES.as_bytes()).unwrap(), 2);
    }

    #[test]
    fn appends_fill_font_and_xf_records() {
        let red = Color::rgb(255, 0, 0);
        let blue = Color::rgb(0, 0, 255);
        let derived = [
            DerivedStyle {
                base: 1,
                fill: Some(red),
                font_color: None,
            },
            DerivedStyle {
                base: 0,
                fill: Some(red),
                font_color: Some(blue),
            },
        ];
        let out = append_derived_styles(STYLES.as_bytes(), &derived).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(count_cell_xfs(out.as_bytes()).unwrap(), 4);
        assert!(out.contains(r#"<fills count="3">"#), "{out}");
        assert!(out.contains(r#"<fgColor rgb="FFFF0000"/>"#), "{out}");
        assert!(out.contains(r#"<fonts count="2">"#), "{out}");
        assert!(
            out.contains(r#"<font><sz val="11"/><color rgb="FF0000FF"/><name val="Calibri"/></font>"#),
            "{out}"
        );
        // The derived date format keeps its number format and alignment.
        assert!(
            out.contains(r#"<xf numFmtId="14" fontId="0" borderId="0" xfId="0" applyNumberFormat="1" fillId="2" applyFill="1"><alignment horizontal="center"/></xf>"#),
            "{out}"
        );
        assert!(
            out.contains(r#"<xf numFmtId="0" borderId="0" xfId="0" fillId="2" applyFill="1" fontId="1" applyFont="1"/>"#),
            "{out}"
        );
    }
}
