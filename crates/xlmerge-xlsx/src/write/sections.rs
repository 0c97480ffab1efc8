use std::io::Write;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::XlsxError;

/// Regenerates some direct children of a part's root element.
pub(crate) trait SectionWriter {
    /// Local names of the regenerated children.
    fn managed(&self) -> &'static [&'static str];

    /// Write the replacement for `name`. `original` is the template's element when there was
    /// one. Writing nothing removes the section.
    fn write_section(
        &mut self,
        out: &mut dyn Write,
        name: &str,
        original: Option<&BytesStart<'_>>,
        prefix: &str,
    ) -> Result<(), XlsxError>;
}

/// Copy `xml` to `out`, replacing the managed children of the root element.
///
/// `order` lists the root's children in schema order. Managed sections missing from the
/// template are inserted before the first element that has to follow them, or before the
/// root end tag. Children not named in `order` (e.g. `mc:AlternateContent`) are copied where
/// they are.
pub(crate) fn patch_sections<W: Write>(
    xml: &[u8],
    order: &[&str],
    sections: &mut dyn SectionWriter,
    out: W,
) -> Result<W, XlsxError> {
    let managed = sections.managed();
    let managed_rank: Vec<usize> = managed
        .iter()
        .map(|name| order.iter().position(|n| n == name).unwrap_or(usize::MAX))
        .collect();
    let rank = |local: &[u8]| order.iter().position(|n| n.as_bytes() == local);
    let mut written = vec![false; managed.len()];

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(out);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut skip_depth = 0usize;
    let mut prefix = String::new();

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            _ if skip_depth > 0 => match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                _ => {}
            },
            Event::Start(ref e) | Event::Empty(ref e) if depth == 1 => {
                let is_start = matches!(event, Event::Start(_));
                let local = e.local_name();
                if let Some(r) = rank(local.as_ref()) {
                    flush(
                        &mut writer,
                        sections,
                        &managed_rank,
                        &mut written,
                        Some(r),
                        &prefix,
                    )?;
                    if let Some(m) = managed.iter().position(|n| n.as_bytes() == local.as_ref()) {
                        if !written[m] {
                            sections.write_section(writer.get_mut(), managed[m], Some(e), &prefix)?;
                            written[m] = true;
                        }
                        if is_start {
                            skip_depth = 1;
                        }
                        continue;
                    }
                }
                if is_start {
                    depth += 1;
                }
                writer.write_event(event.clone())?;
            }
            Event::Start(ref e) => {
                if depth == 0 {
                    if let Some(p) = e.name().prefix() {
                        prefix = format!("{}:", String::from_utf8_lossy(p.as_ref()));
                    }
                }
                depth += 1;
                writer.write_event(event.clone())?;
            }
            Event::End(_) => {
                if depth == 1 {
                    flush(&mut writer, sections, &managed_rank, &mut written, None, &prefix)?;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(event.clone())?;
            }
            other => writer.write_event(other.into_owned())?,
        }
    }

    Ok(writer.into_inner())
}

/// Write the not-yet-written sections ranked before `before` (all of them for `None`).
fn flush<W: Write>(
    writer: &mut Writer<W>,
    sections: &mut dyn SectionWriter,
    managed_rank: &[usize],
    written: &mut [bool],
    before: Option<usize>,
    prefix: &str,
) -> Result<(), XlsxError> {
    let managed = sections.managed();
    for (m, rank) in managed_rank.iter().enumerate() {
        if written[m] || before.is_some_and(|b| *rank >= b) {
            continue;
        }
        sections.write_section(writer.get_mut(), managed[m], None, prefix)?;
        written[m] = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl SectionWriter for Fixed {
        fn managed(&self) -> &'static [&'static str] {
            &["b", "d"]
        }

        fn write_section(
            &mut self,
            out: &mut dyn Write,
            name: &str,
            original: Option<&BytesStart<'_>>,
            prefix: &str,
        ) -> Result<(), XlsxError> {
            let marker = if original.is_some() { "new" } else { "added" };
            write!(out, "<{prefix}{name} v=\"{marker}\"/>")?;
            Ok(())
        }
    }

    fn patch(xml: &str) -> String {
        let out = patch_sections(xml.as_bytes(), &["a", "b", "c", "d", "e"], &mut Fixed, Vec::new())
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn replaces_existing_and_inserts_missing_sections_in_order() {
        assert_eq!(
            patch(r#"<r><a/><b><x>old</x></b><e/></r>"#),
            r#"<r><a/><b v="new"/><d v="added"/><e/></r>"#
        );
        assert_eq!(
            patch(r#"<r><a/><c>keep</c></r>"#),
            r#"<r><a/><b v="added"/><c>keep</c><d v="added"/></r>"#
        );
    }

    #[test]
    fn keeps_the_root_prefix_and_unknown_children() {
        assert_eq!(
            patch(r#"<x:r xmlns:x="urn:x"><x:unknown/><x:d/></x:r>"#),
            r#"<x:r xmlns:x="urn:x"><x:unknown/><x:b v="added"/><x:d v="new"/></x:r>"#
        );
    }
}
