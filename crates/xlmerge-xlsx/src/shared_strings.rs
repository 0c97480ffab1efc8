use quick_xml::events::Event;
use quick_xml::Reader;

use crate::XlsxError;

/// Parse `sharedStrings.xml` into plain strings.
///
/// Rich-text runs are flattened to their visible text; phonetic (`rPh`) and extension subtrees
/// are skipped. Templates only ever match placeholders against the visible text.
pub(crate) fn parse_shared_strings_xml(xml: &str) -> Result<Vec<String>, XlsxError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut items = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"si" => {
                items.push(read_string_item(&mut reader, b"si")?);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"si" => items.push(String::new()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

/// Read the visible text of a string item (`<si>` or an inline `<is>`) up to its end tag.
pub(crate) fn read_string_item(
    reader: &mut Reader<&[u8]>,
    end_local_name: &[u8],
) -> Result<String, XlsxError> {
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                text.push_str(&read_text(reader, b"t")?);
            }
            // Runs contain `<rPr>` formatting and a `<t>`; descend into them.
            Event::Start(e) if e.local_name().as_ref() == b"r" => {}
            Event::End(e) if e.local_name().as_ref() == b"r" => {}
            Event::Start(e) => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if e.local_name().as_ref() == end_local_name => break,
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected end of document inside a string item".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

/// Collect the text content of the current element up to its end tag.
pub(crate) fn read_text(
    reader: &mut Reader<&[u8]>,
    end_local_name: &[u8],
) -> Result<String, XlsxError> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(std::str::from_utf8(e.as_ref())?),
            Event::End(e) if e.local_name().as_ref() == end_local_name => break,
            Event::Eof => {
                return Err(XlsxError::Invalid(format!(
                    "unexpected end of document inside <{}>",
                    String::from_utf8_lossy(end_local_name)
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn flattens_rich_runs_and_skips_phonetics() {
        let xml = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3">
  <si><t xml:space="preserve"> {name} </t></si>
  <si><r><rPr><b/></rPr><t>Hello </t></r><r><t>{user}</t></r><rPh sb="0" eb="1"><t>ignored</t></rPh></si>
  <si/>
</sst>"#;
        let items = parse_shared_strings_xml(xml).unwrap();
        assert_eq!(items, vec![" {name} ", "Hello {user}", ""]);
    }
}
