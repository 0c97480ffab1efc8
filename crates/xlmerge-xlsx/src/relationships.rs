use roxmltree::Document;

use crate::XlsxError;

pub(crate) const REL_TYPE_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub(crate) const REL_TYPE_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub(crate) const REL_TYPE_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
pub(crate) const REL_TYPE_CALC_CHAIN: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";
pub(crate) const REL_TYPE_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub type_: String,
    pub target: String,
}

pub(crate) fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, XlsxError> {
    let xml = std::str::from_utf8(xml)?;
    let doc = Document::parse(xml)?;

    Ok(doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
        .filter_map(|node| {
            Some(Relationship {
                id: node.attribute("Id")?.to_string(),
                type_: node.attribute("Type").unwrap_or_default().to_string(),
                target: node.attribute("Target").unwrap_or_default().to_string(),
            })
        })
        .collect())
}

/// The `_rels` part that holds relationships of `part`.
pub(crate) fn rels_for_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file_name)) => format!("{dir}/_rels/{file_name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that declares it, producing a package part
/// name without leading `/`.
pub(crate) fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or(target);
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => {
            let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
            format!("{base_dir}/{target}")
        }
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
