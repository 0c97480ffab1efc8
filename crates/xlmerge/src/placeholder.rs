//! Finding `{key}` and `{key:N}` markers in template cells.

use regex::Regex;
use xlmerge_model::{Cell, CellRef, CellValue, Worksheet};

use crate::field::{FieldCatalog, FieldKind, MergeField};

/// A resolved marker occurrence.
#[derive(Clone, Debug)]
pub struct Placeholder {
    pub cell: CellRef,
    /// The marker text as it appears in the cell, e.g. `{items:2}`.
    pub pattern: String,
    pub field: MergeField,
}

impl Placeholder {
    pub fn key(&self) -> &str {
        self.field.key()
    }
}

/// A row group marker with the height of its repeating block.
#[derive(Clone, Debug)]
pub struct GroupPlaceholder {
    pub placeholder: Placeholder,
    /// Always at least 1.
    pub rows: u32,
}

#[derive(Clone, Debug)]
pub enum ParsedPlaceholder {
    Value(Placeholder),
    Group(GroupPlaceholder),
}

impl ParsedPlaceholder {
    pub fn placeholder(&self) -> &Placeholder {
        match self {
            ParsedPlaceholder::Value(p) => p,
            ParsedPlaceholder::Group(g) => &g.placeholder,
        }
    }
}

fn marker_re() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_]+)(?::([0-9]+))?\}").expect("valid regex"))
}

/// Resolve the right-most marker in `cell` whose key is in `catalog`.
///
/// Only plain string cells are scanned.
pub fn parse(catalog: &FieldCatalog, at: CellRef, cell: &Cell) -> Option<ParsedPlaceholder> {
    let text = cell.string_value()?;
    let caps = marker_re()
        .captures_iter(text)
        .filter(|caps| catalog.get(&caps[1]).is_some())
        .last()?;
    let field = catalog.get(&caps[1])?.clone();
    let placeholder = Placeholder {
        cell: at,
        pattern: caps[0].to_string(),
        field,
    };
    if placeholder.field.kind() != FieldKind::RepeatRow {
        return Some(ParsedPlaceholder::Value(placeholder));
    }
    let rows = group_rows(&placeholder.pattern, caps.get(2).map(|m| m.as_str()));
    Some(ParsedPlaceholder::Group(GroupPlaceholder { placeholder, rows }))
}

fn group_rows(pattern: &str, span: Option<&str>) -> u32 {
    let Some(span) = span else {
        return 1;
    };
    match span.parse::<u32>() {
        Ok(0) => {
            log::warn!("group marker {pattern} spans 0 rows, using 1");
            1
        }
        Ok(rows) => rows,
        Err(_) => {
            log::warn!("group marker {pattern} has a row span out of range, using 1");
            1
        }
    }
}

/// The group marker of a row, scanning its cells right to left.
pub fn detect_group(
    catalog: &FieldCatalog,
    sheet: &Worksheet,
    row_index: u32,
) -> Option<GroupPlaceholder> {
    let row = sheet.row(row_index)?;
    row.cells.iter().rev().find_map(|(&col, cell)| {
        match parse(catalog, CellRef::new(row_index, col), cell)? {
            ParsedPlaceholder::Group(group) => Some(group),
            ParsedPlaceholder::Value(_) => None,
        }
    })
}

/// Remove the marker text from its cell. A cell left without text becomes blank and keeps
/// its style.
pub fn clear(sheet: &mut Worksheet, placeholder: &Placeholder) {
    let Some(cell) = sheet.cell_mut(placeholder.cell) else {
        return;
    };
    let Some(text) = cell.string_value() else {
        return;
    };
    let text = text.replace(&placeholder.pattern, "");
    if text.is_empty() {
        cell.set_blank();
    } else {
        cell.set_value(CellValue::String(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::Converter;
    use pretty_assertions::assert_eq;

    fn catalog() -> FieldCatalog {
        [
            MergeField::simple("name", Converter::string()),
            MergeField::simple("Total_2", Converter::number()),
            MergeField::repeat_row("items"),
        ]
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap()
    }

    fn parse_text(text: &str) -> Option<ParsedPlaceholder> {
        parse(&catalog(), CellRef::new(0, 0), &Cell::new(CellValue::from(text)))
    }

    #[test]
    fn rightmost_known_marker_wins() {
        let parsed = parse_text("{name} and {Total_2} and {unknown}").unwrap();
        assert_eq!(parsed.placeholder().pattern, "{Total_2}");
        assert_eq!(parsed.placeholder().key(), "Total_2");

        assert!(parse_text("{unknown}").is_none());
        assert!(parse_text("{ name }").is_none());
        assert!(parse_text("{name:}").is_none());
        assert!(parse_text("{items:}").is_none());
        assert_eq!(
            parse_text("{name} {name:}").map(|p| p.placeholder().pattern.clone()),
            Some("{name}".to_string())
        );
        assert!(parse_text("no markers").is_none());
        assert!(parse(&catalog(), CellRef::new(0, 0), &Cell::new(CellValue::Number(1.0))).is_none());
    }

    #[test]
    fn group_spans_default_and_clamp() {
        let rows = |text: &str| match parse_text(text) {
            Some(ParsedPlaceholder::Group(group)) => Some(group.rows),
            _ => None,
        };
        assert_eq!(rows("{items}"), Some(1));
        assert_eq!(rows("{items:3}"), Some(3));
        assert_eq!(rows("{items:0}"), Some(1));
        assert_eq!(rows("{items:99999999999}"), Some(1));
        assert_eq!(rows("{name:3}"), None);
    }

    #[test]
    fn formula_cells_are_not_scanned() {
        let cell = Cell::new(CellValue::from("{name}")).with_formula("\"{name}\"");
        assert!(parse(&catalog(), CellRef::new(0, 0), &cell).is_none());
    }

    #[test]
    fn group_detection_scans_right_to_left_and_clear_blanks_cells() {
        let catalog = catalog();
        let mut sheet = Worksheet::new("S");
        sheet.set_value(CellRef::new(2, 0), "{name}");
        sheet.set_value(CellRef::new(2, 1), "{items:2}").style_id = 3;
        sheet.set_value(CellRef::new(2, 4), "Label {items}");

        let group = detect_group(&catalog, &sheet, 2).unwrap();
        assert_eq!(group.placeholder.cell, CellRef::new(2, 4));
        assert_eq!(group.rows, 1);
        clear(&mut sheet, &group.placeholder);
        assert_eq!(sheet.value(CellRef::new(2, 4)), CellValue::from("Label "));

        let group = detect_group(&catalog, &sheet, 2).unwrap();
        assert_eq!(group.rows, 2);
        clear(&mut sheet, &group.placeholder);
        let cell = sheet.cell(CellRef::new(2, 1)).unwrap();
        assert!(cell.is_blank());
        assert_eq!(cell.style_id, 3);

        assert!(detect_group(&catalog, &sheet, 2).is_none());
        assert!(detect_group(&catalog, &sheet, 9).is_none());
    }
}
