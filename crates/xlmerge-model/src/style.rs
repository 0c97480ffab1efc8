use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An opaque ARGB colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid colour `{0}`: expected RRGGBB or AARRGGBB hex digits")]
pub struct ColorParseError(pub String);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(0xFF00_0000 | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Parse `RRGGBB` or `AARRGGBB`, with an optional leading `#`.
    pub fn from_hex(hex: &str) -> Result<Self, ColorParseError> {
        let digits = hex.trim().trim_start_matches('#');
        let value = u32::from_str_radix(digits, 16).map_err(|_| ColorParseError(hex.to_string()))?;
        match digits.len() {
            6 => Ok(Self(0xFF00_0000 | value)),
            8 => Ok(Self(value)),
            _ => Err(ColorParseError(hex.to_string())),
        }
    }

    /// The `rgb` attribute form used by SpreadsheetML (`FFRRGGBB`).
    pub fn to_argb_hex(self) -> String {
        format!("{:08X}", self.0)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_argb_hex())
    }
}

/// A cell style created at merge time by recolouring an existing template style.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivedStyle {
    /// The template `cellXfs` index this style was cloned from.
    pub base: u32,
    /// Solid fill colour.
    pub fill: Option<Color>,
    pub font_color: Option<Color>,
}

/// Style indexes of the workbook.
///
/// Template styles live in the package's `styles.xml` and are referenced by index only.
/// Styles derived during a merge are appended after them when the workbook is written.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleTable {
    /// Number of `cellXfs` entries in the template.
    pub base_count: u32,
    derived: Vec<DerivedStyle>,
}

impl StyleTable {
    pub fn new(base_count: u32) -> Self {
        Self {
            base_count,
            derived: Vec::new(),
        }
    }

    pub fn derived(&self) -> &[DerivedStyle] {
        &self.derived
    }

    /// Look up a derived style by its style index.
    pub fn get_derived(&self, style_id: u32) -> Option<&DerivedStyle> {
        style_id
            .checked_sub(self.base_count)
            .and_then(|idx| self.derived.get(idx as usize))
    }

    /// Return the style index for `style_id` recoloured with `fill` and/or `font_color`.
    ///
    /// Recolouring a derived style starts again from its template style, so colours do not
    /// stack up across repeated merges. Identical requests share one index.
    pub fn derive(&mut self, style_id: u32, fill: Option<Color>, font_color: Option<Color>) -> u32 {
        let (base, prev_fill, prev_font) = match self.get_derived(style_id) {
            Some(d) => (d.base, d.fill, d.font_color),
            None => (style_id, None, None),
        };
        let wanted = DerivedStyle {
            base,
            fill: fill.or(prev_fill),
            font_color: font_color.or(prev_font),
        };
        if wanted.fill.is_none() && wanted.font_color.is_none() {
            return base;
        }
        if let Some(pos) = self.derived.iter().position(|d| *d == wanted) {
            return self.base_count + pos as u32;
        }
        self.derived.push(wanted);
        self.base_count + (self.derived.len() as u32 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_styles_are_deduplicated_and_rebased() {
        let mut styles = StyleTable::new(4);
        let red = Color::from_hex("#FF0000").unwrap();
        let first = styles.derive(2, Some(red), None);
        assert_eq!(first, 4);
        assert_eq!(styles.derive(2, Some(red), None), 4);

        let blue_font = Color::rgb(0, 0, 255);
        let second = styles.derive(first, None, Some(blue_font));
        assert_eq!(second, 5);
        assert_eq!(
            styles.get_derived(second),
            Some(&DerivedStyle {
                base: 2,
                fill: Some(red),
                font_color: Some(blue_font)
            })
        );
        assert_eq!(red.to_argb_hex(), "FFFF0000");
        assert!(Color::from_hex("12345").is_err());
    }
}
