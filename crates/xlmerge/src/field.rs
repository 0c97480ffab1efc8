use std::collections::HashMap;
use std::sync::Arc;

use crate::converter::Converter;
use crate::error::CatalogError;

/// What a merge does with a field's placeholders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// The placeholder is replaced with a value.
    pub merges_value: bool,
    /// Each placeholder in a row takes the next value of the field.
    pub consumes_value: bool,
    /// A placeholder without a value hides its column.
    pub hides_column_on_empty: bool,
}

impl Capabilities {
    const fn new(merges_value: bool, consumes_value: bool, hides_column_on_empty: bool) -> Self {
        Self {
            merges_value,
            consumes_value,
            hides_column_on_empty,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// One value, substituted everywhere the placeholder appears.
    Simple,
    /// Successive values across the columns of a row; columns without a value are hidden.
    RepeatCol,
    /// Successive values across the placeholders of a row.
    RepeatVal,
    /// Marks a repeating block of rows backed by child data nodes.
    RepeatRow,
    /// Sets a manual page break on the row holding it.
    PageBreak,
}

impl FieldKind {
    pub const fn capabilities(self) -> Capabilities {
        match self {
            FieldKind::Simple => Capabilities::new(true, false, false),
            FieldKind::RepeatCol => Capabilities::new(true, true, true),
            FieldKind::RepeatVal => Capabilities::new(true, true, false),
            FieldKind::RepeatRow => Capabilities::new(false, false, false),
            FieldKind::PageBreak => Capabilities::new(true, true, true),
        }
    }

    pub const fn merges_value(self) -> bool {
        self.capabilities().merges_value
    }

    pub const fn consumes_value(self) -> bool {
        self.capabilities().consumes_value
    }

    pub const fn hides_column_on_empty(self) -> bool {
        self.capabilities().hides_column_on_empty
    }
}

/// A named placeholder a template may reference as `{key}`.
#[derive(Clone, Debug)]
pub struct MergeField {
    key: Arc<str>,
    kind: FieldKind,
    converter: Converter,
}

impl MergeField {
    pub fn new(key: impl Into<Arc<str>>, kind: FieldKind, converter: Converter) -> Self {
        Self {
            key: key.into(),
            kind,
            converter,
        }
    }

    pub fn simple(key: impl Into<Arc<str>>, converter: Converter) -> Self {
        Self::new(key, FieldKind::Simple, converter)
    }

    pub fn repeat_col(key: impl Into<Arc<str>>, converter: Converter) -> Self {
        Self::new(key, FieldKind::RepeatCol, converter)
    }

    pub fn repeat_val(key: impl Into<Arc<str>>, converter: Converter) -> Self {
        Self::new(key, FieldKind::RepeatVal, converter)
    }

    pub fn repeat_row(key: impl Into<Arc<str>>) -> Self {
        Self::new(key, FieldKind::RepeatRow, Converter::noop())
    }

    /// A row group whose rows are sized to their content.
    pub fn repeat_row_auto_height(key: impl Into<Arc<str>>) -> Self {
        Self::new(
            key,
            FieldKind::RepeatRow,
            Converter::auto_height(Converter::noop()),
        )
    }

    pub fn page_break(key: impl Into<Arc<str>>) -> Self {
        Self::new(key, FieldKind::PageBreak, Converter::string())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }
}

/// The fields a merge knows about, by key.
#[derive(Clone, Debug, Default)]
pub struct FieldCatalog {
    fields: HashMap<Arc<str>, MergeField>,
}

impl FieldCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, field: MergeField) -> Result<(), CatalogError> {
        if self.fields.contains_key(field.key()) {
            return Err(CatalogError::DuplicateKey(field.key().to_string()));
        }
        self.fields.insert(field.key.clone(), field);
        Ok(())
    }

    /// Builder form of [`FieldCatalog::register`].
    pub fn with(mut self, field: MergeField) -> Result<Self, CatalogError> {
        self.register(field)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&MergeField> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MergeField> {
        self.fields.values()
    }
}

impl FromIterator<MergeField> for Result<FieldCatalog, CatalogError> {
    fn from_iter<I: IntoIterator<Item = MergeField>>(iter: I) -> Self {
        let mut catalog = FieldCatalog::new();
        for field in iter {
            catalog.register(field)?;
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_keys_are_rejected() {
        let catalog: Result<FieldCatalog, _> = [
            MergeField::simple("name", Converter::string()),
            MergeField::repeat_row("items"),
            MergeField::simple("name", Converter::integer()),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            catalog.unwrap_err(),
            CatalogError::DuplicateKey("name".to_string())
        );

        let catalog = FieldCatalog::new()
            .with(MergeField::repeat_col("month", Converter::string()))
            .unwrap();
        assert_eq!(catalog.get("month").map(MergeField::kind), Some(FieldKind::RepeatCol));
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn kinds_carry_their_capabilities() {
        assert!(FieldKind::Simple.merges_value() && !FieldKind::Simple.consumes_value());
        assert!(FieldKind::RepeatCol.hides_column_on_empty());
        assert!(!FieldKind::RepeatVal.hides_column_on_empty());
        assert_eq!(
            FieldKind::RepeatRow.capabilities(),
            Capabilities::new(false, false, false)
        );
        assert!(FieldKind::PageBreak.consumes_value());
    }
}
