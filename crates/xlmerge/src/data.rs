use std::collections::HashMap;

use crate::error::DataError;
use crate::field::{FieldKind, MergeField};
use crate::value::Value;

/// One scope of merge data: values per field and child scopes per row group.
///
/// A field may hold several values; placeholders read them by position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataNode {
    values: HashMap<String, Vec<Value>>,
    groups: HashMap<String, Vec<DataNode>>,
}

impl DataNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value for `field`.
    pub fn add_value(
        &mut self,
        field: &MergeField,
        value: impl Into<Value>,
    ) -> Result<&mut Self, DataError> {
        if field.kind() == FieldKind::RepeatRow {
            return Err(DataError::GroupFieldHasNoValues(field.key().to_string()));
        }
        self.values
            .entry(field.key().to_string())
            .or_default()
            .push(value.into());
        Ok(self)
    }

    pub fn add_values<I, V>(&mut self, field: &MergeField, values: I) -> Result<&mut Self, DataError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for value in values {
            self.add_value(field, value)?;
        }
        Ok(self)
    }

    /// Append a child scope to the row group `field` and return it for filling.
    pub fn create_group(&mut self, field: &MergeField) -> Result<&mut DataNode, DataError> {
        if field.kind() != FieldKind::RepeatRow {
            return Err(DataError::NotAGroupField(field.key().to_string()));
        }
        let children = self.groups.entry(field.key().to_string()).or_default();
        children.push(DataNode::new());
        let last = children.len() - 1;
        Ok(&mut children[last])
    }

    /// Append `count` empty child scopes and return the whole child list.
    pub fn create_groups(
        &mut self,
        field: &MergeField,
        count: usize,
    ) -> Result<&mut [DataNode], DataError> {
        if field.kind() != FieldKind::RepeatRow {
            return Err(DataError::NotAGroupField(field.key().to_string()));
        }
        let children = self.groups.entry(field.key().to_string()).or_default();
        children.extend(std::iter::repeat_with(DataNode::new).take(count));
        Ok(children.as_mut_slice())
    }

    pub fn groups(&self, field: &MergeField) -> Option<&[DataNode]> {
        self.groups.get(field.key()).map(Vec::as_slice)
    }

    pub fn values(&self, field: &MergeField) -> &[Value] {
        self.values.get(field.key()).map_or(&[], Vec::as_slice)
    }

    pub fn value(&self, field: &MergeField, offset: usize) -> Option<&Value> {
        self.values(field).get(offset)
    }

    pub fn value_count(&self, field: &MergeField) -> usize {
        self.values(field).len()
    }

    /// True when `field` has a value at position `offset`.
    pub fn has_value(&self, field: &MergeField, offset: usize) -> bool {
        offset < self.value_count(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::Converter;
    use proptest::prelude::*;

    #[test]
    fn group_and_value_fields_are_kept_apart() {
        let name = MergeField::simple("name", Converter::string());
        let items = MergeField::repeat_row("items");
        let mut root = DataNode::new();

        assert_eq!(
            root.add_value(&items, "x").unwrap_err(),
            DataError::GroupFieldHasNoValues("items".to_string())
        );
        assert_eq!(
            root.create_group(&name).unwrap_err(),
            DataError::NotAGroupField("name".to_string())
        );

        root.create_group(&items).unwrap().add_value(&name, "first").unwrap();
        root.create_group(&items).unwrap();
        let children = root.groups(&items).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].value(&name, 0), Some(&Value::from("first")));
        assert!(!children[1].has_value(&name, 0));
    }

    proptest! {
        #[test]
        fn has_value_is_positional(count in 0usize..16, offset in 0usize..32) {
            let field = MergeField::repeat_val("v", Converter::integer());
            let mut node = DataNode::new();
            node.add_values(&field, (0..count).map(|i| i as i64)).unwrap();
            prop_assert_eq!(node.has_value(&field, offset), offset < count);
            prop_assert_eq!(node.value(&field, offset).is_some(), offset < count);
        }
    }
}
