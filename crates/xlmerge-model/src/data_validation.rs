use serde::{Deserialize, Serialize};

use crate::Range;

/// The constraint type of a data validation rule (`<dataValidation type="..">`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataValidationKind {
    /// `type="none"` or absent: any value, possibly with an input prompt.
    #[default]
    Any,
    Whole,
    Decimal,
    List,
    Date,
    Time,
    TextLength,
    Custom,
}

impl DataValidationKind {
    pub fn from_ooxml(val: &str) -> Option<Self> {
        match val {
            "none" => Some(Self::Any),
            "whole" => Some(Self::Whole),
            "decimal" => Some(Self::Decimal),
            "list" => Some(Self::List),
            "date" => Some(Self::Date),
            "time" => Some(Self::Time),
            "textLength" => Some(Self::TextLength),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn as_ooxml(self) -> &'static str {
        match self {
            Self::Any => "none",
            Self::Whole => "whole",
            Self::Decimal => "decimal",
            Self::List => "list",
            Self::Date => "date",
            Self::Time => "time",
            Self::TextLength => "textLength",
            Self::Custom => "custom",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataValidationOperator {
    Between,
    NotBetween,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl DataValidationOperator {
    pub fn from_ooxml(val: &str) -> Option<Self> {
        match val {
            "between" => Some(Self::Between),
            "notBetween" => Some(Self::NotBetween),
            "equal" => Some(Self::Equal),
            "notEqual" => Some(Self::NotEqual),
            "greaterThan" => Some(Self::GreaterThan),
            "greaterThanOrEqual" => Some(Self::GreaterThanOrEqual),
            "lessThan" => Some(Self::LessThan),
            "lessThanOrEqual" => Some(Self::LessThanOrEqual),
            _ => None,
        }
    }

    pub fn as_ooxml(self) -> &'static str {
        match self {
            Self::Between => "between",
            Self::NotBetween => "notBetween",
            Self::Equal => "equal",
            Self::NotEqual => "notEqual",
            Self::GreaterThan => "greaterThan",
            Self::GreaterThanOrEqual => "greaterThanOrEqual",
            Self::LessThan => "lessThan",
            Self::LessThanOrEqual => "lessThanOrEqual",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataValidationMessage {
    pub title: Option<String>,
    pub body: Option<String>,
}

/// A validation rule, independent of the cells it applies to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataValidation {
    pub kind: DataValidationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<DataValidationOperator>,
    /// First constraint formula without a leading `=`. For an explicit list this is the quoted
    /// literal, e.g. `"red,green"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula2: Option<String>,
    #[serde(default)]
    pub allow_blank: bool,
    #[serde(default)]
    pub show_input_message: bool,
    #[serde(default)]
    pub show_error_message: bool,
    /// SpreadsheetML `showDropDown="1"` *hides* the in-cell arrow; this flag is stored as-is.
    #[serde(default)]
    pub hide_drop_down: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<DataValidationMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DataValidationMessage>,
}

impl DataValidation {
    /// The items of an explicit value list (`type="list"` with a quoted literal formula).
    ///
    /// Returns `None` for range-backed lists such as `$A$1:$A$5` and for other kinds.
    pub fn explicit_list_values(&self) -> Option<Vec<String>> {
        if self.kind != DataValidationKind::List {
            return None;
        }
        let formula = self.formula1.as_deref()?.trim();
        let inner = formula.strip_prefix('"')?.strip_suffix('"')?;
        Some(
            inner
                .replace("\"\"", "\"")
                .split(',')
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_explicit_list(&self) -> bool {
        self.explicit_list_values().is_some()
    }
}

/// A validation rule bound to the cells it covers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataValidationAssignment {
    pub ranges: Vec<Range>,
    pub validation: DataValidation,
}

impl DataValidationAssignment {
    pub fn new(ranges: Vec<Range>, validation: DataValidation) -> Self {
        Self { ranges, validation }
    }

    /// An explicit-list validation, the most common template control.
    pub fn explicit_list(ranges: Vec<Range>, items: &[&str]) -> Self {
        let literal = items.join(",").replace('"', "\"\"");
        Self::new(
            ranges,
            DataValidation {
                kind: DataValidationKind::List,
                formula1: Some(format!("\"{literal}\"")),
                allow_blank: true,
                show_input_message: true,
                show_error_message: true,
                ..DataValidation::default()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn explicit_list_values_only_for_quoted_literals() {
        let dv = DataValidationAssignment::explicit_list(
            vec![Range::from_a1("A1:A3").unwrap()],
            &["ja", "nein"],
        );
        assert_eq!(
            dv.validation.explicit_list_values(),
            Some(vec!["ja".to_string(), "nein".to_string()])
        );

        let range_backed = DataValidation {
            kind: DataValidationKind::List,
            formula1: Some("$Z$1:$Z$4".to_string()),
            ..DataValidation::default()
        };
        assert_eq!(range_backed.explicit_list_values(), None);
        assert!(!range_backed.is_explicit_list());
    }
}
