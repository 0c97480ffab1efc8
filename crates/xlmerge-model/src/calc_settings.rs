use serde::{Deserialize, Serialize};

/// Workbook calculation settings, mapped to `<calcPr>` in `xl/workbook.xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalcSettings {
    pub calculation_mode: CalculationMode,
    /// Ask the spreadsheet application to recalculate every formula when the file is opened.
    ///
    /// XLSX: `fullCalcOnLoad`.
    pub full_calc_on_load: bool,
}

impl CalcSettings {
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.calculation_mode == CalculationMode::Manual
    }
}

/// Excel workbook calculation mode (`calcMode`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalculationMode {
    /// Excel: `auto`.
    #[default]
    Automatic,
    /// Excel: `autoNoTable`.
    AutomaticNoTable,
    /// Excel: `manual`.
    Manual,
}

impl CalculationMode {
    #[must_use]
    pub fn as_calc_mode_attr(self) -> &'static str {
        match self {
            Self::Automatic => "auto",
            Self::AutomaticNoTable => "autoNoTable",
            Self::Manual => "manual",
        }
    }

    #[must_use]
    pub fn from_calc_mode_attr(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(Self::Automatic),
            "autoNoTable" => Some(Self::AutomaticNoTable),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}
