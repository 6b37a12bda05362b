// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tabula_core::errors::{invalid_header_error, Result};
use tabula_core::matrix::ColumnWidths;

/// The trigesimal precision assumed when a file carries no precision record.
pub const DEFAULT_PRECISION: u32 = 11;

/// A print or write format: type code, field width, and decimal places.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct OutputFormat {
    /// The format type code.
    pub format_type: u32,
    /// The field width in characters.
    pub width: u32,
    /// The number of decimal places.
    pub decimals: u32,
}

/// A dictionary value: numeric or string, matching the variable it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A numeric value.
    Number(f64),
    /// A string value.
    Str(String),
}

/// One missing-value specification of a variable.
#[derive(Clone, Debug, PartialEq)]
pub enum MissingValueSpec {
    /// A single missing value.
    Discrete(Value),
    /// All values at or below the bound are missing.
    OpenLow(f64),
    /// All values at or above the bound are missing.
    OpenHigh(f64),
    /// All values inside the closed range are missing.
    Range(f64, f64),
}

/// One variable of the dictionary.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    /// `0` for a numeric variable, `1..=255` for a fixed-length string.
    pub width: u8,
    /// The variable name, at most 8 bytes.
    pub name: String,
    /// The print format.
    pub print_format: OutputFormat,
    /// The write format.
    pub write_format: OutputFormat,
    /// Missing-value specifications, in file order.
    pub missing: Vec<MissingValueSpec>,
    /// The variable label, when present.
    pub label: Option<String>,
}

impl Variable {
    /// Whether this variable holds numeric values.
    pub fn is_numeric(&self) -> bool {
        self.width == 0
    }
}

/// Assembles a [`Variable`] across the several tag records that describe it.
///
/// A variable record is followed by any number of missing-value and label records; the builder
/// absorbs them and freezes into the finished variable when the next record begins.
pub struct VariableBuilder {
    width: u8,
    name: String,
    print_format: OutputFormat,
    write_format: OutputFormat,
    missing: Vec<MissingValueSpec>,
    label: Option<String>,
}

impl VariableBuilder {
    /// Start a builder from the fields of a variable record.
    pub fn new(
        width: u8,
        name: String,
        print_format: OutputFormat,
        write_format: OutputFormat,
    ) -> VariableBuilder {
        VariableBuilder { width, name, print_format, write_format, missing: Vec::new(), label: None }
    }

    /// The declared width.
    pub fn width(&self) -> u8 {
        self.width
    }

    /// Absorb one missing-value specification.
    pub fn add_missing(&mut self, spec: MissingValueSpec) {
        self.missing.push(spec);
    }

    /// Absorb the variable label.
    pub fn set_label(&mut self, label: String) {
        self.label = Some(label);
    }

    /// Freeze into the finished variable.
    pub fn build(self) -> Variable {
        Variable {
            width: self.width,
            name: self.name,
            print_format: self.print_format,
            write_format: self.write_format,
            missing: self.missing,
            label: self.label,
        }
    }
}

/// A mapping from values to labels, shared by a list of variables.
///
/// All referenced variables hold the same value type: either every one is numeric or every one
/// is a string.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueLabelMap {
    /// The names of the variables this mapping applies to.
    pub variables: Vec<String>,
    /// The labelled values, in file order.
    pub labels: Vec<(Value, String)>,
}

/// The fixed-shape prelude of a portable file.
#[derive(Clone, Debug)]
pub struct PortableHeader {
    /// The five 40-byte splash strings, raw.
    pub splash: Vec<u8>,
    /// The format version byte.
    pub version: u8,
    /// The creation date, `yyyymmdd`.
    pub creation_date: String,
    /// The creation time, `hhmmss`.
    pub creation_time: String,
    /// The producing software, tag `1`.
    pub software: Option<String>,
    /// The author, tag `2`.
    pub author: Option<String>,
    /// The file title, tag `3`.
    pub title: Option<String>,
}

impl Default for PortableHeader {
    fn default() -> PortableHeader {
        PortableHeader {
            splash: vec![b' '; 200],
            version: crate::FORMAT_VERSION,
            creation_date: "19700101".to_string(),
            creation_time: "000000".to_string(),
            software: None,
            author: None,
            title: None,
        }
    }
}

/// The data dictionary of a portable file.
#[derive(Clone, Debug, Default)]
pub struct Dictionary {
    /// The variables, in file order.
    pub variables: Vec<Variable>,
    /// The weight variable name, tag `6`.
    pub weight_variable: Option<String>,
    /// The trigesimal precision, tag `5`.
    pub precision: u32,
    /// The value-label mappings, tag `D`.
    pub value_labels: Vec<ValueLabelMap>,
    /// The document lines, tag `E`.
    pub documents: Vec<String>,
}

impl Dictionary {
    /// The per-column width vector of the case matrix.
    pub fn column_widths(&self) -> ColumnWidths {
        let mut widths = ColumnWidths::new();
        for variable in &self.variables {
            if variable.is_numeric() {
                widths.push_numeric();
            }
            else {
                widths.push_string(variable.width);
            }
        }
        widths
    }

    /// Looks up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Checks the cross-record invariants: variable names unique, the weight variable present
    /// and numeric, and every value-label map type-consistent.
    pub fn validate(&self) -> Result<()> {
        for (i, variable) in self.variables.iter().enumerate() {
            if self.variables[..i].iter().any(|v| v.name == variable.name) {
                return invalid_header_error("duplicate variable name");
            }
        }

        if let Some(weight) = &self.weight_variable {
            match self.variable(weight) {
                Some(variable) if variable.is_numeric() => (),
                Some(_) => return invalid_header_error("weight variable is a string"),
                None => return invalid_header_error("weight variable is undefined"),
            }
        }

        for map in &self.value_labels {
            let mut numeric = None;
            for name in &map.variables {
                let variable = match self.variable(name) {
                    Some(variable) => variable,
                    None => return invalid_header_error("value labels reference an undefined variable"),
                };
                match numeric {
                    None => numeric = Some(variable.is_numeric()),
                    Some(n) if n != variable.is_numeric() => {
                        return invalid_header_error("value labels mix numeric and string variables")
                    }
                    Some(_) => (),
                }
            }
        }

        Ok(())
    }
}

/// A fully parsed portable file, data matrix excluded.
#[derive(Clone, Debug)]
pub struct PortableFile {
    /// The fixed-shape prelude.
    pub header: PortableHeader,
    /// The data dictionary.
    pub dictionary: Dictionary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(name: &str) -> Variable {
        Variable {
            width: 0,
            name: name.to_string(),
            print_format: OutputFormat { format_type: 5, width: 8, decimals: 2 },
            write_format: OutputFormat { format_type: 5, width: 8, decimals: 2 },
            missing: Vec::new(),
            label: None,
        }
    }

    #[test]
    fn verify_builder_freeze() {
        let mut builder = VariableBuilder::new(
            0,
            "AGE".to_string(),
            OutputFormat { format_type: 5, width: 8, decimals: 0 },
            OutputFormat { format_type: 5, width: 8, decimals: 0 },
        );
        builder.add_missing(MissingValueSpec::Discrete(Value::Number(-1.0)));
        builder.add_missing(MissingValueSpec::OpenHigh(99.0));
        builder.set_label("Age in years".to_string());

        let variable = builder.build();
        assert!(variable.is_numeric());
        assert_eq!(variable.missing.len(), 2);
        assert_eq!(variable.label.as_deref(), Some("Age in years"));
    }

    #[test]
    fn verify_dictionary_validation() {
        let mut dictionary = Dictionary {
            variables: vec![numeric("A"), numeric("B")],
            weight_variable: Some("B".to_string()),
            precision: DEFAULT_PRECISION,
            value_labels: Vec::new(),
            documents: Vec::new(),
        };
        assert!(dictionary.validate().is_ok());

        dictionary.weight_variable = Some("MISSING".to_string());
        assert!(dictionary.validate().is_err());

        dictionary.weight_variable = None;
        dictionary.variables.push(numeric("A"));
        assert!(dictionary.validate().is_err());
    }

    #[test]
    fn verify_column_widths() {
        let mut string_var = numeric("S");
        string_var.width = 12;

        let dictionary = Dictionary {
            variables: vec![numeric("A"), string_var],
            weight_variable: None,
            precision: DEFAULT_PRECISION,
            value_labels: Vec::new(),
            documents: Vec::new(),
        };

        let widths = dictionary.column_widths();
        assert_eq!(widths.slots(), &[0, 12]);
        assert_eq!(widths.column_count(), 2);
    }
}
