// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tabula_core::matrix::ColumnWidths;

/// The nominal compression bias.
pub const DEFAULT_BIAS: f64 = 100.0;

/// The fixed-shape header of a system file.
#[derive(Clone, Debug, PartialEq)]
pub struct SystemHeader {
    /// The 60-byte product identification, trailing spaces trimmed.
    pub product: String,
    /// The layout code, normally 2. Reading it byte-swapped discriminates integer endianness.
    pub layout: i32,
    /// The number of 8-byte elements per case.
    pub nominal_case_size: i32,
    /// Whether the case data is run-length compressed.
    pub compressed: bool,
    /// The 1-based dictionary index of the weight variable, or 0 when unweighted.
    pub weight_index: i32,
    /// The number of cases, or -1 when unknown.
    pub case_count: i64,
    /// The compression bias, nominally 100. Its encoding confirms floating-point endianness.
    pub bias: f64,
    /// The creation date, `dd mmm yy`, 9 bytes.
    pub creation_date: String,
    /// The creation time, `hh:mm:ss`, 8 bytes.
    pub creation_time: String,
    /// The 64-byte file label, trailing spaces trimmed.
    pub label: String,
}

impl Default for SystemHeader {
    fn default() -> SystemHeader {
        SystemHeader {
            product: "@(#) SPSS DATA FILE tabula".to_string(),
            layout: 2,
            nominal_case_size: 0,
            compressed: true,
            weight_index: 0,
            case_count: -1,
            bias: DEFAULT_BIAS,
            creation_date: "01 Jan 70".to_string(),
            creation_time: "00:00:00".to_string(),
            label: String::new(),
        }
    }
}

/// A print or write format word: format type, field width, and decimals, one byte each.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FormatWord {
    /// The format type code.
    pub format_type: u8,
    /// The field width in characters.
    pub width: u8,
    /// The number of decimal places.
    pub decimals: u8,
}

impl FormatWord {
    /// Unpacks a format word: decimals in the low byte, then field width, then format type.
    pub fn from_word(word: u32) -> FormatWord {
        FormatWord {
            format_type: ((word >> 16) & 0xff) as u8,
            width: ((word >> 8) & 0xff) as u8,
            decimals: (word & 0xff) as u8,
        }
    }

    /// Packs this format into its word encoding.
    pub fn to_word(self) -> u32 {
        (u32::from(self.format_type) << 16) | (u32::from(self.width) << 8) | u32::from(self.decimals)
    }
}

/// The missing-value declaration of a variable record.
///
/// The on-disk count is signed: a non-negative count lists discrete values, a negative count
/// declares a range plus optionally one discrete value. For string variables the 8-byte units
/// hold characters rather than doubles; they are carried under the file's floating-point
/// encoding either way so a rewrite reproduces them byte-identically.
#[derive(Clone, Debug, PartialEq)]
pub enum MissingValues {
    /// No missing values.
    None,
    /// Up to three discrete missing values.
    Discrete(Vec<f64>),
    /// A closed range, plus at most one discrete value.
    Range {
        /// The inclusive lower bound, possibly the LOWEST sentinel.
        low: f64,
        /// The inclusive upper bound, possibly the HIGHEST sentinel.
        high: f64,
        /// The optional extra discrete missing value.
        discrete: Option<f64>,
    },
}

impl MissingValues {
    /// The signed on-disk count of this declaration.
    pub fn count(&self) -> i32 {
        match self {
            MissingValues::None => 0,
            MissingValues::Discrete(values) => values.len() as i32,
            MissingValues::Range { discrete: None, .. } => -2,
            MissingValues::Range { discrete: Some(_), .. } => -3,
        }
    }

    /// The declared values in file order.
    pub fn values(&self) -> Vec<f64> {
        match self {
            MissingValues::None => Vec::new(),
            MissingValues::Discrete(values) => values.clone(),
            MissingValues::Range { low, high, discrete } => {
                let mut values = vec![*low, *high];
                values.extend(discrete);
                values
            }
        }
    }
}

/// One variable record (record type 2).
///
/// A string wider than 8 bytes is followed by continuation records of width -1, one per extra
/// 8-byte unit; they are retained so that 1-based dictionary indexes keep their meaning.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableRecord {
    /// `0` numeric, `1..=255` the head of a string, `-1` a continuation.
    pub width: i32,
    /// The 8-byte padded name, trailing spaces trimmed.
    pub name: String,
    /// The print format word.
    pub print_format: FormatWord,
    /// The write format word.
    pub write_format: FormatWord,
    /// The variable label, when present.
    pub label: Option<String>,
    /// The missing-value declaration.
    pub missing: MissingValues,
}

impl VariableRecord {
    /// A plain numeric variable.
    pub fn numeric(name: &str, format: FormatWord) -> VariableRecord {
        VariableRecord {
            width: 0,
            name: name.to_string(),
            print_format: format,
            write_format: format,
            label: None,
            missing: MissingValues::None,
        }
    }

    /// A string variable head record. Continuations must be appended separately for widths
    /// over 8.
    pub fn string(name: &str, width: u8) -> VariableRecord {
        let format = FormatWord { format_type: 1, width, decimals: 0 };
        VariableRecord {
            width: i32::from(width),
            name: name.to_string(),
            print_format: format,
            write_format: format,
            label: None,
            missing: MissingValues::None,
        }
    }

    /// A continuation record for a preceding long string.
    pub fn continuation() -> VariableRecord {
        VariableRecord {
            width: -1,
            name: String::new(),
            print_format: FormatWord::default(),
            write_format: FormatWord::default(),
            label: None,
            missing: MissingValues::None,
        }
    }

    /// The number of 8-byte units this record's column occupies per case. Continuations
    /// contribute through their head record.
    pub fn slab_count(&self) -> usize {
        match self.width {
            0 => 1,
            -1 => 0,
            w => (w as usize + 7) / 8,
        }
    }
}

/// A value-label record (record type 3) and its variable index list (record type 4).
#[derive(Clone, Debug, PartialEq)]
pub struct ValueLabelRecord {
    /// Labelled values: the raw 8-byte unit and its label. Numeric values decode under the
    /// file endianness, string values are the characters themselves.
    pub labels: Vec<([u8; 8], String)>,
    /// 1-based dictionary indexes of the variables this record applies to. The referenced
    /// variables are either all numeric or all string.
    pub variable_indexes: Vec<i32>,
}

/// Machine integer information, extension subtag 3.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct IntegerInfoRecord {
    /// Software major version.
    pub version_major: i32,
    /// Software minor version.
    pub version_minor: i32,
    /// Software revision.
    pub version_revision: i32,
    /// The machine code, -1 when unknown.
    pub machine_code: i32,
    /// The floating-point representation: 1 IEEE-754, 2 IBM 370, 3 DEC VAX.
    pub floating_point_rep: i32,
    /// The compression code.
    pub compression_code: i32,
    /// The integer endianness: 1 big, 2 little.
    pub endianness: i32,
    /// The character set code.
    pub character_code: i32,
}

/// Machine floating-point information, extension subtag 4. These constants feed the case
/// codec's system-missing comparison and the missing-range sentinels.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FloatInfoRecord {
    /// The system-missing value.
    pub sysmiss: f64,
    /// The HIGHEST range sentinel.
    pub highest: f64,
    /// The LOWEST range sentinel.
    pub lowest: f64,
}

impl Default for FloatInfoRecord {
    fn default() -> FloatInfoRecord {
        FloatInfoRecord {
            sysmiss: crate::sysmiss(),
            highest: crate::highest(),
            lowest: crate::lowest(),
        }
    }
}

/// An extension record preserved without structural parsing.
#[derive(Clone, Debug, PartialEq)]
pub struct RawExtension {
    /// The extension subtag.
    pub subtag: u32,
    /// The element size in bytes.
    pub element_size: u32,
    /// The number of elements.
    pub count: u32,
    /// The payload, `element_size * count` bytes.
    pub data: Vec<u8>,
}

/// An extension record (record type 7), keyed by its subtag.
///
/// Unknown subtags round-trip byte-identically through the `Raw` variant.
#[derive(Clone, Debug, PartialEq)]
pub enum Extension {
    /// Subtag 3: machine integer information.
    IntegerInfo(IntegerInfoRecord),
    /// Subtag 4: machine floating-point information.
    FloatInfo(FloatInfoRecord),
    /// Any other subtag, preserved verbatim.
    Raw(RawExtension),
}

/// One dictionary record of a system file, keyed by its record type.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    /// Record type 2.
    Variable(VariableRecord),
    /// Record types 3 and 4.
    ValueLabels(ValueLabelRecord),
    /// Record type 6.
    Documents(Vec<String>),
    /// Record type 7.
    Extension(Extension),
    /// Record type 999. The case data follows.
    DictionaryEnd,
}

/// A fully parsed system file, case data excluded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SystemFile {
    /// The fixed-shape header.
    pub header: SystemHeader,
    /// Variable records in file order, string continuations included.
    pub variables: Vec<VariableRecord>,
    /// Value-label records in file order.
    pub value_labels: Vec<ValueLabelRecord>,
    /// Document lines, 80 characters each.
    pub documents: Vec<String>,
    /// Extension records in file order.
    pub extensions: Vec<Extension>,
}

impl SystemFile {
    /// The per-slot width vector of the case matrix.
    pub fn column_widths(&self) -> ColumnWidths {
        let mut widths = ColumnWidths::new();
        for variable in &self.variables {
            match variable.width {
                0 => widths.push_numeric(),
                -1 => widths.push_continuation(),
                w => widths.push_string(w as u8),
            }
        }
        widths
    }

    /// The floating-point information in effect: the typed extension record when present, the
    /// format defaults otherwise.
    pub fn float_info(&self) -> FloatInfoRecord {
        for extension in &self.extensions {
            if let Extension::FloatInfo(info) = extension {
                return *info;
            }
        }
        FloatInfoRecord::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_format_word_packing() {
        let format = FormatWord { format_type: 5, width: 8, decimals: 2 };
        assert_eq!(format.to_word(), 0x0005_0802);
        assert_eq!(FormatWord::from_word(0x0005_0802), format);
    }

    #[test]
    fn verify_missing_value_counts() {
        assert_eq!(MissingValues::None.count(), 0);
        assert_eq!(MissingValues::Discrete(vec![1.0, 2.0]).count(), 2);
        assert_eq!(
            MissingValues::Range { low: 0.0, high: 9.0, discrete: None }.count(),
            -2
        );
        assert_eq!(
            MissingValues::Range { low: 0.0, high: 9.0, discrete: Some(99.0) }.count(),
            -3
        );
    }

    #[test]
    fn verify_column_widths_with_long_string() {
        let mut file = SystemFile::default();
        file.variables.push(VariableRecord::numeric("A", FormatWord::default()));
        file.variables.push(VariableRecord::string("S", 11));
        file.variables.push(VariableRecord::continuation());

        let widths = file.column_widths();
        assert_eq!(widths.slots(), &[0, 11, -1]);
        assert_eq!(widths.column_count(), 2);
        assert_eq!(widths.slot_count(), 3);
    }

    #[test]
    fn verify_slab_counts() {
        assert_eq!(VariableRecord::numeric("A", FormatWord::default()).slab_count(), 1);
        assert_eq!(VariableRecord::string("S", 8).slab_count(), 1);
        assert_eq!(VariableRecord::string("S", 9).slab_count(), 2);
        assert_eq!(VariableRecord::continuation().slab_count(), 0);
    }
}
