// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tabula_core::errors::{invalid_header_error, Result};
use tabula_core::io::WriteBytes;
use tabula_core::matrix::Cell;
use tabula_core::num::{
    BackendKind, ExactRounding, FormatOptions, NumberFormatter, NumberSystem, PrecisionContext,
};

use crate::charset::Charset;
use crate::line::LineWriter;
use crate::matrix::MatrixWriter;
use crate::records::{MissingValueSpec, OutputFormat, PortableFile, Value};
use crate::{FORMAT_VERSION, SIGNATURE};

/// Options for a [`PortableWriter`].
#[derive(Clone, Debug)]
pub struct PortableWriterOptions {
    /// The digit-generation back-end for numeric cells and dictionary numbers.
    pub backend: BackendKind,
    /// The working precision of the precise back-end.
    pub context: PrecisionContext,
    /// Near-tie handling under the fast back-end.
    pub exact_rounding: ExactRounding,
    /// The byte translation written into the header and applied to the whole file.
    pub charset: Charset,
}

impl Default for PortableWriterOptions {
    fn default() -> PortableWriterOptions {
        // The precise back-end is the canonical emission path; the fast back-end is opt-in.
        PortableWriterOptions {
            backend: BackendKind::Precise,
            context: PrecisionContext::default(),
            exact_rounding: ExactRounding::default(),
            charset: Charset::identity(),
        }
    }
}

/// A writer of portable files.
///
/// Construction emits the prelude and the whole dictionary, leaving the writer at the top of
/// the data matrix; cells are then appended row by row and the file is closed with
/// [`finish`](PortableWriter::finish).
pub struct PortableWriter<W: WriteBytes> {
    matrix: MatrixWriter<W>,
}

impl<W: WriteBytes> PortableWriter<W> {
    /// Writes the prelude and dictionary of `file` into the given sink.
    pub fn try_new(
        sink: W,
        file: &PortableFile,
        opts: &PortableWriterOptions,
    ) -> Result<PortableWriter<W>> {
        file.dictionary.validate()?;

        if file.dictionary.precision == 0 {
            return invalid_header_error("precision must be at least 1");
        }

        let format_opts = FormatOptions {
            backend: opts.backend,
            context: opts.context,
            exact_rounding: opts.exact_rounding,
        };

        let precision = file.dictionary.precision;
        let formatter = NumberFormatter::with_options(NumberSystem::new(30)?, format_opts);
        let mut line = LineWriter::new(sink);
        let mut emit = Emitter { line: &mut line, formatter: &formatter, precision };

        emit.write_prelude(file, opts)?;
        emit.write_dictionary(file)?;

        let matrix =
            MatrixWriter::new(line, file.dictionary.column_widths(), precision, format_opts)?;

        Ok(PortableWriter { matrix })
    }

    /// Writes one cell into the current row.
    pub fn write_cell(&mut self, cell: &Cell) -> Result<()> {
        self.matrix.write_cell(cell)
    }

    /// Writes one full row of cells.
    pub fn write_row(&mut self, cells: &[Cell]) -> Result<()> {
        self.matrix.write_row(cells)
    }

    /// Ends the data matrix with its sentinel padding and returns the underlying sink.
    pub fn finish(self) -> Result<W> {
        let line = self.matrix.finish()?;
        line.finish()
    }
}

/// The dictionary emission phase of a writer.
struct Emitter<'a, W: WriteBytes> {
    line: &'a mut LineWriter<W>,
    formatter: &'a NumberFormatter,
    precision: u32,
}

impl<W: WriteBytes> Emitter<'_, W> {
    fn write_prelude(&mut self, file: &PortableFile, opts: &PortableWriterOptions) -> Result<()> {
        // The splash and the translation table define the charset, so they precede it and are
        // written through the identity mapping.
        let mut splash = file.header.splash.clone();
        splash.resize(200, b' ');
        self.line.write_encoded_buf(&splash)?;

        let mut table = [0u8; 256];
        for (slot, byte) in table.iter_mut().enumerate() {
            *byte = opts.charset.encode(slot as u8);
        }
        self.line.write_encoded_buf(&table)?;

        self.line.set_charset(opts.charset.clone());

        self.line.write_encoded_buf(SIGNATURE)?;
        self.line.write_encoded(FORMAT_VERSION)?;

        self.write_string(&file.header.creation_date)?;
        self.write_string(&file.header.creation_time)?;

        Ok(())
    }

    fn write_dictionary(&mut self, file: &PortableFile) -> Result<()> {
        let dictionary = &file.dictionary;

        if let Some(software) = &file.header.software {
            self.write_tag(b'1')?;
            self.write_string(software)?;
        }
        if let Some(author) = &file.header.author {
            self.write_tag(b'2')?;
            self.write_string(author)?;
        }
        if let Some(title) = &file.header.title {
            self.write_tag(b'3')?;
            self.write_string(title)?;
        }

        self.write_tag(b'4')?;
        self.write_unsigned(dictionary.variables.len() as u64)?;

        self.write_tag(b'5')?;
        self.write_unsigned(u64::from(dictionary.precision))?;

        if let Some(weight) = &dictionary.weight_variable {
            self.write_tag(b'6')?;
            self.write_string(weight)?;
        }

        for variable in &dictionary.variables {
            self.write_tag(b'7')?;
            self.write_unsigned(u64::from(variable.width))?;
            self.write_string(&variable.name)?;
            self.write_format(&variable.print_format)?;
            self.write_format(&variable.write_format)?;

            for spec in &variable.missing {
                match spec {
                    MissingValueSpec::Discrete(value) => {
                        self.write_tag(b'8')?;
                        self.write_value(value)?;
                    }
                    MissingValueSpec::OpenLow(bound) => {
                        self.write_tag(b'9')?;
                        self.write_number(*bound)?;
                    }
                    MissingValueSpec::OpenHigh(bound) => {
                        self.write_tag(b'A')?;
                        self.write_number(*bound)?;
                    }
                    MissingValueSpec::Range(low, high) => {
                        self.write_tag(b'B')?;
                        self.write_number(*low)?;
                        self.write_number(*high)?;
                    }
                }
            }

            if let Some(label) = &variable.label {
                self.write_tag(b'C')?;
                self.write_string(label)?;
            }
        }

        for map in &dictionary.value_labels {
            self.write_tag(b'D')?;
            self.write_unsigned(map.variables.len() as u64)?;
            for name in &map.variables {
                self.write_string(name)?;
            }
            self.write_unsigned(map.labels.len() as u64)?;
            for (value, label) in &map.labels {
                self.write_value(value)?;
                self.write_string(label)?;
            }
        }

        if !dictionary.documents.is_empty() {
            self.write_tag(b'E')?;
            self.write_unsigned(dictionary.documents.len() as u64)?;
            for document in &dictionary.documents {
                self.write_string(document)?;
            }
        }

        self.write_tag(b'F')?;
        Ok(())
    }

    fn write_tag(&mut self, tag: u8) -> Result<()> {
        self.line.write_encoded(tag)
    }

    fn write_number(&mut self, value: f64) -> Result<()> {
        let text = self.formatter.format(value, self.precision)?;
        self.line.write_encoded_buf(text.as_bytes())?;
        self.line.write_encoded(b'/')
    }

    fn write_unsigned(&mut self, value: u64) -> Result<()> {
        let text = self.formatter.format_unsigned(value);
        self.line.write_encoded_buf(text.as_bytes())?;
        self.line.write_encoded(b'/')
    }

    fn write_string(&mut self, text: &str) -> Result<()> {
        self.write_unsigned(text.len() as u64)?;
        self.line.write_encoded_buf(text.as_bytes())
    }

    fn write_format(&mut self, format: &OutputFormat) -> Result<()> {
        self.write_unsigned(u64::from(format.format_type))?;
        self.write_unsigned(u64::from(format.width))?;
        self.write_unsigned(u64::from(format.decimals))
    }

    fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Number(number) => self.write_number(*number),
            Value::Str(text) => self.write_string(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{PortableReader, PortableReaderOptions};
    use crate::records::{
        Dictionary, MissingValueSpec, PortableHeader, Value, ValueLabelMap, Variable,
        DEFAULT_PRECISION,
    };
    use tabula_core::io::BufReader;
    use tabula_core::matrix::CellReader;

    fn variable(name: &str, width: u8) -> Variable {
        Variable {
            width,
            name: name.to_string(),
            print_format: OutputFormat { format_type: 5, width: 8, decimals: 2 },
            write_format: OutputFormat { format_type: 5, width: 8, decimals: 2 },
            missing: Vec::new(),
            label: None,
        }
    }

    fn sample_file() -> PortableFile {
        let mut age = variable("AGE", 0);
        age.missing.push(MissingValueSpec::Discrete(Value::Number(-1.0)));
        age.missing.push(MissingValueSpec::Range(90.0, 99.0));
        age.label = Some("Age in years".to_string());

        let name = variable("NAME", 8);

        PortableFile {
            header: PortableHeader {
                software: Some("tabula".to_string()),
                title: Some("round trip".to_string()),
                creation_date: "20260801".to_string(),
                creation_time: "120000".to_string(),
                ..Default::default()
            },
            dictionary: Dictionary {
                variables: vec![age, name],
                weight_variable: Some("AGE".to_string()),
                precision: DEFAULT_PRECISION,
                value_labels: vec![ValueLabelMap {
                    variables: vec!["AGE".to_string()],
                    labels: vec![(Value::Number(-1.0), "refused".to_string())],
                }],
                documents: vec!["first doc line".to_string(), "second doc line".to_string()],
            },
        }
    }

    #[test]
    fn verify_write_read_round_trip() {
        let file = sample_file();

        let mut writer =
            PortableWriter::try_new(Vec::new(), &file, &PortableWriterOptions::default())
                .unwrap();
        writer.write_row(&[Cell::Numeric(23.0), Cell::Str("ADA".to_string())]).unwrap();
        writer.write_row(&[Cell::Sysmiss, Cell::Str("GRACE".to_string())]).unwrap();
        writer.write_row(&[Cell::Numeric(-1.5), Cell::Str(String::new())]).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = PortableReader::try_new(
            BufReader::new(&bytes),
            &PortableReaderOptions::default(),
        )
        .unwrap();

        let got = reader.file();
        assert_eq!(got.header.software.as_deref(), Some("tabula"));
        assert_eq!(got.header.title.as_deref(), Some("round trip"));
        assert_eq!(got.header.creation_date, "20260801");
        assert_eq!(got.dictionary.variables, file.dictionary.variables);
        assert_eq!(got.dictionary.weight_variable.as_deref(), Some("AGE"));
        assert_eq!(got.dictionary.value_labels, file.dictionary.value_labels);
        assert_eq!(got.dictionary.documents, file.dictionary.documents);
        assert_eq!(reader.precision(), DEFAULT_PRECISION);

        let mut cells = Vec::new();
        while let Some((_, _, cell)) = reader.next_cell().unwrap() {
            cells.push(cell);
        }
        assert_eq!(
            cells,
            vec![
                Cell::Numeric(23.0),
                Cell::Str("ADA".to_string()),
                Cell::Sysmiss,
                Cell::Str("GRACE".to_string()),
                Cell::Numeric(-1.5),
                Cell::Str(String::new()),
            ]
        );

        // A second traversal sees the same cells.
        reader.reset().unwrap();
        let mut second = Vec::new();
        while let Some((_, _, cell)) = reader.next_cell().unwrap() {
            second.push(cell);
        }
        assert_eq!(cells, second);
    }

    #[test]
    fn verify_write_read_round_trip_with_custom_charset() {
        // A rotation of the printable range exercises the translation on every header byte.
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }
        for i in 0x20u8..0x7f {
            table[i as usize] = 0x20 + ((i - 0x20 + 13) % (0x7f - 0x20));
        }

        let opts = PortableWriterOptions {
            charset: Charset::from_table(&table),
            ..Default::default()
        };

        let file = sample_file();
        let mut writer = PortableWriter::try_new(Vec::new(), &file, &opts).unwrap();
        writer.write_row(&[Cell::Numeric(7.0), Cell::Str("OK".to_string())]).unwrap();
        let bytes = writer.finish().unwrap();

        // The signature is rotated on disk but legible after decoding.
        assert!(!bytes.windows(8).any(|w| w == b"SPSSPORT"));

        let mut reader = PortableReader::try_new(
            BufReader::new(&bytes),
            &PortableReaderOptions::default(),
        )
        .unwrap();
        assert_eq!(reader.file().dictionary.variables.len(), 2);

        let (_, _, cell) = reader.next_cell().unwrap().unwrap();
        assert_eq!(cell, Cell::Numeric(7.0));
        let (_, _, cell) = reader.next_cell().unwrap().unwrap();
        assert_eq!(cell, Cell::Str("OK".to_string()));
    }

    #[test]
    fn verify_missing_precision_defaults() {
        // A minimal file assembled by hand, with no precision record.
        let mut line = LineWriter::new(Vec::new());
        line.write_encoded_buf(&[b' '; 200]).unwrap();
        let table: Vec<u8> = (0u8..=255).collect();
        line.write_encoded_buf(&table).unwrap();
        line.write_encoded_buf(b"SPSSPORT").unwrap();
        line.write_encoded(FORMAT_VERSION).unwrap();
        line.write_encoded_buf(b"8/19700101").unwrap();
        line.write_encoded_buf(b"6/000000").unwrap();
        // One numeric variable, then the matrix: a single value and the sentinel.
        line.write_encoded_buf(b"41/70/1/X5/8/2/5/8/2/F1/Z").unwrap();
        let bytes = line.finish().unwrap();

        let mut reader = PortableReader::try_new(
            BufReader::new(&bytes),
            &PortableReaderOptions::default(),
        )
        .unwrap();

        assert_eq!(reader.precision(), DEFAULT_PRECISION);
        assert_eq!(reader.next_cell().unwrap().unwrap().2, Cell::Numeric(1.0));
        assert_eq!(reader.next_cell().unwrap(), None);
    }
}
