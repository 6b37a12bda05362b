// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use encoding_rs::{Encoding, WINDOWS_1252};

use tabula_core::errors::{invalid_header_error, Result};
use tabula_core::io::{Endian, WriteBytes};
use tabula_core::matrix::Cell;

use crate::cases::CaseWriter;
use crate::records::{Extension, SystemFile, VariableRecord};
use crate::SIGNATURE;

/// Options for a [`SystemWriter`].
#[derive(Copy, Clone, Debug)]
pub struct SystemWriterOptions {
    /// The byte order of the produced file.
    pub endian: Endian,
    /// The character encoding of string cells and dictionary text.
    pub encoding: &'static Encoding,
}

impl Default for SystemWriterOptions {
    fn default() -> SystemWriterOptions {
        SystemWriterOptions { endian: Endian::Little, encoding: WINDOWS_1252 }
    }
}

/// A writer of system files.
///
/// Construction emits the header and the whole dictionary, leaving the writer at the top of
/// the case data; cells are then appended row by row and the file is closed with
/// [`finish`](SystemWriter::finish).
pub struct SystemWriter<W: WriteBytes> {
    cases: CaseWriter<W>,
}

impl<W: WriteBytes> SystemWriter<W> {
    /// Writes the header and dictionary of `file` into the given sink.
    pub fn try_new(
        mut sink: W,
        file: &SystemFile,
        opts: &SystemWriterOptions,
    ) -> Result<SystemWriter<W>> {
        let widths = file.column_widths();

        let slot_count = widths.slot_count() as i32;
        if file.header.nominal_case_size != slot_count && file.header.nominal_case_size != -1 {
            return invalid_header_error("nominal case size does not match variable records");
        }

        let endian = opts.endian;
        let mut emit = Emitter { sink: &mut sink, endian, encoding: opts.encoding };

        emit.write_header(file)?;

        for variable in &file.variables {
            emit.write_variable(variable)?;
        }

        for record in &file.value_labels {
            emit.sink.write_i32_endian(3, endian)?;
            emit.sink.write_i32_endian(record.labels.len() as i32, endian)?;
            for (value, label) in &record.labels {
                emit.write_value_label(value, label)?;
            }

            emit.sink.write_i32_endian(4, endian)?;
            emit.sink.write_i32_endian(record.variable_indexes.len() as i32, endian)?;
            for &index in &record.variable_indexes {
                emit.sink.write_i32_endian(index, endian)?;
            }
        }

        if !file.documents.is_empty() {
            emit.sink.write_i32_endian(6, endian)?;
            emit.sink.write_i32_endian(file.documents.len() as i32, endian)?;
            for line in &file.documents {
                emit.write_padded_string(line, 80)?;
            }
        }

        for extension in &file.extensions {
            emit.write_extension(extension)?;
        }

        emit.sink.write_i32_endian(999, endian)?;
        emit.sink.write_i32_endian(0, endian)?;

        let float_info = file.float_info();
        let cases = if file.header.compressed {
            CaseWriter::compressed(
                sink,
                widths,
                file.header.bias,
                float_info.sysmiss,
                endian,
                opts.encoding,
            )
        }
        else {
            CaseWriter::raw(sink, widths, float_info.sysmiss, endian, opts.encoding)
        };

        Ok(SystemWriter { cases })
    }

    /// Writes one cell into the current row.
    pub fn write_cell(&mut self, cell: &Cell) -> Result<()> {
        self.cases.write_cell(cell)
    }

    /// Writes one full row of cells.
    pub fn write_row(&mut self, cells: &[Cell]) -> Result<()> {
        self.cases.write_row(cells)
    }

    /// Ends the case data and returns the underlying sink.
    pub fn finish(self) -> Result<W> {
        self.cases.finish()
    }
}

/// The dictionary emission phase of a writer.
struct Emitter<'a, W: WriteBytes> {
    sink: &'a mut W,
    endian: Endian,
    encoding: &'static Encoding,
}

impl<W: WriteBytes> Emitter<'_, W> {
    fn write_header(&mut self, file: &SystemFile) -> Result<()> {
        let header = &file.header;

        self.sink.write_buf(SIGNATURE)?;
        self.write_padded_string(&header.product, 60)?;
        self.sink.write_i32_endian(header.layout, self.endian)?;
        self.sink.write_i32_endian(header.nominal_case_size, self.endian)?;
        self.sink.write_i32_endian(i32::from(header.compressed), self.endian)?;
        self.sink.write_i32_endian(header.weight_index, self.endian)?;
        self.sink.write_i32_endian(header.case_count as i32, self.endian)?;
        self.sink.write_f64_endian(header.bias, self.endian)?;
        self.write_padded_string(&header.creation_date, 9)?;
        self.write_padded_string(&header.creation_time, 8)?;
        self.write_padded_string(&header.label, 64)?;
        self.sink.write_buf(&[0u8; 3])?;

        Ok(())
    }

    fn write_variable(&mut self, variable: &VariableRecord) -> Result<()> {
        self.sink.write_i32_endian(2, self.endian)?;
        self.sink.write_i32_endian(variable.width, self.endian)?;
        self.sink.write_i32_endian(i32::from(variable.label.is_some()), self.endian)?;
        self.sink.write_i32_endian(variable.missing.count(), self.endian)?;
        self.sink.write_i32_endian(variable.print_format.to_word() as i32, self.endian)?;
        self.sink.write_i32_endian(variable.write_format.to_word() as i32, self.endian)?;
        self.write_padded_string(&variable.name, 8)?;

        if let Some(label) = &variable.label {
            let (bytes, _, _) = self.encoding.encode(label);
            let len = bytes.len() as i32;
            self.sink.write_i32_endian(len, self.endian)?;
            self.sink.write_buf(&bytes)?;
            let pad = ((4 - len as usize % 4) % 4) as usize;
            self.sink.write_buf(&vec![b' '; pad])?;
        }

        for value in variable.missing.values() {
            self.sink.write_f64_endian(value, self.endian)?;
        }

        Ok(())
    }

    fn write_value_label(&mut self, value: &[u8; 8], label: &str) -> Result<()> {
        self.sink.write_buf(value)?;

        let (bytes, _, _) = self.encoding.encode(label);
        let len = bytes.len().min(255);
        self.sink.write_byte(len as u8)?;
        self.sink.write_buf(&bytes[..len])?;

        let padded = (len + 1 + 7) / 8 * 8 - 1;
        self.sink.write_buf(&vec![b' '; padded - len])?;

        Ok(())
    }

    fn write_extension(&mut self, extension: &Extension) -> Result<()> {
        self.sink.write_i32_endian(7, self.endian)?;

        match extension {
            Extension::IntegerInfo(info) => {
                self.sink.write_i32_endian(3, self.endian)?;
                self.sink.write_i32_endian(4, self.endian)?;
                self.sink.write_i32_endian(8, self.endian)?;
                for field in [
                    info.version_major,
                    info.version_minor,
                    info.version_revision,
                    info.machine_code,
                    info.floating_point_rep,
                    info.compression_code,
                    info.endianness,
                    info.character_code,
                ] {
                    self.sink.write_i32_endian(field, self.endian)?;
                }
            }
            Extension::FloatInfo(info) => {
                self.sink.write_i32_endian(4, self.endian)?;
                self.sink.write_i32_endian(8, self.endian)?;
                self.sink.write_i32_endian(3, self.endian)?;
                for value in [info.sysmiss, info.highest, info.lowest] {
                    self.sink.write_f64_endian(value, self.endian)?;
                }
            }
            Extension::Raw(raw) => {
                self.sink.write_i32_endian(raw.subtag as i32, self.endian)?;
                self.sink.write_i32_endian(raw.element_size as i32, self.endian)?;
                self.sink.write_i32_endian(raw.count as i32, self.endian)?;
                self.sink.write_buf(&raw.data)?;
            }
        }

        Ok(())
    }

    fn write_padded_string(&mut self, text: &str, len: usize) -> Result<()> {
        let (bytes, _, _) = self.encoding.encode(text);
        if bytes.len() > len {
            return invalid_header_error("fixed field text too long");
        }

        self.sink.write_buf(&bytes)?;
        self.sink.write_buf(&vec![b' '; len - bytes.len()])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{SystemReader, SystemReaderOptions};
    use crate::records::{
        FloatInfoRecord, FormatWord, IntegerInfoRecord, MissingValues, RawExtension,
        SystemHeader, ValueLabelRecord,
    };
    use tabula_core::io::BufReader;
    use tabula_core::matrix::CellReader;

    fn sample_file(compressed: bool) -> SystemFile {
        let mut age = VariableRecord::numeric("AGE", FormatWord {
            format_type: 5,
            width: 8,
            decimals: 0,
        });
        age.label = Some("Age in years".to_string());
        age.missing = MissingValues::Range { low: 90.0, high: 99.0, discrete: Some(-1.0) };

        let name = VariableRecord::string("NAME", 11);

        let mut label_value = [b' '; 8];
        label_value[..2].copy_from_slice(&[b'0', b'1']);

        SystemFile {
            header: SystemHeader {
                nominal_case_size: 4,
                compressed,
                case_count: 2,
                label: "round trip".to_string(),
                ..Default::default()
            },
            variables: vec![
                age,
                name,
                VariableRecord::continuation(),
                VariableRecord::numeric("SCORE", FormatWord {
                    format_type: 5,
                    width: 8,
                    decimals: 2,
                }),
            ],
            value_labels: vec![ValueLabelRecord {
                labels: vec![((-1.0f64).to_le_bytes(), "refused".to_string())],
                variable_indexes: vec![1],
            }],
            documents: vec!["first doc line".to_string()],
            extensions: vec![
                Extension::IntegerInfo(IntegerInfoRecord {
                    version_major: 1,
                    version_minor: 0,
                    version_revision: 0,
                    machine_code: -1,
                    floating_point_rep: 1,
                    compression_code: 1,
                    endianness: 2,
                    character_code: 1252,
                }),
                Extension::FloatInfo(FloatInfoRecord::default()),
                // Subtag 7 has no structural parser and must survive verbatim.
                Extension::Raw(RawExtension {
                    subtag: 7,
                    element_size: 1,
                    count: 5,
                    data: b"hello".to_vec(),
                }),
            ],
        }
    }

    fn rows() -> Vec<Vec<Cell>> {
        vec![
            vec![
                Cell::Numeric(23.0),
                Cell::Str("ADA".to_string()),
                Cell::Numeric(99.75),
            ],
            vec![
                Cell::Sysmiss,
                Cell::Str("GRACE HOPPER".to_string()[..11].to_string()),
                Cell::Numeric(-1.0),
            ],
        ]
    }

    fn write_then_read(file: &SystemFile, opts: &SystemWriterOptions) -> Vec<u8> {
        let mut writer = SystemWriter::try_new(Vec::new(), file, opts).unwrap();
        for row in rows() {
            writer.write_row(&row).unwrap();
        }
        writer.finish().unwrap()
    }

    fn assert_round_trip(file: &SystemFile, opts: &SystemWriterOptions) {
        let bytes = write_then_read(file, opts);

        let mut reader = SystemReader::try_new(
            BufReader::new(&bytes),
            &SystemReaderOptions { encoding: opts.encoding },
        )
        .unwrap();

        assert_eq!(reader.endian(), opts.endian);
        assert_eq!(reader.file(), file);

        let mut cells = Vec::new();
        while let Some((_, _, cell)) = reader.next_cell().unwrap() {
            cells.push(cell);
        }
        let expected: Vec<Cell> = rows().into_iter().flatten().collect();
        assert_eq!(cells, expected);

        // A second traversal sees the same cells.
        reader.reset().unwrap();
        let mut second = Vec::new();
        while let Some((_, _, cell)) = reader.next_cell().unwrap() {
            second.push(cell);
        }
        assert_eq!(cells, second);
    }

    #[test]
    fn verify_compressed_round_trip() {
        assert_round_trip(&sample_file(true), &SystemWriterOptions::default());
    }

    #[test]
    fn verify_uncompressed_round_trip() {
        assert_round_trip(&sample_file(false), &SystemWriterOptions::default());
    }

    #[test]
    fn verify_big_endian_round_trip() {
        let opts = SystemWriterOptions { endian: Endian::Big, ..Default::default() };
        assert_round_trip(&sample_file(true), &opts);
    }

    #[test]
    fn verify_signature_and_layout() {
        let bytes = write_then_read(&sample_file(true), &SystemWriterOptions::default());
        assert_eq!(&bytes[..4], b"$FL2");

        let mut corrupted = bytes.clone();
        corrupted[0] = b'X';
        assert!(SystemReader::try_new(
            BufReader::new(&corrupted),
            &SystemReaderOptions::default()
        )
        .is_err());
    }

    #[test]
    fn verify_case_size_mismatch_is_rejected() {
        let mut file = sample_file(true);
        file.header.nominal_case_size = 7;
        assert!(SystemWriter::try_new(Vec::new(), &file, &SystemWriterOptions::default())
            .is_err());
    }
}
