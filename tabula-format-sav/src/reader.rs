// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use encoding_rs::{Encoding, WINDOWS_1252};
use log::{debug, warn};

use tabula_core::errors::{
    invalid_header_error, rejected_error, unsupported_error, Error, Result,
};
use tabula_core::io::{Endian, ReadBytes, SeekBytes};
use tabula_core::matrix::{Cell, CellReader, ColumnWidths};

use crate::cases::{CaseParser, CaseParserAction};
use crate::compression::{Decompressor, Slab};
use crate::records::{
    Extension, FloatInfoRecord, FormatWord, IntegerInfoRecord, MissingValues, RawExtension,
    Record, SystemFile, SystemHeader, ValueLabelRecord, VariableRecord, DEFAULT_BIAS,
};
use crate::SIGNATURE;

/// Options for a [`SystemReader`].
#[derive(Copy, Clone, Debug)]
pub struct SystemReaderOptions {
    /// The character encoding of string cells and dictionary text.
    pub encoding: &'static Encoding,
}

impl Default for SystemReaderOptions {
    fn default() -> SystemReaderOptions {
        SystemReaderOptions { encoding: WINDOWS_1252 }
    }
}

/// A reader of system files.
///
/// Construction consumes the header and the whole dictionary record stream, stopping at the
/// dictionary terminator. Cases are then pulled through the [`CellReader`] interface; the
/// traversal can be restarted with [`reset`](CellReader::reset).
pub struct SystemReader<B: ReadBytes + SeekBytes> {
    source: B,
    file: SystemFile,
    endian: Endian,
    widths: ColumnWidths,
    parser: CaseParser,
    decompressor: Option<Decompressor>,
    data_start: u64,
    at_end: bool,
}

impl<B: ReadBytes + SeekBytes> SystemReader<B> {
    /// Reads the header and dictionary of a system file from the given source.
    pub fn try_new(mut source: B, opts: &SystemReaderOptions) -> Result<SystemReader<B>> {
        let mut signature = [0u8; 4];
        source.read_buf_exact(&mut signature)?;
        if &signature != SIGNATURE {
            return invalid_header_error("system file signature mismatch");
        }

        let product = read_padded_string(&mut source, 60, opts.encoding)?;

        // The layout code is written in the producer's byte order; reading it both ways
        // deduces the integer endianness of the whole file.
        let layout_bytes = source.read_quad_bytes()?;
        let (endian, layout) = match i32::from_le_bytes(layout_bytes) {
            2 | 3 => (Endian::Little, i32::from_le_bytes(layout_bytes)),
            _ => match i32::from_be_bytes(layout_bytes) {
                2 | 3 => (Endian::Big, i32::from_be_bytes(layout_bytes)),
                _ => return invalid_header_error("unrecognized layout code"),
            },
        };

        let nominal_case_size = source.read_i32_endian(endian)?;
        let compression = source.read_i32_endian(endian)?;
        let compressed = match compression {
            0 => false,
            1 => true,
            _ => return unsupported_error("unsupported compression scheme"),
        };
        let weight_index = source.read_i32_endian(endian)?;
        let case_count = i64::from(source.read_i32_endian(endian)?);

        let bias = source.read_f64_endian(endian)?;
        if bias != DEFAULT_BIAS {
            warn!("sav: unusual compression bias {}", bias);
        }

        let creation_date = read_padded_string(&mut source, 9, opts.encoding)?;
        let creation_time = read_padded_string(&mut source, 8, opts.encoding)?;
        let label = read_padded_string(&mut source, 64, opts.encoding)?;
        source.ignore_bytes(3)?;

        let header = SystemHeader {
            product,
            layout,
            nominal_case_size,
            compressed,
            weight_index,
            case_count,
            bias,
            creation_date,
            creation_time,
            label,
        };

        let mut file = SystemFile { header, ..Default::default() };
        walk_records(&mut source, endian, opts.encoding, &mut file)?;

        let widths = file.column_widths();
        let float_info = file.float_info();
        let parser = CaseParser::new(widths.clone(), endian, float_info.sysmiss, opts.encoding);
        let decompressor = if file.header.compressed {
            Some(Decompressor::new(file.header.bias))
        }
        else {
            None
        };
        let data_start = source.pos();

        Ok(SystemReader {
            source,
            file,
            endian,
            widths,
            parser,
            decompressor,
            data_start,
            at_end: false,
        })
    }

    /// The parsed file metadata.
    pub fn file(&self) -> &SystemFile {
        &self.file
    }

    /// The byte order of this file.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Reads one 8-byte slab, or `None` at a clean end of data.
    fn read_slab(&mut self) -> Result<Option<[u8; 8]>> {
        let mut slab = [0u8; 8];
        let mut filled = 0;

        while filled < 8 {
            match self.source.read_buf(&mut slab[filled..])? {
                0 if filled == 0 => return Ok(None),
                0 => return rejected_error("end of file inside an 8-byte unit"),
                n => filled += n,
            }
        }

        Ok(Some(slab))
    }

    fn feed(&mut self, slab: Slab) -> Result<Option<(usize, usize, Cell)>> {
        match self.parser.consume(slab) {
            Ok(CaseParserAction::Cell { column, row, cell }) => Ok(Some((column, row, cell))),
            Ok(CaseParserAction::Continue) => Ok(None),
            Err(err) => Err(Error::InvalidCell {
                column: self.parser.column(),
                offset: self.source.pos(),
                cause: Box::new(err),
            }),
        }
    }

    fn end_of_data(&mut self) -> Result<Option<(usize, usize, Cell)>> {
        if !self.parser.at_row_boundary() {
            return rejected_error("end of data at a non-row boundary");
        }
        self.at_end = true;
        Ok(None)
    }
}

impl<B: ReadBytes + SeekBytes> CellReader for SystemReader<B> {
    fn next_cell(&mut self) -> Result<Option<(usize, usize, Cell)>> {
        if self.at_end {
            return Ok(None);
        }

        loop {
            // Drain decoded slabs before touching the byte cursor.
            if let Some(decompressor) = &mut self.decompressor {
                if let Some(slab) = decompressor.pop() {
                    if let Some(event) = self.feed(slab)? {
                        return Ok(Some(event));
                    }
                    continue;
                }
                if decompressor.finished() {
                    return self.end_of_data();
                }
            }

            let slab = match self.read_slab()? {
                Some(slab) => slab,
                None => return self.end_of_data(),
            };

            match &mut self.decompressor {
                Some(decompressor) => decompressor.push(slab)?,
                None => {
                    if let Some(event) = self.feed(Slab::Raw(slab))? {
                        return Ok(Some(event));
                    }
                }
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.source.seek_to(self.data_start)?;
        self.parser.reset();
        if let Some(decompressor) = &mut self.decompressor {
            decompressor.reset();
        }
        self.at_end = false;
        Ok(())
    }

    fn widths(&self) -> &ColumnWidths {
        &self.widths
    }
}

/// Walks the dictionary records up to and including the terminator, folding each [`Record`]
/// into the file aggregate.
fn walk_records<B: ReadBytes>(
    source: &mut B,
    endian: Endian,
    encoding: &'static Encoding,
    file: &mut SystemFile,
) -> Result<()> {
    loop {
        match read_record(source, endian, encoding)? {
            Record::Variable(variable) => {
                debug!("variable {} width {}", variable.name, variable.width);
                file.variables.push(variable);
            }
            Record::ValueLabels(record) => file.value_labels.push(record),
            Record::Documents(lines) => file.documents.extend(lines),
            Record::Extension(extension) => file.extensions.push(extension),
            Record::DictionaryEnd => return Ok(()),
        }
    }
}

/// Reads one dictionary record, dispatching on its record type.
fn read_record<B: ReadBytes>(
    source: &mut B,
    endian: Endian,
    encoding: &'static Encoding,
) -> Result<Record> {
    let record_type = source.read_i32_endian(endian)?;

    match record_type {
        2 => Ok(Record::Variable(read_variable(source, endian, encoding)?)),
        3 => {
            let labels = read_value_labels(source, endian, encoding)?;

            // The companion index record binds the labels to variables.
            if source.read_i32_endian(endian)? != 4 {
                return invalid_header_error("value labels without a variable index record");
            }
            let count = read_count(source, endian)?;
            let mut variable_indexes = Vec::with_capacity(count);
            for _ in 0..count {
                variable_indexes.push(source.read_i32_endian(endian)?);
            }

            Ok(Record::ValueLabels(ValueLabelRecord { labels, variable_indexes }))
        }
        4 => invalid_header_error("variable index record without value labels"),
        6 => {
            let count = read_count(source, endian)?;
            let mut lines = Vec::with_capacity(count);
            for _ in 0..count {
                lines.push(read_padded_string(source, 80, encoding)?);
            }
            Ok(Record::Documents(lines))
        }
        7 => Ok(Record::Extension(read_extension(source, endian)?)),
        999 => {
            source.ignore_bytes(4)?;
            Ok(Record::DictionaryEnd)
        }
        other => Err(Error::TagUnknown(other as u8)),
    }
}

fn read_variable<B: ReadBytes>(
    source: &mut B,
    endian: Endian,
    encoding: &'static Encoding,
) -> Result<VariableRecord> {
    let width = source.read_i32_endian(endian)?;
    if width < -1 || width > 255 {
        return invalid_header_error("variable width out of range");
    }

    let has_label = source.read_i32_endian(endian)?;
    let n_missing = source.read_i32_endian(endian)?;

    let print_format = FormatWord::from_word(source.read_i32_endian(endian)? as u32);
    let write_format = FormatWord::from_word(source.read_i32_endian(endian)? as u32);

    let name = read_padded_string(source, 8, encoding)?;

    let label = match has_label {
        0 => None,
        1 => {
            let len = source.read_i32_endian(endian)?;
            if len < 0 || len > 65_535 {
                return invalid_header_error("variable label length out of range");
            }
            let text = read_padded_string(source, len as usize, encoding)?;
            // Labels pad to a 4-byte boundary.
            source.ignore_bytes(((4 - len as u64 % 4) % 4) as u64)?;
            Some(text)
        }
        _ => return invalid_header_error("label flag must be 0 or 1"),
    };

    let missing = match n_missing {
        0 => MissingValues::None,
        1..=3 => {
            let mut values = Vec::with_capacity(n_missing as usize);
            for _ in 0..n_missing {
                values.push(source.read_f64_endian(endian)?);
            }
            MissingValues::Discrete(values)
        }
        -2 | -3 => {
            let low = source.read_f64_endian(endian)?;
            let high = source.read_f64_endian(endian)?;
            let discrete = if n_missing == -3 {
                Some(source.read_f64_endian(endian)?)
            }
            else {
                None
            };
            MissingValues::Range { low, high, discrete }
        }
        _ => return invalid_header_error("missing value count out of range"),
    };

    Ok(VariableRecord { width, name, print_format, write_format, label, missing })
}

fn read_value_labels<B: ReadBytes>(
    source: &mut B,
    endian: Endian,
    encoding: &'static Encoding,
) -> Result<Vec<([u8; 8], String)>> {
    let count = read_count(source, endian)?;
    let mut labels = Vec::with_capacity(count);

    for _ in 0..count {
        let mut value = [0u8; 8];
        source.read_buf_exact(&mut value)?;

        // The label is length-prefixed by one byte and padded so the prefix plus text fill a
        // whole number of 8-byte units.
        let len = source.read_byte()? as usize;
        let padded = (len + 1 + 7) / 8 * 8 - 1;
        let raw = source.read_boxed_slice_exact(padded)?;
        let (text, _, _) = encoding.decode(&raw[..len]);

        labels.push((value, text.into_owned()));
    }

    Ok(labels)
}

fn read_extension<B: ReadBytes>(source: &mut B, endian: Endian) -> Result<Extension> {
    let subtag = source.read_i32_endian(endian)? as u32;
    let element_size = source.read_i32_endian(endian)? as u32;
    let count = source.read_i32_endian(endian)? as u32;

    let len = u64::from(element_size) * u64::from(count);
    if len > 1 << 24 {
        return Err(Error::LimitError("extension record too large"));
    }
    let data = source.read_boxed_slice_exact(len as usize)?.into_vec();

    let extension = match (subtag, element_size, count) {
        (3, 4, 8) => {
            let mut fields = [0i32; 8];
            for (i, field) in fields.iter_mut().enumerate() {
                let mut word = [0u8; 4];
                word.copy_from_slice(&data[i * 4..i * 4 + 4]);
                *field = endian.decode_i32(word);
            }
            Extension::IntegerInfo(IntegerInfoRecord {
                version_major: fields[0],
                version_minor: fields[1],
                version_revision: fields[2],
                machine_code: fields[3],
                floating_point_rep: fields[4],
                compression_code: fields[5],
                endianness: fields[6],
                character_code: fields[7],
            })
        }
        (4, 8, 3) => {
            let mut values = [0f64; 3];
            for (i, value) in values.iter_mut().enumerate() {
                let mut word = [0u8; 8];
                word.copy_from_slice(&data[i * 8..i * 8 + 8]);
                *value = endian.decode_f64(word);
            }
            Extension::FloatInfo(FloatInfoRecord {
                sysmiss: values[0],
                highest: values[1],
                lowest: values[2],
            })
        }
        _ => Extension::Raw(RawExtension { subtag, element_size, count, data }),
    };

    Ok(extension)
}

fn read_count<B: ReadBytes>(source: &mut B, endian: Endian) -> Result<usize> {
    let count = source.read_i32_endian(endian)?;
    if count < 0 || count > 1 << 24 {
        return invalid_header_error("record count out of range");
    }
    Ok(count as usize)
}

/// Reads a fixed-size field and trims its trailing space padding.
fn read_padded_string<B: ReadBytes>(
    source: &mut B,
    len: usize,
    encoding: &'static Encoding,
) -> Result<String> {
    let raw = source.read_boxed_slice_exact(len)?;
    let end = raw.iter().rposition(|&b| b != b' ').map_or(0, |p| p + 1);
    let (text, _, _) = encoding.decode(&raw[..end]);
    Ok(text.into_owned())
}
