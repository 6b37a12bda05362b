// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use log::debug;

use tabula_core::errors::{invalid_header_error, Error, Result};
use tabula_core::io::{ReadBytes, SeekBytes};
use tabula_core::matrix::{Cell, CellReader, ColumnWidths};
use tabula_core::num::{
    BackendKind, NumberParser, NumberSystem, Outcome, PrecisionContext, Step,
};

use crate::charset::Charset;
use crate::line::{LineCheckpoint, LineReader};
use crate::matrix::{MatrixAction, MatrixParser};
use crate::records::{
    Dictionary, MissingValueSpec, OutputFormat, PortableFile, PortableHeader, Value, ValueLabelMap,
    Variable, VariableBuilder, DEFAULT_PRECISION,
};
use crate::{FORMAT_VERSION, SIGNATURE};

/// Options for a [`PortableReader`].
#[derive(Copy, Clone, Debug, Default)]
pub struct PortableReaderOptions {
    /// The numeric back-end used for cell values.
    pub backend: BackendKind,
    /// The working precision of the precise back-end.
    pub context: PrecisionContext,
}

/// A reader of portable files.
///
/// Construction consumes the prelude and the whole metadata record stream, stopping at the
/// data-matrix record. Cells are then pulled through the [`CellReader`] interface; the
/// traversal can be restarted with [`reset`](CellReader::reset).
pub struct PortableReader<B: ReadBytes + SeekBytes> {
    line: LineReader<B>,
    file: PortableFile,
    widths: ColumnWidths,
    matrix: MatrixParser,
    matrix_start: LineCheckpoint,
    at_end: bool,
}

impl<B: ReadBytes + SeekBytes> PortableReader<B> {
    /// Reads the prelude and dictionary of a portable file from the given source.
    pub fn try_new(source: B, opts: &PortableReaderOptions) -> Result<PortableReader<B>> {
        let mut line = LineReader::new(source);
        let mut number = NumberParser::with_backend(
            NumberSystem::new(30)?,
            opts.backend,
            opts.context,
        )
        .with_delimiter('/');

        // The splash strings and the translation table precede the charset switch and read
        // through the identity mapping.
        let mut splash = vec![0u8; 200];
        line.read_decoded_buf(&mut splash)?;

        let mut table = [0u8; 256];
        line.read_decoded_buf(&mut table)?;
        line.set_charset(Charset::from_table(&table));

        let mut signature = [0u8; 8];
        line.read_decoded_buf(&mut signature)?;
        if &signature != SIGNATURE {
            return invalid_header_error("portable signature mismatch");
        }

        let version = line.read_decoded()?;
        if version != FORMAT_VERSION {
            return invalid_header_error("unsupported portable format version");
        }

        let creation_date = read_string(&mut line, &mut number)?;
        let creation_time = read_string(&mut line, &mut number)?;

        let mut header = PortableHeader {
            splash,
            version,
            creation_date,
            creation_time,
            software: None,
            author: None,
            title: None,
        };

        let dictionary = walk_records(&mut line, &mut number, &mut header)?;
        dictionary.validate()?;

        let widths = dictionary.column_widths();
        let matrix = MatrixParser::new(widths.clone(), opts.backend, opts.context)?;
        let matrix_start = line.checkpoint();

        Ok(PortableReader {
            line,
            file: PortableFile { header, dictionary },
            widths,
            matrix,
            matrix_start,
            at_end: false,
        })
    }

    /// The parsed file metadata.
    pub fn file(&self) -> &PortableFile {
        &self.file
    }

    /// The trigesimal precision in effect for the data matrix.
    pub fn precision(&self) -> u32 {
        self.file.dictionary.precision
    }
}

impl<B: ReadBytes + SeekBytes> CellReader for PortableReader<B> {
    fn next_cell(&mut self) -> Result<Option<(usize, usize, Cell)>> {
        if self.at_end {
            return Ok(None);
        }

        loop {
            let byte = match self.line.read_decoded() {
                Ok(byte) => byte,
                Err(Error::EndOfFile) if self.matrix.at_row_boundary() => {
                    self.at_end = true;
                    return Ok(None);
                }
                Err(err) => return Err(err),
            };

            match self.matrix.consume(byte) {
                Ok(MatrixAction::Continue) => (),
                Ok(MatrixAction::Cell { column, row, cell }) => {
                    return Ok(Some((column, row, cell)))
                }
                Ok(MatrixAction::EndOfMatrix) => {
                    self.at_end = true;
                    return Ok(None);
                }
                Err(err) => {
                    return Err(Error::InvalidCell {
                        column: self.matrix.column(),
                        offset: self.line.pos(),
                        cause: Box::new(err),
                    })
                }
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.line.restore(self.matrix_start)?;
        self.matrix.reset();
        self.at_end = false;
        Ok(())
    }

    fn widths(&self) -> &ColumnWidths {
        &self.widths
    }
}

/// Walks the tag records up to and including the data-matrix tag `F`.
fn walk_records<B: ReadBytes>(
    line: &mut LineReader<B>,
    number: &mut NumberParser,
    header: &mut PortableHeader,
) -> Result<Dictionary> {
    let mut dictionary = Dictionary { precision: DEFAULT_PRECISION, ..Default::default() };
    let mut declared_count = None;
    let mut current: Option<VariableBuilder> = None;

    loop {
        let tag = read_tag(line)?;

        // Records past a variable record attach to it; any other tag freezes the builder.
        if !matches!(tag, b'8' | b'9' | b'A' | b'B' | b'C') {
            if let Some(builder) = current.take() {
                dictionary.variables.push(builder.build());
            }
        }

        match tag {
            b'1' => header.software = Some(read_string(line, number)?),
            b'2' => header.author = Some(read_string(line, number)?),
            b'3' => header.title = Some(read_string(line, number)?),
            b'4' => declared_count = Some(read_integer(line, number)? as usize),
            b'5' => dictionary.precision = read_integer(line, number)? as u32,
            b'6' => dictionary.weight_variable = Some(read_string(line, number)?),
            b'7' => {
                let width = read_integer(line, number)?;
                if width < 0 || width > 255 {
                    return invalid_header_error("variable width out of range");
                }
                let name = read_string(line, number)?;
                if name.len() > 8 {
                    return invalid_header_error("variable name longer than 8 bytes");
                }
                let print_format = read_format(line, number)?;
                let write_format = read_format(line, number)?;

                debug!("variable {} width {}", name, width);
                current = Some(VariableBuilder::new(width as u8, name, print_format, write_format));
            }
            b'8' => {
                let builder = expect_variable(&mut current)?;
                let value = read_value(line, number, builder.width())?;
                builder.add_missing(MissingValueSpec::Discrete(value));
            }
            b'9' => {
                let builder = expect_variable(&mut current)?;
                let bound = read_numeric(line, number)?;
                builder.add_missing(MissingValueSpec::OpenLow(bound));
            }
            b'A' => {
                let builder = expect_variable(&mut current)?;
                let bound = read_numeric(line, number)?;
                builder.add_missing(MissingValueSpec::OpenHigh(bound));
            }
            b'B' => {
                let builder = expect_variable(&mut current)?;
                let low = read_numeric(line, number)?;
                let high = read_numeric(line, number)?;
                builder.add_missing(MissingValueSpec::Range(low, high));
            }
            b'C' => {
                let builder = expect_variable(&mut current)?;
                builder.set_label(read_string(line, number)?);
            }
            b'D' => {
                let map = read_value_labels(line, number, &dictionary.variables)?;
                dictionary.value_labels.push(map);
            }
            b'E' => {
                let count = read_integer(line, number)? as usize;
                for _ in 0..count {
                    dictionary.documents.push(read_string(line, number)?);
                }
            }
            b'F' => break,
            other => return Err(Error::TagUnknown(other)),
        }
    }

    if let Some(count) = declared_count {
        if count != dictionary.variables.len() {
            return invalid_header_error("variable count does not match variable records");
        }
    }

    Ok(dictionary)
}

fn expect_variable(current: &mut Option<VariableBuilder>) -> Result<&mut VariableBuilder> {
    match current {
        Some(builder) => Ok(builder),
        None => invalid_header_error("variable detail record outside a variable"),
    }
}

/// Reads the next tag byte, skipping the space padding the soft wrap may have synthesized.
fn read_tag<B: ReadBytes>(line: &mut LineReader<B>) -> Result<u8> {
    loop {
        let byte = line.read_decoded()?;
        if byte != b' ' {
            return Ok(byte);
        }
    }
}

/// Reads one number, driving the incremental parser to its delimiter.
fn read_number<B: ReadBytes>(
    line: &mut LineReader<B>,
    number: &mut NumberParser,
) -> Result<Outcome> {
    loop {
        let byte = line.read_decoded()?;
        if let Step::Done(outcome) = number.consume(char::from(byte))? {
            return Ok(outcome);
        }
    }
}

fn read_numeric<B: ReadBytes>(
    line: &mut LineReader<B>,
    number: &mut NumberParser,
) -> Result<f64> {
    match read_number(line, number)? {
        Outcome::Number(parsed) => Ok(parsed.value),
        Outcome::Sysmiss => invalid_header_error("system-missing in a dictionary record"),
    }
}

fn read_integer<B: ReadBytes>(
    line: &mut LineReader<B>,
    number: &mut NumberParser,
) -> Result<i64> {
    let value = read_numeric(line, number)?;
    if value.fract() != 0.0 || value.abs() > 9.0e15 {
        return invalid_header_error("expected an integer");
    }
    Ok(value as i64)
}

/// Reads a length-prefixed string.
fn read_string<B: ReadBytes>(
    line: &mut LineReader<B>,
    number: &mut NumberParser,
) -> Result<String> {
    let len = read_integer(line, number)?;
    if len < 0 || len > 32_767 {
        return invalid_header_error("string length out of range");
    }

    let mut buf = vec![0u8; len as usize];
    line.read_decoded_buf(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn read_format<B: ReadBytes>(
    line: &mut LineReader<B>,
    number: &mut NumberParser,
) -> Result<OutputFormat> {
    let format_type = read_integer(line, number)? as u32;
    let width = read_integer(line, number)? as u32;
    let decimals = read_integer(line, number)? as u32;
    Ok(OutputFormat { format_type, width, decimals })
}

/// Reads a value typed by the owning variable's width.
fn read_value<B: ReadBytes>(
    line: &mut LineReader<B>,
    number: &mut NumberParser,
    width: u8,
) -> Result<Value> {
    if width == 0 {
        Ok(Value::Number(read_numeric(line, number)?))
    }
    else {
        Ok(Value::Str(read_string(line, number)?))
    }
}

/// Reads a value-label map. The value type follows the referenced variables, which must all
/// agree and must already be defined.
fn read_value_labels<B: ReadBytes>(
    line: &mut LineReader<B>,
    number: &mut NumberParser,
    variables: &[Variable],
) -> Result<ValueLabelMap> {
    let var_count = read_integer(line, number)? as usize;

    let mut names = Vec::with_capacity(var_count);
    for _ in 0..var_count {
        names.push(read_string(line, number)?);
    }

    let width_of =
        |name: &str| -> Option<u8> { variables.iter().find(|v| v.name == name).map(|v| v.width) };

    let mut width = None;
    for name in &names {
        match width_of(name) {
            Some(w) => {
                let is_string = w > 0;
                match width {
                    None => width = Some((w, is_string)),
                    Some((_, s)) if s != is_string => {
                        return invalid_header_error(
                            "value labels mix numeric and string variables",
                        )
                    }
                    Some(_) => (),
                }
            }
            None => return invalid_header_error("value labels reference an undefined variable"),
        }
    }

    let value_width = width.map_or(0, |(w, _)| w);

    let label_count = read_integer(line, number)? as usize;
    let mut labels = Vec::with_capacity(label_count);
    for _ in 0..label_count {
        let value = read_value(line, number, value_width)?;
        let label = read_string(line, number)?;
        labels.push((value, label));
    }

    Ok(ValueLabelMap { variables: names, labels })
}
