// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The portable data-matrix codec: a push parser mapping the decoded byte stream onto typed
//! cells, and the mirror emitter.

use tabula_core::errors::{limit_error, number_error, unsupported_error, NumberErrorKind, Result};
use tabula_core::io::WriteBytes;
use tabula_core::matrix::{Cell, ColumnWidths};
use tabula_core::num::{
    BackendKind, FormatOptions, NumberFormatter, NumberParser, NumberSystem, Outcome,
    PrecisionContext, Step,
};

use crate::line::LineWriter;

/// The longest string cell a well-formed file can declare.
const MAX_STRING_LEN: u64 = 255;

/// The sentinel byte padding the end of the cell stream.
const END_SENTINEL: u8 = b'Z';

/// The code returned by each [`MatrixParser::consume`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum MatrixAction {
    /// More bytes are required.
    Continue,
    /// A cell completed.
    Cell {
        /// Zero-based column of the cell.
        column: usize,
        /// Zero-based row of the cell.
        row: usize,
        /// The cell itself.
        cell: Cell,
    },
    /// The end-of-matrix sentinel was reached.
    EndOfMatrix,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum State {
    /// At or inside the leading number of a cell.
    CellStart,
    /// Consuming the bytes of a string cell.
    StringBody,
    /// Past the sentinel; only padding may follow.
    End,
}

/// The push parser of the portable data matrix.
///
/// Feed decoded logical bytes through [`consume`](MatrixParser::consume); the parser never
/// blocks and never reads on its own. Cell type is selected per column from the width vector:
/// a numeric column holds a base-30 number closed by `/` (or the `*.` system-missing mark),
/// a string column holds a base-30 length, `/`, and that many bytes. Rows end implicitly after
/// the last column; the stream ends at the `Z` sentinel.
pub struct MatrixParser {
    widths: ColumnWidths,
    number: NumberParser,
    state: State,
    column: usize,
    row: usize,
    fed: bool,
    str_remaining: usize,
    str_buf: Vec<u8>,
}

impl MatrixParser {
    /// Create a parser over the given width vector and numeric back-end.
    pub fn new(
        widths: ColumnWidths,
        backend: BackendKind,
        context: PrecisionContext,
    ) -> Result<MatrixParser> {
        let system = NumberSystem::new(30)?;
        let number = NumberParser::with_backend(system, backend, context).with_delimiter('/');

        Ok(MatrixParser {
            widths,
            number,
            state: State::CellStart,
            column: 0,
            row: 0,
            fed: false,
            str_remaining: 0,
            str_buf: Vec::new(),
        })
    }

    /// The width vector driving this parser.
    pub fn widths(&self) -> &ColumnWidths {
        &self.widths
    }

    /// The column the parser is currently inside.
    pub fn column(&self) -> usize {
        self.column
    }

    /// Whether the parser sits at a fresh row boundary with no bytes consumed towards the next
    /// cell. End of input is only clean here or past the sentinel.
    pub fn at_row_boundary(&self) -> bool {
        match self.state {
            State::End => true,
            State::CellStart => self.column == 0 && !self.fed,
            State::StringBody => false,
        }
    }

    /// Returns the parser to the top of the matrix without releasing its buffers.
    pub fn reset(&mut self) {
        self.number.reset();
        self.state = State::CellStart;
        self.column = 0;
        self.row = 0;
        self.fed = false;
        self.str_remaining = 0;
        self.str_buf.clear();
    }

    /// Feeds one decoded logical byte.
    pub fn consume(&mut self, byte: u8) -> Result<MatrixAction> {
        match self.state {
            State::End => match byte {
                END_SENTINEL | b' ' => Ok(MatrixAction::EndOfMatrix),
                _ => number_error(NumberErrorKind::UnexpectedChar),
            },
            State::CellStart => {
                if !self.fed && byte == END_SENTINEL {
                    self.state = State::End;
                    return Ok(MatrixAction::EndOfMatrix);
                }

                if byte != b' ' {
                    self.fed = true;
                }

                match self.number.consume(char::from(byte))? {
                    Step::Continue => Ok(MatrixAction::Continue),
                    Step::Done(outcome) => self.number_done(outcome),
                }
            }
            State::StringBody => {
                self.str_buf.push(byte);
                self.str_remaining -= 1;

                if self.str_remaining == 0 {
                    let text = finish_string(&self.str_buf);
                    self.str_buf.clear();
                    Ok(self.emit(Cell::Str(text)))
                }
                else {
                    Ok(MatrixAction::Continue)
                }
            }
        }
    }

    fn number_done(&mut self, outcome: Outcome) -> Result<MatrixAction> {
        let width = match self.widths.slots().get(self.column) {
            Some(&width) => width,
            None => return number_error(NumberErrorKind::UnexpectedChar),
        };

        if width == 0 {
            return match outcome {
                Outcome::Number(parsed) => Ok(self.emit(Cell::Numeric(parsed.value))),
                Outcome::Sysmiss => Ok(self.emit(Cell::Sysmiss)),
            };
        }

        // A string cell leads with its byte count.
        let parsed = match outcome {
            Outcome::Number(parsed) => parsed,
            Outcome::Sysmiss => return number_error(NumberErrorKind::UnexpectedChar),
        };

        if parsed.value < 0.0 || parsed.value.fract() != 0.0 || parsed.value > MAX_STRING_LEN as f64
        {
            return number_error(NumberErrorKind::UnexpectedChar);
        }

        let len = parsed.value as usize;

        if len == 0 {
            return Ok(self.emit(Cell::Str(String::new())));
        }

        self.str_remaining = len;
        self.state = State::StringBody;
        Ok(MatrixAction::Continue)
    }

    fn emit(&mut self, cell: Cell) -> MatrixAction {
        let column = self.column;
        let row = self.row;

        self.column += 1;
        if self.column == self.widths.slot_count() {
            self.column = 0;
            self.row += 1;
        }

        self.state = State::CellStart;
        self.fed = false;

        MatrixAction::Cell { column, row, cell }
    }
}

/// Strips the trailing space padding of a fixed-width string cell.
fn finish_string(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != b' ').map_or(0, |p| p + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// The emitter of the portable data matrix, the mirror of [`MatrixParser`].
///
/// Cells pass through the soft-wrap line writer one column at a time; a traversal ends with
/// [`finish`](MatrixWriter::finish), which pads the remainder of the current 80-column line
/// with the `Z` sentinel and hands the line writer back.
pub struct MatrixWriter<W: WriteBytes> {
    line: LineWriter<W>,
    widths: ColumnWidths,
    formatter: NumberFormatter,
    precision: u32,
    column: usize,
}

impl<W: WriteBytes> MatrixWriter<W> {
    /// Create an emitter over the given line writer and width vector, formatting numeric cells
    /// at the file's trigesimal precision.
    pub fn new(
        line: LineWriter<W>,
        widths: ColumnWidths,
        precision: u32,
        opts: FormatOptions,
    ) -> Result<MatrixWriter<W>> {
        let formatter = NumberFormatter::with_options(NumberSystem::new(30)?, opts);
        Ok(MatrixWriter { line, widths, formatter, precision, column: 0 })
    }

    /// Writes one cell into the current row.
    pub fn write_cell(&mut self, cell: &Cell) -> Result<()> {
        let width = match self.widths.slots().get(self.column) {
            Some(&width) => width,
            None => return unsupported_error("cell written outside the column layout"),
        };

        match (width, cell) {
            (0, Cell::Numeric(value)) => {
                let text = self.formatter.format(*value, self.precision)?;
                self.line.write_encoded_buf(text.as_bytes())?;
                self.line.write_encoded(b'/')?;
            }
            (0, Cell::Sysmiss) => {
                self.line.write_encoded_buf(b"*.")?;
            }
            (width, Cell::Str(text)) if width > 0 => {
                let width = width as usize;
                if text.len() > width {
                    return limit_error("string cell longer than its declared width");
                }

                // Fixed-width semantics: pad to the declared width so every cell of the column
                // spans the same byte count.
                let length = self.formatter.format_unsigned(width as u64);
                self.line.write_encoded_buf(length.as_bytes())?;
                self.line.write_encoded(b'/')?;
                self.line.write_encoded_buf(text.as_bytes())?;
                for _ in text.len()..width {
                    self.line.write_encoded(b' ')?;
                }
            }
            _ => return unsupported_error("cell type does not match the column type"),
        }

        self.column += 1;
        if self.column == self.widths.slot_count() {
            self.column = 0;
        }

        Ok(())
    }

    /// Writes one full row of cells.
    pub fn write_row(&mut self, cells: &[Cell]) -> Result<()> {
        for cell in cells {
            self.write_cell(cell)?;
        }
        Ok(())
    }

    /// Ends the cell stream: at least one `Z` sentinel, padded to the end of the current
    /// 80-column line. Returns the underlying line writer.
    pub fn finish(mut self) -> Result<LineWriter<W>> {
        if self.column != 0 {
            return unsupported_error("matrix ended in the middle of a row");
        }

        loop {
            self.line.write_encoded(END_SENTINEL)?;
            if self.line.column() == 0 {
                break;
            }
        }

        Ok(self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::matrix::ColumnWidths;

    fn widths() -> ColumnWidths {
        let mut widths = ColumnWidths::new();
        widths.push_numeric();
        widths.push_string(4);
        widths
    }

    fn parse_all(parser: &mut MatrixParser, text: &[u8]) -> Vec<(usize, usize, Cell)> {
        let mut cells = Vec::new();
        for &byte in text {
            match parser.consume(byte).unwrap() {
                MatrixAction::Cell { column, row, cell } => cells.push((column, row, cell)),
                MatrixAction::EndOfMatrix => break,
                MatrixAction::Continue => (),
            }
        }
        cells
    }

    #[test]
    fn verify_parse_rows() {
        let mut parser =
            MatrixParser::new(widths(), BackendKind::Fast, PrecisionContext::default()).unwrap();

        let cells = parse_all(&mut parser, b"1/4/AB  *.4/CDEFZ");

        assert_eq!(
            cells,
            vec![
                (0, 0, Cell::Numeric(1.0)),
                (1, 0, Cell::Str("AB".to_string())),
                (0, 1, Cell::Sysmiss),
                (1, 1, Cell::Str("CDEF".to_string())),
            ]
        );
        assert!(parser.at_row_boundary());
    }

    #[test]
    fn verify_sentinel_and_padding() {
        let mut parser =
            MatrixParser::new(widths(), BackendKind::Fast, PrecisionContext::default()).unwrap();

        assert_eq!(parser.consume(b'Z').unwrap(), MatrixAction::EndOfMatrix);
        assert_eq!(parser.consume(b'Z').unwrap(), MatrixAction::EndOfMatrix);
        assert_eq!(parser.consume(b' ').unwrap(), MatrixAction::EndOfMatrix);
        assert!(parser.consume(b'x').is_err());
    }

    #[test]
    fn verify_reset_restores_position() {
        let mut parser =
            MatrixParser::new(widths(), BackendKind::Fast, PrecisionContext::default()).unwrap();

        parse_all(&mut parser, b"1/4/AB  ");
        assert!(!parser.at_row_boundary() || parser.column() == 0);

        parser.reset();
        let cells = parse_all(&mut parser, b"2/4/XY  Z");
        assert_eq!(cells[0], (0, 0, Cell::Numeric(2.0)));
    }

    #[test]
    fn verify_writer_emits_parseable_stream() {
        let ws = widths();
        let line = crate::line::LineWriter::new(Vec::new());

        let mut writer =
            MatrixWriter::new(line, ws.clone(), 11, FormatOptions::default()).unwrap();
        writer.write_row(&[Cell::Numeric(-12.5), Cell::Str("AB".to_string())]).unwrap();
        writer.write_row(&[Cell::Sysmiss, Cell::Str(String::new())]).unwrap();
        let line = writer.finish().unwrap();

        let physical = line.finish().unwrap();
        let text = String::from_utf8(physical).unwrap();
        assert!(text.starts_with("-C.F/4/AB  *.4/    ZZZ"), "got {}", text);

        let mut parser =
            MatrixParser::new(ws, BackendKind::Fast, PrecisionContext::default()).unwrap();
        let cells = parse_all(&mut parser, text.replace(['\n', '\r'], "").as_bytes());

        assert_eq!(
            cells,
            vec![
                (0, 0, Cell::Numeric(-12.5)),
                (1, 0, Cell::Str("AB".to_string())),
                (0, 1, Cell::Sysmiss),
                (1, 1, Cell::Str(String::new())),
            ]
        );
    }

    #[test]
    fn verify_string_cell_over_width_is_rejected() {
        let line = crate::line::LineWriter::new(Vec::new());
        let mut writer =
            MatrixWriter::new(line, widths(), 11, FormatOptions::default()).unwrap();

        writer.write_cell(&Cell::Numeric(0.0)).unwrap();
        assert!(writer.write_cell(&Cell::Str("TOO LONG".to_string())).is_err());
    }
}
