// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The case codec: maps the 8-byte slab stream onto typed column cells and back, driven by
//! the per-slot width vector.

use encoding_rs::Encoding;

use tabula_core::errors::{rejected_error, unsupported_error, Result};
use tabula_core::io::{Endian, WriteBytes};
use tabula_core::matrix::{Cell, ColumnWidths};

use crate::compression::{Compressor, Slab};

/// The code returned by each [`CaseParser::consume`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum CaseParserAction {
    /// More slabs are required.
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
}

/// The push parser mapping decoded slabs onto column cells.
///
/// Each slot of the width vector consumes exactly one slab per case: a numeric slot yields a
/// numeric or system-missing cell, a string head slot opens an accumulation spanning its
/// continuation slots, and the string finalizes with its trailing spaces trimmed and its bytes
/// decoded under the configured encoding.
pub struct CaseParser {
    widths: ColumnWidths,
    /// Column index of each slot; continuations repeat their head's column.
    columns: Vec<usize>,
    endian: Endian,
    sysmiss_bits: u64,
    encoding: &'static Encoding,
    slot: usize,
    row: usize,
    str_buf: Vec<u8>,
    str_width: usize,
}

impl CaseParser {
    /// Create a parser over the given width vector.
    pub fn new(
        widths: ColumnWidths,
        endian: Endian,
        sysmiss: f64,
        encoding: &'static Encoding,
    ) -> CaseParser {
        let mut columns = Vec::with_capacity(widths.slot_count());
        let mut column = 0usize;
        for &width in widths.slots() {
            if width >= 0 && !columns.is_empty() {
                column += 1;
            }
            columns.push(column);
        }

        CaseParser {
            widths,
            columns,
            endian,
            sysmiss_bits: sysmiss.to_bits(),
            encoding,
            slot: 0,
            row: 0,
            str_buf: Vec::new(),
            str_width: 0,
        }
    }

    /// The width vector driving this parser.
    pub fn widths(&self) -> &ColumnWidths {
        &self.widths
    }

    /// The column the parser is currently inside.
    pub fn column(&self) -> usize {
        self.columns.get(self.slot).copied().unwrap_or(0)
    }

    /// Whether the parser sits at a fresh row boundary. End of input is only clean here.
    pub fn at_row_boundary(&self) -> bool {
        self.slot == 0 && self.str_buf.is_empty()
    }

    /// Returns the parser to the top of the matrix without releasing its buffers.
    pub fn reset(&mut self) {
        self.slot = 0;
        self.row = 0;
        self.str_buf.clear();
        self.str_width = 0;
    }

    /// Resizes the string accumulation buffer. The size must be a positive multiple of 8.
    pub fn resize_buffer(&mut self, size: usize) -> Result<()> {
        if size == 0 || size % 8 != 0 {
            return unsupported_error("string buffer size must be a positive multiple of 8");
        }
        if self.str_buf.capacity() < size {
            self.str_buf.reserve_exact(size - self.str_buf.len());
        }
        Ok(())
    }

    /// Releases the string accumulation buffer, e.g. between traversals.
    pub fn free_buffer(&mut self) {
        self.str_buf = Vec::new();
    }

    /// Feeds one decoded slab.
    pub fn consume(&mut self, slab: Slab) -> Result<CaseParserAction> {
        let width = match self.widths.slots().get(self.slot) {
            Some(&width) => width,
            None => return rejected_error("slab past the end of the width vector"),
        };

        let action = if width == 0 {
            let cell = match slab {
                Slab::Number(value) => Cell::Numeric(value),
                Slab::Sysmiss => Cell::Sysmiss,
                Slab::Raw(bytes) => {
                    let value = self.endian.decode_f64(bytes);
                    if value.to_bits() == self.sysmiss_bits {
                        Cell::Sysmiss
                    }
                    else {
                        Cell::Numeric(value)
                    }
                }
                Slab::Spaces => return rejected_error("spaces run in a numeric column"),
            };
            Some(cell)
        }
        else {
            let bytes = match slab {
                Slab::Raw(bytes) => bytes,
                Slab::Spaces => [b' '; 8],
                Slab::Number(_) => {
                    return rejected_error("compressed number in a string column")
                }
                Slab::Sysmiss => return rejected_error("system-missing in a string column"),
            };

            if width > 0 {
                self.str_buf.clear();
                self.str_width = width as usize;
            }
            self.str_buf.extend_from_slice(&bytes);

            if self.string_complete() {
                Some(Cell::Str(self.finish_string()))
            }
            else {
                None
            }
        };

        match action {
            Some(cell) => {
                let column = self.columns[self.slot];
                let row = self.row;

                self.slot += 1;
                if self.slot == self.widths.slot_count() {
                    self.slot = 0;
                    self.row += 1;
                }

                Ok(CaseParserAction::Cell { column, row, cell })
            }
            None => {
                self.slot += 1;
                Ok(CaseParserAction::Continue)
            }
        }
    }

    /// Whether the next slot no longer belongs to the string under accumulation.
    fn string_complete(&self) -> bool {
        !matches!(self.widths.slots().get(self.slot + 1), Some(-1))
    }

    /// Trims trailing spaces and decodes the accumulated string bytes.
    fn finish_string(&mut self) -> String {
        let end = self.str_buf.iter().rposition(|&b| b != b' ').map_or(0, |p| p + 1);
        let end = end.min(self.str_width);
        let (text, _, _) = self.encoding.decode(&self.str_buf[..end]);
        let text = text.into_owned();
        self.str_buf.clear();
        self.str_width = 0;
        text
    }
}

/// Where compressed or raw slabs are sent.
enum CaseSink<W: WriteBytes> {
    Compressed(Compressor<W>),
    Raw { sink: W, endian: Endian },
}

/// The mirror of [`CaseParser`]: maps typed cells onto the slab stream, compressing when the
/// file calls for it.
pub struct CaseWriter<W: WriteBytes> {
    sink: CaseSink<W>,
    widths: ColumnWidths,
    sysmiss: f64,
    encoding: &'static Encoding,
    slot: usize,
}

impl<W: WriteBytes> CaseWriter<W> {
    /// Create a writer emitting compressed segments with the given bias.
    pub fn compressed(
        sink: W,
        widths: ColumnWidths,
        bias: f64,
        sysmiss: f64,
        endian: Endian,
        encoding: &'static Encoding,
    ) -> CaseWriter<W> {
        CaseWriter {
            sink: CaseSink::Compressed(Compressor::new(sink, bias, sysmiss, endian)),
            widths,
            sysmiss,
            encoding,
            slot: 0,
        }
    }

    /// Create a writer emitting verbatim slabs.
    pub fn raw(
        sink: W,
        widths: ColumnWidths,
        sysmiss: f64,
        endian: Endian,
        encoding: &'static Encoding,
    ) -> CaseWriter<W> {
        CaseWriter { sink: CaseSink::Raw { sink, endian }, widths, sysmiss, encoding, slot: 0 }
    }

    /// Writes one cell into the current row. A string cell covers its continuation slots.
    pub fn write_cell(&mut self, cell: &Cell) -> Result<()> {
        let width = match self.widths.slots().get(self.slot) {
            Some(&width) if width >= 0 => width,
            _ => return rejected_error("cell does not start a column"),
        };

        if width == 0 {
            let value = match cell {
                Cell::Numeric(value) => *value,
                Cell::Sysmiss => self.sysmiss,
                Cell::Str(_) => return rejected_error("string cell in a numeric column"),
            };
            self.write_number(value)?;
            self.slot += 1;
        }
        else {
            let text = match cell {
                Cell::Str(text) => text,
                _ => return rejected_error("numeric cell in a string column"),
            };

            let (bytes, _, _) = self.encoding.encode(text);
            if bytes.len() > width as usize {
                return rejected_error("string cell longer than its declared width");
            }

            let slabs = (width as usize + 7) / 8;
            let mut padded = bytes.into_owned();
            padded.resize(slabs * 8, b' ');

            for chunk in padded.chunks(8) {
                let mut slab = [0u8; 8];
                slab.copy_from_slice(chunk);
                self.write_string_slab(slab)?;
            }

            // The head slot plus its continuations are all accounted for.
            self.slot += slabs;
        }

        if self.slot >= self.widths.slot_count() {
            self.slot = 0;
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

    /// Ends the case stream and returns the underlying sink. The compressed form appends its
    /// end-of-stream code; the raw form simply stops.
    pub fn finish(self) -> Result<W> {
        if self.slot != 0 {
            return rejected_error("case stream ended in the middle of a row");
        }

        match self.sink {
            CaseSink::Compressed(compressor) => compressor.finish(),
            CaseSink::Raw { sink, .. } => Ok(sink),
        }
    }

    fn write_number(&mut self, value: f64) -> Result<()> {
        match &mut self.sink {
            CaseSink::Compressed(compressor) => compressor.push_number(value),
            CaseSink::Raw { sink, endian } => sink.write_f64_endian(value, *endian),
        }
    }

    fn write_string_slab(&mut self, slab: [u8; 8]) -> Result<()> {
        match &mut self.sink {
            CaseSink::Compressed(compressor) => compressor.push_string_slab(slab),
            CaseSink::Raw { sink, .. } => sink.write_buf(&slab),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Decompressor;
    use encoding_rs::WINDOWS_1252;

    fn widths() -> ColumnWidths {
        ColumnWidths::from_slots(vec![0, 11, -1, 0])
    }

    fn parser() -> CaseParser {
        CaseParser::new(widths(), Endian::Little, crate::sysmiss(), WINDOWS_1252)
    }

    #[test]
    fn verify_parser_maps_slabs_to_cells() {
        let mut parser = parser();

        let actions = [
            parser.consume(Slab::Number(1.5)).unwrap(),
            parser.consume(Slab::Raw(*b"LOVELACE")).unwrap(),
            parser.consume(Slab::Raw(*b"AD      ")).unwrap(),
            parser.consume(Slab::Sysmiss).unwrap(),
        ];

        assert_eq!(
            actions[0],
            CaseParserAction::Cell { column: 0, row: 0, cell: Cell::Numeric(1.5) }
        );
        assert_eq!(actions[1], CaseParserAction::Continue);
        assert_eq!(
            actions[2],
            CaseParserAction::Cell {
                column: 1,
                row: 0,
                cell: Cell::Str("LOVELACEAD".to_string())
            }
        );
        assert_eq!(
            actions[3],
            CaseParserAction::Cell { column: 2, row: 0, cell: Cell::Sysmiss }
        );
        assert!(parser.at_row_boundary());
    }

    #[test]
    fn verify_string_trims_to_declared_width() {
        // Width 11: the twelfth byte is padding even when it is not a space.
        let mut parser = parser();
        parser.consume(Slab::Number(0.0)).unwrap();
        parser.consume(Slab::Raw(*b"ABCDEFGH")).unwrap();
        let action = parser.consume(Slab::Raw(*b"IJK     ")).unwrap();

        assert_eq!(
            action,
            CaseParserAction::Cell { column: 1, row: 0, cell: Cell::Str("ABCDEFGHIJK".to_string()) }
        );
    }

    #[test]
    fn verify_type_mismatches_are_rejected() {
        {
            let mut parser = parser();
            assert!(parser.consume(Slab::Spaces).is_err());
        }

        {
            let mut parser = parser();
            parser.consume(Slab::Number(0.0)).unwrap();
            assert!(parser.consume(Slab::Sysmiss).is_err());
        }

        {
            let mut parser = parser();
            parser.consume(Slab::Number(0.0)).unwrap();
            assert!(parser.consume(Slab::Number(2.0)).is_err());
        }
    }

    #[test]
    fn verify_raw_sysmiss_bits_map_to_sysmiss() {
        let mut parser = parser();
        let action = parser.consume(Slab::Raw(crate::sysmiss().to_le_bytes())).unwrap();
        assert_eq!(action, CaseParserAction::Cell { column: 0, row: 0, cell: Cell::Sysmiss });
    }

    #[test]
    fn verify_writer_parser_round_trip() {
        let cells = [
            Cell::Numeric(42.0),
            Cell::Str("GRACE".to_string()),
            Cell::Sysmiss,
            Cell::Numeric(-0.125),
            Cell::Str("ADA LOVELACE".to_string()),
            Cell::Numeric(7.0),
        ];
        // "ADA LOVELACE" is 12 bytes and cannot fit in a width-11 column.
        let mut writer = CaseWriter::compressed(
            Vec::new(),
            widths(),
            100.0,
            crate::sysmiss(),
            Endian::Little,
            WINDOWS_1252,
        );
        writer.write_cell(&cells[0]).unwrap();
        assert!(writer.write_cell(&cells[4]).is_err());

        let mut writer = CaseWriter::compressed(
            Vec::new(),
            widths(),
            100.0,
            crate::sysmiss(),
            Endian::Little,
            WINDOWS_1252,
        );
        writer.write_row(&cells[..3]).unwrap();
        writer
            .write_row(&[Cell::Numeric(-0.125), Cell::Str(String::new()), Cell::Numeric(3.0)])
            .unwrap();
        let bytes = writer.finish().unwrap();

        let mut decompressor = Decompressor::new(100.0);
        let mut parser = parser();
        let mut got = Vec::new();

        'outer: for chunk in bytes.chunks(8) {
            let mut slab = [0u8; 8];
            slab.copy_from_slice(chunk);
            decompressor.push(slab).unwrap();
            while let Some(decoded) = decompressor.pop() {
                if let CaseParserAction::Cell { cell, .. } = parser.consume(decoded).unwrap() {
                    got.push(cell);
                }
            }
            if decompressor.finished() {
                break 'outer;
            }
        }

        assert_eq!(
            got,
            vec![
                Cell::Numeric(42.0),
                Cell::Str("GRACE".to_string()),
                Cell::Sysmiss,
                Cell::Numeric(-0.125),
                Cell::Str(String::new()),
                Cell::Numeric(3.0),
            ]
        );
        assert!(parser.at_row_boundary());
    }
}
