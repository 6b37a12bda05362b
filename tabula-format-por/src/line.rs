// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tabula_core::errors::{Error, Result};
use tabula_core::io::{ReadBytes, SeekBytes, WriteBytes};

use crate::charset::Charset;

/// The width of one logical row of a portable file.
pub const ROW_WIDTH: usize = 80;

/// A resumable position of a [`LineReader`], capturing both the byte offset and the soft-wrap
/// state at that offset.
#[derive(Copy, Clone, Debug)]
pub struct LineCheckpoint {
    pos: u64,
    line_len: usize,
    pending_pad: usize,
}

/// A `LineReader` turns the physical text of a portable file into its logical byte stream.
///
/// The stream is treated as a sequence of logical rows of exactly [`ROW_WIDTH`] bytes:
/// carriage returns vanish, a line feed before the row boundary synthesizes space bytes up to
/// it, and a physical line running past the boundary is fatal. Every delivered byte, the
/// synthesized padding included, passes through the charset decoding table.
pub struct LineReader<B: ReadBytes> {
    inner: B,
    charset: Charset,
    row_width: usize,
    /// Data bytes seen on the current physical line.
    line_len: usize,
    /// Synthesized space bytes not yet delivered.
    pending_pad: usize,
    warned: Box<[bool; 256]>,
}

impl<B: ReadBytes> LineReader<B> {
    /// Create a line reader with the identity charset and the standard row width.
    pub fn new(inner: B) -> LineReader<B> {
        LineReader::with_row_width(inner, ROW_WIDTH)
    }

    /// Create a line reader with a non-standard row width.
    pub fn with_row_width(inner: B, row_width: usize) -> LineReader<B> {
        LineReader {
            inner,
            charset: Charset::identity(),
            row_width,
            line_len: 0,
            pending_pad: 0,
            warned: Box::new([false; 256]),
        }
    }

    /// Swaps in the charset decoded from the file header. Bytes already read are unaffected.
    pub fn set_charset(&mut self, charset: Charset) {
        self.charset = charset;
    }

    /// The charset currently in effect.
    pub fn charset(&self) -> &Charset {
        &self.charset
    }

    /// Reads the next logical byte: soft-wrapped, padded, and charset-decoded.
    pub fn read_decoded(&mut self) -> Result<u8> {
        loop {
            if self.pending_pad > 0 {
                self.pending_pad -= 1;
                return Ok(self.charset.decode_logged(0x20, &mut self.warned));
            }

            let byte = self.inner.read_byte()?;

            match byte {
                b'\r' => (),
                b'\n' => {
                    if self.line_len < self.row_width {
                        self.pending_pad = self.row_width - self.line_len;
                    }
                    self.line_len = 0;
                }
                _ => {
                    if self.line_len == self.row_width {
                        return Err(Error::RowTooLong(self.row_width));
                    }
                    self.line_len += 1;
                    return Ok(self.charset.decode_logged(byte, &mut self.warned));
                }
            }
        }
    }

    /// Reads exactly `len` logical bytes.
    pub fn read_decoded_buf(&mut self, buf: &mut [u8]) -> Result<()> {
        for slot in buf.iter_mut() {
            *slot = self.read_decoded()?;
        }
        Ok(())
    }

    /// The byte offset of the underlying source.
    pub fn pos(&self) -> u64 {
        self.inner.pos()
    }

    /// Captures the current position and soft-wrap state.
    pub fn checkpoint(&self) -> LineCheckpoint {
        LineCheckpoint { pos: self.inner.pos(), line_len: self.line_len, pending_pad: self.pending_pad }
    }
}

impl<B: ReadBytes + SeekBytes> LineReader<B> {
    /// Returns to a previously captured checkpoint.
    pub fn restore(&mut self, checkpoint: LineCheckpoint) -> Result<()> {
        self.inner.seek_to(checkpoint.pos)?;
        self.line_len = checkpoint.line_len;
        self.pending_pad = checkpoint.pending_pad;
        Ok(())
    }
}

/// A `LineWriter` is the mirror of [`LineReader`]: it segments a logical byte stream into
/// physical lines of [`ROW_WIDTH`] characters with platform line endings, passing each byte
/// through the charset encoding table.
pub struct LineWriter<W: WriteBytes> {
    inner: W,
    charset: Charset,
    row_width: usize,
    column: usize,
}

impl<W: WriteBytes> LineWriter<W> {
    /// Create a line writer with the identity charset and the standard row width.
    pub fn new(inner: W) -> LineWriter<W> {
        LineWriter { inner, charset: Charset::identity(), row_width: ROW_WIDTH, column: 0 }
    }

    /// Swaps in the charset used to encode subsequent bytes.
    pub fn set_charset(&mut self, charset: Charset) {
        self.charset = charset;
    }

    /// The logical column the next byte lands in, in `[0, ROW_WIDTH)`.
    pub fn column(&self) -> usize {
        self.column
    }

    /// Writes one logical byte, breaking the line at the row boundary.
    pub fn write_encoded(&mut self, byte: u8) -> Result<()> {
        self.inner.write_byte(self.charset.encode(byte))?;
        self.column += 1;

        if self.column == self.row_width {
            self.write_line_ending()?;
            self.column = 0;
        }

        Ok(())
    }

    /// Writes a buffer of logical bytes.
    pub fn write_encoded_buf(&mut self, buf: &[u8]) -> Result<()> {
        for &byte in buf {
            self.write_encoded(byte)?;
        }
        Ok(())
    }

    /// Terminates a trailing partial line and unwraps the underlying sink.
    pub fn finish(mut self) -> Result<W> {
        if self.column > 0 {
            self.write_line_ending()?;
        }
        Ok(self.inner)
    }

    fn write_line_ending(&mut self) -> Result<()> {
        if cfg!(windows) {
            self.inner.write_buf(b"\r\n")
        }
        else {
            self.inner.write_byte(b'\n')
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::io::BufReader;

    fn read_all<B: ReadBytes>(reader: &mut LineReader<B>, n: usize) -> Vec<u8> {
        (0..n).map(|_| reader.read_decoded().unwrap()).collect()
    }

    #[test]
    fn verify_short_lines_pad_to_row_width() {
        let text = b"AB\nC\n";
        let mut reader = LineReader::new(BufReader::new(text));

        let row = read_all(&mut reader, ROW_WIDTH);
        assert_eq!(&row[..2], b"AB");
        assert!(row[2..].iter().all(|&b| b == b' '));

        let row = read_all(&mut reader, ROW_WIDTH);
        assert_eq!(row[0], b'C');
        assert!(row[1..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn verify_crlf_is_consumed() {
        let text = b"AB\r\nCD\r\n";
        let mut reader = LineReader::new(BufReader::new(text));

        let row = read_all(&mut reader, ROW_WIDTH);
        assert_eq!(&row[..2], b"AB");

        let row = read_all(&mut reader, 2);
        assert_eq!(&row, b"CD");
    }

    #[test]
    fn verify_full_line_needs_no_padding() {
        let mut text = vec![b'x'; ROW_WIDTH];
        text.push(b'\n');
        text.push(b'y');
        let mut reader = LineReader::new(BufReader::new(&text));

        let row = read_all(&mut reader, ROW_WIDTH);
        assert!(row.iter().all(|&b| b == b'x'));
        assert_eq!(reader.read_decoded().unwrap(), b'y');
    }

    #[test]
    fn verify_overlong_line_is_fatal() {
        let text = vec![b'x'; ROW_WIDTH + 1];
        let mut reader = LineReader::new(BufReader::new(&text));

        for _ in 0..ROW_WIDTH {
            reader.read_decoded().unwrap();
        }
        assert!(matches!(reader.read_decoded(), Err(Error::RowTooLong(_))));
    }

    #[test]
    fn verify_padding_is_decoded() {
        // A charset that maps slot ' ' onto source '_', so a decoded source '_' is a space
        // and the synthesized pad byte 0x20 decodes through the table as well.
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }
        table[b' ' as usize] = b'_';
        table[b'_' as usize] = b' ';

        let mut reader = LineReader::new(BufReader::new(b"A_\n"));
        reader.set_charset(Charset::from_table(&table));

        let row = read_all(&mut reader, 3);
        assert_eq!(row[0], b'A');
        assert_eq!(row[1], b' ');
        // The pad byte 0x20 maps onto slot '_' in this table.
        assert_eq!(row[2], b'_');
    }

    #[test]
    fn verify_writer_wraps_and_finishes() {
        let mut writer = LineWriter::new(Vec::new());
        for _ in 0..ROW_WIDTH + 3 {
            writer.write_encoded(b'a').unwrap();
        }
        let out = writer.finish().unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), ROW_WIDTH);
        assert_eq!(lines[1], "aaa");
    }

    #[test]
    fn verify_writer_reader_round_trip() {
        let payload: Vec<u8> = (0..200).map(|i| b'A' + (i % 26) as u8).collect();

        let mut writer = LineWriter::new(Vec::new());
        writer.write_encoded_buf(&payload).unwrap();
        let physical = writer.finish().unwrap();

        let mut reader = LineReader::new(BufReader::new(&physical));
        let logical = read_all(&mut reader, payload.len());
        assert_eq!(logical, payload);
    }
}
