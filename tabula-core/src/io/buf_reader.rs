// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp;

use crate::errors::{end_of_stream_error, Result};
use crate::io::{FiniteStream, ReadBytes, SeekBytes};

/// A `BufReader` reads bytes from a byte buffer.
///
/// The unread portion is kept as a shrinking tail slice of the original buffer; the stream
/// position falls out of the two lengths.
pub struct BufReader<'a> {
    full: &'a [u8],
    rest: &'a [u8],
}

impl<'a> BufReader<'a> {
    /// Instantiate a new `BufReader` with a given byte buffer.
    pub fn new(buf: &'a [u8]) -> Self {
        BufReader { full: buf, rest: buf }
    }

    /// Splits the next `len` bytes off the unread tail.
    fn split(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.rest.len() {
            return end_of_stream_error();
        }

        let (head, tail) = self.rest.split_at(len);
        self.rest = tail;
        Ok(head)
    }
}

impl ReadBytes for BufReader<'_> {
    #[inline(always)]
    fn read_byte(&mut self) -> Result<u8> {
        match self.rest.split_first() {
            Some((&byte, tail)) => {
                self.rest = tail;
                Ok(byte)
            }
            None => end_of_stream_error(),
        }
    }

    #[inline(always)]
    fn read_double_bytes(&mut self) -> Result<[u8; 2]> {
        let mut bytes = [0u8; 2];
        bytes.copy_from_slice(self.split(2)?);
        Ok(bytes)
    }

    #[inline(always)]
    fn read_quad_bytes(&mut self) -> Result<[u8; 4]> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.split(4)?);
        Ok(bytes)
    }

    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = cmp::min(self.rest.len(), buf.len());
        buf[..len].copy_from_slice(self.split(len)?);
        Ok(len)
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        buf.copy_from_slice(self.split(buf.len())?);
        Ok(())
    }

    fn ignore_bytes(&mut self, count: u64) -> Result<()> {
        if count > self.rest.len() as u64 {
            return end_of_stream_error();
        }

        self.split(count as usize)?;
        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        (self.full.len() - self.rest.len()) as u64
    }
}

impl SeekBytes for BufReader<'_> {
    fn seek_to(&mut self, pos: u64) -> Result<u64> {
        if pos > self.full.len() as u64 {
            return end_of_stream_error();
        }

        self.rest = &self.full[pos as usize..];
        Ok(pos)
    }
}

impl FiniteStream for BufReader<'_> {
    #[inline(always)]
    fn byte_len(&self) -> u64 {
        self.full.len() as u64
    }

    #[inline(always)]
    fn bytes_read(&self) -> u64 {
        self.pos()
    }

    #[inline(always)]
    fn bytes_available(&self) -> u64 {
        self.rest.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_reads_advance_the_tail() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut reader = BufReader::new(&data);

        assert_eq!(reader.read_byte().unwrap(), 1);
        assert_eq!(reader.read_double_bytes().unwrap(), [2, 3]);
        assert_eq!(reader.read_quad_bytes().unwrap(), [4, 5, 6, 7]);
        assert_eq!(reader.pos(), 7);
        assert_eq!(reader.bytes_available(), 2);

        let mut tail = [0u8; 4];
        assert_eq!(reader.read_buf(&mut tail).unwrap(), 2);
        assert_eq!(&tail[..2], &[8, 9]);

        assert!(reader.read_byte().is_err());
    }

    #[test]
    fn verify_exact_reads_do_not_consume_on_underrun() {
        let data = [1u8, 2, 3];
        let mut reader = BufReader::new(&data);

        let mut buf = [0u8; 4];
        assert!(reader.read_buf_exact(&mut buf).is_err());
        assert_eq!(reader.pos(), 0);

        assert!(reader.ignore_bytes(4).is_err());
        reader.ignore_bytes(3).unwrap();
        assert_eq!(reader.bytes_available(), 0);
    }

    #[test]
    fn verify_seek_rewinds() {
        let data = [10u8, 11, 12];
        let mut reader = BufReader::new(&data);

        reader.ignore_bytes(3).unwrap();
        reader.seek_to(1).unwrap();
        assert_eq!(reader.read_byte().unwrap(), 11);
        assert!(reader.seek_to(4).is_err());
        assert_eq!(reader.byte_len(), 3);
    }
}
