// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements composable byte-level I/O.
//!
//! All readers operating on bytes of data implement the [`ReadBytes`] trait, and all writers the
//! [`WriteBytes`] trait. [`BufReader`] consumes a `&[u8]`, while [`SourceStream`] and
//! [`SinkStream`] buffer any source implementing [`std::io::Read`] or [`std::io::Write`]
//! respectively.

use std::mem;

use crate::errors::Result;

mod buf_reader;
mod sink_stream;
mod source_stream;

pub use buf_reader::BufReader;
pub use sink_stream::SinkStream;
pub use source_stream::SourceStream;

/// The byte order of multi-byte encoded values.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Endian {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

impl Endian {
    /// Decode a 32-bit signed integer from 4 bytes in this byte order.
    #[inline(always)]
    pub fn decode_i32(&self, bytes: [u8; 4]) -> i32 {
        match *self {
            Endian::Little => i32::from_le_bytes(bytes),
            Endian::Big => i32::from_be_bytes(bytes),
        }
    }

    /// Encode a 32-bit signed integer into 4 bytes in this byte order.
    #[inline(always)]
    pub fn encode_i32(&self, value: i32) -> [u8; 4] {
        match *self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    /// Decode a 64-bit IEEE-754 value from one 8-byte slab in this byte order.
    #[inline(always)]
    pub fn decode_f64(&self, bytes: [u8; 8]) -> f64 {
        match *self {
            Endian::Little => f64::from_le_bytes(bytes),
            Endian::Big => f64::from_be_bytes(bytes),
        }
    }

    /// Encode a 64-bit IEEE-754 value into one 8-byte slab in this byte order.
    #[inline(always)]
    pub fn encode_f64(&self, value: f64) -> [u8; 8] {
        match *self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }
}

/// `ReadBytes` provides methods to read bytes and interpret them as little- or big-endian
/// unsigned integers or floating-point values of standard widths.
pub trait ReadBytes {
    /// Reads a single byte from the stream and returns it or an error.
    fn read_byte(&mut self) -> Result<u8>;

    /// Reads two bytes from the stream and returns them in read-order or an error.
    fn read_double_bytes(&mut self) -> Result<[u8; 2]>;

    /// Reads four bytes from the stream and returns them in read-order or an error.
    fn read_quad_bytes(&mut self) -> Result<[u8; 4]>;

    /// Reads up-to the number of bytes required to fill buf or returns an error.
    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reads exactly the number of bytes required to fill the provided buffer or returns an
    /// error.
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Reads a single unsigned byte from the stream and returns it or an error.
    #[inline(always)]
    fn read_u8(&mut self) -> Result<u8> {
        self.read_byte()
    }

    /// Reads two bytes from the stream and interprets them as an unsigned 16-bit little-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_double_bytes()?))
    }

    /// Reads two bytes from the stream and interprets them as an unsigned 16-bit big-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_be_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_double_bytes()?))
    }

    /// Reads four bytes from the stream and interprets them as an unsigned 32-bit little-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_quad_bytes()?))
    }

    /// Reads four bytes from the stream and interprets them as an unsigned 32-bit big-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_be_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_quad_bytes()?))
    }

    /// Reads four bytes from the stream and interprets them as a signed 32-bit little-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_quad_bytes()?))
    }

    /// Reads four bytes from the stream and interprets them as a signed 32-bit big-endian
    /// integer or returns an error.
    #[inline(always)]
    fn read_be_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_quad_bytes()?))
    }

    /// Reads four bytes from the stream and interprets them as a signed 32-bit integer in the
    /// given byte order or returns an error.
    #[inline(always)]
    fn read_i32_endian(&mut self, endian: Endian) -> Result<i32> {
        Ok(endian.decode_i32(self.read_quad_bytes()?))
    }

    /// Reads eight bytes from the stream and interprets them as a 64-bit little-endian IEEE-754
    /// floating-point value.
    #[inline(always)]
    fn read_f64(&mut self) -> Result<f64> {
        let mut buf = [0u8; mem::size_of::<u64>()];
        self.read_buf_exact(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    /// Reads eight bytes from the stream and interprets them as a 64-bit big-endian IEEE-754
    /// floating-point value.
    #[inline(always)]
    fn read_be_f64(&mut self) -> Result<f64> {
        let mut buf = [0u8; mem::size_of::<u64>()];
        self.read_buf_exact(&mut buf)?;
        Ok(f64::from_be_bytes(buf))
    }

    /// Reads eight bytes from the stream and interprets them as a 64-bit IEEE-754 floating-point
    /// value in the given byte order.
    #[inline(always)]
    fn read_f64_endian(&mut self, endian: Endian) -> Result<f64> {
        let mut buf = [0u8; mem::size_of::<u64>()];
        self.read_buf_exact(&mut buf)?;
        Ok(endian.decode_f64(buf))
    }

    /// Reads exactly the number of bytes requested, and returns a boxed slice of the data or an
    /// error.
    fn read_boxed_slice_exact(&mut self, len: usize) -> Result<Box<[u8]>> {
        let mut buf = vec![0u8; len];
        self.read_buf_exact(&mut buf)?;
        Ok(buf.into_boxed_slice())
    }

    /// Ignores the specified number of bytes from the stream or returns an error.
    fn ignore_bytes(&mut self, count: u64) -> Result<()>;

    /// Gets the position of the stream.
    fn pos(&self) -> u64;
}

impl<R: ReadBytes> ReadBytes for &mut R {
    #[inline(always)]
    fn read_byte(&mut self) -> Result<u8> {
        (*self).read_byte()
    }

    #[inline(always)]
    fn read_double_bytes(&mut self) -> Result<[u8; 2]> {
        (*self).read_double_bytes()
    }

    #[inline(always)]
    fn read_quad_bytes(&mut self) -> Result<[u8; 4]> {
        (*self).read_quad_bytes()
    }

    #[inline(always)]
    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize> {
        (*self).read_buf(buf)
    }

    #[inline(always)]
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        (*self).read_buf_exact(buf)
    }

    #[inline(always)]
    fn ignore_bytes(&mut self, count: u64) -> Result<()> {
        (*self).ignore_bytes(count)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        (**self).pos()
    }
}

/// `WriteBytes` provides methods to write bytes and encode little- or big-endian unsigned
/// integers or floating-point values of standard widths. It is the mirror of [`ReadBytes`].
pub trait WriteBytes {
    /// Writes a single byte to the stream or returns an error.
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Writes the whole buffer to the stream or returns an error.
    fn write_buf(&mut self, buf: &[u8]) -> Result<()>;

    /// Writes a single unsigned byte to the stream or returns an error.
    #[inline(always)]
    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_byte(value)
    }

    /// Writes an unsigned 32-bit integer in little-endian byte order or returns an error.
    #[inline(always)]
    fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_buf(&value.to_le_bytes())
    }

    /// Writes a signed 32-bit integer in little-endian byte order or returns an error.
    #[inline(always)]
    fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_buf(&value.to_le_bytes())
    }

    /// Writes a signed 32-bit integer in the given byte order or returns an error.
    #[inline(always)]
    fn write_i32_endian(&mut self, value: i32, endian: Endian) -> Result<()> {
        self.write_buf(&endian.encode_i32(value))
    }

    /// Writes a 64-bit IEEE-754 value in little-endian byte order or returns an error.
    #[inline(always)]
    fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_buf(&value.to_le_bytes())
    }

    /// Writes a 64-bit IEEE-754 value in the given byte order or returns an error.
    #[inline(always)]
    fn write_f64_endian(&mut self, value: f64, endian: Endian) -> Result<()> {
        self.write_buf(&endian.encode_f64(value))
    }

    /// Gets the number of bytes written so far.
    fn pos(&self) -> u64;
}

impl<W: WriteBytes> WriteBytes for &mut W {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        (*self).write_byte(byte)
    }

    #[inline(always)]
    fn write_buf(&mut self, buf: &[u8]) -> Result<()> {
        (*self).write_buf(buf)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        (**self).pos()
    }
}

impl WriteBytes for Vec<u8> {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.push(byte);
        Ok(())
    }

    #[inline(always)]
    fn write_buf(&mut self, buf: &[u8]) -> Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.len() as u64
    }
}

/// `SeekBytes` provides absolute repositioning for sources that support it. Matrix readers
/// use it to rewind the byte cursor at the start of each traversal.
pub trait SeekBytes {
    /// Seeks to an absolute byte position. Returns the position seeked to.
    fn seek_to(&mut self, pos: u64) -> Result<u64>;
}

impl<S: SeekBytes> SeekBytes for &mut S {
    #[inline(always)]
    fn seek_to(&mut self, pos: u64) -> Result<u64> {
        (*self).seek_to(pos)
    }
}

/// A `FiniteStream` is a stream that has a known length in bytes.
pub trait FiniteStream {
    /// Returns the length of the stream in bytes.
    fn byte_len(&self) -> u64;

    /// Returns the number of bytes that have been read.
    fn bytes_read(&self) -> u64;

    /// Returns the number of bytes available for reading.
    fn bytes_available(&self) -> u64;
}
