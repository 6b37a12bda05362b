// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp;
use std::io;

use crate::errors::{end_of_stream_error, Result};
use crate::io::{ReadBytes, SeekBytes};

const DEFAULT_BUF_LEN: usize = 8 * 1024;

/// A `SourceStream` is a buffered reader over any source implementing [`std::io::Read`],
/// tracking the absolute position of the stream.
pub struct SourceStream<R: io::Read> {
    inner: R,
    buf: Box<[u8]>,
    /// Position of the first unread byte within `buf`.
    pos: usize,
    /// Number of valid bytes within `buf`.
    end: usize,
    /// Absolute position of `buf[0]` within the source.
    base: u64,
}

impl<R: io::Read> SourceStream<R> {
    /// Instantiate a new `SourceStream` over the given source with the default buffer size.
    pub fn new(inner: R) -> Self {
        SourceStream {
            inner,
            buf: vec![0u8; DEFAULT_BUF_LEN].into_boxed_slice(),
            pos: 0,
            end: 0,
            base: 0,
        }
    }

    /// Unwraps this `SourceStream`, returning the underlying source.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fetch(&mut self) -> Result<()> {
        if self.pos < self.end {
            return Ok(());
        }

        self.base += self.end as u64;
        self.pos = 0;
        self.end = 0;

        loop {
            match self.inner.read(&mut self.buf) {
                Ok(0) => return end_of_stream_error(),
                Ok(n) => {
                    self.end = n;
                    return Ok(());
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => (),
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl<R: io::Read + io::Seek> SeekBytes for SourceStream<R> {
    fn seek_to(&mut self, pos: u64) -> Result<u64> {
        // Discard the buffered window; the next read refills at the new position.
        self.pos = 0;
        self.end = 0;
        self.base = self.inner.seek(io::SeekFrom::Start(pos))?;
        Ok(self.base)
    }
}

impl<R: io::Read> ReadBytes for SourceStream<R> {
    #[inline(always)]
    fn read_byte(&mut self) -> Result<u8> {
        self.fetch()?;
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn read_double_bytes(&mut self) -> Result<[u8; 2]> {
        let mut bytes = [0u8; 2];
        self.read_buf_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_quad_bytes(&mut self) -> Result<[u8; 4]> {
        let mut bytes = [0u8; 4];
        self.read_buf_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_buf(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        match self.fetch() {
            Ok(()) => (),
            Err(crate::errors::Error::EndOfFile) => return Ok(0),
            Err(err) => return Err(err),
        }

        let len = cmp::min(self.end - self.pos, buf.len());
        buf[..len].copy_from_slice(&self.buf[self.pos..self.pos + len]);
        self.pos += len;

        Ok(len)
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut written = 0;

        while written < buf.len() {
            match self.read_buf(&mut buf[written..])? {
                0 => return end_of_stream_error(),
                n => written += n,
            }
        }

        Ok(())
    }

    fn ignore_bytes(&mut self, count: u64) -> Result<()> {
        let mut remaining = count;

        while remaining > 0 {
            self.fetch()?;
            let len = cmp::min((self.end - self.pos) as u64, remaining);
            self.pos += len as usize;
            remaining -= len;
        }

        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.base + self.pos as u64
    }
}

#[cfg(test)]
mod tests {
    use super::SourceStream;
    use crate::io::ReadBytes;
    use std::io::Cursor;

    #[test]
    fn verify_source_stream_tracks_position() {
        let data: Vec<u8> = (0u8..=255).collect();
        let mut stream = SourceStream::new(Cursor::new(data));

        assert_eq!(stream.read_byte().unwrap(), 0);
        assert_eq!(stream.read_double_bytes().unwrap(), [1, 2]);
        assert_eq!(stream.pos(), 3);

        stream.ignore_bytes(250).unwrap();
        assert_eq!(stream.pos(), 253);

        let mut tail = [0u8; 3];
        stream.read_buf_exact(&mut tail).unwrap();
        assert_eq!(tail, [253, 254, 255]);

        assert!(stream.read_byte().is_err());
    }
}
