// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

use crate::errors::Result;
use crate::io::WriteBytes;

const DEFAULT_BUF_LEN: usize = 8 * 1024;

/// A `SinkStream` is a buffered writer over any sink implementing [`std::io::Write`], tracking
/// the absolute position of the stream.
pub struct SinkStream<W: io::Write> {
    inner: W,
    buf: Vec<u8>,
    written: u64,
}

impl<W: io::Write> SinkStream<W> {
    /// Instantiate a new `SinkStream` over the given sink.
    pub fn new(inner: W) -> Self {
        SinkStream { inner, buf: Vec::with_capacity(DEFAULT_BUF_LEN), written: 0 }
    }

    /// Flushes all buffered bytes into the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.write_all(&self.buf)?;
        self.buf.clear();
        self.inner.flush()?;
        Ok(())
    }

    /// Flushes all buffered bytes and unwraps this `SinkStream`, returning the underlying sink.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.inner)
    }
}

impl<W: io::Write> WriteBytes for SinkStream<W> {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) -> Result<()> {
        if self.buf.len() >= DEFAULT_BUF_LEN {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        self.buf.push(byte);
        self.written += 1;
        Ok(())
    }

    fn write_buf(&mut self, buf: &[u8]) -> Result<()> {
        if self.buf.len() + buf.len() > DEFAULT_BUF_LEN {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }

        if buf.len() > DEFAULT_BUF_LEN {
            self.inner.write_all(buf)?;
        }
        else {
            self.buf.extend_from_slice(buf);
        }

        self.written += buf.len() as u64;
        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.written
    }
}
