// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The run-length scheme of the system-file case stream.
//!
//! Nine 8-byte units pack into one *segment*: a control slab of eight one-byte codes followed
//! by up to eight payload slabs, one per code 253. A code in `1..=251` synthesizes the numeric
//! value `code - bias` without any payload; 254 synthesizes an all-spaces unit, 255 the
//! system-missing value, 0 is structural filler, and 252 terminates the matrix.

use std::collections::VecDeque;

use tabula_core::errors::{rejected_error, Result};
use tabula_core::io::{Endian, WriteBytes};

/// Control code 0: structural filler.
const CODE_NOP: u8 = 0;
/// Control code 252: end of the case stream.
const CODE_EOF: u8 = 252;
/// Control code 253: the next payload slab is verbatim.
const CODE_RAW: u8 = 253;
/// Control code 254: an all-spaces slab.
const CODE_SPACES: u8 = 254;
/// Control code 255: the system-missing value.
const CODE_SYSMISS: u8 = 255;

/// The smallest compressible biased integer.
const CODE_MIN: u8 = 1;
/// The largest compressible biased integer.
const CODE_MAX: u8 = 251;

/// One decoded 8-byte unit of the case stream.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Slab {
    /// A verbatim unit: a raw double or eight string characters.
    Raw([u8; 8]),
    /// A numeric unit synthesized from a compressed integer code.
    Number(f64),
    /// An all-spaces unit (string columns only).
    Spaces,
    /// A system-missing unit (numeric columns only).
    Sysmiss,
}

/// The streaming decompressor: a push state machine over 8-byte slabs.
///
/// Feed file slabs through [`push`](Decompressor::push) and drain decoded slabs with
/// [`pop`](Decompressor::pop). The decompressor never blocks and never reads on its own; the
/// caller drives all I/O one slab at a time.
pub struct Decompressor {
    bias: f64,
    /// Codes of the current segment not yet acted upon.
    codes: VecDeque<u8>,
    /// Decoded slabs ready for the caller.
    out: VecDeque<Slab>,
    /// A code 253 is waiting for its payload slab.
    wants_payload: bool,
    finished: bool,
}

impl Decompressor {
    /// Create a decompressor with the given bias.
    pub fn new(bias: f64) -> Decompressor {
        Decompressor {
            bias,
            codes: VecDeque::with_capacity(8),
            out: VecDeque::with_capacity(8),
            wants_payload: false,
            finished: false,
        }
    }

    /// Whether the end-of-stream code has been seen.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Whether the next pushed slab must be a payload or control slab. After the end code no
    /// further input is accepted.
    pub fn wants_input(&self) -> bool {
        !self.finished && self.out.is_empty()
    }

    /// Returns the decompressor to its initial state without releasing its buffers.
    pub fn reset(&mut self) {
        self.codes.clear();
        self.out.clear();
        self.wants_payload = false;
        self.finished = false;
    }

    /// Feeds one 8-byte file slab: a control slab when the previous segment is exhausted, a
    /// payload slab when one is owed.
    pub fn push(&mut self, slab: [u8; 8]) -> Result<()> {
        if self.finished {
            return rejected_error("slab past the end-of-stream code");
        }

        if self.wants_payload {
            self.out.push_back(Slab::Raw(slab));
            self.wants_payload = false;
        }
        else {
            debug_assert!(self.codes.is_empty());
            self.codes.extend(slab);
        }

        self.run_codes()
    }

    /// Takes the next decoded slab, if one is ready.
    pub fn pop(&mut self) -> Option<Slab> {
        self.out.pop_front()
    }

    /// Acts on pending control codes until a payload is owed or the segment is exhausted.
    fn run_codes(&mut self) -> Result<()> {
        while !self.wants_payload {
            let code = match self.codes.pop_front() {
                Some(code) => code,
                None => break,
            };

            match code {
                CODE_NOP => (),
                CODE_EOF => {
                    // A clean end may arrive mid-segment; the remaining slots must be filler.
                    if self.codes.iter().any(|&c| c != CODE_NOP) {
                        return rejected_error("data after the end-of-stream code");
                    }
                    self.codes.clear();
                    self.finished = true;
                }
                CODE_RAW => self.wants_payload = true,
                CODE_SPACES => self.out.push_back(Slab::Spaces),
                CODE_SYSMISS => self.out.push_back(Slab::Sysmiss),
                code => self.out.push_back(Slab::Number(f64::from(code) - self.bias)),
            }
        }

        Ok(())
    }
}

/// The streaming compressor, the mirror of [`Decompressor`].
///
/// Cells arrive as numbers or 8-byte string units; segments flush into the sink as their
/// control slabs fill. [`finish`](Compressor::finish) appends the end-of-stream code, padding
/// the final control slab with filler.
pub struct Compressor<W: WriteBytes> {
    sink: W,
    bias: f64,
    sysmiss_bits: u64,
    endian: Endian,
    codes: Vec<u8>,
    payload: Vec<u8>,
}

impl<W: WriteBytes> Compressor<W> {
    /// Create a compressor over the given sink.
    pub fn new(sink: W, bias: f64, sysmiss: f64, endian: Endian) -> Compressor<W> {
        Compressor {
            sink,
            bias,
            sysmiss_bits: sysmiss.to_bits(),
            endian,
            codes: Vec::with_capacity(8),
            payload: Vec::with_capacity(64),
        }
    }

    /// Compresses one numeric unit.
    ///
    /// The value is compressible when it is the system-missing constant, or when adding the
    /// bias lands on an integer in `[1, 251]`; anything else is stored verbatim.
    pub fn push_number(&mut self, value: f64) -> Result<()> {
        if value.to_bits() == self.sysmiss_bits {
            return self.push_code(CODE_SYSMISS);
        }

        let biased = value + self.bias;
        if biased.fract() == 0.0
            && biased >= f64::from(CODE_MIN)
            && biased <= f64::from(CODE_MAX)
        {
            return self.push_code(biased as u8);
        }

        self.push_verbatim(self.endian.encode_f64(value))
    }

    /// Compresses one 8-byte string unit. Only an all-spaces unit has a short code.
    pub fn push_string_slab(&mut self, slab: [u8; 8]) -> Result<()> {
        if slab == [b' '; 8] {
            self.push_code(CODE_SPACES)
        }
        else {
            self.push_verbatim(slab)
        }
    }

    /// Ends the case stream: the end code, filler for the rest of its control slab, and a
    /// final flush. Returns the underlying sink.
    pub fn finish(mut self) -> Result<W> {
        self.push_code(CODE_EOF)?;
        if !self.codes.is_empty() {
            self.codes.resize(8, CODE_NOP);
            self.flush_segment()?;
        }
        Ok(self.sink)
    }

    fn push_verbatim(&mut self, slab: [u8; 8]) -> Result<()> {
        self.payload.extend_from_slice(&slab);
        self.push_code(CODE_RAW)
    }

    fn push_code(&mut self, code: u8) -> Result<()> {
        self.codes.push(code);
        if self.codes.len() == 8 {
            self.flush_segment()?;
        }
        Ok(())
    }

    fn flush_segment(&mut self) -> Result<()> {
        self.sink.write_buf(&self.codes)?;
        self.sink.write_buf(&self.payload)?;
        self.codes.clear();
        self.payload.clear();
        Ok(())
    }
}
