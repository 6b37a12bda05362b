// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SPSS/PSPP portable (POR) file reader and writer.
//!
//! A portable file is a text-encoded rendition of a data dictionary and case matrix: every
//! byte passes through a translation table carried in the file header, the stream is
//! soft-wrapped into 80-column physical lines, and numbers are written in base-30 with a
//! variable precision.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod charset;
mod line;
mod matrix;
mod reader;
mod records;
mod writer;

pub use charset::Charset;
pub use line::{LineCheckpoint, LineReader, LineWriter, ROW_WIDTH};
pub use matrix::{MatrixAction, MatrixParser, MatrixWriter};
pub use reader::{PortableReader, PortableReaderOptions};
pub use records::{
    Dictionary, MissingValueSpec, OutputFormat, PortableFile, PortableHeader, Value,
    ValueLabelMap, Variable, DEFAULT_PRECISION,
};
pub use writer::{PortableWriter, PortableWriterOptions};

/// The signature every portable file carries after its translation table, in canonical bytes.
pub const SIGNATURE: &[u8; 8] = b"SPSSPORT";

/// The format version byte this implementation reads and writes.
pub const FORMAT_VERSION: u8 = b'A';
