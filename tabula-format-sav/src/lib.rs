// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SPSS/PSPP system (SAV) file reader and writer.
//!
//! A system file is a binary rendition of a data dictionary and case matrix. Cases are stored
//! in fixed 8-byte units: a numeric cell is one IEEE-754 double, a string cell spans as many
//! units as its declared width requires. An optional run-length scheme packs nine units into a
//! control slab plus up to eight payload slabs.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cases;
mod compression;
mod reader;
mod records;
mod writer;

pub use cases::{CaseParser, CaseParserAction, CaseWriter};
pub use compression::{Compressor, Decompressor, Slab};
pub use reader::{SystemReader, SystemReaderOptions};
pub use records::{
    Extension, FloatInfoRecord, FormatWord, IntegerInfoRecord, MissingValues, RawExtension,
    Record, SystemFile, SystemHeader, ValueLabelRecord, VariableRecord, DEFAULT_BIAS,
};
pub use writer::{SystemWriter, SystemWriterOptions};

/// The signature every system file opens with.
pub const SIGNATURE: &[u8; 4] = b"$FL2";

/// The raw IEEE-754 bit pattern of the default system-missing value.
pub const SYSMISS_BITS: u64 = 0xFFEF_FFFF_FFFF_FFFF;

/// The raw IEEE-754 bit pattern of the default HIGHEST range sentinel.
pub const HIGHEST_BITS: u64 = 0x7FEF_FFFF_FFFF_FFFF;

/// The raw IEEE-754 bit pattern of the default LOWEST range sentinel.
pub const LOWEST_BITS: u64 = 0xFFEF_FFFF_FFFF_FFFE;

/// The default system-missing value.
pub fn sysmiss() -> f64 {
    f64::from_bits(SYSMISS_BITS)
}

/// The default HIGHEST range sentinel.
pub fn highest() -> f64 {
    f64::from_bits(HIGHEST_BITS)
}

/// The default LOWEST range sentinel.
pub fn lowest() -> f64 {
    f64::from_bits(LOWEST_BITS)
}
