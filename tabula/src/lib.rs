// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! # Project Tabula
//!
//! Tabula is a 100% pure Rust library for reading and writing the two data-file formats
//! historically used by SPSS and PSPP: the text-encoded portable file (POR) and the binary
//! system file (SAV).
//!
//! # Usage
//!
//! The following steps describe a basic usage of Tabula:
//!
//! 1.  Wrap the input in a byte source: [`core::io::BufReader`] over a byte slice, or
//!     [`core::io::SourceStream`] over anything implementing [`std::io::Read`] and
//!     [`std::io::Seek`].
//! 2.  Call [`probe::open`] to sniff the format and obtain a [`probe::File`], or construct a
//!     [`por::PortableReader`] or [`sav::SystemReader`] directly when the format is known.
//! 3.  Interrogate the reader for the file's dictionary: variables, missing-value
//!     declarations, value labels, and documents.
//! 4.  Pull cells through the [`core::matrix::CellReader`] interface, or wrap the reader in
//!     [`core::matrix::Cells`] for an iterator, or push events into a
//!     [`core::matrix::MatrixHandler`] with [`core::matrix::dispatch_matrix`].
//! 5.  To produce a file, build the dictionary records and feed rows through a
//!     [`por::PortableWriter`] or [`sav::SystemWriter`].

pub use tabula_core as core;
pub use tabula_format_por as por;
pub use tabula_format_sav as sav;

pub mod probe {
    //! Format detection over a seekable byte source.

    use crate::core::errors::Result;
    use crate::core::io::{ReadBytes, SeekBytes};
    use crate::por::{PortableReader, PortableReaderOptions};
    use crate::sav::{SystemReader, SystemReaderOptions};

    /// A reader for whichever format the probe detected.
    pub enum File<B: ReadBytes + SeekBytes> {
        /// A portable file.
        Portable(Box<PortableReader<B>>),
        /// A system file.
        System(Box<SystemReader<B>>),
    }

    /// Sniffs the source and opens the matching reader with default options.
    ///
    /// A system file opens with the `$FL2` signature in its first four bytes; anything else is
    /// handed to the portable reader, whose own prelude check rejects foreign data.
    pub fn open<B: ReadBytes + SeekBytes>(mut source: B) -> Result<File<B>> {
        let mut signature = [0u8; 4];
        source.read_buf_exact(&mut signature)?;
        source.seek_to(0)?;

        if &signature == crate::sav::SIGNATURE {
            let reader = SystemReader::try_new(source, &SystemReaderOptions::default())?;
            Ok(File::System(Box::new(reader)))
        }
        else {
            let reader = PortableReader::try_new(source, &PortableReaderOptions::default())?;
            Ok(File::Portable(Box::new(reader)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::probe;
    use crate::core::io::BufReader;
    use crate::core::matrix::Cell;
    use crate::por::{
        Dictionary, PortableFile, PortableHeader, PortableWriter, PortableWriterOptions,
        Variable, DEFAULT_PRECISION,
    };
    use crate::por::OutputFormat;
    use crate::sav::{
        FormatWord, SystemFile, SystemHeader, SystemWriter, SystemWriterOptions, VariableRecord,
    };

    fn portable_bytes() -> Vec<u8> {
        let file = PortableFile {
            header: PortableHeader::default(),
            dictionary: Dictionary {
                variables: vec![Variable {
                    width: 0,
                    name: "X".to_string(),
                    print_format: OutputFormat { format_type: 5, width: 8, decimals: 2 },
                    write_format: OutputFormat { format_type: 5, width: 8, decimals: 2 },
                    missing: Vec::new(),
                    label: None,
                }],
                weight_variable: None,
                precision: DEFAULT_PRECISION,
                value_labels: Vec::new(),
                documents: Vec::new(),
            },
        };

        let mut writer =
            PortableWriter::try_new(Vec::new(), &file, &PortableWriterOptions::default())
                .unwrap();
        writer.write_row(&[Cell::Numeric(1.0)]).unwrap();
        writer.finish().unwrap()
    }

    fn system_bytes() -> Vec<u8> {
        let file = SystemFile {
            header: SystemHeader { nominal_case_size: 1, ..Default::default() },
            variables: vec![VariableRecord::numeric(
                "X",
                FormatWord { format_type: 5, width: 8, decimals: 2 },
            )],
            ..Default::default()
        };

        let mut writer =
            SystemWriter::try_new(Vec::new(), &file, &SystemWriterOptions::default()).unwrap();
        writer.write_row(&[Cell::Numeric(1.0)]).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn verify_probe_detects_formats() {
        let por = portable_bytes();
        match probe::open(BufReader::new(&por)).unwrap() {
            probe::File::Portable(reader) => {
                assert_eq!(reader.file().dictionary.variables.len(), 1)
            }
            probe::File::System(_) => panic!("portable file probed as system"),
        }

        let sav = system_bytes();
        match probe::open(BufReader::new(&sav)).unwrap() {
            probe::File::System(reader) => {
                assert_eq!(reader.file().variables.len(), 1)
            }
            probe::File::Portable(_) => panic!("system file probed as portable"),
        }
    }

    #[test]
    fn verify_probe_rejects_foreign_data() {
        let garbage = vec![0xAAu8; 600];
        assert!(probe::open(BufReader::new(&garbage)).is_err());
    }

    /// Converting a system-file double into an 11-digit trigesimal cell and back loses at most
    /// the final ULP, and the loss is absorbed after one pass.
    #[test]
    fn verify_sav_to_por_conversion_is_one_ulp_stable() {
        use crate::core::matrix::CellReader;
        use crate::por::{PortableReader, PortableReaderOptions};
        use tabula_core::num::BackendKind;

        let original = f64::from_bits(u64::from_le_bytes([
            0x27, 0x23, 0xF7, 0x0C, 0x92, 0x52, 0x93, 0x3F,
        ]));

        // Stage the value in a system file.
        let file = SystemFile {
            header: SystemHeader { nominal_case_size: 1, ..Default::default() },
            variables: vec![VariableRecord::numeric(
                "X",
                FormatWord { format_type: 5, width: 8, decimals: 6 },
            )],
            ..Default::default()
        };
        let mut writer =
            SystemWriter::try_new(Vec::new(), &file, &SystemWriterOptions::default()).unwrap();
        writer.write_row(&[Cell::Numeric(original)]).unwrap();
        let sav_bytes = writer.finish().unwrap();

        let mut sav_reader = crate::sav::SystemReader::try_new(
            BufReader::new(&sav_bytes),
            &crate::sav::SystemReaderOptions::default(),
        )
        .unwrap();
        let (_, _, cell) = sav_reader.next_cell().unwrap().unwrap();
        assert_eq!(cell, Cell::Numeric(original));

        // Convert to a portable file at the default trigesimal precision.
        let por_file = PortableFile {
            header: PortableHeader::default(),
            dictionary: Dictionary {
                variables: vec![Variable {
                    width: 0,
                    name: "X".to_string(),
                    print_format: OutputFormat { format_type: 5, width: 8, decimals: 6 },
                    write_format: OutputFormat { format_type: 5, width: 8, decimals: 6 },
                    missing: Vec::new(),
                    label: None,
                }],
                weight_variable: None,
                precision: DEFAULT_PRECISION,
                value_labels: Vec::new(),
                documents: Vec::new(),
            },
        };

        let write_por = |value: f64| -> Vec<u8> {
            let mut writer =
                PortableWriter::try_new(Vec::new(), &por_file, &PortableWriterOptions::default())
                    .unwrap();
            writer.write_row(&[Cell::Numeric(value)]).unwrap();
            writer.finish().unwrap()
        };

        let read_por = |bytes: &[u8]| -> f64 {
            let mut reader = PortableReader::try_new(
                BufReader::new(bytes),
                &PortableReaderOptions {
                    backend: BackendKind::Precise,
                    ..Default::default()
                },
            )
            .unwrap();
            match reader.next_cell().unwrap().unwrap().2 {
                Cell::Numeric(value) => value,
                other => panic!("unexpected cell {:?}", other),
            }
        };

        // Eleven trigesimal digits cannot hold the full 53-bit significand: the re-decoded
        // double is the one-ULP-lower neighbour.
        let reparsed = read_por(&write_por(original));
        assert_eq!(reparsed.to_bits(), original.to_bits() - 1);

        // Re-encoding the re-decoded value is stable from the first pass on.
        let second = read_por(&write_por(reparsed));
        assert_eq!(second.to_bits(), reparsed.to_bits());
    }
}
