// Tabula
// Copyright (c) 2026 The Project Tabula Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::result;

/// `NumberErrorKind` is a list of reasons why a textual number may fail to parse or scale.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NumberErrorKind {
    /// No digits were consumed.
    Empty,
    /// A non-digit was found at a position where only digits are accepted.
    UnexpectedChar,
    /// The magnitude exceeds the representable range of the numeric back-end.
    Overflow,
    /// The magnitude is too small for the numeric back-end and vanished entirely.
    Underflow,
    /// The precise back-end exceeded its working precision.
    Backend,
}

impl NumberErrorKind {
    fn as_str(&self) -> &'static str {
        match *self {
            NumberErrorKind::Empty => "no digits",
            NumberErrorKind::UnexpectedChar => "unexpected character",
            NumberErrorKind::Overflow => "magnitude too large",
            NumberErrorKind::Underflow => "magnitude too small",
            NumberErrorKind::Backend => "working precision exceeded",
        }
    }
}

/// `Error` provides an enumeration of all possible errors reported by Tabula.
#[derive(Debug)]
pub enum Error {
    /// An IO error occurred while reading, writing, or seeking the stream.
    IoError(std::io::Error),
    /// The end of the stream was reached unexpectedly.
    EndOfFile,
    /// The stream prelude did not carry a recognizable file signature, or a fixed header field
    /// held an impossible value.
    InvalidHeader(&'static str),
    /// An unrecognized dictionary tag record was encountered.
    TagUnknown(u8),
    /// A textual or binary number could not be converted.
    MalformedNumber(NumberErrorKind),
    /// A physical line exceeded the configured row width.
    RowTooLong(usize),
    /// The case stream violated the declared column layout.
    Rejected(&'static str),
    /// A cell could not be produced. Wraps the underlying cause with its position.
    InvalidCell {
        /// Zero-based column of the offending cell.
        column: usize,
        /// Byte offset of the underlying stream when the cell failed.
        offset: u64,
        /// The error that stopped the cell.
        cause: Box<Error>,
    },
    /// A digit alphabet failed validation.
    AlphabetInvalid(&'static str),
    /// The number formatter was handed a NaN or an infinity.
    NonFiniteInput,
    /// An unsupported container or codec feature was encountered.
    Unsupported(&'static str),
    /// A default or user-defined limit was reached while decoding the stream. Limits are used to
    /// prevent denial-of-service attacks from malicious streams.
    LimitError(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => {
                write!(f, "io error: {}", err)
            }
            Error::EndOfFile => {
                write!(f, "unexpected end of file")
            }
            Error::InvalidHeader(msg) => {
                write!(f, "invalid header: {}", msg)
            }
            Error::TagUnknown(tag) => {
                write!(f, "unknown tag record: {:#04x}", tag)
            }
            Error::MalformedNumber(ref kind) => {
                write!(f, "malformed number: {}", kind.as_str())
            }
            Error::RowTooLong(limit) => {
                write!(f, "physical line longer than {} bytes", limit)
            }
            Error::Rejected(msg) => {
                write!(f, "case stream rejected: {}", msg)
            }
            Error::InvalidCell { column, offset, ref cause } => {
                write!(f, "invalid cell in column {} at offset {}: {}", column, offset, cause)
            }
            Error::AlphabetInvalid(msg) => {
                write!(f, "invalid digit alphabet: {}", msg)
            }
            Error::NonFiniteInput => {
                write!(f, "non-finite input")
            }
            Error::Unsupported(feature) => {
                write!(f, "unsupported feature: {}", feature)
            }
            Error::LimitError(constraint) => {
                write!(f, "limit reached: {}", constraint)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            Error::InvalidCell { ref cause, .. } => Some(cause),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::EndOfFile,
            _ => Error::IoError(err),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create an invalid header error.
pub fn invalid_header_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::InvalidHeader(desc))
}

/// Convenience function to create a malformed number error.
pub fn number_error<T>(kind: NumberErrorKind) -> Result<T> {
    Err(Error::MalformedNumber(kind))
}

/// Convenience function to create a rejected case stream error.
pub fn rejected_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::Rejected(desc))
}

/// Convenience function to create an invalid alphabet error.
pub fn alphabet_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::AlphabetInvalid(desc))
}

/// Convenience function to create an unsupported feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}

/// Convenience function to create a limit error.
pub fn limit_error<T>(constraint: &'static str) -> Result<T> {
    Err(Error::LimitError(constraint))
}

/// Convenience function to create an end-of-stream error.
pub fn end_of_stream_error<T>() -> Result<T> {
    Err(Error::EndOfFile)
}
