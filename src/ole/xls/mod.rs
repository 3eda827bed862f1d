//! Legacy Excel (.xls) file format reader
//!
//! This module parses Microsoft Excel workbooks in the binary BIFF format,
//! versions 2 through 8, either stored in a compound file ("Workbook" or
//! "Book" stream) or as a bare record stream.
//!
//! The layers, bottom up:
//!
//! - [`stream::BiffStream`] splits the stream into records and decrypts
//!   their payloads ([`crypto`])
//! - [`records::decode`] turns a record into a [`BiffRecord`] for the
//!   stream's BIFF version
//! - [`sst`] reassembles the shared string table across CONTINUE records
//! - [`open`] scans the workbook globals; [`Worksheet`] scans one sheet and
//!   decodes its rows in blocks

/// Error types for XLS parsing
mod error;

/// Record identifiers and decoder constants
pub mod consts;

/// Codepage handling for byte strings
pub mod codepage;

/// FILEPASS schemes and payload decryption
pub mod crypto;

/// BIFF record parsing utilities
pub mod records;

/// Record stream decoder
pub mod stream;

/// Shared string table reassembly
pub mod sst;

/// Number format date classification
pub mod format;

/// Open options
mod options;

/// Workbook parsing implementation
mod workbook;

/// Worksheet scanning and row block decoding
mod worksheet;

/// Cell value representation
mod cell;

/// Shared parsing utilities
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;


pub use cell::{CellError, CellValue, Row};
pub use codepage::XlsEncoding;
pub use error::{XlsError, XlsResult};
pub use format::{DefaultNumberFormats, NumberFormatClassifier};
pub use options::OpenOptions;
pub use records::{BiffRecord, BiffVersion, StreamKind};
pub use stream::{BiffStream, DecoderContext};
pub use workbook::{Font, OpenError, SheetInfo, WorkbookGlobals, XlsWorkbook, open};
pub use worksheet::{RowIter, Worksheet};
