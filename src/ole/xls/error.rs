//! Error types for XLS file parsing

use std::io;

use thiserror::Error;

use crate::common::binary::BinaryError;
use crate::ole::OleError;

/// Result type alias for XLS operations
pub type XlsResult<T> = Result<T, XlsError>;

/// Errors that can occur while opening or decoding a workbook
#[derive(Debug, Error)]
pub enum XlsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Container-level failure (bad header, corrupt sector chains)
    #[error("container error: {0}")]
    Container(#[from] OleError),

    /// Neither the legacy default password nor the caller's password verified
    #[error("invalid password")]
    InvalidPassword,

    /// FILEPASS names a scheme or cipher this reader does not implement
    #[error("unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    /// A record's declared size runs past the end of the stream
    #[error(
        "record 0x{record_id:04X} at offset {offset} declares {declared} bytes but only {available} remain"
    )]
    RecordSize {
        record_id: u16,
        offset: u64,
        declared: usize,
        available: usize,
    },

    /// Record payload too short or structurally invalid for its id
    #[error("invalid record 0x{record_id:04X}: {message}")]
    InvalidRecord { record_id: u16, message: String },

    #[error("unsupported BIFF version 0x{0:04X}")]
    UnsupportedBiffVersion(u16),

    /// Neither a "Workbook" nor a "Book" stream exists
    #[error("no Workbook or Book stream in container")]
    MissingWorkbookStream,

    /// Stream does not start with a BOF record
    #[error("stream does not start with a BOF record")]
    MissingBof,

    #[error("worksheet {0} not found")]
    WorksheetNotFound(usize),

    /// Seek target outside the stream
    #[error("offset {offset} outside stream of {len} bytes")]
    SeekOutOfRange { offset: u64, len: u64 },

    #[error("binary parsing error: {0}")]
    Binary(#[from] BinaryError),
}

impl XlsError {
    pub(crate) fn invalid(record_id: u16, message: impl Into<String>) -> Self {
        XlsError::InvalidRecord {
            record_id,
            message: message.into(),
        }
    }

    /// Whether the failure is a password problem the caller can retry
    pub fn is_password_error(&self) -> bool {
        matches!(self, XlsError::InvalidPassword)
    }
}
