//! Error types for the compound file container

use std::io;

use thiserror::Error;

/// Problems with the fixed 512-byte header. Always fatal to opening a file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// The 8-byte magic does not match a compound file
    #[error("not a compound file: bad signature")]
    BadSignature,
    /// Neither the standard nor the known broken byte-order marker
    #[error("invalid byte order marker 0x{0:04X}")]
    BadByteOrder(u16),
    /// Sector or mini sector shift outside the supported range
    #[error("unsupported sector shift {0}")]
    BadSectorShift(u16),
    /// A bare BIFF stream whose BOF names a version we cannot read
    #[error("unsupported raw BIFF version 0x{0:04X}")]
    UnsupportedRawBiff(u16),
    /// Fewer bytes than a full header
    #[error("header truncated: {0} bytes available")]
    Truncated(usize),
}

/// Error types for compound file parsing
#[derive(Debug, Error)]
pub enum OleError {
    /// I/O failure outside sector reads
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Header validation failed
    #[error("invalid header: {0}")]
    Header(#[from] HeaderError),
    /// Sector chains or directory are inconsistent, or the file is truncated
    #[error("corrupt container: {message}")]
    Corrupt {
        message: String,
        #[source]
        source: Option<io::Error>,
    },
    /// No directory entry with the requested name
    #[error("stream not found: {0}")]
    StreamNotFound(String),
    /// The named entry exists but is a storage, not a stream
    #[error("entry is not a stream: {0}")]
    NotAStream(String),
}

impl OleError {
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        OleError::Corrupt {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn truncated(message: impl Into<String>, source: io::Error) -> Self {
        OleError::Corrupt {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Whether this error reports a structurally damaged container
    pub fn is_corrupt(&self) -> bool {
        matches!(self, OleError::Corrupt { .. })
    }
}
