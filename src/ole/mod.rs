/// Constants for OLE file format
pub mod consts;

/// Container error taxonomy
mod error;

/// Fixed 512-byte header and the raw-BIFF probe
pub mod header;

/// FAT, DIFAT and MiniFAT tables
pub mod sector;

/// Directory entry arena and name lookup
pub mod directory;

/// Sector run coalescing and logical stream reassembly
pub mod stream;

/// Compound file reader tying the pieces together
mod file;

/// Legacy Excel (.xls) reader
///
/// BIFF2 through BIFF8 workbooks, stored either in a compound file or as a
/// bare record stream.
pub mod xls;

#[cfg(test)]
pub(crate) mod testing;


// Re-export public types for convenient access
pub use directory::{Directory, DirectoryEntry, EntryType};
pub use error::{HeaderError, OleError};
pub use file::{OleFile, is_ole_file};
pub use header::{Header, HeaderProbe, probe_header, read_header};
pub use sector::{ChainKind, SectorChain};
