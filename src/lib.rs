//! Litchi XLS - A Rust library for reading legacy Excel workbooks
//!
//! This library reads the binary Excel formats (BIFF2 through BIFF8) used
//! by `.xls` files, from the compound file container down to decoded row
//! values.
//!
//! # Features
//!
//! - **Compound file reader**: FAT, DIFAT and MiniFAT chains with loop and
//!   truncation checks, plus detection of bare BIFF streams with no container
//! - **Encryption**: XOR obfuscation and RC4 (standard and CryptoAPI), with
//!   the legacy "VelvetSweatshop" default password tried automatically
//! - **Shared strings**: SST reassembly across CONTINUE records
//! - **Row blocks**: worksheets are scanned once and decoded 32 rows at a time
//!
//! # Example - Reading rows
//!
//! ```no_run
//! use std::fs::File;
//! use litchi_xls::ole::xls::{CellValue, OpenOptions, open};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("budget.xls")?;
//! let workbook = open(file, &OpenOptions::new().password("secret"))?;
//!
//! for (index, name) in workbook.sheet_names().iter().enumerate() {
//!     println!("== {} ==", name);
//!     for row in workbook.read_worksheet_rows(index)? {
//!         let row = row?;
//!         let cells: Vec<String> = row.values.iter().map(CellValue::to_string).collect();
//!         println!("{}", cells.join("\t"));
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Low-level container access
//!
//! ```no_run
//! use std::fs::File;
//! use litchi_xls::ole::OleFile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ole = OleFile::open(File::open("budget.xls")?)?;
//! for path in ole.list_streams()? {
//!     println!("{}", path.join("/"));
//! }
//! let workbook = ole.open_stream_by_name("Workbook")?;
//! println!("Workbook stream: {} bytes", workbook.len());
//! # Ok(())
//! # }
//! ```

/// Helpers shared by the container and BIFF layers
pub mod common;

/// OLE2 compound file reader
///
/// The `ole` module also contains the `xls` submodule, since .xls workbooks
/// are stored in compound files.
pub mod ole;

// Re-export commonly used types for convenience
pub use ole::xls;
pub use ole::xls::{
    CellValue, OpenError, OpenOptions, Row, WorkbookGlobals, XlsError, XlsResult, XlsWorkbook,
    open,
};
