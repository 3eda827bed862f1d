//! Bounds-checked little-endian readers shared by the container and BIFF layers.
//!
//! Every reader takes the full buffer plus an offset and fails with
//! [`BinaryError::InsufficientData`] instead of panicking when the value
//! would run past the end of the buffer.

use thiserror::Error;
use zerocopy::{F64, FromBytes, LE, U16, U32};

/// Binary parsing error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinaryError {
    /// Not enough data to read the requested type
    #[error("Insufficient data: expected {expected}, got {available}")]
    InsufficientData { expected: usize, available: usize },
    /// Failed to parse the data
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for binary operations
pub type BinaryResult<T> = Result<T, BinaryError>;

#[inline]
fn window(data: &[u8], offset: usize, len: usize) -> BinaryResult<&[u8]> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| BinaryError::ParseError("offset overflow".to_string()))?;
    data.get(offset..end).ok_or(BinaryError::InsufficientData {
        expected: end,
        available: data.len(),
    })
}

/// Read a single byte at the given offset.
#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> BinaryResult<u8> {
    window(data, offset, 1).map(|b| b[0])
}

/// Read a little-endian u16 from a byte slice at the given offset.
///
/// # Examples
///
/// ```
/// use litchi_xls::common::binary::read_u16_le;
/// let data = [0x34, 0x12, 0x78, 0x56];
/// assert_eq!(read_u16_le(&data, 0).unwrap(), 0x1234);
/// assert_eq!(read_u16_le(&data, 2).unwrap(), 0x5678);
/// assert!(read_u16_le(&data, 3).is_err());
/// ```
#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> BinaryResult<u16> {
    U16::<LE>::read_from_bytes(window(data, offset, 2)?)
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read u16".to_string()))
}

/// Read a little-endian u32 from a byte slice at the given offset.
#[inline]
pub fn read_u32_le(data: &[u8], offset: usize) -> BinaryResult<u32> {
    U32::<LE>::read_from_bytes(window(data, offset, 4)?)
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read u32".to_string()))
}

/// Read a little-endian IEEE-754 double at the given offset.
#[inline]
pub fn read_f64_le(data: &[u8], offset: usize) -> BinaryResult<f64> {
    F64::<LE>::read_from_bytes(window(data, offset, 8)?)
        .map(|v| v.get())
        .map_err(|_| BinaryError::ParseError("Failed to read f64".to_string()))
}

/// Borrow `len` bytes starting at `offset`.
#[inline]
pub fn read_bytes(data: &[u8], offset: usize, len: usize) -> BinaryResult<&[u8]> {
    window(data, offset, len)
}

/// Collect little-endian UTF-16 code units from a byte slice.
///
/// A trailing odd byte is ignored.
pub fn utf16le_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Decode UTF-16LE bytes into a `String`, dropping trailing NULs.
///
/// Unpaired surrogates are replaced with U+FFFD.
pub fn decode_utf16le(bytes: &[u8]) -> String {
    let units = utf16le_units(bytes);
    String::from_utf16_lossy(&units)
        .trim_end_matches('\0')
        .to_string()
}
