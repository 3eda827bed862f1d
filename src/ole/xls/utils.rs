//! Utility functions for XLS parsing: string layouts, RK numbers and serial dates

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::codepage::XlsEncoding;
use crate::common::binary::{self, BinaryResult};

/// Character data as stored in a record.
///
/// BIFF8 strings carry their own encoding and are decoded on the spot;
/// earlier versions store codepage bytes that are only decoded once the
/// workbook's CODEPAGE is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum XlsString {
    Text(String),
    Bytes(Vec<u8>),
}

impl XlsString {
    pub fn decode(&self, encoding: &XlsEncoding) -> String {
        match self {
            XlsString::Text(s) => s.clone(),
            XlsString::Bytes(b) => encoding.decode(b),
        }
    }

    pub fn into_string(self, encoding: &XlsEncoding) -> String {
        match self {
            XlsString::Text(s) => s,
            XlsString::Bytes(b) => encoding.decode(&b),
        }
    }
}

impl Default for XlsString {
    fn default() -> Self {
        XlsString::Text(String::new())
    }
}

/// Byte string with a one-byte length prefix. Returns the string and the
/// number of bytes consumed.
pub fn parse_byte_string(data: &[u8], offset: usize) -> BinaryResult<(XlsString, usize)> {
    let len = binary::read_u8(data, offset)? as usize;
    let bytes = binary::read_bytes(data, offset + 1, len)?;
    Ok((XlsString::Bytes(bytes.to_vec()), 1 + len))
}

/// Byte string with a two-byte length prefix (BIFF3-5 LABEL and friends).
pub fn parse_word_string(data: &[u8], offset: usize) -> BinaryResult<(XlsString, usize)> {
    let len = binary::read_u16_le(data, offset)? as usize;
    let bytes = binary::read_bytes(data, offset + 2, len)?;
    Ok((XlsString::Bytes(bytes.to_vec()), 2 + len))
}

/// BIFF8 `XLUnicodeString` (two-byte character count) or, with
/// `short_count`, `ShortXLUnicodeString` (one-byte count).
///
/// Rich-text and phonetic headers are skipped together with their trailing
/// run data, so the consumed length covers the whole structure.
pub fn parse_unicode_string(
    data: &[u8],
    offset: usize,
    short_count: bool,
) -> BinaryResult<(String, usize)> {
    let (cch, mut pos) = if short_count {
        (binary::read_u8(data, offset)? as usize, offset + 1)
    } else {
        (binary::read_u16_le(data, offset)? as usize, offset + 2)
    };
    let flags = binary::read_u8(data, pos)?;
    pos += 1;

    let mut runs = 0usize;
    if flags & 0x08 != 0 {
        runs = binary::read_u16_le(data, pos)? as usize;
        pos += 2;
    }
    let mut ext = 0usize;
    if flags & 0x04 != 0 {
        ext = binary::read_u32_le(data, pos)? as usize;
        pos += 4;
    }

    let text = if flags & 0x01 != 0 {
        let bytes = binary::read_bytes(data, pos, cch * 2)?;
        pos += cch * 2;
        String::from_utf16_lossy(&binary::utf16le_units(bytes))
    } else {
        let bytes = binary::read_bytes(data, pos, cch)?;
        pos += cch;
        bytes.iter().map(|&b| b as char).collect()
    };

    // Trailing formatting runs and ExtRst may be cut short in damaged
    // records; the text itself is complete at this point.
    let consumed = (pos + runs * 4 + ext).min(data.len().max(pos)) - offset;
    Ok((text, consumed))
}

/// Decode an RK number.
///
/// Bit 0 divides the result by 100, bit 1 selects a 30-bit signed integer
/// instead of the high 30 bits of an IEEE double.
pub fn rk_to_f64(rk: u32) -> f64 {
    let div100 = rk & 0x01 != 0;
    let is_int = rk & 0x02 != 0;
    let value = if is_int {
        ((rk as i32) >> 2) as f64
    } else {
        f64::from_bits(((rk & 0xFFFF_FFFC) as u64) << 32)
    };
    if div100 { value / 100.0 } else { value }
}

/// Convert an Excel serial date to a timestamp, rounded to the millisecond.
///
/// The 1900 system counts from 1899-12-30 (absorbing the fictitious
/// 1900-02-29), the 1904 system from 1904-01-01.
pub fn serial_to_datetime(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let epoch = if is_1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    }
    .and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round();
    if millis.abs() > i64::MAX as f64 / 2.0 {
        return None;
    }
    epoch.checked_add_signed(Duration::milliseconds(millis as i64))
}
