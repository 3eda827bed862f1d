//! Codepage handling for byte strings in pre-BIFF8 workbooks.
//!
//! BIFF2-5 store text as single-byte (or DBCS) strings in the codepage named
//! by the CODEPAGE record. BIFF8 stores UTF-16 or "compressed" Latin-1
//! strings and only uses the codepage for a handful of legacy records.

use encoding_rs::Encoding;
use log::warn;
use serde::{Deserialize, Serialize};

/// Codepage value BIFF8 writes to mean UTF-16LE
pub const CODEPAGE_UTF16: u16 = 1200;

/// How byte strings in the workbook are decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XlsEncoding {
    /// Single or double byte Windows codepage
    Codepage(u16),
    /// UTF-16 little endian (BIFF8)
    Utf16Le,
}

impl Default for XlsEncoding {
    fn default() -> Self {
        XlsEncoding::Codepage(1252)
    }
}

impl XlsEncoding {
    pub fn from_codepage(codepage: u16) -> Self {
        match codepage {
            CODEPAGE_UTF16 => XlsEncoding::Utf16Le,
            cp => XlsEncoding::Codepage(cp),
        }
    }

    /// The numeric codepage as stored in a CODEPAGE record
    pub fn codepage(&self) -> u16 {
        match self {
            XlsEncoding::Codepage(cp) => *cp,
            XlsEncoding::Utf16Le => CODEPAGE_UTF16,
        }
    }

    /// Decode a byte string.
    ///
    /// Byte strings in a BIFF8 workbook are compressed UTF-16 (Latin-1), and
    /// unknown codepages fall back to windows-1252 with a warning.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            XlsEncoding::Utf16Le => bytes.iter().map(|&b| b as char).collect(),
            XlsEncoding::Codepage(cp) => {
                let encoding = codepage_to_encoding(*cp).unwrap_or_else(|| {
                    warn!("unsupported codepage {}, decoding as windows-1252", cp);
                    encoding_rs::WINDOWS_1252
                });
                encoding.decode_without_bom_handling(bytes).0.into_owned()
            }
        }
    }
}

/// Map a Windows codepage identifier to an `encoding_rs` encoding.
///
/// Covers the codepages Excel writes into CODEPAGE records, including the
/// Macintosh and "ANSI Latin I" values used by BIFF2-4.
#[inline]
pub fn codepage_to_encoding(codepage: u16) -> Option<&'static Encoding> {
    match codepage {
        // US-ASCII and the BIFF2-4 Windows ANSI alias
        367 | 1252 | 32769 => Some(encoding_rs::WINDOWS_1252),
        437 | 850 => Some(encoding_rs::WINDOWS_1252),
        866 => Some(encoding_rs::IBM866),
        874 => Some(encoding_rs::WINDOWS_874),
        1250 => Some(encoding_rs::WINDOWS_1250),
        1251 => Some(encoding_rs::WINDOWS_1251),
        1253 => Some(encoding_rs::WINDOWS_1253),
        1254 => Some(encoding_rs::WINDOWS_1254),
        1255 => Some(encoding_rs::WINDOWS_1255),
        1256 => Some(encoding_rs::WINDOWS_1256),
        1257 => Some(encoding_rs::WINDOWS_1257),
        1258 => Some(encoding_rs::WINDOWS_1258),

        // East Asian
        932 => Some(encoding_rs::SHIFT_JIS),
        936 => Some(encoding_rs::GBK),
        949 => Some(encoding_rs::EUC_KR),
        950 => Some(encoding_rs::BIG5),

        // Macintosh Roman (10000, and 32768 in BIFF2-4)
        10000 | 32768 => Some(encoding_rs::MACINTOSH),
        10007 => Some(encoding_rs::X_MAC_CYRILLIC),

        65001 => Some(encoding_rs::UTF_8),
        _ => None,
    }
}
