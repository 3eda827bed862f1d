//! Number format classification.
//!
//! Only one question is asked of a number format here: does it render a
//! date? Full format rendering is left to callers, who can plug their own
//! [`NumberFormatClassifier`] into the worksheet reader.

use phf::phf_map;

/// Decides whether a cell's number format renders a date/time
pub trait NumberFormatClassifier {
    /// `format_code` is the workbook's FORMAT record for the index, if any.
    fn is_date(&self, format_index: u16, format_code: Option<&str>) -> bool;
}

/// Built-in format ids plus a scan of custom format codes for date tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNumberFormats;

impl NumberFormatClassifier for DefaultNumberFormats {
    fn is_date(&self, format_index: u16, format_code: Option<&str>) -> bool {
        match format_code {
            Some(code) => is_date_format(code),
            None => is_builtin_date(format_index),
        }
    }
}

/// Built-in ids that are dates in every locale (including the CJK-only ids)
pub fn is_builtin_date(id: u16) -> bool {
    matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
}

static BUILTIN_FORMATS: phf::Map<u16, &'static str> = phf_map! {
    0u16 => "General",
    1u16 => "0",
    2u16 => "0.00",
    3u16 => "#,##0",
    4u16 => "#,##0.00",
    9u16 => "0%",
    10u16 => "0.00%",
    11u16 => "0.00E+00",
    12u16 => "# ?/?",
    13u16 => "# ??/??",
    14u16 => "mm-dd-yy",
    15u16 => "d-mmm-yy",
    16u16 => "d-mmm",
    17u16 => "mmm-yy",
    18u16 => "h:mm AM/PM",
    19u16 => "h:mm:ss AM/PM",
    20u16 => "h:mm",
    21u16 => "h:mm:ss",
    22u16 => "m/d/yy h:mm",
    37u16 => "#,##0 ;(#,##0)",
    38u16 => "#,##0 ;[Red](#,##0)",
    39u16 => "#,##0.00;(#,##0.00)",
    40u16 => "#,##0.00;[Red](#,##0.00)",
    45u16 => "mm:ss",
    46u16 => "[h]:mm:ss",
    47u16 => "mmss.0",
    48u16 => "##0.0E+0",
    49u16 => "@",
};

/// Format code of a built-in number format id
pub fn builtin_format_code(id: u16) -> Option<&'static str> {
    BUILTIN_FORMATS.get(&id).copied()
}

/// Check if a format code represents a date/time format.
///
/// Only the first section counts. Quoted text, escaped characters and
/// bracketed locale/colour sections are ignored, and elapsed-time brackets
/// such as `[h]` mark a duration, not a date.
pub fn is_date_format(format: &str) -> bool {
    let mut escaped = false;
    let mut is_quote = false;
    let mut brackets = 0u8;
    let mut prev = ' ';
    let mut hms = false;
    let mut ap = false;

    for s in format.chars() {
        match (s, escaped, is_quote, ap, brackets) {
            (_, true, ..) => escaped = false,
            ('_' | '\\', ..) => escaped = true,
            ('"', _, true, _, _) => is_quote = false,
            (_, _, true, _, _) => (),
            ('"', _, _, _, _) => is_quote = true,
            (';', ..) => return false,
            ('[', ..) => brackets += 1,
            (']', .., 1) if hms => return false,
            (']', ..) => brackets = brackets.saturating_sub(1),
            ('a' | 'A', _, _, false, 0) => ap = true,
            ('p' | 'm' | '/' | 'P' | 'M', _, _, true, 0) => return true,
            ('d' | 'm' | 'h' | 'y' | 's' | 'D' | 'M' | 'H' | 'Y' | 'S', _, _, false, 0) => {
                return true;
            },
            _ => {
                if !(hms && s.eq_ignore_ascii_case(&prev)) {
                    hms = prev == '[' && matches!(s, 'm' | 'h' | 's' | 'M' | 'H' | 'S');
                }
            },
        }
        prev = s;
    }
    false
}
