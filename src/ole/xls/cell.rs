//! Cell representation for XLS files

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Error values stored in BOOLERR and formula cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellError {
    Null,
    Div0,
    Value,
    Ref,
    Name,
    Num,
    NA,
    /// Code outside the documented set
    Other(u8),
}

impl From<u8> for CellError {
    fn from(code: u8) -> Self {
        match code {
            0x00 => CellError::Null,
            0x07 => CellError::Div0,
            0x0F => CellError::Value,
            0x17 => CellError::Ref,
            0x1D => CellError::Name,
            0x24 => CellError::Num,
            0x2A => CellError::NA,
            other => CellError::Other(other),
        }
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellError::Null => f.write_str("#NULL!"),
            CellError::Div0 => f.write_str("#DIV/0!"),
            CellError::Value => f.write_str("#VALUE!"),
            CellError::Ref => f.write_str("#REF!"),
            CellError::Name => f.write_str("#NAME?"),
            CellError::Num => f.write_str("#NUM!"),
            CellError::NA => f.write_str("#N/A"),
            CellError::Other(code) => write!(f, "#ERR{}", code),
        }
    }
}

/// Decoded value of one cell
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Error(CellError),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Bool(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            CellValue::Error(e) => write!(f, "{}", e),
            CellValue::DateTime(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S%.3f")),
        }
    }
}

/// One worksheet row.
///
/// `values` always spans the sheet's field count; absent cells are
/// [`CellValue::Empty`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub index: u32,
    /// Height in points
    pub height: f64,
    pub values: Vec<CellValue>,
}

impl Row {
    pub fn cell(&self, col: usize) -> Option<&CellValue> {
        self.values.get(col)
    }

    /// True when no cell in the row holds a value
    pub fn is_blank(&self) -> bool {
        self.values.iter().all(CellValue::is_empty)
    }
}
