//! BIFF record parsing for XLS files
//!
//! [`decode`] turns one raw record into a [`BiffRecord`] variant. Dispatch is
//! a single table keyed by `(record id, BIFF version)`: several ids changed
//! between versions, and the same id can carry differently laid out
//! payloads (BIFF2 cell records have a 3-byte attribute block instead of an
//! XF index, BIFF8 widens row numbers in DIMENSIONS and INDEX, and so on).
//! Fields are normalised at decode time, so consumers never look at the
//! version again.

use bytes::Bytes;
use log::trace;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::consts::*;
use super::error::{XlsError, XlsResult};
use super::utils::{self, XlsString};
use crate::common::binary;

/// BIFF versions supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BiffVersion {
    Biff2,
    Biff3,
    Biff4,
    Biff5,
    Biff8,
}

impl BiffVersion {
    pub fn supports_unicode(&self) -> bool {
        matches!(self, BiffVersion::Biff8)
    }

    /// BIFF2-4 files hold a single sheet with no workbook globals
    pub fn is_single_sheet(&self) -> bool {
        matches!(self, BiffVersion::Biff2 | BiffVersion::Biff3 | BiffVersion::Biff4)
    }
}

/// Substream type named by the BOF `dt` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    WorkbookGlobals,
    Worksheet,
    Chart,
    MacroSheet,
    VbModule,
    Workspace,
    Unknown(u16),
}

impl From<u16> for StreamKind {
    fn from(dt: u16) -> Self {
        match dt {
            0x0005 => StreamKind::WorkbookGlobals,
            0x0006 => StreamKind::VbModule,
            0x0010 => StreamKind::Worksheet,
            0x0020 => StreamKind::Chart,
            0x0040 => StreamKind::MacroSheet,
            0x0100 => StreamKind::Workspace,
            other => StreamKind::Unknown(other),
        }
    }
}

pub fn is_bof(record_id: u16) -> bool {
    matches!(record_id, BOF_BIFF2 | BOF_BIFF3 | BOF_BIFF4 | BOF)
}

/// BOF (Beginning of File) record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BofRecord {
    pub version: BiffVersion,
    pub kind: StreamKind,
    /// Version field exactly as stored
    pub raw_version: u16,
}

impl BofRecord {
    /// Parse a BOF payload. The record id fixes BIFF2-4; for the BIFF5+ id
    /// the version field decides, and a zero version falls back to the
    /// payload length.
    pub fn parse(record_id: u16, data: &[u8]) -> XlsResult<Self> {
        let raw_version = binary::read_u16_le(data, 0)?;
        let dt = binary::read_u16_le(data, 2)?;
        let version = match record_id {
            BOF_BIFF2 => BiffVersion::Biff2,
            BOF_BIFF3 => BiffVersion::Biff3,
            BOF_BIFF4 => BiffVersion::Biff4,
            BOF => match raw_version {
                0x0500 => BiffVersion::Biff5,
                0x0600 => BiffVersion::Biff8,
                0 if data.len() >= 16 => BiffVersion::Biff8,
                0 => BiffVersion::Biff5,
                other => return Err(XlsError::UnsupportedBiffVersion(other)),
            },
            other => return Err(XlsError::invalid(other, "not a BOF record")),
        };
        Ok(BofRecord {
            version,
            kind: StreamKind::from(dt),
            raw_version,
        })
    }
}

/// Sheet visibility types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SheetVisibility {
    Visible,
    Hidden,
    VeryHidden,
}

impl From<u8> for SheetVisibility {
    fn from(value: u8) -> Self {
        match value & 0x03 {
            0x01 => SheetVisibility::Hidden,
            0x02 => SheetVisibility::VeryHidden,
            _ => SheetVisibility::Visible,
        }
    }
}

/// Sheet types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SheetKind {
    Worksheet,
    MacroSheet,
    Chart,
    VbModule,
    Other(u8),
}

impl From<u8> for SheetKind {
    fn from(value: u8) -> Self {
        match value {
            0x00 => SheetKind::Worksheet,
            0x01 => SheetKind::MacroSheet,
            0x02 => SheetKind::Chart,
            0x06 => SheetKind::VbModule,
            other => SheetKind::Other(other),
        }
    }
}

/// BoundSheet8 record (worksheet metadata)
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSheetRecord {
    /// Stream offset of the sheet's BOF
    pub position: u32,
    pub visibility: SheetVisibility,
    pub kind: SheetKind,
    pub name: XlsString,
}

/// FORMAT record. BIFF2-4 formats carry no index and are numbered in order
/// of appearance by the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatRecord {
    pub index: Option<u16>,
    pub code: XlsString,
}

/// XF (Extended Format) record - cell formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedFormat {
    pub font_index: u16,
    pub format_index: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FontRecord {
    /// Height in twips
    pub height: u16,
    pub name: XlsString,
}

/// Dimensions record (worksheet bounds). Last row and column are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionsRecord {
    pub first_row: u32,
    pub last_row: u32,
    pub first_col: u16,
    pub last_col: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub first_row: u32,
    /// One past the last row holding data
    pub last_row: u32,
    pub dbcell_offsets: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbCellRecord {
    /// Backward distance from the DBCELL to the first ROW of its block
    pub first_row_offset: u32,
    pub cell_offsets: SmallVec<[u16; 32]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRecord {
    pub index: u32,
    pub first_col: u16,
    pub last_col: u16,
    /// Height in twips
    pub height: u16,
    /// Height is the sheet default rather than set explicitly
    pub default_height: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub first_col: u16,
    pub last_col: u16,
    /// Width in 1/256 of a character
    pub width: u16,
    pub xf_index: u16,
    pub hidden: bool,
}

/// Inclusive cell range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRange {
    pub first_row: u32,
    pub last_row: u32,
    pub first_col: u16,
    pub last_col: u16,
}

/// Position and XF of a cell record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellHeader {
    pub row: u32,
    pub col: u16,
    pub xf_index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolErrValue {
    Bool(bool),
    Error(u8),
}

/// Cached result of a FORMULA record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormulaResult {
    Number(f64),
    /// Text follows in the next STRING record
    String,
    Bool(bool),
    Error(u8),
    EmptyString,
}

/// One decoded BIFF record
#[derive(Debug, Clone, PartialEq)]
pub enum BiffRecord {
    Bof(BofRecord),
    Eof,
    FilePass(Bytes),
    Codepage(u16),
    Date1904(bool),
    BoundSheet(BoundSheetRecord),
    Format(FormatRecord),
    Xf(ExtendedFormat),
    Font(FontRecord),
    Dimensions(DimensionsRecord),
    Index(IndexRecord),
    DbCell(DbCellRecord),
    Row(RowRecord),
    /// Default row height in twips
    DefaultRowHeight(u16),
    ColInfo(ColumnInfo),
    MergeCells(Vec<CellRange>),
    Header(Option<XlsString>),
    Footer(Option<XlsString>),
    CodeName(XlsString),
    Sst(Bytes),
    Continue(Bytes),
    Blank(CellHeader),
    /// BIFF2 unsigned integer cell
    Integer { cell: CellHeader, value: u16 },
    Number { cell: CellHeader, value: f64 },
    Label { cell: CellHeader, value: XlsString },
    RString { cell: CellHeader, value: XlsString },
    LabelSst { cell: CellHeader, index: u32 },
    Rk { cell: CellHeader, value: f64 },
    MulRk { row: u32, first_col: u16, values: Vec<(u16, f64)> },
    MulBlank { row: u32, first_col: u16, xf_indexes: Vec<u16> },
    BoolErr { cell: CellHeader, value: BoolErrValue },
    Formula { cell: CellHeader, result: FormulaResult },
    String(XlsString),
    SharedFormula,
    Unknown { id: u16, data: Bytes },
}

impl BiffRecord {
    /// Row touched by a cell or ROW record
    pub fn row(&self) -> Option<u32> {
        match self {
            BiffRecord::Row(r) => Some(r.index),
            BiffRecord::Blank(cell)
            | BiffRecord::Integer { cell, .. }
            | BiffRecord::Number { cell, .. }
            | BiffRecord::Label { cell, .. }
            | BiffRecord::RString { cell, .. }
            | BiffRecord::LabelSst { cell, .. }
            | BiffRecord::Rk { cell, .. }
            | BiffRecord::BoolErr { cell, .. }
            | BiffRecord::Formula { cell, .. } => Some(cell.row),
            BiffRecord::MulRk { row, .. } | BiffRecord::MulBlank { row, .. } => Some(*row),
            _ => None,
        }
    }

    /// Last column (inclusive) touched by a cell record
    pub fn last_col(&self) -> Option<u16> {
        match self {
            BiffRecord::Blank(cell)
            | BiffRecord::Integer { cell, .. }
            | BiffRecord::Number { cell, .. }
            | BiffRecord::Label { cell, .. }
            | BiffRecord::RString { cell, .. }
            | BiffRecord::LabelSst { cell, .. }
            | BiffRecord::Rk { cell, .. }
            | BiffRecord::BoolErr { cell, .. }
            | BiffRecord::Formula { cell, .. } => Some(cell.col),
            BiffRecord::MulRk { first_col, values, .. } if !values.is_empty() => {
                u16::try_from(*first_col as usize + values.len() - 1).ok()
            },
            BiffRecord::MulBlank { first_col, xf_indexes, .. } if !xf_indexes.is_empty() => {
                u16::try_from(*first_col as usize + xf_indexes.len() - 1).ok()
            },
            _ => None,
        }
    }
}

/// Decode a record payload.
///
/// `offset` is the absolute stream offset of the record header and only
/// feeds error messages and traces. Ids with no variant, and ids used by a
/// different version than the one given, come back as [`BiffRecord::Unknown`].
pub fn decode(id: u16, version: BiffVersion, data: Bytes, offset: u64) -> XlsResult<BiffRecord> {
    use BiffVersion::*;

    trace!("record 0x{:04X} at {} ({} bytes)", id, offset, data.len());
    let d = &data[..];
    let record = match (id, version) {
        (BOF_BIFF2 | BOF_BIFF3 | BOF_BIFF4 | BOF, _) => BiffRecord::Bof(BofRecord::parse(id, d)?),
        (EOF, _) => BiffRecord::Eof,
        (FILEPASS, _) => BiffRecord::FilePass(data.clone()),
        (CODEPAGE, _) => BiffRecord::Codepage(binary::read_u16_le(d, 0)?),
        (DATE1904, _) => BiffRecord::Date1904(binary::read_u16_le(d, 0)? != 0),
        (BOUNDSHEET, Biff5 | Biff8) => BiffRecord::BoundSheet(parse_bound_sheet(d, version)?),
        (FORMAT_BIFF2 | FORMAT, _) => BiffRecord::Format(parse_format(id, d, version)?),
        (XF_BIFF2 | XF_BIFF3 | XF_BIFF4 | XF, _) => BiffRecord::Xf(parse_xf(id, d)?),
        (FONT | FONT_BIFF3, _) => BiffRecord::Font(parse_font(id, d, version)?),
        (DIMENSIONS_BIFF2 | DIMENSIONS, _) => BiffRecord::Dimensions(parse_dimensions(d, version)?),
        (INDEX_BIFF2 | INDEX, _) => BiffRecord::Index(parse_index(d, version)?),
        (DBCELL, Biff5 | Biff8) => BiffRecord::DbCell(parse_dbcell(d)?),
        (ROW_BIFF2 | ROW, _) => BiffRecord::Row(parse_row(d)?),
        (DEFAULTROWHEIGHT_BIFF2, _) => {
            BiffRecord::DefaultRowHeight(binary::read_u16_le(d, 0)? & 0x7FFF)
        },
        (DEFAULTROWHEIGHT, _) => BiffRecord::DefaultRowHeight(binary::read_u16_le(d, 2)?),
        (COLINFO, _) => BiffRecord::ColInfo(parse_colinfo(d)?),
        (MERGECELLS, Biff8) => BiffRecord::MergeCells(parse_merge_cells(d)?),
        (HEADER, _) => BiffRecord::Header(parse_optional_string(d, version)?),
        (FOOTER, _) => BiffRecord::Footer(parse_optional_string(d, version)?),
        (CODENAME, Biff8) => BiffRecord::CodeName(XlsString::Text(
            utils::parse_unicode_string(d, 0, false)?.0,
        )),
        (SST, Biff8) => BiffRecord::Sst(data.clone()),
        (CONTINUE, _) => BiffRecord::Continue(data.clone()),

        (BLANK_BIFF2, Biff2) => BiffRecord::Blank(biff2_cell(d)?),
        (INTEGER_BIFF2, Biff2) => BiffRecord::Integer {
            cell: biff2_cell(d)?,
            value: binary::read_u16_le(d, 7)?,
        },
        (NUMBER_BIFF2, Biff2) => BiffRecord::Number {
            cell: biff2_cell(d)?,
            value: binary::read_f64_le(d, 7)?,
        },
        (LABEL_BIFF2, Biff2) => BiffRecord::Label {
            cell: biff2_cell(d)?,
            value: utils::parse_byte_string(d, 7)?.0,
        },
        (BOOLERR_BIFF2, Biff2) => BiffRecord::BoolErr {
            cell: biff2_cell(d)?,
            value: bool_err(d, 7)?,
        },
        (FORMULA, Biff2) => BiffRecord::Formula {
            cell: biff2_cell(d)?,
            result: formula_result(d, 7)?,
        },
        (STRING_BIFF2, Biff2) => BiffRecord::String(utils::parse_byte_string(d, 0)?.0),

        (BLANK, _) => BiffRecord::Blank(cell(d)?),
        (NUMBER, _) => BiffRecord::Number {
            cell: cell(d)?,
            value: binary::read_f64_le(d, 6)?,
        },
        (LABEL, Biff8) => BiffRecord::Label {
            cell: cell(d)?,
            value: XlsString::Text(utils::parse_unicode_string(d, 6, false)?.0),
        },
        (LABEL, _) => BiffRecord::Label {
            cell: cell(d)?,
            value: utils::parse_word_string(d, 6)?.0,
        },
        (RSTRING, Biff8) => BiffRecord::RString {
            cell: cell(d)?,
            value: XlsString::Text(utils::parse_unicode_string(d, 6, false)?.0),
        },
        (RSTRING, _) => BiffRecord::RString {
            cell: cell(d)?,
            value: utils::parse_word_string(d, 6)?.0,
        },
        (LABELSST, Biff8) => BiffRecord::LabelSst {
            cell: cell(d)?,
            index: binary::read_u32_le(d, 6)?,
        },
        (RK, _) => BiffRecord::Rk {
            cell: cell(d)?,
            value: utils::rk_to_f64(binary::read_u32_le(d, 6)?),
        },
        (MULRK, Biff5 | Biff8) => parse_mulrk(d)?,
        (MULBLANK, Biff5 | Biff8) => parse_mulblank(d)?,
        (BOOLERR, _) => BiffRecord::BoolErr {
            cell: cell(d)?,
            value: bool_err(d, 6)?,
        },
        (FORMULA, Biff5 | Biff8) | (FORMULA_BIFF3, Biff3) | (FORMULA_BIFF4, Biff4) => {
            BiffRecord::Formula {
                cell: cell(d)?,
                result: formula_result(d, 6)?,
            }
        },
        (STRING, Biff8) => {
            BiffRecord::String(XlsString::Text(utils::parse_unicode_string(d, 0, false)?.0))
        },
        (STRING, _) => BiffRecord::String(utils::parse_word_string(d, 0)?.0),
        (SHAREDFMLA, Biff5 | Biff8) => BiffRecord::SharedFormula,

        _ => BiffRecord::Unknown { id, data },
    };
    Ok(record)
}

fn cell(d: &[u8]) -> XlsResult<CellHeader> {
    Ok(CellHeader {
        row: binary::read_u16_le(d, 0)? as u32,
        col: binary::read_u16_le(d, 2)?,
        xf_index: binary::read_u16_le(d, 4)?,
    })
}

/// BIFF2 cells store 3 attribute bytes; the low 6 bits of the first one
/// index the XF table.
fn biff2_cell(d: &[u8]) -> XlsResult<CellHeader> {
    Ok(CellHeader {
        row: binary::read_u16_le(d, 0)? as u32,
        col: binary::read_u16_le(d, 2)?,
        xf_index: (binary::read_u8(d, 4)? & 0x3F) as u16,
    })
}

fn bool_err(d: &[u8], at: usize) -> XlsResult<BoolErrValue> {
    let value = binary::read_u8(d, at)?;
    let is_error = binary::read_u8(d, at + 1)? != 0;
    Ok(if is_error {
        BoolErrValue::Error(value)
    } else {
        BoolErrValue::Bool(value != 0)
    })
}

fn formula_result(d: &[u8], at: usize) -> XlsResult<FormulaResult> {
    let raw = binary::read_bytes(d, at, 8)?;
    if raw[6] == 0xFF && raw[7] == 0xFF {
        return Ok(match raw[0] {
            0x00 => FormulaResult::String,
            0x01 => FormulaResult::Bool(raw[2] != 0),
            0x02 => FormulaResult::Error(raw[2]),
            _ => FormulaResult::EmptyString,
        });
    }
    Ok(FormulaResult::Number(binary::read_f64_le(d, at)?))
}

fn parse_bound_sheet(d: &[u8], version: BiffVersion) -> XlsResult<BoundSheetRecord> {
    let name = if version == BiffVersion::Biff8 {
        XlsString::Text(utils::parse_unicode_string(d, 6, true)?.0)
    } else {
        utils::parse_byte_string(d, 6)?.0
    };
    Ok(BoundSheetRecord {
        position: binary::read_u32_le(d, 0)?,
        visibility: SheetVisibility::from(binary::read_u8(d, 4)?),
        kind: SheetKind::from(binary::read_u8(d, 5)?),
        name,
    })
}

fn parse_format(id: u16, d: &[u8], version: BiffVersion) -> XlsResult<FormatRecord> {
    use BiffVersion::*;
    match (id, version) {
        (FORMAT_BIFF2, _) => Ok(FormatRecord {
            index: None,
            code: utils::parse_byte_string(d, 0)?.0,
        }),
        (_, Biff2 | Biff3 | Biff4) => Ok(FormatRecord {
            index: None,
            code: utils::parse_byte_string(d, 2)?.0,
        }),
        (_, Biff5) => Ok(FormatRecord {
            index: Some(binary::read_u16_le(d, 0)?),
            code: utils::parse_byte_string(d, 2)?.0,
        }),
        (_, Biff8) => Ok(FormatRecord {
            index: Some(binary::read_u16_le(d, 0)?),
            code: XlsString::Text(utils::parse_unicode_string(d, 2, false)?.0),
        }),
    }
}

fn parse_xf(id: u16, d: &[u8]) -> XlsResult<ExtendedFormat> {
    let xf = match id {
        XF_BIFF2 => ExtendedFormat {
            font_index: binary::read_u8(d, 0)? as u16,
            format_index: (binary::read_u8(d, 2)? & 0x3F) as u16,
        },
        XF_BIFF3 | XF_BIFF4 => ExtendedFormat {
            font_index: binary::read_u8(d, 0)? as u16,
            format_index: binary::read_u8(d, 1)? as u16,
        },
        _ => ExtendedFormat {
            font_index: binary::read_u16_le(d, 0)?,
            format_index: binary::read_u16_le(d, 2)?,
        },
    };
    Ok(xf)
}

fn parse_font(id: u16, d: &[u8], version: BiffVersion) -> XlsResult<FontRecord> {
    let height = binary::read_u16_le(d, 0)?;
    let name = match (id, version) {
        (FONT_BIFF3, _) => utils::parse_byte_string(d, 6)?.0,
        (_, BiffVersion::Biff2) => utils::parse_byte_string(d, 4)?.0,
        (_, BiffVersion::Biff8) => XlsString::Text(utils::parse_unicode_string(d, 14, true)?.0),
        _ => utils::parse_byte_string(d, 14)?.0,
    };
    Ok(FontRecord { height, name })
}

fn parse_dimensions(d: &[u8], version: BiffVersion) -> XlsResult<DimensionsRecord> {
    if version == BiffVersion::Biff8 {
        Ok(DimensionsRecord {
            first_row: binary::read_u32_le(d, 0)?,
            last_row: binary::read_u32_le(d, 4)?,
            first_col: binary::read_u16_le(d, 8)?,
            last_col: binary::read_u16_le(d, 10)?,
        })
    } else {
        Ok(DimensionsRecord {
            first_row: binary::read_u16_le(d, 0)? as u32,
            last_row: binary::read_u16_le(d, 2)? as u32,
            first_col: binary::read_u16_le(d, 4)?,
            last_col: binary::read_u16_le(d, 6)?,
        })
    }
}

fn parse_index(d: &[u8], version: BiffVersion) -> XlsResult<IndexRecord> {
    use BiffVersion::*;
    let (first_row, last_row, table_start) = match version {
        Biff8 => (binary::read_u32_le(d, 4)?, binary::read_u32_le(d, 8)?, 16),
        Biff4 | Biff5 => (
            binary::read_u16_le(d, 4)? as u32,
            binary::read_u16_le(d, 6)? as u32,
            12,
        ),
        Biff2 | Biff3 => (
            binary::read_u16_le(d, 4)? as u32,
            binary::read_u16_le(d, 6)? as u32,
            8,
        ),
    };
    let dbcell_offsets = d
        .get(table_start..)
        .unwrap_or_default()
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(IndexRecord {
        first_row,
        last_row,
        dbcell_offsets,
    })
}

fn parse_dbcell(d: &[u8]) -> XlsResult<DbCellRecord> {
    Ok(DbCellRecord {
        first_row_offset: binary::read_u32_le(d, 0)?,
        cell_offsets: d[4..]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect(),
    })
}

fn parse_row(d: &[u8]) -> XlsResult<RowRecord> {
    let raw_height = binary::read_u16_le(d, 6)?;
    Ok(RowRecord {
        index: binary::read_u16_le(d, 0)? as u32,
        first_col: binary::read_u16_le(d, 2)?,
        last_col: binary::read_u16_le(d, 4)?,
        height: raw_height & 0x7FFF,
        default_height: raw_height & 0x8000 != 0,
    })
}

fn parse_colinfo(d: &[u8]) -> XlsResult<ColumnInfo> {
    Ok(ColumnInfo {
        first_col: binary::read_u16_le(d, 0)?,
        last_col: binary::read_u16_le(d, 2)?,
        width: binary::read_u16_le(d, 4)?,
        xf_index: binary::read_u16_le(d, 6)?,
        hidden: binary::read_u16_le(d, 8)? & 0x0001 != 0,
    })
}

fn parse_merge_cells(d: &[u8]) -> XlsResult<Vec<CellRange>> {
    let count = binary::read_u16_le(d, 0)? as usize;
    let mut ranges = Vec::with_capacity(count);
    for i in 0..count {
        let at = 2 + i * 8;
        ranges.push(CellRange {
            first_row: binary::read_u16_le(d, at)? as u32,
            last_row: binary::read_u16_le(d, at + 2)? as u32,
            first_col: binary::read_u16_le(d, at + 4)?,
            last_col: binary::read_u16_le(d, at + 6)?,
        });
    }
    Ok(ranges)
}

fn parse_optional_string(d: &[u8], version: BiffVersion) -> XlsResult<Option<XlsString>> {
    if d.is_empty() {
        return Ok(None);
    }
    let s = if version == BiffVersion::Biff8 {
        XlsString::Text(utils::parse_unicode_string(d, 0, false)?.0)
    } else {
        utils::parse_byte_string(d, 0)?.0
    };
    Ok(Some(s))
}

fn parse_mulrk(d: &[u8]) -> XlsResult<BiffRecord> {
    if d.len() < 6 || (d.len() - 6) % 6 != 0 {
        return Err(XlsError::invalid(MULRK, format!("bad payload length {}", d.len())));
    }
    let row = binary::read_u16_le(d, 0)? as u32;
    let first_col = binary::read_u16_le(d, 2)?;
    let values: Vec<(u16, f64)> = d[4..d.len() - 2]
        .chunks_exact(6)
        .map(|c| {
            let xf = u16::from_le_bytes([c[0], c[1]]);
            let rk = u32::from_le_bytes([c[2], c[3], c[4], c[5]]);
            (xf, utils::rk_to_f64(rk))
        })
        .collect();
    check_column_run(MULRK, first_col, values.len())?;
    Ok(BiffRecord::MulRk {
        row,
        first_col,
        values,
    })
}

/// Reject MULRK/MULBLANK runs that would run past the last column
fn check_column_run(record_id: u16, first_col: u16, count: usize) -> XlsResult<()> {
    let last = (first_col as usize + count).saturating_sub(1);
    if last > u16::MAX as usize {
        return Err(XlsError::invalid(
            record_id,
            format!("{} cells from column {} overflow the column range", count, first_col),
        ));
    }
    Ok(())
}

fn parse_mulblank(d: &[u8]) -> XlsResult<BiffRecord> {
    if d.len() < 6 || d.len() % 2 != 0 {
        return Err(XlsError::invalid(MULBLANK, format!("bad payload length {}", d.len())));
    }
    let row = binary::read_u16_le(d, 0)? as u32;
    let first_col = binary::read_u16_le(d, 2)?;
    let xf_indexes: Vec<u16> = d[4..d.len() - 2]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    check_column_run(MULBLANK, first_col, xf_indexes.len())?;
    Ok(BiffRecord::MulBlank {
        row,
        first_col,
        xf_indexes,
    })
}
