//! Worksheet implementation for XLS files
//!
//! Opening a worksheet reads its sheet level metadata and notes, for every
//! row, the first and last record offset that touches it. When the sheet
//! carries an INDEX record, those offsets come from the DBCELL record
//! closing each row block and the cell table itself is jumped over. Sheets
//! without a usable INDEX are walked record by record instead.
//!
//! Rows are then decoded in blocks of
//! [`ROWS_PER_BLOCK`](super::consts::ROWS_PER_BLOCK): one seek to the
//! smallest offset of the block, then a linear decode up to the largest.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Range;

use log::{debug, trace, warn};

use super::cell::{CellError, CellValue, Row};
use super::consts::{ARRAY, ARRAY_BIFF2, DEFAULT_ROW_HEIGHT_TWIPS, ROWS_PER_BLOCK, TABLE};
use super::error::{XlsError, XlsResult};
use super::format::NumberFormatClassifier;
use super::records::{
    BiffRecord, BiffVersion, BoolErrValue, CellRange, ColumnInfo, DbCellRecord, FormulaResult,
    IndexRecord,
};
use super::stream::BiffStream;
use super::utils;
use super::workbook::{SheetInfo, WorkbookGlobals};

/// First and last record offsets touching one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RowSpan {
    min: u64,
    max: u64,
}

impl RowSpan {
    fn extend(&mut self, offset: u64) {
        self.min = self.min.min(offset);
        self.max = self.max.max(offset);
    }
}

/// Row offsets recovered from INDEX and DBCELL
#[derive(Debug)]
struct RowIndex {
    spans: BTreeMap<u32, RowSpan>,
    /// Bytes from the first ROW of the first block to the end of the last DBCELL
    table: Range<u64>,
    /// Widest ROW record, exclusive
    columns: usize,
}

impl RowIndex {
    /// Follow every DBCELL the INDEX lists. `None` when any of them does not
    /// lead to a run of ROW records placed after `after`.
    fn read(
        stream: &mut BiffStream,
        index: &IndexRecord,
        after: u64,
    ) -> XlsResult<Option<Self>> {
        if index.dbcell_offsets.is_empty() {
            return Ok(None);
        }
        let mut found = RowIndex {
            spans: BTreeMap::new(),
            table: u64::MAX..0,
            columns: 0,
        };
        for &dbcell_at in &index.dbcell_offsets {
            let dbcell_at = dbcell_at as u64;
            if dbcell_at <= after || dbcell_at >= stream.len() {
                return Ok(None);
            }
            let Some(BiffRecord::DbCell(dbcell)) = stream.read_at(dbcell_at)? else {
                return Ok(None);
            };
            let block_end = stream.position();
            let Some(block_start) = dbcell_at
                .checked_sub(dbcell.first_row_offset as u64)
                .filter(|&start| start > after && start < dbcell_at)
            else {
                return Ok(None);
            };

            let mut rows: Vec<(u32, u64)> = Vec::with_capacity(ROWS_PER_BLOCK as usize);
            let mut second_row = block_start;
            let mut cells_from = block_start;
            stream.seek(block_start)?;
            while stream.position() < dbcell_at {
                let at = stream.position();
                let Some(BiffRecord::Row(row)) = stream.read()? else {
                    break;
                };
                found.columns = found.columns.max(row.last_col as usize);
                rows.push((row.index, at));
                if rows.len() == 1 {
                    second_row = stream.position();
                }
                cells_from = stream.position();
            }
            if rows.is_empty() {
                return Ok(None);
            }

            let starts = cell_starts(&dbcell, rows.len(), second_row, cells_from..dbcell_at);
            for (k, &(row, at)) in rows.iter().enumerate() {
                let span = match &starts {
                    Some(starts) => {
                        let end = starts[k + 1..]
                            .iter()
                            .flatten()
                            .next()
                            .copied()
                            .unwrap_or(dbcell_at);
                        RowSpan {
                            min: at,
                            max: if starts[k].is_some() { end - 1 } else { at },
                        }
                    },
                    None => RowSpan {
                        min: at,
                        max: dbcell_at - 1,
                    },
                };
                found
                    .spans
                    .entry(row)
                    .and_modify(|s| {
                        s.extend(span.min);
                        s.extend(span.max);
                    })
                    .or_insert(span);
            }
            found.table.start = found.table.start.min(block_start);
            found.table.end = found.table.end.max(block_end);
        }
        Ok(Some(found))
    }
}

/// Offset of each row's first cell record, from the DBCELL's chain of
/// deltas: the first is relative to the second ROW record, each later one to
/// the previous row's first cell. A later zero delta marks a row with no
/// cells. `None` when the deltas do not fit between the ROW records and the
/// DBCELL.
fn cell_starts(
    dbcell: &DbCellRecord,
    rows: usize,
    second_row: u64,
    cells: Range<u64>,
) -> Option<Vec<Option<u64>>> {
    if dbcell.cell_offsets.len() != rows {
        return None;
    }
    let mut base = second_row;
    let mut starts = Vec::with_capacity(rows);
    for (k, &delta) in dbcell.cell_offsets.iter().enumerate() {
        if delta == 0 && k > 0 {
            starts.push(None);
            continue;
        }
        base += delta as u64;
        if !cells.contains(&base) {
            return None;
        }
        starts.push(Some(base));
    }
    Some(starts)
}

/// A scanned worksheet
#[derive(Clone)]
pub struct Worksheet<'a> {
    pub info: SheetInfo,
    /// Columns per row: the larger of DIMENSIONS and the widest cell seen
    pub field_count: usize,
    /// Rows in the sheet: the larger of DIMENSIONS and the last row seen
    pub row_count: u32,
    /// Height in points of rows without their own ROW record
    pub default_row_height: f64,
    pub column_info: Vec<ColumnInfo>,
    pub merged_cells: Vec<CellRange>,
    pub header: Option<String>,
    pub footer: Option<String>,
    pub code_name: Option<String>,
    indexed: bool,
    spans: BTreeMap<u32, RowSpan>,
    globals: &'a WorkbookGlobals,
    classifier: &'a dyn NumberFormatClassifier,
    stream: BiffStream,
}

impl std::fmt::Debug for Worksheet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worksheet")
            .field("info", &self.info)
            .field("field_count", &self.field_count)
            .field("row_count", &self.row_count)
            .field("default_row_height", &self.default_row_height)
            .finish_non_exhaustive()
    }
}

fn twips_to_points(twips: u16) -> f64 {
    twips as f64 / 20.0
}

impl<'a> Worksheet<'a> {
    pub(crate) fn scan(
        info: SheetInfo,
        globals: &'a WorkbookGlobals,
        classifier: &'a dyn NumberFormatClassifier,
        workbook: &BiffStream,
    ) -> XlsResult<Self> {
        let mut stream = workbook.substream(info.position)?;
        let enc = globals.encoding;

        let mut sheet = Worksheet {
            info,
            field_count: 0,
            row_count: 0,
            default_row_height: twips_to_points(DEFAULT_ROW_HEIGHT_TWIPS),
            column_info: Vec::new(),
            merged_cells: Vec::new(),
            header: None,
            footer: None,
            code_name: None,
            indexed: false,
            spans: BTreeMap::new(),
            globals,
            classifier,
            stream: stream.clone(),
        };

        let mut declared_rows = 0u32;
        let mut declared_cols = 0usize;
        let mut seen_rows = 0u32;
        let mut seen_cols = 0usize;

        let first = stream.read()?;
        if !matches!(first, Some(BiffRecord::Bof(_))) {
            return Err(XlsError::MissingBof);
        }
        let mut table: Option<Range<u64>> = None;
        loop {
            let offset = stream.position();
            if let Some(t) = table.as_ref().filter(|t| t.contains(&offset)) {
                trace!("jumping over the cell table {}..{}", t.start, t.end);
                stream.seek(t.end)?;
                continue;
            }
            let Some(record) = stream.read()? else {
                warn!("sheet '{}' has no EOF record", sheet.info.name);
                break;
            };
            if let Some(row) = record.row() {
                sheet
                    .spans
                    .entry(row)
                    .and_modify(|s| s.extend(offset))
                    .or_insert(RowSpan {
                        min: offset,
                        max: offset,
                    });
                seen_rows = seen_rows.max(row + 1);
            }
            if let Some(col) = record.last_col() {
                seen_cols = seen_cols.max(col as usize + 1);
            }
            match record {
                BiffRecord::Eof => break,
                BiffRecord::Bof(bof) => {
                    warn!(
                        "skipping embedded {:?} substream at {} in sheet '{}'",
                        bof.kind, offset, sheet.info.name
                    );
                    skip_substream(&mut stream)?;
                },
                BiffRecord::Index(index)
                    if !sheet.indexed
                        && matches!(stream.version(), BiffVersion::Biff5 | BiffVersion::Biff8) =>
                {
                    let resume = stream.position();
                    match RowIndex::read(&mut stream, &index, resume) {
                        Ok(Some(found)) => {
                            debug!(
                                "sheet '{}': {} rows located through {} DBCELL records",
                                sheet.info.name,
                                found.spans.len(),
                                index.dbcell_offsets.len()
                            );
                            if let Some(&last) = found.spans.keys().next_back() {
                                seen_rows = seen_rows.max(last + 1);
                            }
                            seen_rows = seen_rows.max(index.last_row);
                            seen_cols = seen_cols.max(found.columns);
                            for (row, span) in found.spans {
                                sheet
                                    .spans
                                    .entry(row)
                                    .and_modify(|s| {
                                        s.extend(span.min);
                                        s.extend(span.max);
                                    })
                                    .or_insert(span);
                            }
                            table = Some(found.table);
                            sheet.indexed = true;
                        },
                        Ok(None) => {
                            warn!("sheet '{}': unusable INDEX, reading every record", sheet.info.name)
                        },
                        Err(e) => warn!(
                            "sheet '{}': INDEX leads to a bad record ({}), reading every record",
                            sheet.info.name, e
                        ),
                    }
                    stream.seek(resume)?;
                },
                BiffRecord::Dimensions(d) => {
                    declared_rows = d.last_row;
                    declared_cols = d.last_col as usize;
                },
                BiffRecord::DefaultRowHeight(twips) => {
                    sheet.default_row_height = twips_to_points(twips)
                },
                BiffRecord::ColInfo(info) => sheet.column_info.push(info),
                BiffRecord::MergeCells(ranges) => sheet.merged_cells.extend(ranges),
                BiffRecord::Header(h) => sheet.header = h.map(|s| s.into_string(&enc)),
                BiffRecord::Footer(f) => sheet.footer = f.map(|s| s.into_string(&enc)),
                BiffRecord::CodeName(name) => sheet.code_name = Some(name.into_string(&enc)),
                _ => {},
            }
        }

        if seen_rows > declared_rows || seen_cols > declared_cols {
            debug!(
                "sheet '{}': DIMENSIONS says {}x{}, cells reach {}x{}",
                sheet.info.name, declared_rows, declared_cols, seen_rows, seen_cols
            );
        }
        sheet.row_count = declared_rows.max(seen_rows);
        sheet.field_count = declared_cols.max(seen_cols);
        debug!(
            "sheet '{}': {} rows, {} fields, {} rows with data",
            sheet.info.name,
            sheet.row_count,
            sheet.field_count,
            sheet.spans.len()
        );
        Ok(sheet)
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Whether row offsets came from the sheet's INDEX and DBCELL records
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Iterate the rows, decoding a block at a time
    pub fn rows(&self) -> RowIter<'a> {
        self.clone().into_rows()
    }

    pub fn into_rows(self) -> RowIter<'a> {
        RowIter {
            sheet: self,
            next_row: 0,
            pending: VecDeque::new(),
            failed: false,
        }
    }

    fn empty_row(&self, index: u32) -> Row {
        Row {
            index,
            height: self.default_row_height,
            values: vec![CellValue::Empty; self.field_count],
        }
    }

    /// Decode rows `first..last` with a single seek
    fn read_block(&mut self, first: u32, last: u32) -> XlsResult<Vec<Row>> {
        let mut rows: Vec<Row> = (first..last).map(|i| self.empty_row(i)).collect();
        let span = self
            .spans
            .range(first..last)
            .map(|(_, s)| *s)
            .reduce(|a, b| RowSpan {
                min: a.min.min(b.min),
                max: a.max.max(b.max),
            });
        let Some(span) = span else {
            return Ok(rows);
        };
        trace!("rows {}..{}: bytes {}..={}", first, last, span.min, span.max);

        self.stream.seek(span.min)?;
        while self.stream.position() <= span.max {
            let Some(record) = self.stream.read()? else {
                break;
            };
            let Some(row) = record.row().filter(|r| (first..last).contains(r)) else {
                if matches!(record, BiffRecord::Bof(_)) {
                    skip_substream(&mut self.stream)?;
                }
                continue;
            };
            let slot = (row - first) as usize;
            match record {
                BiffRecord::Row(r) => {
                    rows[slot].height = if r.default_height {
                        self.default_row_height
                    } else {
                        twips_to_points(r.height)
                    };
                },
                BiffRecord::MulRk {
                    first_col, values, ..
                } => {
                    for (i, (xf, v)) in values.into_iter().enumerate() {
                        let value = self.number(xf, v);
                        self.place(&mut rows[slot], first_col as usize + i, value);
                    }
                },
                BiffRecord::MulBlank { .. } => {},
                BiffRecord::Formula {
                    cell,
                    result: FormulaResult::String,
                } => {
                    let text = self.formula_string()?;
                    self.place(&mut rows[slot], cell.col as usize, CellValue::Text(text));
                },
                other => {
                    if let Some((col, value)) = self.cell_value(other) {
                        self.place(&mut rows[slot], col, value);
                    }
                },
            }
        }
        Ok(rows)
    }

    fn place(&self, row: &mut Row, col: usize, value: CellValue) {
        if let Some(slot) = row.values.get_mut(col) {
            *slot = value;
        }
    }

    /// Text of a string-valued formula, held in the STRING record after it
    fn formula_string(&mut self) -> XlsResult<String> {
        loop {
            let at = self.stream.position();
            match self.stream.read()? {
                Some(BiffRecord::String(s)) => return Ok(s.into_string(&self.globals.encoding)),
                Some(BiffRecord::SharedFormula) => continue,
                Some(BiffRecord::Unknown { id, .. }) if matches!(id, ARRAY | ARRAY_BIFF2 | TABLE) => {
                    continue;
                },
                Some(_) => {
                    warn!("string formula at {} has no STRING record", at);
                    self.stream.seek(at)?;
                    return Ok(String::new());
                },
                None => return Ok(String::new()),
            }
        }
    }

    fn number(&self, xf_index: u16, value: f64) -> CellValue {
        let Some(format_index) = self.globals.format_index(xf_index) else {
            return CellValue::Number(value);
        };
        let code = self.globals.format_code(format_index);
        if self.classifier.is_date(format_index, code) {
            if let Some(dt) = utils::serial_to_datetime(value, self.globals.is_date_1904) {
                return CellValue::DateTime(dt);
            }
        }
        CellValue::Number(value)
    }

    fn cell_value(&self, record: BiffRecord) -> Option<(usize, CellValue)> {
        let enc = &self.globals.encoding;
        let (cell, value) = match record {
            BiffRecord::Blank(cell) => (cell, CellValue::Empty),
            BiffRecord::Integer { cell, value } => (cell, self.number(cell.xf_index, value as f64)),
            BiffRecord::Number { cell, value } | BiffRecord::Rk { cell, value } => {
                (cell, self.number(cell.xf_index, value))
            },
            BiffRecord::Label { cell, value } | BiffRecord::RString { cell, value } => {
                (cell, CellValue::Text(value.into_string(enc)))
            },
            BiffRecord::LabelSst { cell, index } => {
                let text = self.globals.shared_strings.get(index as usize);
                if text.is_none() {
                    warn!("shared string {} out of range at row {}", index, cell.row);
                }
                (cell, text.map_or(CellValue::Empty, |s| CellValue::Text(s.clone())))
            },
            BiffRecord::BoolErr { cell, value } => match value {
                BoolErrValue::Bool(b) => (cell, CellValue::Bool(b)),
                BoolErrValue::Error(code) => (cell, CellValue::Error(CellError::from(code))),
            },
            BiffRecord::Formula { cell, result } => match result {
                FormulaResult::Number(v) => (cell, self.number(cell.xf_index, v)),
                FormulaResult::Bool(b) => (cell, CellValue::Bool(b)),
                FormulaResult::Error(code) => (cell, CellValue::Error(CellError::from(code))),
                FormulaResult::EmptyString | FormulaResult::String => {
                    (cell, CellValue::Text(String::new()))
                },
            },
            _ => return None,
        };
        Some((cell.col as usize, value))
    }
}

/// Skip an embedded BOF..EOF substream whose BOF was just read
fn skip_substream(stream: &mut BiffStream) -> XlsResult<()> {
    let mut depth = 1usize;
    while depth > 0 {
        match stream.read()? {
            Some(BiffRecord::Bof(_)) => depth += 1,
            Some(BiffRecord::Eof) => depth -= 1,
            Some(_) => {},
            None => break,
        }
    }
    Ok(())
}

/// Iterator over a worksheet's rows.
///
/// Every index in `0..row_count` yields a row; rows without records come
/// back empty at the default height. The first error ends iteration.
#[derive(Debug)]
pub struct RowIter<'a> {
    sheet: Worksheet<'a>,
    next_row: u32,
    pending: VecDeque<Row>,
    failed: bool,
}

impl Iterator for RowIter<'_> {
    type Item = XlsResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.pending.pop_front() {
            return Some(Ok(row));
        }
        if self.failed || self.next_row >= self.sheet.row_count {
            return None;
        }
        let first = self.next_row;
        let last = first.saturating_add(ROWS_PER_BLOCK).min(self.sheet.row_count);
        self.next_row = last;
        match self.sheet.read_block(first, last) {
            Ok(rows) => {
                self.pending.extend(rows);
                self.pending.pop_front().map(Ok)
            },
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            },
        }
    }
}
