//! BIFF record stream fixtures for tests.
//!
//! Writers for individual record payloads, a shared string table writer
//! that splits across CONTINUE records wherever it is told to, a BIFF8
//! workbook layout helper, and FILEPASS/encryption helpers for every
//! supported scheme.

use super::consts::*;
use super::crypto::rc4::{self, Rc4};
use super::crypto::{Cipher, EncryptionInfo, xor};
use super::records::BiffVersion;
use super::stream::clear_prefix;

#[derive(Debug, Default)]
pub(crate) struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return the offset of its header
    pub fn record(&mut self, id: u16, payload: &[u8]) -> u64 {
        let at = self.buf.len() as u64;
        self.buf.extend_from_slice(&id.to_le_bytes());
        self.buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        self.buf.extend_from_slice(payload);
        at
    }

    pub fn records(&mut self, records: &[(u16, Vec<u8>)]) {
        for (id, payload) in records {
            self.record(*id, payload);
        }
    }

    pub fn position(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn patch_u32(&mut self, at: usize, value: u32) {
        self.buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

pub(crate) fn bof_biff8(dt: u16) -> Vec<u8> {
    let mut v = Vec::with_capacity(16);
    v.extend_from_slice(&0x0600u16.to_le_bytes());
    v.extend_from_slice(&dt.to_le_bytes());
    v.extend_from_slice(&0x0DBBu16.to_le_bytes());
    v.extend_from_slice(&0x07CCu16.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    v.extend_from_slice(&0x0006u32.to_le_bytes());
    v
}

pub(crate) fn bof_biff5(dt: u16) -> Vec<u8> {
    let mut v = Vec::with_capacity(8);
    v.extend_from_slice(&0x0500u16.to_le_bytes());
    v.extend_from_slice(&dt.to_le_bytes());
    v.extend_from_slice(&0x0DBBu16.to_le_bytes());
    v.extend_from_slice(&0x07CCu16.to_le_bytes());
    v
}

pub(crate) fn bof_biff2() -> Vec<u8> {
    let mut v = 0x0002u16.to_le_bytes().to_vec();
    v.extend_from_slice(&0x0010u16.to_le_bytes());
    v
}

/// `XLUnicodeString`: compressed when every unit fits a byte
pub(crate) fn unicode_string(s: &str) -> Vec<u8> {
    let units: Vec<u16> = s.encode_utf16().collect();
    let mut v = (units.len() as u16).to_le_bytes().to_vec();
    if units.iter().all(|&u| u <= 0xFF) {
        v.push(0x00);
        v.extend(units.iter().map(|&u| u as u8));
    } else {
        v.push(0x01);
        v.extend(units.iter().flat_map(|u| u.to_le_bytes()));
    }
    v
}

pub(crate) fn byte_string(s: &[u8]) -> Vec<u8> {
    let mut v = vec![s.len() as u8];
    v.extend_from_slice(s);
    v
}

fn cell_header(row: u16, col: u16, xf: u16) -> Vec<u8> {
    let mut v = Vec::with_capacity(16);
    v.extend_from_slice(&row.to_le_bytes());
    v.extend_from_slice(&col.to_le_bytes());
    v.extend_from_slice(&xf.to_le_bytes());
    v
}

pub(crate) fn number(row: u16, col: u16, xf: u16, value: f64) -> (u16, Vec<u8>) {
    let mut v = cell_header(row, col, xf);
    v.extend_from_slice(&value.to_le_bytes());
    (NUMBER, v)
}

pub(crate) fn label_sst(row: u16, col: u16, index: u32) -> (u16, Vec<u8>) {
    let mut v = cell_header(row, col, 0);
    v.extend_from_slice(&index.to_le_bytes());
    (LABELSST, v)
}

pub(crate) fn label8(row: u16, col: u16, text: &str) -> (u16, Vec<u8>) {
    let mut v = cell_header(row, col, 0);
    v.extend(unicode_string(text));
    (LABEL, v)
}

pub(crate) fn label5(row: u16, col: u16, text: &[u8]) -> (u16, Vec<u8>) {
    let mut v = cell_header(row, col, 0);
    v.extend_from_slice(&(text.len() as u16).to_le_bytes());
    v.extend_from_slice(text);
    (LABEL, v)
}

pub(crate) fn bool_err(row: u16, col: u16, value: u8, is_error: bool) -> (u16, Vec<u8>) {
    let mut v = cell_header(row, col, 0);
    v.push(value);
    v.push(is_error as u8);
    (BOOLERR, v)
}

pub(crate) fn rk_int(value: i32) -> u32 {
    ((value << 2) as u32) | 0x02
}

pub(crate) fn rk(row: u16, col: u16, xf: u16, rk: u32) -> (u16, Vec<u8>) {
    let mut v = cell_header(row, col, xf);
    v.extend_from_slice(&rk.to_le_bytes());
    (RK, v)
}

pub(crate) fn mulrk(row: u16, first_col: u16, values: &[u32]) -> (u16, Vec<u8>) {
    let mut v = row.to_le_bytes().to_vec();
    v.extend_from_slice(&first_col.to_le_bytes());
    for rk in values {
        v.extend_from_slice(&0u16.to_le_bytes());
        v.extend_from_slice(&rk.to_le_bytes());
    }
    let last_col = (first_col as usize + values.len()).saturating_sub(1) as u16;
    v.extend_from_slice(&last_col.to_le_bytes());
    (MULRK, v)
}

pub(crate) fn mulblank(row: u16, first_col: u16, count: u16) -> (u16, Vec<u8>) {
    let mut v = row.to_le_bytes().to_vec();
    v.extend_from_slice(&first_col.to_le_bytes());
    for _ in 0..count {
        v.extend_from_slice(&0u16.to_le_bytes());
    }
    let last_col = (first_col as usize + count as usize).saturating_sub(1) as u16;
    v.extend_from_slice(&last_col.to_le_bytes());
    (MULBLANK, v)
}

/// FORMULA whose cached result is a string held in the next STRING record
pub(crate) fn formula_string(row: u16, col: u16) -> (u16, Vec<u8>) {
    let mut v = cell_header(row, col, 0);
    v.extend_from_slice(&[0x00, 0, 0, 0, 0, 0, 0xFF, 0xFF]);
    v.extend_from_slice(&[0; 6]);
    (FORMULA, v)
}

pub(crate) fn string8(text: &str) -> (u16, Vec<u8>) {
    (STRING, unicode_string(text))
}

pub(crate) fn row_record(row: u16, last_col: u16, height_twips: u16) -> (u16, Vec<u8>) {
    let mut v = row.to_le_bytes().to_vec();
    v.extend_from_slice(&0u16.to_le_bytes());
    v.extend_from_slice(&last_col.to_le_bytes());
    v.extend_from_slice(&height_twips.to_le_bytes());
    v.extend_from_slice(&[0; 8]);
    (ROW, v)
}

/// BIFF8 DIMENSIONS; last row and column are exclusive
pub(crate) fn dimensions8(last_row: u32, last_col: u16) -> (u16, Vec<u8>) {
    let mut v = 0u32.to_le_bytes().to_vec();
    v.extend_from_slice(&last_row.to_le_bytes());
    v.extend_from_slice(&0u16.to_le_bytes());
    v.extend_from_slice(&last_col.to_le_bytes());
    v.extend_from_slice(&0u16.to_le_bytes());
    (DIMENSIONS, v)
}

pub(crate) fn xf8(format_index: u16) -> (u16, Vec<u8>) {
    let mut v = 0u16.to_le_bytes().to_vec();
    v.extend_from_slice(&format_index.to_le_bytes());
    v.resize(20, 0);
    (XF, v)
}

pub(crate) fn format8(index: u16, code: &str) -> (u16, Vec<u8>) {
    let mut v = index.to_le_bytes().to_vec();
    v.extend(unicode_string(code));
    (FORMAT, v)
}

/// BIFF8 INDEX with `blocks` DBCELL slots left for [`fill_row_index`]
pub(crate) fn index8(first_row: u32, last_row: u32, blocks: usize) -> (u16, Vec<u8>) {
    let mut v = 0u32.to_le_bytes().to_vec();
    v.extend_from_slice(&first_row.to_le_bytes());
    v.extend_from_slice(&last_row.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    v.resize(16 + 4 * blocks, 0);
    (INDEX, v)
}

/// DBCELL closing a block of `rows` ROW records, offsets left for
/// [`fill_row_index`]
pub(crate) fn dbcell(rows: usize) -> (u16, Vec<u8>) {
    (DBCELL, vec![0; 4 + 2 * rows])
}

/// Filler record no reader gives meaning to
pub(crate) fn filler(len: usize) -> (u16, Vec<u8>) {
    (0x0862, vec![0x5A; len])
}

/// Fill in every INDEX and DBCELL placeholder of a laid out stream, the way
/// a writer would once record positions are known.
pub(crate) fn fill_row_index(stream: &mut [u8]) {
    let mut slots: Vec<usize> = Vec::new();
    let mut rows: Vec<(u16, usize)> = Vec::new();
    let mut first_cells: Vec<(u16, usize)> = Vec::new();
    let mut pos = 0usize;
    while pos + RECORD_HEADER_SIZE <= stream.len() {
        let id = u16::from_le_bytes([stream[pos], stream[pos + 1]]);
        let size = u16::from_le_bytes([stream[pos + 2], stream[pos + 3]]) as usize;
        let start = pos + RECORD_HEADER_SIZE;
        match id {
            INDEX => {
                slots = (start + 16..start + size).step_by(4).rev().collect();
            },
            ROW => {
                let row = u16::from_le_bytes([stream[start], stream[start + 1]]);
                rows.push((row, pos));
            },
            BLANK | NUMBER | LABEL | RSTRING | LABELSST | RK | MULRK | MULBLANK | BOOLERR
            | FORMULA => {
                let row = u16::from_le_bytes([stream[start], stream[start + 1]]);
                if !first_cells.iter().any(|&(r, _)| r == row) {
                    first_cells.push((row, pos));
                }
            },
            DBCELL => {
                let (_, first_row) = rows[0];
                stream[start..start + 4].copy_from_slice(&((pos - first_row) as u32).to_le_bytes());
                let mut base = first_row + RECORD_HEADER_SIZE + 16;
                for (k, (row, _)) in rows.iter().enumerate() {
                    let delta = match first_cells.iter().find(|(r, _)| r == row) {
                        Some(&(_, at)) => {
                            let delta = at - base;
                            base = at;
                            delta as u16
                        },
                        None => 0,
                    };
                    let at = start + 4 + 2 * k;
                    stream[at..at + 2].copy_from_slice(&delta.to_le_bytes());
                }
                if let Some(slot) = slots.pop() {
                    stream[slot..slot + 4].copy_from_slice(&(pos as u32).to_le_bytes());
                }
                rows.clear();
                first_cells.clear();
            },
            _ => {},
        }
        pos = start + size;
    }
}

/// A sheet: name plus the records between its BOF and EOF
#[derive(Debug, Clone, Default)]
pub(crate) struct SheetSpec {
    pub name: String,
    pub records: Vec<(u16, Vec<u8>)>,
}

impl SheetSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Vec::new(),
        }
    }

    pub fn with(mut self, record: (u16, Vec<u8>)) -> Self {
        self.records.push(record);
        self
    }
}

/// A BIFF8 workbook stream: globals (optional FILEPASS right after the BOF,
/// then `globals`, then one BOUNDSHEET per sheet) followed by each sheet's
/// substream.
pub(crate) fn workbook_biff8(
    filepass: Option<&[u8]>,
    globals: &[(u16, Vec<u8>)],
    sheets: &[SheetSpec],
) -> Vec<u8> {
    let mut w = RecordWriter::new();
    w.record(BOF, &bof_biff8(0x0005));
    if let Some(fp) = filepass {
        w.record(FILEPASS, fp);
    }
    w.records(globals);
    let mut position_fields = Vec::new();
    for sheet in sheets {
        let mut payload = vec![0, 0, 0, 0, 0, 0];
        payload.push(sheet.name.len() as u8);
        payload.push(0);
        payload.extend_from_slice(sheet.name.as_bytes());
        let at = w.record(BOUNDSHEET, &payload);
        position_fields.push(at as usize + RECORD_HEADER_SIZE);
    }
    w.record(EOF, &[]);

    for (sheet, field) in sheets.iter().zip(position_fields) {
        let start = w.position() as u32;
        w.patch_u32(field, start);
        w.record(BOF, &bof_biff8(0x0010));
        w.records(&sheet.records);
        w.record(EOF, &[]);
    }
    w.into_bytes()
}

/// Splits a shared string table into an SST record and CONTINUE records.
///
/// `limits` cycles through payload sizes; `choices` cycles through the
/// "store compressed strings as UTF-16 anyway" decision made at every
/// string start and every CONTINUE inside character data.
pub(crate) struct SstWriter<'a> {
    limits: &'a [usize],
    choices: &'a [bool],
    choice: usize,
    records: Vec<Vec<u8>>,
    cur: Vec<u8>,
}

impl<'a> SstWriter<'a> {
    pub fn new(limits: &'a [usize], choices: &'a [bool]) -> Self {
        Self {
            limits,
            choices,
            choice: 0,
            records: Vec::new(),
            cur: Vec::new(),
        }
    }

    fn limit(&self) -> usize {
        if self.limits.is_empty() {
            return 8224;
        }
        self.limits[self.records.len() % self.limits.len()].max(4)
    }

    fn next_choice(&mut self) -> bool {
        if self.choices.is_empty() {
            return false;
        }
        let c = self.choices[self.choice % self.choices.len()];
        self.choice += 1;
        c
    }

    fn flush(&mut self) {
        self.records.push(std::mem::take(&mut self.cur));
    }

    fn push_plain(&mut self, byte: u8) {
        if self.cur.len() >= self.limit() {
            self.flush();
        }
        self.cur.push(byte);
    }

    fn string(&mut self, s: &str, runs: u16, ext: u32) {
        let units: Vec<u16> = s.encode_utf16().collect();
        let wide_from = |i: usize| units[i..].iter().any(|&u| u > 0xFF);
        let mut high = units.iter().any(|&u| u > 0xFF) || self.next_choice();

        let mut flags = high as u8;
        if runs > 0 {
            flags |= 0x08;
        }
        if ext > 0 {
            flags |= 0x04;
        }
        let mut header = (units.len() as u16).to_le_bytes().to_vec();
        header.push(flags);
        if runs > 0 {
            header.extend_from_slice(&runs.to_le_bytes());
        }
        if ext > 0 {
            header.extend_from_slice(&ext.to_le_bytes());
        }
        for b in header {
            self.push_plain(b);
        }

        for (i, &unit) in units.iter().enumerate() {
            loop {
                let space = self.limit().saturating_sub(self.cur.len());
                if space == 0 || (high && space == 1) {
                    if space == 1 {
                        // Half a character: the reader drops it as padding
                        self.cur.push(unit as u8);
                    }
                    self.flush();
                    high = wide_from(i) || self.next_choice();
                    self.cur.push(high as u8);
                    continue;
                }
                if high {
                    self.cur.extend_from_slice(&unit.to_le_bytes());
                } else {
                    self.cur.push(unit as u8);
                }
                break;
            }
        }

        for i in 0..(runs as usize * 4 + ext as usize) {
            self.push_plain(i as u8);
        }
    }

    /// SST payload first, then CONTINUE payloads
    pub fn write(mut self, strings: &[(String, u16, u32)]) -> Vec<Vec<u8>> {
        let count = strings.len() as u32;
        self.cur.extend_from_slice(&count.to_le_bytes());
        self.cur.extend_from_slice(&count.to_le_bytes());
        for (s, runs, ext) in strings {
            self.string(s, *runs, *ext);
        }
        self.flush();
        self.records
    }
}

/// SST plus CONTINUE records as workbook records
pub(crate) fn sst_records(strings: &[&str], limit: usize) -> Vec<(u16, Vec<u8>)> {
    let owned: Vec<(String, u16, u32)> = strings.iter().map(|s| (s.to_string(), 0, 0)).collect();
    let limits = [limit];
    SstWriter::new(&limits, &[])
        .write(&owned)
        .into_iter()
        .enumerate()
        .map(|(i, payload)| (if i == 0 { SST } else { CONTINUE }, payload))
        .collect()
}

/// FILEPASS payload for XOR obfuscation with `password`
pub(crate) fn xor_filepass(version: BiffVersion, password: &str) -> Vec<u8> {
    let bytes = xor::password_bytes(password);
    let key = xor::create_key(&bytes);
    let verifier = xor::create_verifier(&bytes);
    let mut v = Vec::new();
    if version == BiffVersion::Biff8 {
        v.extend_from_slice(&0u16.to_le_bytes());
    }
    v.extend_from_slice(&key.to_le_bytes());
    v.extend_from_slice(&verifier.to_le_bytes());
    v
}

const TEST_VERIFIER: [u8; 16] = *b"0123456789abcdef";

/// FILEPASS payload for standard RC4 encryption
pub(crate) fn rc4_standard_filepass(password: &str, salt: [u8; 16]) -> Vec<u8> {
    let material = rc4::standard_key_material(password, &salt);
    let mut blob = TEST_VERIFIER.to_vec();
    blob.extend_from_slice(&rc4::md5_bytes(&TEST_VERIFIER));
    Rc4::new(&rc4::standard_block_key(&material, 0)).apply_keystream(&mut blob);

    let mut v = Vec::new();
    for field in [1u16, 1, 1] {
        v.extend_from_slice(&field.to_le_bytes());
    }
    v.extend_from_slice(&salt);
    v.extend_from_slice(&blob);
    v
}

/// FILEPASS payload for CryptoAPI RC4 encryption
pub(crate) fn cryptoapi_filepass(password: &str, salt: [u8; 16], key_bits: u32) -> Vec<u8> {
    let material = rc4::cryptoapi_key_material(password, &salt);
    let mut blob = TEST_VERIFIER.to_vec();
    blob.extend_from_slice(&rc4::sha1_bytes(&TEST_VERIFIER));
    let key = rc4::cryptoapi_block_key(&material, 0, (key_bits / 8) as usize);
    Rc4::new(&key).apply_keystream(&mut blob);

    let mut header = Vec::new();
    header.extend_from_slice(&0x24u32.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&0x6801u32.to_le_bytes());
    header.extend_from_slice(&0x8004u32.to_le_bytes());
    header.extend_from_slice(&key_bits.to_le_bytes());
    header.extend_from_slice(&1u32.to_le_bytes());
    header.extend_from_slice(&[0; 8]);
    header.extend_from_slice(&[0, 0]);

    let mut v = Vec::new();
    for field in [1u16, 2, 2] {
        v.extend_from_slice(&field.to_le_bytes());
    }
    v.extend_from_slice(&0x24u32.to_le_bytes());
    v.extend_from_slice(&(header.len() as u32).to_le_bytes());
    v.extend_from_slice(&header);
    v.extend_from_slice(&16u32.to_le_bytes());
    v.extend_from_slice(&salt);
    v.extend_from_slice(&blob[..16]);
    v.extend_from_slice(&20u32.to_le_bytes());
    v.extend_from_slice(&blob[16..]);
    v
}

/// Encrypt every record payload after the FILEPASS record in place, the
/// way a writer would, using the cipher `password` unlocks.
pub(crate) fn encrypt_stream(stream: &mut [u8], version: BiffVersion, password: &str) {
    let mut keystream = None;
    let mut cipher: Option<Cipher> = None;
    let mut pos = 0usize;
    while pos + RECORD_HEADER_SIZE <= stream.len() {
        let id = u16::from_le_bytes([stream[pos], stream[pos + 1]]);
        let size = u16::from_le_bytes([stream[pos + 2], stream[pos + 3]]) as usize;
        let start = pos + RECORD_HEADER_SIZE;
        let skip = clear_prefix(id, size);
        if let Some(c) = &cipher {
            if skip < size {
                let body = &mut stream[start + skip..start + size];
                match c {
                    Cipher::Xor { array } => xor::encrypt(array, body, (start + skip) as u64, size),
                    Cipher::Rc4(_) => c.decrypt(&mut keystream, body, (start + skip) as u64, size),
                }
            }
        }
        if id == FILEPASS && cipher.is_none() {
            let info = EncryptionInfo::parse(version, &stream[start..start + size]).unwrap();
            cipher = Some(info.verify(password).unwrap());
        }
        pos = start + size;
    }
}
