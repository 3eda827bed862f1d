//! Workbook implementation for XLS files
//!
//! [`open`] locates the workbook stream (inside a compound file or as a bare
//! BIFF stream), resolves encryption and scans the globals substream once.
//! Worksheets are scanned lazily, one per [`XlsWorkbook::read_worksheet`]
//! call, over the same shared stream buffer.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Seek, SeekFrom};

use bytes::Bytes;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::codepage::XlsEncoding;
use super::error::{XlsError, XlsResult};
use super::format::{DefaultNumberFormats, NumberFormatClassifier};
use super::options::OpenOptions;
use super::records::{
    BiffRecord, BiffVersion, ExtendedFormat, SheetKind, SheetVisibility, StreamKind,
};
use super::sst::SstReader;
use super::stream::BiffStream;
use super::utils::XlsString;
use super::worksheet::{RowIter, Worksheet};
use crate::ole::{HeaderProbe, OleFile, read_header};

static DEFAULT_NUMBER_FORMATS: DefaultNumberFormats = DefaultNumberFormats;

/// Name given to the only sheet of a BIFF2-4 worksheet file
pub const SINGLE_SHEET_NAME: &str = "Sheet1";

/// A sheet listed in the workbook globals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetInfo {
    pub name: String,
    /// Stream offset of the sheet's BOF record
    pub position: u64,
    pub visibility: SheetVisibility,
    pub kind: SheetKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Font {
    /// Height in twips
    pub height: u16,
    pub name: String,
}

/// Everything the globals substream declares for the whole workbook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbookGlobals {
    pub sheets: Vec<SheetInfo>,
    /// Custom number formats by format index
    pub formats: BTreeMap<u16, String>,
    pub extended_formats: Vec<ExtendedFormat>,
    pub fonts: Vec<Font>,
    pub shared_strings: Vec<String>,
    pub biff_version: BiffVersion,
    pub encoding: XlsEncoding,
    pub is_date_1904: bool,
    pub code_name: Option<String>,
}

impl WorkbookGlobals {
    /// Number format index of an XF record
    pub fn format_index(&self, xf_index: u16) -> Option<u16> {
        self.extended_formats
            .get(xf_index as usize)
            .map(|xf| xf.format_index)
    }

    pub fn format_code(&self, format_index: u16) -> Option<&str> {
        self.formats.get(&format_index).map(String::as_str)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Failure from [`open`], handing the reader back unless the options asked
/// for it to be dropped.
pub struct OpenError<R> {
    pub error: XlsError,
    reader: Option<R>,
}

impl<R> OpenError<R> {
    fn new(error: XlsError, reader: R, options: &OpenOptions) -> Self {
        Self {
            error,
            reader: (!options.close_on_fail).then_some(reader),
        }
    }

    pub fn reader(&self) -> Option<&R> {
        self.reader.as_ref()
    }

    pub fn into_reader(self) -> Option<R> {
        self.reader
    }

    pub fn into_parts(self) -> (XlsError, Option<R>) {
        (self.error, self.reader)
    }
}

impl<R> fmt::Debug for OpenError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenError")
            .field("error", &self.error)
            .field("reader_returned", &self.reader.is_some())
            .finish()
    }
}

impl<R> fmt::Display for OpenError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<R> std::error::Error for OpenError<R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<R> From<OpenError<R>> for XlsError {
    fn from(err: OpenError<R>) -> Self {
        err.error
    }
}

/// An opened workbook: the scanned globals plus the decoder over the
/// workbook stream.
#[derive(Debug)]
pub struct XlsWorkbook<R> {
    reader: R,
    globals: WorkbookGlobals,
    stream: BiffStream,
}

/// Open a workbook from a compound file or a bare BIFF stream.
///
/// # Examples
///
/// ```no_run
/// use std::fs::File;
/// use litchi_xls::ole::xls::{OpenOptions, open};
///
/// let file = File::open("report.xls")?;
/// let workbook = open(file, &OpenOptions::new())?;
/// for row in workbook.read_worksheet_rows(0)? {
///     let row = row?;
///     println!("{}: {:?}", row.index, row.values);
/// }
/// # Ok::<(), litchi_xls::ole::xls::XlsError>(())
/// ```
pub fn open<R: Read + Seek>(
    mut reader: R,
    options: &OpenOptions,
) -> Result<XlsWorkbook<R>, OpenError<R>> {
    let probe = reader
        .seek(SeekFrom::Start(0))
        .map_err(XlsError::from)
        .and_then(|_| read_header(&mut reader).map_err(XlsError::from));
    let probe = match probe {
        Ok(probe) => probe,
        Err(e) => return Err(OpenError::new(e, reader, options)),
    };

    let (data, reader) = match probe {
        HeaderProbe::Container(header) => {
            let ole = OleFile::with_header(reader, header)
                .map_err(|(e, r)| OpenError::new(e.into(), r, options))?;
            let data = workbook_stream(&ole);
            let reader = ole.into_inner();
            match data {
                Ok(data) => (data, reader),
                Err(e) => return Err(OpenError::new(e, reader, options)),
            }
        },
        HeaderProbe::RawBiff(version) => {
            debug!("reading bare {:?} stream", version);
            let mut data = Vec::new();
            let read = reader
                .seek(SeekFrom::Start(0))
                .and_then(|_| reader.read_to_end(&mut data));
            if let Err(e) = read {
                return Err(OpenError::new(e.into(), reader, options));
            }
            (data, reader)
        },
    };

    match scan_globals(Bytes::from(data), options) {
        Ok((globals, stream)) => Ok(XlsWorkbook {
            reader,
            globals,
            stream,
        }),
        Err(e) => Err(OpenError::new(e, reader, options)),
    }
}

fn workbook_stream<R: Read + Seek>(ole: &OleFile<R>) -> XlsResult<Vec<u8>> {
    let entry = ole
        .find_entry_by_name("Workbook")
        .or_else(|| ole.find_entry_by_name("Book"))
        .ok_or(XlsError::MissingWorkbookStream)?;
    if !entry.is_stream() {
        return Err(XlsError::MissingWorkbookStream);
    }
    debug!("workbook stream '{}' ({} bytes)", entry.name, entry.size);
    Ok(ole.read_entry(entry)?)
}

/// Globals records gathered before string decoding
struct GlobalsBuilder {
    sheets: Vec<(XlsString, u64, SheetVisibility, SheetKind)>,
    formats: Vec<(u16, XlsString)>,
    extended_formats: Vec<ExtendedFormat>,
    fonts: Vec<(u16, XlsString)>,
    shared_strings: Vec<String>,
    encoding: XlsEncoding,
    is_date_1904: bool,
    code_name: Option<XlsString>,
    sst: Option<SstReader>,
}

impl GlobalsBuilder {
    fn end_sst(&mut self) {
        if let Some(mut sst) = self.sst.take() {
            if let Some(partial) = sst.flush() {
                warn!("shared string table ended inside a string");
                self.shared_strings.push(partial);
            }
        }
    }
}

fn scan_globals(data: Bytes, options: &OpenOptions) -> XlsResult<(WorkbookGlobals, BiffStream)> {
    let mut stream = BiffStream::open(data, options.password.as_deref())?;
    let version = stream.version();
    let single_sheet = stream.kind() != StreamKind::WorkbookGlobals;

    let mut b = GlobalsBuilder {
        sheets: Vec::new(),
        formats: Vec::new(),
        extended_formats: Vec::new(),
        fonts: Vec::new(),
        shared_strings: Vec::new(),
        encoding: if version.supports_unicode() {
            XlsEncoding::Utf16Le
        } else {
            XlsEncoding::from_codepage(options.fallback_codepage)
        },
        is_date_1904: false,
        code_name: None,
        sst: None,
    };

    let mut depth = 0usize;
    while let Some(record) = stream.read()? {
        if !matches!(record, BiffRecord::Continue(_)) {
            b.end_sst();
        }
        match record {
            BiffRecord::Bof(_) => depth += 1,
            BiffRecord::Eof => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            },
            _ if depth > 1 => {},
            BiffRecord::Codepage(cp) => b.encoding = XlsEncoding::from_codepage(cp),
            BiffRecord::Date1904(flag) => b.is_date_1904 = flag,
            BiffRecord::BoundSheet(sheet) => b.sheets.push((
                sheet.name,
                sheet.position as u64,
                sheet.visibility,
                sheet.kind,
            )),
            BiffRecord::Format(format) => {
                let index = format.index.unwrap_or(b.formats.len() as u16);
                b.formats.push((index, format.code));
            },
            BiffRecord::Xf(xf) => b.extended_formats.push(xf),
            BiffRecord::Font(font) => b.fonts.push((font.height, font.name)),
            BiffRecord::CodeName(name) => b.code_name = Some(name),
            BiffRecord::Sst(payload) => {
                let mut sst = SstReader::new();
                b.shared_strings.extend(sst.read_strings_from_sst(&payload));
                b.sst = Some(sst);
            },
            BiffRecord::Continue(payload) => {
                if let Some(sst) = b.sst.as_mut() {
                    b.shared_strings
                        .extend(sst.read_strings_from_continue(&payload));
                }
            },
            _ => {},
        }
    }
    b.end_sst();

    let enc = b.encoding;
    let sheets = if single_sheet {
        vec![SheetInfo {
            name: SINGLE_SHEET_NAME.to_string(),
            position: 0,
            visibility: SheetVisibility::Visible,
            kind: SheetKind::Worksheet,
        }]
    } else {
        b.sheets
            .into_iter()
            .map(|(name, position, visibility, kind)| SheetInfo {
                name: name.into_string(&enc),
                position,
                visibility,
                kind,
            })
            .collect()
    };

    let globals = WorkbookGlobals {
        sheets,
        formats: b
            .formats
            .into_iter()
            .map(|(i, code)| (i, code.into_string(&enc)))
            .collect(),
        extended_formats: b.extended_formats,
        fonts: b
            .fonts
            .into_iter()
            .map(|(height, name)| Font {
                height,
                name: name.into_string(&enc),
            })
            .collect(),
        shared_strings: b.shared_strings,
        biff_version: version,
        encoding: enc,
        is_date_1904: b.is_date_1904,
        code_name: b.code_name.map(|n| n.into_string(&enc)),
    };
    debug!(
        "globals: {:?}, {} sheets, {} shared strings, {} formats",
        version,
        globals.sheets.len(),
        globals.shared_strings.len(),
        globals.formats.len()
    );
    Ok((globals, stream))
}

impl<R> XlsWorkbook<R> {
    pub fn globals(&self) -> &WorkbookGlobals {
        &self.globals
    }

    pub fn biff_version(&self) -> BiffVersion {
        self.globals.biff_version
    }

    pub fn is_encrypted(&self) -> bool {
        self.stream.is_encrypted()
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.globals.sheet_names()
    }

    /// Scan a worksheet using the built-in date detection
    pub fn read_worksheet(&self, index: usize) -> XlsResult<Worksheet<'_>> {
        self.worksheet_with(index, &DEFAULT_NUMBER_FORMATS)
    }

    /// Scan a worksheet, deciding date cells with `classifier`
    pub fn worksheet_with<'a>(
        &'a self,
        index: usize,
        classifier: &'a dyn NumberFormatClassifier,
    ) -> XlsResult<Worksheet<'a>> {
        let info = self
            .globals
            .sheets
            .get(index)
            .ok_or(XlsError::WorksheetNotFound(index))?;
        Worksheet::scan(info.clone(), &self.globals, classifier, &self.stream)
    }

    /// Rows of a worksheet, decoded a block at a time
    pub fn read_worksheet_rows(&self, index: usize) -> XlsResult<RowIter<'_>> {
        Ok(self.read_worksheet(index)?.into_rows())
    }

    /// Give back the reader the workbook was opened from
    pub fn into_inner(self) -> R {
        self.reader
    }
}
