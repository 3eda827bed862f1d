//! Compound file reader.
//!
//! Ties the header, FAT, directory and stream reconstruction together behind
//! [`OleFile`], which looks streams up by name and reads them whole.

use std::io::{Read, Seek, SeekFrom};

use log::debug;
use once_cell::sync::OnceCell;

use super::directory::{Directory, DirectoryEntry};
use super::error::{HeaderError, OleError};
use super::header::{Header, HeaderProbe, read_header};
use super::sector::{SectorChain, build_fat, build_minifat};
use super::stream::{SectorSource, read_mini_stream, read_regular_stream};

/// Main OLE file parser structure
///
/// Holds the reader behind a lock together with the FAT and the directory
/// arena. The MiniFAT and the root stream's sector list are only built the
/// first time a mini stream is read.
#[derive(Debug)]
pub struct OleFile<R> {
    source: SectorSource<R>,
    header: Header,
    fat: SectorChain,
    directory: Directory,
    minifat: OnceCell<SectorChain>,
    root_sectors: OnceCell<Vec<u32>>,
}

impl<R: Read + Seek> OleFile<R> {
    /// Open and parse a compound file from a reader
    ///
    /// A bare BIFF stream is not a compound file and fails with
    /// [`HeaderError::BadSignature`]; use [`read_header`] to tell the two apart.
    pub fn open(reader: R) -> Result<Self, OleError> {
        Self::try_open(reader).map_err(|(err, _)| err)
    }

    /// Like [`OleFile::open`], but hands the reader back on failure.
    pub fn try_open(mut reader: R) -> Result<Self, (OleError, R)> {
        if let Err(e) = reader.seek(SeekFrom::Start(0)) {
            return Err((OleError::Io(e), reader));
        }
        match read_header(&mut reader) {
            Ok(HeaderProbe::Container(header)) => Self::with_header(reader, header),
            Ok(HeaderProbe::RawBiff(_)) => Err((HeaderError::BadSignature.into(), reader)),
            Err(err) => Err((err, reader)),
        }
    }

    /// Build sector tables and the directory for an already-validated header.
    pub fn with_header(reader: R, header: Header) -> Result<Self, (OleError, R)> {
        let source = SectorSource::new(reader, header.sector_size())?;
        match Self::load(&source, &header) {
            Ok((fat, directory)) => Ok(Self {
                source,
                header,
                fat,
                directory,
                minifat: OnceCell::new(),
                root_sectors: OnceCell::new(),
            }),
            Err(err) => Err((err, source.into_inner())),
        }
    }

    fn load(source: &SectorSource<R>, header: &Header) -> Result<(SectorChain, Directory), OleError> {
        let fat = build_fat(header, source)?;
        let dir_data = read_regular_stream(source, &fat, header.first_dir_sector, None)?;
        let directory =
            Directory::parse(&dir_data, header.sector_size(), header.mini_stream_cutoff)?;
        debug!(
            "directory loaded: {} entries, file size {} bytes",
            directory.entries().len(),
            source.file_len()
        );
        Ok((fat, directory))
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn fat(&self) -> &SectorChain {
        &self.fat
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn file_size(&self) -> u64 {
        self.source.file_len()
    }

    /// Case-insensitive lookup, first match wins
    pub fn find_entry_by_name(&self, name: &str) -> Option<&DirectoryEntry> {
        self.directory.find_entry_by_name(name)
    }

    /// Child entry indices of a storage, in sibling-tree order
    pub fn children(&self, index: usize) -> Result<Vec<usize>, OleError> {
        self.directory.children(index)
    }

    /// List every stream path below the root
    pub fn list_streams(&self) -> Result<Vec<Vec<String>>, OleError> {
        self.directory.stream_paths()
    }

    /// The MiniFAT, built on first use
    pub fn minifat(&self) -> Result<&SectorChain, OleError> {
        self.minifat
            .get_or_try_init(|| build_minifat(&self.header, &self.fat, &self.source))
    }

    fn root_sectors(&self) -> Result<&[u32], OleError> {
        self.root_sectors
            .get_or_try_init(|| self.fat.chain(self.directory.root().start_sector))
            .map(Vec::as_slice)
    }

    /// Reassemble the contents of a stream entry.
    pub fn read_entry(&self, entry: &DirectoryEntry) -> Result<Vec<u8>, OleError> {
        if !entry.is_stream() {
            return Err(OleError::NotAStream(entry.name.clone()));
        }
        if entry.size == 0 {
            return Ok(Vec::new());
        }
        if entry.is_mini {
            read_mini_stream(
                &self.source,
                self.minifat()?,
                self.header.mini_sector_size(),
                self.root_sectors()?,
                entry.start_sector,
                entry.size,
            )
        } else {
            read_regular_stream(&self.source, &self.fat, entry.start_sector, Some(entry.size))
        }
    }

    /// Open a stream by (case-insensitive) name and return its contents
    pub fn open_stream_by_name(&self, name: &str) -> Result<Vec<u8>, OleError> {
        let entry = self
            .find_entry_by_name(name)
            .ok_or_else(|| OleError::StreamNotFound(name.to_string()))?;
        self.read_entry(entry)
    }

    /// Give back the underlying reader
    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }
}

/// Check if a file/data is an OLE file by checking magic bytes
pub fn is_ole_file(data: &[u8]) -> bool {
    data.len() >= 8 && &data[..8] == super::consts::MAGIC
}
