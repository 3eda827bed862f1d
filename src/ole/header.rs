//! Compound file header parsing.
//!
//! The first 512 bytes of a compound file describe the sector geometry and
//! where the FAT, MiniFAT, DIFAT and directory chains start. Some legacy
//! spreadsheets are not wrapped in a container at all and start directly
//! with a BIFF BOF record, so the raw-BIFF probe runs before the magic check.

use std::io::{ErrorKind, Read};

use log::debug;
use zerocopy::{FromBytes, LE, U16, U32};
use zerocopy_derive::FromBytes as DeriveFromBytes;

use super::consts::*;
use super::error::{HeaderError, OleError};
use crate::ole::xls::records::{BiffVersion, BofRecord};

/// On-disk layout of the 512-byte header.
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawHeader {
    signature: [u8; 8],
    clsid: [u8; 16],
    minor_version: U16<LE>,
    major_version: U16<LE>,
    byte_order: U16<LE>,
    sector_shift: U16<LE>,
    mini_sector_shift: U16<LE>,
    reserved: [u8; 6],
    dir_sector_count: U32<LE>,
    fat_sector_count: U32<LE>,
    first_dir_sector: U32<LE>,
    transaction_signature: U32<LE>,
    mini_stream_cutoff: U32<LE>,
    first_minifat_sector: U32<LE>,
    minifat_sector_count: U32<LE>,
    first_difat_sector: U32<LE>,
    difat_sector_count: U32<LE>,
    difat: [U32<LE>; HEADER_DIFAT_ENTRIES],
}

/// Parsed compound file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub major_version: u16,
    pub byte_order: u16,
    pub sector_shift: u16,
    pub mini_sector_shift: u16,
    pub fat_sector_count: u32,
    pub first_dir_sector: u32,
    pub mini_stream_cutoff: u32,
    pub first_minifat_sector: u32,
    pub minifat_sector_count: u32,
    pub first_difat_sector: u32,
    pub difat_sector_count: u32,
    /// The 109 FAT sector ids stored inline in the header
    pub difat: Vec<u32>,
}

impl Header {
    /// Size of a regular sector in bytes (512 or 4096)
    pub fn sector_size(&self) -> usize {
        1usize << self.sector_shift
    }

    /// Size of a mini sector in bytes (normally 64)
    pub fn mini_sector_size(&self) -> usize {
        1usize << self.mini_sector_shift
    }
}

/// What the first bytes of a file turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderProbe {
    /// A compound file; sectors and directory follow
    Container(Header),
    /// A bare BIFF stream with no container around it
    RawBiff(BiffVersion),
}

/// Read up to 512 bytes from `reader` and classify them.
///
/// Short files are fine as long as they are a complete raw BIFF stream; a
/// compound file shorter than its header fails with [`HeaderError::Truncated`].
pub fn read_header<R: Read>(reader: &mut R) -> Result<HeaderProbe, OleError> {
    let mut buf = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(OleError::Io(e)),
        }
    }
    Ok(probe_header(&buf[..filled])?)
}

/// Classify a header buffer without touching any sector data.
pub fn probe_header(bytes: &[u8]) -> Result<HeaderProbe, HeaderError> {
    if let Some(version) = probe_raw_biff(bytes)? {
        debug!("raw BIFF stream detected ({:?}), no container", version);
        return Ok(HeaderProbe::RawBiff(version));
    }

    if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
        return Err(HeaderError::BadSignature);
    }
    if bytes.len() < HEADER_SIZE {
        return Err(HeaderError::Truncated(bytes.len()));
    }

    let raw = RawHeader::read_from_bytes(&bytes[..HEADER_SIZE])
        .map_err(|_| HeaderError::Truncated(bytes.len()))?;

    let byte_order = raw.byte_order.get();
    if byte_order != BYTE_ORDER_LE && byte_order != BYTE_ORDER_BROKEN {
        return Err(HeaderError::BadByteOrder(byte_order));
    }

    let sector_shift = raw.sector_shift.get();
    if sector_shift != SECTOR_SHIFT_V3 && sector_shift != SECTOR_SHIFT_V4 {
        return Err(HeaderError::BadSectorShift(sector_shift));
    }
    let mini_sector_shift = raw.mini_sector_shift.get();
    if mini_sector_shift == 0 || mini_sector_shift >= sector_shift {
        return Err(HeaderError::BadSectorShift(mini_sector_shift));
    }

    let mini_stream_cutoff = match raw.mini_stream_cutoff.get() {
        0 => DEFAULT_MINI_CUTOFF,
        cutoff => cutoff,
    };

    let header = Header {
        major_version: raw.major_version.get(),
        byte_order,
        sector_shift,
        mini_sector_shift,
        fat_sector_count: raw.fat_sector_count.get(),
        first_dir_sector: raw.first_dir_sector.get(),
        mini_stream_cutoff,
        first_minifat_sector: raw.first_minifat_sector.get(),
        minifat_sector_count: raw.minifat_sector_count.get(),
        first_difat_sector: raw.first_difat_sector.get(),
        difat_sector_count: raw.difat_sector_count.get(),
        difat: raw.difat.iter().map(|v| v.get()).collect(),
    };

    debug!(
        "compound file v{}: sector {} bytes, mini sector {} bytes, {} FAT sectors, {} DIFAT sectors",
        header.major_version,
        header.sector_size(),
        header.mini_sector_size(),
        header.fat_sector_count,
        header.difat_sector_count
    );
    Ok(HeaderProbe::Container(header))
}

/// Recognise a leading BOF record of a bare BIFF2-8 stream.
///
/// Returns `Ok(None)` when the bytes do not look like BIFF at all, and an
/// error when they clearly are a BOF but of a version we cannot read.
fn probe_raw_biff(bytes: &[u8]) -> Result<Option<BiffVersion>, HeaderError> {
    if bytes.len() < 8 {
        return Ok(None);
    }
    let id = u16::from_le_bytes([bytes[0], bytes[1]]);
    let size = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    let dt = u16::from_le_bytes([bytes[6], bytes[7]]);

    let plausible = match id {
        0x0009 => size == 4 && matches!(dt, 0x0010 | 0x0020 | 0x0040),
        0x0209 | 0x0409 => size == 6 && matches!(dt, 0x0010 | 0x0020 | 0x0040 | 0x0100),
        0x0809 => (8..=20).contains(&size) && matches!(dt, 0x0005 | 0x0006 | 0x0010 | 0x0020 | 0x0040 | 0x0100),
        _ => false,
    };
    if !plausible {
        return Ok(None);
    }

    let payload_end = (4 + size).min(bytes.len());
    match BofRecord::parse(id, &bytes[4..payload_end]) {
        Ok(bof) => Ok(Some(bof.version)),
        Err(_) => Err(HeaderError::UnsupportedRawBiff(version)),
    }
}
