//! Logical stream reconstruction from physically scattered sectors.
//!
//! A chain of sector ids is first mapped to byte extents in the file, with
//! physically adjacent sectors merged into one extent, and each extent is
//! then served by a single seek + read under the reader lock. Mini streams
//! live inside the root entry's regular stream, so each mini sector is
//! translated through the root stream's own sector list to a file offset.

use std::io::{Read, Seek, SeekFrom};

use log::trace;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::error::OleError;
use super::sector::SectorChain;

/// A contiguous byte range in the underlying file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub offset: u64,
    pub len: usize,
}

/// Shared access to the underlying reader.
///
/// Every physical seek + read happens while holding the lock, so structures
/// built on different call paths (FAT, directory, lazily-loaded MiniFAT) can
/// share one handle.
#[derive(Debug)]
pub struct SectorSource<R> {
    reader: Mutex<R>,
    sector_size: usize,
    file_len: u64,
}

impl<R: Read + Seek> SectorSource<R> {
    pub fn new(mut reader: R, sector_size: usize) -> Result<Self, (OleError, R)> {
        let file_len = match reader.seek(SeekFrom::End(0)) {
            Ok(len) => len,
            Err(e) => return Err((OleError::Io(e), reader)),
        };
        Ok(Self {
            reader: Mutex::new(reader),
            sector_size,
            file_len,
        })
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Whole regular sectors after the header
    pub fn sector_count(&self) -> u32 {
        let sectors = (self.file_len / self.sector_size as u64).saturating_sub(1);
        u32::try_from(sectors).unwrap_or(u32::MAX)
    }

    /// File offset of a regular sector: the header occupies sector "-1".
    pub fn sector_offset(&self, sector: u32) -> u64 {
        (sector as u64 + 1) * self.sector_size as u64
    }

    /// Read one whole sector.
    pub fn read_sector(&self, sector: u32) -> Result<Vec<u8>, OleError> {
        let extent = Extent {
            offset: self.sector_offset(sector),
            len: self.sector_size,
        };
        let data = self.read_extents(&[extent], self.sector_size)?;
        if data.len() < self.sector_size {
            return Err(OleError::corrupt(format!("sector {} truncated", sector)));
        }
        Ok(data)
    }

    /// Read `extents` in order until `limit` bytes are collected.
    ///
    /// An extent starting past the end of the file is corruption; one that
    /// is cut short by the end of the file yields whatever bytes exist and
    /// stops, leaving the length check to the caller.
    pub fn read_extents(&self, extents: &[Extent], limit: usize) -> Result<Vec<u8>, OleError> {
        let mut out = Vec::with_capacity(limit);
        let mut reader = self.reader.lock();
        for extent in extents {
            if out.len() >= limit {
                break;
            }
            if extent.offset >= self.file_len {
                return Err(OleError::corrupt(format!(
                    "sector data at offset {} lies beyond end of file ({} bytes)",
                    extent.offset, self.file_len
                )));
            }
            let available = (self.file_len - extent.offset).min(extent.len as u64) as usize;
            let take = available.min(limit - out.len());

            reader.seek(SeekFrom::Start(extent.offset))?;
            let start = out.len();
            out.resize(start + take, 0);
            reader
                .read_exact(&mut out[start..])
                .map_err(|e| OleError::truncated("short read inside sector run", e))?;

            if available < extent.len {
                break;
            }
        }
        Ok(out)
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

/// Map a regular sector chain to coalesced file extents.
pub fn regular_extents(sectors: &[u32], sector_size: usize) -> Vec<Extent> {
    let mut extents: Vec<Extent> = Vec::new();
    for &sector in sectors {
        let offset = (sector as u64 + 1) * sector_size as u64;
        push_coalesced(&mut extents, offset, sector_size);
    }
    extents
}

/// Map a mini sector chain to coalesced file extents.
///
/// `root_sectors` is the regular chain of the root entry, which holds the
/// mini stream.
pub fn mini_extents(
    mini_sectors: &[u32],
    mini_sector_size: usize,
    root_sectors: &[u32],
    sector_size: usize,
) -> Result<Vec<Extent>, OleError> {
    let mut extents: Vec<Extent> = Vec::new();
    for &mini in mini_sectors {
        let byte_offset = mini as usize * mini_sector_size;
        let index = byte_offset / sector_size;
        let within = byte_offset % sector_size;
        let root_sector = *root_sectors.get(index).ok_or_else(|| {
            OleError::corrupt(format!(
                "mini sector {} lies beyond the root stream ({} sectors)",
                mini,
                root_sectors.len()
            ))
        })?;
        let offset = (root_sector as u64 + 1) * sector_size as u64 + within as u64;
        push_coalesced(&mut extents, offset, mini_sector_size);
    }
    Ok(extents)
}

fn push_coalesced(extents: &mut Vec<Extent>, offset: u64, len: usize) {
    if let Some(last) = extents.last_mut()
        && last.offset + last.len as u64 == offset
    {
        last.len += len;
        return;
    }
    extents.push(Extent { offset, len });
}

/// Reassemble a regular stream of `size` bytes (or the whole chain when
/// `size` is `None`).
pub fn read_regular_stream<R: Read + Seek>(
    source: &SectorSource<R>,
    fat: &SectorChain,
    start: u32,
    size: Option<u64>,
) -> Result<Vec<u8>, OleError> {
    let sectors = fat.chain(start)?;
    trace!(
        "stream at sector {}: {} sectors in {} runs",
        start,
        sectors.len(),
        sector_runs(&sectors).len()
    );
    let capacity = sectors.len() * source.sector_size();
    let wanted = checked_size(size, capacity, start)?;
    let extents = regular_extents(&sectors, source.sector_size());
    let data = source.read_extents(&extents, wanted)?;
    if data.len() < wanted {
        return Err(OleError::corrupt(format!(
            "stream at sector {} truncated: {} of {} bytes present",
            start,
            data.len(),
            wanted
        )));
    }
    Ok(data)
}

/// Reassemble a mini stream of `size` bytes.
pub fn read_mini_stream<R: Read + Seek>(
    source: &SectorSource<R>,
    minifat: &SectorChain,
    mini_sector_size: usize,
    root_sectors: &[u32],
    start: u32,
    size: u64,
) -> Result<Vec<u8>, OleError> {
    let sectors = minifat.chain(start)?;
    let wanted = checked_size(Some(size), sectors.len() * mini_sector_size, start)?;
    let extents = mini_extents(&sectors, mini_sector_size, root_sectors, source.sector_size())?;
    let data = source.read_extents(&extents, wanted)?;
    if data.len() < wanted {
        return Err(OleError::corrupt(format!(
            "mini stream at sector {} truncated: {} of {} bytes present",
            start,
            data.len(),
            wanted
        )));
    }
    Ok(data)
}

fn checked_size(size: Option<u64>, capacity: usize, start: u32) -> Result<usize, OleError> {
    match size {
        None => Ok(capacity),
        Some(size) if size <= capacity as u64 => Ok(size as usize),
        Some(size) => Err(OleError::corrupt(format!(
            "chain from sector {} holds {} bytes but the entry declares {}",
            start, capacity, size
        ))),
    }
}

/// Sector ids grouped into physically consecutive runs, for diagnostics.
pub fn sector_runs(sectors: &[u32]) -> SmallVec<[(u32, u32); 8]> {
    let mut runs: SmallVec<[(u32, u32); 8]> = SmallVec::new();
    for &s in sectors {
        match runs.last_mut() {
            Some((first, count)) if *first + *count == s => *count += 1,
            _ => runs.push((s, 1)),
        }
    }
    runs
}
