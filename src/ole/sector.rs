//! FAT, DIFAT and MiniFAT construction.
//!
//! A sector chain is a flat table mapping each sector to its successor.
//! Traversal is guarded structurally: a chain that revisits a sector, points
//! at a reserved marker or leaves the table is reported as corruption instead
//! of looping.

use std::io::{Read, Seek};

use fixedbitset::FixedBitSet;
use log::{debug, trace};

use super::consts::*;
use super::error::OleError;
use super::header::Header;
use super::stream::{SectorSource, regular_extents};

/// Which allocation table a chain belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    Fat,
    MiniFat,
}

/// Sector allocation table (FAT or MiniFAT).
#[derive(Debug, Clone)]
pub struct SectorChain {
    kind: ChainKind,
    entries: Vec<u32>,
}

impl SectorChain {
    /// Wrap a raw table. Trailing free entries are trimmed.
    pub fn new(kind: ChainKind, mut entries: Vec<u32>) -> Self {
        while entries.last() == Some(&FREESECT) {
            entries.pop();
        }
        Self { kind, entries }
    }

    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    /// Number of addressable sectors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw table entry for `sector`, if it is inside the table
    pub fn entry(&self, sector: u32) -> Option<u32> {
        self.entries.get(sector as usize).copied()
    }

    /// Successor of `sector` as a data pointer.
    ///
    /// Reserved markers (free, FAT, DIFAT) and a pointer back to sector 0
    /// are protocol violations when they show up inside a stream chain.
    pub fn next(&self, sector: u32) -> Result<u32, OleError> {
        let next = self.entry(sector).ok_or_else(|| {
            OleError::corrupt(format!(
                "{:?} sector {} outside table of {} entries",
                self.kind,
                sector,
                self.entries.len()
            ))
        })?;
        match next {
            ENDOFCHAIN => Ok(ENDOFCHAIN),
            FREESECT | FATSECT | DIFSECT => Err(OleError::corrupt(format!(
                "{:?} sector {} links to reserved marker 0x{:08X}",
                self.kind, sector, next
            ))),
            0 => Err(OleError::corrupt(format!(
                "{:?} sector {} links back to sector 0",
                self.kind, sector
            ))),
            n if n > MAXREGSECT => Err(OleError::corrupt(format!(
                "{:?} sector {} links to invalid id 0x{:08X}",
                self.kind, sector, n
            ))),
            n => Ok(n),
        }
    }

    /// Collect the sectors of the chain starting at `start`.
    pub fn chain(&self, start: u32) -> Result<Vec<u32>, OleError> {
        let mut sectors = Vec::new();
        if start == ENDOFCHAIN || start == FREESECT {
            return Ok(sectors);
        }

        let mut visited = FixedBitSet::with_capacity(self.entries.len());
        let mut current = start;
        loop {
            if current as usize >= self.entries.len() {
                return Err(OleError::corrupt(format!(
                    "{:?} chain from {} reaches sector {} outside table of {} entries",
                    self.kind,
                    start,
                    current,
                    self.entries.len()
                )));
            }
            if visited.put(current as usize) {
                return Err(OleError::corrupt(format!(
                    "{:?} chain from {} revisits sector {}",
                    self.kind, start, current
                )));
            }
            sectors.push(current);

            current = self.next(current)?;
            if current == ENDOFCHAIN {
                break;
            }
        }
        Ok(sectors)
    }
}

/// Build the FAT from the header's inline DIFAT entries and the DIFAT chain.
pub fn build_fat<R: Read + Seek>(
    header: &Header,
    source: &SectorSource<R>,
) -> Result<SectorChain, OleError> {
    let wanted = header.fat_sector_count as usize;
    let mut fat_sectors: Vec<u32> = header
        .difat
        .iter()
        .copied()
        .filter(|&s| s != FREESECT)
        .take(wanted)
        .collect();

    if fat_sectors.len() < wanted && header.difat_sector_count > 0 {
        let per_sector = header.sector_size() / 4 - 1;
        let mut difat_sector = header.first_difat_sector;
        let sector_count = source.sector_count();
        let mut seen = FixedBitSet::with_capacity(sector_count as usize);

        for _ in 0..header.difat_sector_count {
            if difat_sector == ENDOFCHAIN || difat_sector == FREESECT {
                break;
            }
            if difat_sector > MAXREGSECT {
                return Err(OleError::corrupt(format!(
                    "DIFAT chain points at reserved marker 0x{:08X}",
                    difat_sector
                )));
            }
            if difat_sector >= sector_count {
                return Err(OleError::corrupt(format!(
                    "DIFAT sector {} is past the end of a {} sector file",
                    difat_sector, sector_count
                )));
            }
            if seen.put(difat_sector as usize) {
                return Err(OleError::corrupt(format!(
                    "DIFAT chain revisits sector {}",
                    difat_sector
                )));
            }

            let data = source.read_sector(difat_sector)?;
            let ids = sector_entries(&data);
            for &id in ids.iter().take(per_sector) {
                if id != FREESECT && fat_sectors.len() < wanted {
                    fat_sectors.push(id);
                }
            }
            difat_sector = ids.get(per_sector).copied().unwrap_or(ENDOFCHAIN);
        }
    }

    if fat_sectors.len() < wanted {
        return Err(OleError::corrupt(format!(
            "header declares {} FAT sectors but only {} are listed",
            wanted,
            fat_sectors.len()
        )));
    }
    if let Some(&bad) = fat_sectors.iter().find(|&&s| s > MAXREGSECT) {
        return Err(OleError::corrupt(format!(
            "FAT sector list contains reserved marker 0x{:08X}",
            bad
        )));
    }

    let sector_size = header.sector_size();
    let extents = regular_extents(&fat_sectors, sector_size);
    let data = source.read_extents(&extents, fat_sectors.len() * sector_size)?;
    if data.len() < fat_sectors.len() * sector_size {
        return Err(OleError::corrupt("FAT sectors truncated"));
    }

    let fat = SectorChain::new(ChainKind::Fat, sector_entries(&data));
    debug!(
        "FAT built from {} sectors, {} entries",
        fat_sectors.len(),
        fat.len()
    );
    Ok(fat)
}

/// Build the MiniFAT, a regular stream rooted at the header's MiniFAT start.
pub fn build_minifat<R: Read + Seek>(
    header: &Header,
    fat: &SectorChain,
    source: &SectorSource<R>,
) -> Result<SectorChain, OleError> {
    if header.minifat_sector_count == 0 || header.first_minifat_sector == ENDOFCHAIN {
        return Ok(SectorChain::new(ChainKind::MiniFat, Vec::new()));
    }
    let sectors = fat.chain(header.first_minifat_sector)?;
    let extents = regular_extents(&sectors, header.sector_size());
    let data = source.read_extents(&extents, sectors.len() * header.sector_size())?;
    let minifat = SectorChain::new(ChainKind::MiniFat, sector_entries(&data));
    trace!("MiniFAT loaded lazily: {} entries", minifat.len());
    Ok(minifat)
}

fn sector_entries(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
