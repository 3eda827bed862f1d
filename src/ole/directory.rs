//! Directory entries kept in a flat arena.
//!
//! Sibling and child links are plain indices into the arena; tree walks take
//! an index and look it up, so there are no back-references between entries.

use fixedbitset::FixedBitSet;
use zerocopy::{FromBytes, LE, U16, U32};
use zerocopy_derive::FromBytes as DeriveFromBytes;

use super::consts::*;
use super::error::OleError;
use crate::common::binary::decode_utf16le;

/// Raw OLE directory entry structure (128 bytes)
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawDirectoryEntry {
    /// Entry name in UTF-16LE (64 bytes, null-padded)
    name: [u8; 64],
    /// Length of name in bytes (including null terminator)
    name_len: U16<LE>,
    entry_type: u8,
    /// Node color (0 = red, 1 = black)
    color: u8,
    left: U32<LE>,
    right: U32<LE>,
    child: U32<LE>,
    clsid: [u8; 16],
    state_bits: U32<LE>,
    creation_time: [u8; 8],
    modified_time: [u8; 8],
    start_sector: U32<LE>,
    size_low: U32<LE>,
    size_high: U32<LE>,
}

/// Kind of directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Empty,
    Storage,
    Stream,
    LockBytes,
    Property,
    Root,
    Invalid(u8),
}

impl From<u8> for EntryType {
    fn from(value: u8) -> Self {
        match value {
            STGTY_EMPTY => EntryType::Empty,
            STGTY_STORAGE => EntryType::Storage,
            STGTY_STREAM => EntryType::Stream,
            STGTY_LOCKBYTES => EntryType::LockBytes,
            STGTY_PROPERTY => EntryType::Property,
            STGTY_ROOT => EntryType::Root,
            other => EntryType::Invalid(other),
        }
    }
}

/// One entry of the directory arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Index of this entry in the arena
    pub index: usize,
    /// Entry name (UTF-16 decoded, trailing NULs trimmed)
    pub name: String,
    pub entry_type: EntryType,
    /// Node color (0 = red, 1 = black)
    pub color: u8,
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub child: Option<usize>,
    pub clsid: [u8; 16],
    pub state_bits: u32,
    /// Creation time as a raw FILETIME
    pub creation_time: u64,
    /// Modification time as a raw FILETIME
    pub modified_time: u64,
    pub start_sector: u32,
    pub size: u64,
    /// Stored in the mini stream (size below the cutoff)
    pub is_mini: bool,
}

impl DirectoryEntry {
    pub fn is_stream(&self) -> bool {
        self.entry_type == EntryType::Stream
    }

    pub fn is_storage(&self) -> bool {
        matches!(self.entry_type, EntryType::Storage | EntryType::Root)
    }
}

/// Flat array of directory entries, created once per container open.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    /// Slice a reconstructed directory stream into 128-byte entries.
    ///
    /// `sector_size` decides whether the high half of the size field is
    /// meaningful (4096-byte sectors only).
    pub fn parse(data: &[u8], sector_size: usize, mini_cutoff: u32) -> Result<Self, OleError> {
        let count = data.len() / DIRENTRY_SIZE;
        if count == 0 {
            return Err(OleError::corrupt("directory stream holds no entries"));
        }

        let mut entries = Vec::with_capacity(count);
        for (index, chunk) in data.chunks_exact(DIRENTRY_SIZE).enumerate() {
            let raw = RawDirectoryEntry::read_from_bytes(chunk)
                .map_err(|_| OleError::corrupt("directory entry too short"))?;
            entries.push(parse_entry(&raw, index, count, sector_size, mini_cutoff)?);
        }

        if entries[0].entry_type != EntryType::Root {
            return Err(OleError::corrupt(format!(
                "first directory entry is {:?}, not the root",
                entries[0].entry_type
            )));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&DirectoryEntry> {
        self.entries.get(index)
    }

    /// The root entry, which also owns the mini stream
    pub fn root(&self) -> &DirectoryEntry {
        &self.entries[0]
    }

    /// Case-insensitive exact name match; the first match in arena order wins.
    pub fn find_entry_by_name(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.entry_type != EntryType::Empty)
            .find(|e| names_match(&e.name, name))
    }

    /// Children of a storage in sibling-tree order.
    ///
    /// Cycles in the sibling links are reported as corruption.
    pub fn children(&self, index: usize) -> Result<Vec<usize>, OleError> {
        let Some(parent) = self.entries.get(index) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut visited = FixedBitSet::with_capacity(self.entries.len());
        let mut stack: Vec<usize> = Vec::new();
        let mut current = parent.child;

        while current.is_some() || !stack.is_empty() {
            while let Some(i) = current {
                if visited.put(i) {
                    return Err(OleError::corrupt(format!(
                        "directory sibling links revisit entry {}",
                        i
                    )));
                }
                stack.push(i);
                current = self.entries[i].left;
            }
            if let Some(i) = stack.pop() {
                out.push(i);
                current = self.entries[i].right;
            }
        }
        Ok(out)
    }

    /// Paths of every stream reachable from the root.
    pub fn stream_paths(&self) -> Result<Vec<Vec<String>>, OleError> {
        let mut paths = Vec::new();
        let mut pending = vec![(0usize, Vec::<String>::new())];
        let mut expanded = FixedBitSet::with_capacity(self.entries.len());

        while let Some((storage, prefix)) = pending.pop() {
            if expanded.put(storage) {
                return Err(OleError::corrupt("directory storages form a cycle"));
            }
            for child in self.children(storage)? {
                let entry = &self.entries[child];
                let mut path = prefix.clone();
                path.push(entry.name.clone());
                if entry.is_stream() {
                    paths.push(path);
                } else if entry.is_storage() {
                    pending.push((child, path));
                }
            }
        }
        paths.sort();
        Ok(paths)
    }
}

fn parse_entry(
    raw: &RawDirectoryEntry,
    index: usize,
    count: usize,
    sector_size: usize,
    mini_cutoff: u32,
) -> Result<DirectoryEntry, OleError> {
    let name_len = (raw.name_len.get() as usize).min(64);
    let name = decode_utf16le(&raw.name[..name_len.saturating_sub(2)]);
    let entry_type = EntryType::from(raw.entry_type);

    let link = |value: u32, what: &str| -> Result<Option<usize>, OleError> {
        if value == NOSTREAM || entry_type == EntryType::Empty {
            return Ok(None);
        }
        if value as usize >= count {
            return Err(OleError::corrupt(format!(
                "directory entry {} has {} link {} past the {} entries",
                index, what, value, count
            )));
        }
        Ok(Some(value as usize))
    };

    let size = if sector_size == 512 {
        raw.size_low.get() as u64
    } else {
        ((raw.size_high.get() as u64) << 32) | raw.size_low.get() as u64
    };

    Ok(DirectoryEntry {
        index,
        name,
        entry_type,
        color: raw.color,
        left: link(raw.left.get(), "left")?,
        right: link(raw.right.get(), "right")?,
        child: link(raw.child.get(), "child")?,
        clsid: raw.clsid,
        state_bits: raw.state_bits.get(),
        creation_time: u64::from_le_bytes(raw.creation_time),
        modified_time: u64::from_le_bytes(raw.modified_time),
        start_sector: raw.start_sector.get(),
        size,
        is_mini: entry_type == EntryType::Stream && size < mini_cutoff as u64,
    })
}

fn names_match(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}
