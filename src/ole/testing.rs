//! Compound file fixtures for tests.
//!
//! The builder lays out streams with a controllable sector order, so tests
//! can produce physically fragmented chains, DIFAT-listed FAT sectors and
//! mini streams scattered through the root stream.

use std::collections::HashMap;

use super::consts::*;

const MINI_SECTOR: usize = 64;

#[derive(Debug, Default)]
pub(crate) struct CfbBuilder {
    streams: Vec<(String, Vec<u8>)>,
    seed: Option<u64>,
    force_difat: bool,
    large_sectors: bool,
}

#[derive(Debug)]
pub(crate) struct BuiltCfb {
    pub bytes: Vec<u8>,
    /// Regular (or mini) sector ids per stream name
    pub sectors: HashMap<String, Vec<u32>>,
    pub sector_size: usize,
}

impl BuiltCfb {
    /// Overwrite one FAT entry in place. FAT sectors occupy the first ids.
    pub fn set_fat_entry(&mut self, sector: u32, value: u32) {
        let per = self.sector_size / 4;
        let fat_sector = sector as usize / per;
        let offset = (fat_sector + 1) * self.sector_size + (sector as usize % per) * 4;
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl CfbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(mut self, name: &str, data: &[u8]) -> Self {
        self.streams.push((name.to_string(), data.to_vec()));
        self
    }

    /// Shuffle data sector placement with a deterministic seed
    pub fn scatter(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// List all but the first FAT sector through DIFAT sectors
    pub fn force_difat(mut self) -> Self {
        self.force_difat = true;
        self
    }

    /// Use 4096-byte sectors
    pub fn large_sectors(mut self) -> Self {
        self.large_sectors = true;
        self
    }

    pub fn build(self) -> BuiltCfb {
        let shift: u16 = if self.large_sectors { SECTOR_SHIFT_V4 } else { SECTOR_SHIFT_V3 };
        let ss = 1usize << shift;
        let per = ss / 4;
        let mut rng = XorShift(self.seed.unwrap_or(0x9E37_79B9_7F4A_7C15) | 1);

        // Mini stream layout.
        let small: Vec<usize> = (0..self.streams.len())
            .filter(|&i| {
                let len = self.streams[i].1.len();
                len > 0 && len < DEFAULT_MINI_CUTOFF as usize
            })
            .collect();
        let mini_total: usize = small
            .iter()
            .map(|&i| self.streams[i].1.len().div_ceil(MINI_SECTOR))
            .sum();
        let mut mini_slots: Vec<usize> = (0..mini_total).collect();
        if self.seed.is_some() {
            rng.shuffle(&mut mini_slots);
        }
        let mut minifat = vec![FREESECT; mini_total];
        let mut mini_data = vec![0u8; mini_total * MINI_SECTOR];
        let mut sectors: HashMap<String, Vec<u32>> = HashMap::new();
        let mut mini_starts: HashMap<usize, u32> = HashMap::new();
        let mut cursor = 0;
        for &i in &small {
            let data = &self.streams[i].1;
            let n = data.len().div_ceil(MINI_SECTOR);
            let ids: Vec<u32> = mini_slots[cursor..cursor + n].iter().map(|&s| s as u32).collect();
            cursor += n;
            link(&mut minifat, &ids);
            for (chunk, &id) in data.chunks(MINI_SECTOR).zip(&ids) {
                let at = id as usize * MINI_SECTOR;
                mini_data[at..at + chunk.len()].copy_from_slice(chunk);
            }
            mini_starts.insert(i, ids[0]);
            sectors.insert(self.streams[i].0.clone(), ids);
        }
        let minifat_bytes: Vec<u8> = minifat.iter().flat_map(|v| v.to_le_bytes()).collect();

        // Regular chains: large streams, then the root (mini) stream, MiniFAT, directory.
        let large: Vec<usize> = (0..self.streams.len())
            .filter(|&i| self.streams[i].1.len() >= DEFAULT_MINI_CUTOFF as usize)
            .collect();
        let dir_entries = 1 + self.streams.len();
        let dir_len = (dir_entries * DIRENTRY_SIZE).div_ceil(ss) * ss;

        let mut chain_lens: Vec<usize> = large
            .iter()
            .map(|&i| self.streams[i].1.len().div_ceil(ss))
            .collect();
        chain_lens.push(mini_data.len().div_ceil(ss));
        chain_lens.push(minifat_bytes.len().div_ceil(ss));
        chain_lens.push(dir_len / ss);
        let data_sectors: usize = chain_lens.iter().sum();

        let inline_cap = if self.force_difat { 1 } else { HEADER_DIFAT_ENTRIES };
        let (mut fat_count, mut difat_count) = (1usize, 0usize);
        loop {
            let total = data_sectors + fat_count + difat_count;
            let need_fat = total.div_ceil(per);
            let need_difat = need_fat.saturating_sub(inline_cap).div_ceil(per - 1);
            if need_fat == fat_count && need_difat == difat_count {
                break;
            }
            fat_count = need_fat;
            difat_count = need_difat;
        }
        let first_data = fat_count + difat_count;
        let total = first_data + data_sectors;

        let mut slots: Vec<u32> = (first_data as u32..total as u32).collect();
        if self.seed.is_some() {
            rng.shuffle(&mut slots);
        }
        let mut fat = vec![FREESECT; fat_count * per];
        for entry in fat.iter_mut().take(fat_count) {
            *entry = FATSECT;
        }
        for entry in fat.iter_mut().skip(fat_count).take(difat_count) {
            *entry = DIFSECT;
        }

        let mut next_slot = 0;
        let mut chains: Vec<Vec<u32>> = Vec::new();
        for &n in &chain_lens {
            let ids = slots[next_slot..next_slot + n].to_vec();
            next_slot += n;
            link(&mut fat, &ids);
            chains.push(ids);
        }
        let root_chain = chains[large.len()].clone();
        let minifat_chain = chains[large.len() + 1].clone();
        let dir_chain = chains[large.len() + 2].clone();
        for (k, &i) in large.iter().enumerate() {
            sectors.insert(self.streams[i].0.clone(), chains[k].clone());
        }

        // Directory: root, then each stream linked as a right-leaning chain.
        let mut dir = Vec::with_capacity(dir_len);
        let root_start = root_chain.first().copied().unwrap_or(ENDOFCHAIN);
        let child = if self.streams.is_empty() { NOSTREAM } else { 1 };
        dir.extend(dir_entry("Root Entry", STGTY_ROOT, NOSTREAM, child, root_start, mini_data.len() as u64));
        for (i, (name, data)) in self.streams.iter().enumerate() {
            let right = if i + 1 < self.streams.len() { i as u32 + 2 } else { NOSTREAM };
            let start = if data.is_empty() {
                ENDOFCHAIN
            } else if let Some(&s) = mini_starts.get(&i) {
                s
            } else {
                let k = large.iter().position(|&l| l == i).unwrap();
                chains[k][0]
            };
            dir.extend(dir_entry(name, STGTY_STREAM, right, NOSTREAM, start, data.len() as u64));
        }
        while dir.len() < dir_len {
            dir.extend(dir_entry("", STGTY_EMPTY, NOSTREAM, NOSTREAM, FREESECT, 0));
        }

        let mut bytes = vec![0u8; (total + 1) * ss];
        let write_chain = |bytes: &mut Vec<u8>, ids: &[u32], data: &[u8]| {
            for (chunk, &id) in data.chunks(ss).zip(ids) {
                let at = (id as usize + 1) * ss;
                bytes[at..at + chunk.len()].copy_from_slice(chunk);
            }
        };
        for (k, &i) in large.iter().enumerate() {
            write_chain(&mut bytes, &chains[k], &self.streams[i].1);
        }
        write_chain(&mut bytes, &root_chain, &mini_data);
        write_chain(&mut bytes, &minifat_chain, &minifat_bytes);
        write_chain(&mut bytes, &dir_chain, &dir);

        // FAT sectors are ids 0..fat_count, DIFAT sectors follow.
        let fat_bytes: Vec<u8> = fat.iter().flat_map(|v| v.to_le_bytes()).collect();
        bytes[ss..ss + fat_bytes.len()].copy_from_slice(&fat_bytes);

        let fat_ids: Vec<u32> = (0..fat_count as u32).collect();
        let overflow: Vec<u32> = fat_ids.iter().copied().skip(inline_cap).collect();
        for d in 0..difat_count {
            let id = (fat_count + d) as u32;
            let mut sector = vec![FREESECT; per];
            for (slot, &fat_id) in overflow.iter().skip(d * (per - 1)).take(per - 1).enumerate() {
                sector[slot] = fat_id;
            }
            sector[per - 1] = if d + 1 < difat_count { id + 1 } else { ENDOFCHAIN };
            let at = (id as usize + 1) * ss;
            for (j, v) in sector.iter().enumerate() {
                bytes[at + j * 4..at + j * 4 + 4].copy_from_slice(&v.to_le_bytes());
            }
        }

        let h = &mut bytes[..HEADER_SIZE];
        h[..8].copy_from_slice(MAGIC);
        h[0x18..0x1A].copy_from_slice(&0x003Eu16.to_le_bytes());
        h[0x1A..0x1C].copy_from_slice(&(if self.large_sectors { 4u16 } else { 3u16 }).to_le_bytes());
        h[0x1C..0x1E].copy_from_slice(&BYTE_ORDER_LE.to_le_bytes());
        h[0x1E..0x20].copy_from_slice(&shift.to_le_bytes());
        h[0x20..0x22].copy_from_slice(&6u16.to_le_bytes());
        h[0x2C..0x30].copy_from_slice(&(fat_count as u32).to_le_bytes());
        h[0x30..0x34].copy_from_slice(&dir_chain[0].to_le_bytes());
        h[0x38..0x3C].copy_from_slice(&DEFAULT_MINI_CUTOFF.to_le_bytes());
        let (minifat_start, minifat_count) = match minifat_chain.first() {
            Some(&s) => (s, minifat_chain.len() as u32),
            None => (ENDOFCHAIN, 0),
        };
        h[0x3C..0x40].copy_from_slice(&minifat_start.to_le_bytes());
        h[0x40..0x44].copy_from_slice(&minifat_count.to_le_bytes());
        let difat_start = if difat_count > 0 { fat_count as u32 } else { ENDOFCHAIN };
        h[0x44..0x48].copy_from_slice(&difat_start.to_le_bytes());
        h[0x48..0x4C].copy_from_slice(&(difat_count as u32).to_le_bytes());
        for i in 0..HEADER_DIFAT_ENTRIES {
            let v = if i < inline_cap.min(fat_count) { i as u32 } else { FREESECT };
            let off = HEADER_DIFAT_OFFSET + i * 4;
            h[off..off + 4].copy_from_slice(&v.to_le_bytes());
        }

        BuiltCfb {
            bytes,
            sectors,
            sector_size: ss,
        }
    }
}

fn link(table: &mut [u32], ids: &[u32]) {
    for pair in ids.windows(2) {
        table[pair[0] as usize] = pair[1];
    }
    if let Some(&last) = ids.last() {
        table[last as usize] = ENDOFCHAIN;
    }
}

fn dir_entry(name: &str, ty: u8, right: u32, child: u32, start: u32, size: u64) -> Vec<u8> {
    let mut e = vec![0u8; DIRENTRY_SIZE];
    let units: Vec<u16> = name.encode_utf16().collect();
    for (i, u) in units.iter().enumerate() {
        e[i * 2..i * 2 + 2].copy_from_slice(&u.to_le_bytes());
    }
    let name_len = if name.is_empty() { 0 } else { (units.len() + 1) * 2 };
    e[64..66].copy_from_slice(&(name_len as u16).to_le_bytes());
    e[66] = ty;
    e[67] = 1;
    e[68..72].copy_from_slice(&NOSTREAM.to_le_bytes());
    e[72..76].copy_from_slice(&right.to_le_bytes());
    e[76..80].copy_from_slice(&child.to_le_bytes());
    e[116..120].copy_from_slice(&start.to_le_bytes());
    e[120..128].copy_from_slice(&size.to_le_bytes());
    e
}

struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = (self.next() % (i as u64 + 1)) as usize;
            items.swap(i, j);
        }
    }
}
