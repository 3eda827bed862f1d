//! Shared string table reassembly.
//!
//! An SST record and its CONTINUE records form one logical byte sequence,
//! except that a CONTINUE record starting inside a string's character data
//! opens with a fresh option byte whose bit 0 says how the remaining
//! characters are stored. Strings, string headers and the trailing rich-text
//! and phonetic blocks may all be cut at any record boundary.
//!
//! [`advance`] is a pure step function over [`SstState`]; [`SstReader`]
//! wraps it for callers that just feed records in stream order.

use bitflags::bitflags;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::common::binary;

bitflags! {
    /// Option byte of an `XLUnicodeRichExtendedString`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct StringFlags: u8 {
        /// Characters are UTF-16LE rather than compressed Latin-1
        const HIGH_BYTE = 0x01;
        /// Phonetic (ExtRst) block follows the characters
        const EXT = 0x04;
        /// Formatting runs follow the characters
        const RICH = 0x08;
    }
}

/// Where the reader is inside the current string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SstPhase {
    /// Character count and option byte
    #[default]
    StartHeader,
    /// Run count and ExtRst size
    Header,
    Data,
    /// Formatting runs and ExtRst bytes
    Tail,
}

/// Reassembly state carried between records
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SstState {
    pub phase: SstPhase,
    pub flags: StringFlags,
    /// Header bytes collected so far for the current phase
    header: Vec<u8>,
    chars_left: usize,
    tail_left: usize,
    /// Characters of the string being built, always UTF-16 code units
    buffer: Vec<u16>,
    /// Unique strings the table still owes
    pub remaining: u32,
    /// Unique count declared by the SST record
    pub unique_count: u32,
}

/// One record of the table
#[derive(Debug, Clone, Copy)]
pub enum SstChunk<'a> {
    /// SST payload, starting with the total and unique counts
    Table(&'a [u8]),
    Continue(&'a [u8]),
}

impl SstState {
    fn start_data(&mut self, out: &mut Vec<String>) {
        self.phase = SstPhase::Data;
        if self.chars_left == 0 {
            self.finish_data(out);
        }
    }

    fn finish_data(&mut self, out: &mut Vec<String>) {
        if self.tail_left > 0 {
            self.phase = SstPhase::Tail;
        } else {
            self.emit(out);
        }
    }

    fn emit(&mut self, out: &mut Vec<String>) {
        out.push(String::from_utf16_lossy(&self.buffer));
        self.buffer.clear();
        self.header.clear();
        self.flags = StringFlags::empty();
        self.phase = SstPhase::StartHeader;
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// Move bytes from `data` into the header buffer until it holds `need`.
    /// Returns false when `data` ran out first.
    fn collect<'a>(&mut self, data: &mut &'a [u8], need: usize) -> bool {
        let take = need.saturating_sub(self.header.len()).min(data.len());
        self.header.extend_from_slice(&data[..take]);
        *data = &data[take..];
        self.header.len() >= need
    }

    fn header_extra(&self) -> usize {
        let mut n = 0;
        if self.flags.contains(StringFlags::RICH) {
            n += 2;
        }
        if self.flags.contains(StringFlags::EXT) {
            n += 4;
        }
        n
    }
}

/// Feed one record and return the state after it plus every string it
/// completed.
pub fn advance(mut state: SstState, chunk: SstChunk<'_>) -> (SstState, Vec<String>) {
    let mut out = Vec::new();
    let mut data = match chunk {
        SstChunk::Table(payload) => {
            let unique = binary::read_u32_le(payload, 4).unwrap_or(0);
            state = SstState {
                remaining: unique,
                unique_count: unique,
                ..SstState::default()
            };
            payload.get(8..).unwrap_or(&[])
        },
        SstChunk::Continue(payload) => match (state.phase, payload.split_first()) {
            (SstPhase::Data, Some((&option, rest))) => {
                state.flags.set(StringFlags::HIGH_BYTE, option & 0x01 != 0);
                rest
            },
            _ => payload,
        },
    };

    while !data.is_empty() && state.remaining > 0 {
        match state.phase {
            SstPhase::StartHeader => {
                if !state.collect(&mut data, 3) {
                    break;
                }
                state.chars_left = u16::from_le_bytes([state.header[0], state.header[1]]) as usize;
                state.flags = StringFlags::from_bits_truncate(state.header[2]);
                state.tail_left = 0;
                state.header.clear();
                state.buffer.reserve(state.chars_left);
                if state.header_extra() == 0 {
                    state.start_data(&mut out);
                } else {
                    state.phase = SstPhase::Header;
                }
            },
            SstPhase::Header => {
                let need = state.header_extra();
                if !state.collect(&mut data, need) {
                    break;
                }
                let mut at = 0;
                if state.flags.contains(StringFlags::RICH) {
                    let runs = u16::from_le_bytes([state.header[0], state.header[1]]) as usize;
                    state.tail_left += runs * 4;
                    at = 2;
                }
                if state.flags.contains(StringFlags::EXT) {
                    let h = &state.header[at..at + 4];
                    state.tail_left += u32::from_le_bytes([h[0], h[1], h[2], h[3]]) as usize;
                }
                state.header.clear();
                state.start_data(&mut out);
            },
            SstPhase::Data => {
                let high = state.flags.contains(StringFlags::HIGH_BYTE);
                if high && data.len() == 1 {
                    // Pad byte: a UTF-16 character never straddles records.
                    data = &[];
                    break;
                }
                let width = if high { 2 } else { 1 };
                let n = (data.len() / width).min(state.chars_left);
                let (chars, rest) = data.split_at(n * width);
                if high {
                    state.buffer.extend(binary::utf16le_units(chars));
                } else {
                    state.buffer.extend(chars.iter().map(|&b| b as u16));
                }
                data = rest;
                state.chars_left -= n;
                if state.chars_left == 0 {
                    state.finish_data(&mut out);
                }
            },
            SstPhase::Tail => {
                let n = state.tail_left.min(data.len());
                data = &data[n..];
                state.tail_left -= n;
                if state.tail_left == 0 {
                    state.emit(&mut out);
                }
            },
        }
    }
    (state, out)
}

/// Stateful wrapper over [`advance`]
#[derive(Debug, Clone, Default)]
pub struct SstReader {
    state: SstState,
}

impl SstReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SstState {
        &self.state
    }

    fn step(&mut self, chunk: SstChunk<'_>) -> Vec<String> {
        let (state, out) = advance(std::mem::take(&mut self.state), chunk);
        self.state = state;
        out
    }

    /// Start a table from an SST record payload
    pub fn read_strings_from_sst(&mut self, record: &[u8]) -> Vec<String> {
        self.step(SstChunk::Table(record))
    }

    /// Continue the table with the next CONTINUE record payload
    pub fn read_strings_from_continue(&mut self, record: &[u8]) -> Vec<String> {
        self.step(SstChunk::Continue(record))
    }

    /// Whether every declared unique string has been produced
    pub fn is_complete(&self) -> bool {
        self.state.remaining == 0
    }

    /// Give up on the table, returning a string cut short by its end.
    pub fn flush(&mut self) -> Option<String> {
        let state = std::mem::take(&mut self.state);
        let partial = state.phase != SstPhase::StartHeader || !state.buffer.is_empty();
        if state.remaining > 0 {
            warn!(
                "shared string table ended with {} of {} strings missing",
                state.remaining, state.unique_count
            );
        }
        partial.then(|| String::from_utf16_lossy(&state.buffer))
    }
}
