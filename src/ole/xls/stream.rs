//! BIFF record stream decoder.
//!
//! [`BiffStream`] walks the length-prefixed records of a workbook stream,
//! decrypting payloads when the globals carry a FILEPASS record. The read
//! cursor and the RC4 keystream state live in a [`DecoderContext`] so a
//! decode can be suspended and resumed by handing the context around.

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, trace};

use super::consts::{
    BOF, BOF_BIFF2, BOF_BIFF3, BOF_BIFF4, BOUNDSHEET, FILEPASS, INTERFACEHDR, RECORD_HEADER_SIZE,
};
use super::crypto::{self, Cipher, EncryptionInfo, Keystream};
use super::error::{XlsError, XlsResult};
use super::records::{self, BiffRecord, BiffVersion, BofRecord, StreamKind};
use crate::common::binary;

/// Records FILEPASS may follow in the globals substream
const FILEPASS_SEARCH_DEPTH: usize = 3;

/// One record as stored, with its payload already decrypted
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: u16,
    /// Absolute offset of the record header
    pub offset: u64,
    pub data: Bytes,
}

impl RawRecord {
    /// Offset just past the payload
    pub fn end(&self) -> u64 {
        self.offset + (RECORD_HEADER_SIZE + self.data.len()) as u64
    }
}

/// Cursor and cipher state of a decoder
#[derive(Debug, Clone, Default)]
pub struct DecoderContext {
    pub position: u64,
    keystream: Option<Keystream>,
}

impl DecoderContext {
    pub fn at(position: u64) -> Self {
        Self {
            position,
            keystream: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Encryption {
    cipher: Arc<Cipher>,
    /// Payloads starting before this offset were written in the clear
    from: u64,
}

/// Decoder over an in-memory workbook stream
#[derive(Debug, Clone)]
pub struct BiffStream {
    data: Bytes,
    version: BiffVersion,
    kind: StreamKind,
    encryption: Option<Encryption>,
    context: DecoderContext,
}

impl BiffStream {
    /// Open a stream that starts with a BOF record.
    ///
    /// The BOF fixes the BIFF version and substream kind. When one of the
    /// following records is FILEPASS, the legacy default password and then
    /// `password` are tried; neither verifying is
    /// [`XlsError::InvalidPassword`].
    pub fn open(data: Bytes, password: Option<&str>) -> XlsResult<Self> {
        let (id, payload) = header_at(&data, 0)?.ok_or(XlsError::MissingBof)?;
        if !records::is_bof(id) {
            return Err(XlsError::MissingBof);
        }
        let bof = BofRecord::parse(id, &payload)?;
        debug!("BOF: {:?} {:?}", bof.version, bof.kind);

        let mut stream = Self {
            data,
            version: bof.version,
            kind: bof.kind,
            encryption: None,
            context: DecoderContext::default(),
        };
        stream.detect_encryption(password)?;
        stream.seek(0)?;
        Ok(stream)
    }

    /// Decoder with a forced version and no encryption, positioned at 0.
    pub fn with_version(data: Bytes, version: BiffVersion) -> Self {
        Self {
            data,
            version,
            kind: StreamKind::Unknown(0),
            encryption: None,
            context: DecoderContext::default(),
        }
    }

    fn detect_encryption(&mut self, password: Option<&str>) -> XlsResult<()> {
        for _ in 0..FILEPASS_SEARCH_DEPTH {
            let Some(record) = self.read_raw()? else {
                return Ok(());
            };
            if record.id != FILEPASS {
                continue;
            }
            let info = EncryptionInfo::parse(self.version, &record.data)?;
            debug!("workbook is encrypted with {}", info.scheme_name());
            let cipher = crypto::resolve(&info, password)?;
            self.encryption = Some(Encryption {
                cipher: Arc::new(cipher),
                from: record.end(),
            });
            return Ok(());
        }
        Ok(())
    }

    /// A decoder for the substream at `offset` sharing this stream's bytes,
    /// version and cipher.
    pub fn substream(&self, offset: u64) -> XlsResult<Self> {
        let mut sub = Self {
            data: self.data.clone(),
            version: self.version,
            kind: self.kind,
            encryption: self.encryption.clone(),
            context: DecoderContext::default(),
        };
        sub.seek(offset)?;
        if let Some((id, payload)) = header_at(&sub.data, offset)? {
            if records::is_bof(id) {
                sub.kind = BofRecord::parse(id, &payload)?.kind;
            }
        }
        Ok(sub)
    }

    pub fn version(&self) -> BiffVersion {
        self.version
    }

    /// Kind of the substream the decoder was opened on
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> u64 {
        self.context.position
    }

    pub fn context(&self) -> &DecoderContext {
        &self.context
    }

    /// Resume from a previously saved context
    pub fn set_context(&mut self, context: DecoderContext) -> XlsResult<()> {
        self.check_offset(context.position)?;
        self.context = context;
        Ok(())
    }

    fn check_offset(&self, offset: u64) -> XlsResult<()> {
        if offset > self.len() {
            return Err(XlsError::SeekOutOfRange {
                offset,
                len: self.len(),
            });
        }
        Ok(())
    }

    /// Move the cursor to `offset` (`0..=len`) and realign the keystream.
    pub fn seek(&mut self, offset: u64) -> XlsResult<()> {
        self.check_offset(offset)?;
        self.context.position = offset;
        if let Some(enc) = &self.encryption {
            enc.cipher.seek(&mut self.context.keystream, offset);
        }
        Ok(())
    }

    /// Read the next record without decoding it. `None` at end of stream.
    pub fn read_raw(&mut self) -> XlsResult<Option<RawRecord>> {
        let offset = self.context.position;
        let Some((id, _)) = header_at(&self.data, offset)? else {
            return Ok(None);
        };
        let start = offset as usize + RECORD_HEADER_SIZE;
        let size = binary::read_u16_le(&self.data, offset as usize + 2)? as usize;
        let available = self.data.len() - start;
        if size > available {
            return Err(XlsError::RecordSize {
                record_id: id,
                offset,
                declared: size,
                available,
            });
        }

        let payload = self.data.slice(start..start + size);
        let data = match &self.encryption {
            Some(enc) if start as u64 >= enc.from => {
                let skip = clear_prefix(id, size);
                if skip >= size {
                    payload
                } else {
                    let mut buf = payload.to_vec();
                    enc.cipher.decrypt(
                        &mut self.context.keystream,
                        &mut buf[skip..],
                        (start + skip) as u64,
                        size,
                    );
                    Bytes::from(buf)
                }
            },
            _ => payload,
        };

        self.context.position = (start + size) as u64;
        trace!("raw record 0x{:04X} at {}", id, offset);
        Ok(Some(RawRecord { id, offset, data }))
    }

    /// Read and decode the next record. `None` at end of stream.
    pub fn read(&mut self) -> XlsResult<Option<BiffRecord>> {
        match self.read_raw()? {
            Some(raw) => Ok(Some(records::decode(raw.id, self.version, raw.data, raw.offset)?)),
            None => Ok(None),
        }
    }

    /// Seek to `offset` and read the record there.
    pub fn read_at(&mut self, offset: u64) -> XlsResult<Option<BiffRecord>> {
        self.seek(offset)?;
        self.read()
    }
}

/// Number of leading payload bytes stored unencrypted
pub(crate) fn clear_prefix(id: u16, size: usize) -> usize {
    match id {
        BOF_BIFF2 | BOF_BIFF3 | BOF_BIFF4 | BOF | FILEPASS | INTERFACEHDR => size,
        // lbPlyPos stays readable so sheets can be located without the key
        BOUNDSHEET => 4.min(size),
        _ => 0,
    }
}

/// Record id and clear payload at `offset`, or `None` when fewer than a
/// header's worth of bytes remain.
fn header_at(data: &Bytes, offset: u64) -> XlsResult<Option<(u16, Bytes)>> {
    let offset = offset as usize;
    let remaining = data.len().saturating_sub(offset);
    if remaining < RECORD_HEADER_SIZE {
        if remaining > 0 {
            debug!("{} trailing bytes after the last record", remaining);
        }
        return Ok(None);
    }
    let id = binary::read_u16_le(data, offset)?;
    let size = binary::read_u16_le(data, offset + 2)? as usize;
    let start = offset + RECORD_HEADER_SIZE;
    let end = (start + size).min(data.len());
    Ok(Some((id, data.slice(start..end))))
}
