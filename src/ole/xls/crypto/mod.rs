//! FILEPASS parsing, password verification and record payload decryption.
//!
//! Three schemes exist in the wild:
//!
//! - XOR obfuscation (BIFF2-5, and BIFF8 with `wEncryptionType == 0`)
//! - RC4 with MD5 key derivation (BIFF8 "standard" encryption)
//! - RC4 with CryptoAPI SHA-1 key derivation
//!
//! Decryption is addressed by absolute position in the workbook stream: the
//! XOR array index and the RC4 block key both depend only on where a byte
//! sits, so records can be decoded in any order once the keystream state is
//! realigned.

pub mod rc4;
pub mod xor;

use log::debug;
use zeroize::Zeroizing;

use self::rc4::Rc4;
use super::consts::{DEFAULT_PASSWORD, RC4_BLOCK_SIZE};
use super::error::{XlsError, XlsResult};
use super::records::BiffVersion;
use crate::common::binary;

const ENCRYPTION_TYPE_XOR: u16 = 0x0000;
const ENCRYPTION_TYPE_RC4: u16 = 0x0001;

const CALG_RC4: u32 = 0x6801;
const CALG_SHA1: u32 = 0x8004;

const MAX_ENCRYPTION_HEADER_SIZE: usize = 1024;

/// Encryption descriptor read from a FILEPASS payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionInfo {
    Xor {
        key: u16,
        verifier: u16,
    },
    Rc4Standard {
        salt: [u8; 16],
        encrypted_verifier: [u8; 16],
        encrypted_verifier_hash: [u8; 16],
    },
    Rc4CryptoApi {
        key_bits: u32,
        salt: Vec<u8>,
        encrypted_verifier: [u8; 16],
        encrypted_verifier_hash: Vec<u8>,
    },
}

fn array16(data: &[u8], offset: usize) -> XlsResult<[u8; 16]> {
    let mut out = [0u8; 16];
    out.copy_from_slice(binary::read_bytes(data, offset, 16)?);
    Ok(out)
}

fn unsupported(message: impl Into<String>) -> XlsError {
    XlsError::UnsupportedEncryption(message.into())
}

impl EncryptionInfo {
    pub fn parse(version: BiffVersion, data: &[u8]) -> XlsResult<Self> {
        if version < BiffVersion::Biff8 {
            return Ok(EncryptionInfo::Xor {
                key: binary::read_u16_le(data, 0)?,
                verifier: binary::read_u16_le(data, 2)?,
            });
        }

        match binary::read_u16_le(data, 0)? {
            ENCRYPTION_TYPE_XOR => Ok(EncryptionInfo::Xor {
                key: binary::read_u16_le(data, 2)?,
                verifier: binary::read_u16_le(data, 4)?,
            }),
            ENCRYPTION_TYPE_RC4 => {
                let major = binary::read_u16_le(data, 2)?;
                let minor = binary::read_u16_le(data, 4)?;
                match (major, minor) {
                    (1, 1) => Ok(EncryptionInfo::Rc4Standard {
                        salt: array16(data, 6)?,
                        encrypted_verifier: array16(data, 22)?,
                        encrypted_verifier_hash: array16(data, 38)?,
                    }),
                    (2..=4, _) => Self::parse_cryptoapi(data),
                    _ => Err(unsupported(format!("RC4 version {major}.{minor}"))),
                }
            },
            other => Err(unsupported(format!("wEncryptionType=0x{other:04X}"))),
        }
    }

    /// `EncryptionHeader` followed by `EncryptionVerifier`, preceded by the
    /// version fields, flags and header size.
    fn parse_cryptoapi(data: &[u8]) -> XlsResult<Self> {
        let header_size = binary::read_u32_le(data, 10)? as usize;
        if header_size < 20 || header_size > MAX_ENCRYPTION_HEADER_SIZE {
            return Err(unsupported(format!("EncryptionHeader size {header_size}")));
        }
        let header = binary::read_bytes(data, 14, header_size)?;

        let alg_id = binary::read_u32_le(header, 8)?;
        let alg_id_hash = binary::read_u32_le(header, 12)?;
        let key_bits = match binary::read_u32_le(header, 16)? {
            0 => 40,
            bits => bits,
        };
        if alg_id != CALG_RC4 && alg_id != 0 {
            return Err(unsupported(format!("CryptoAPI AlgID 0x{alg_id:04X}")));
        }
        if alg_id_hash != CALG_SHA1 && alg_id_hash != 0 {
            return Err(unsupported(format!("CryptoAPI AlgIDHash 0x{alg_id_hash:04X}")));
        }
        if !(40..=128).contains(&key_bits) || key_bits % 8 != 0 {
            return Err(unsupported(format!("CryptoAPI key size {key_bits}")));
        }

        let v = 14 + header_size;
        let salt_size = binary::read_u32_le(data, v)? as usize;
        if salt_size != 16 {
            return Err(unsupported(format!("CryptoAPI salt size {salt_size}")));
        }
        let salt = binary::read_bytes(data, v + 4, salt_size)?.to_vec();
        let encrypted_verifier = array16(data, v + 20)?;
        let hash_size = binary::read_u32_le(data, v + 36)? as usize;
        if hash_size != 20 {
            return Err(unsupported(format!("CryptoAPI verifier hash size {hash_size}")));
        }
        let encrypted_verifier_hash = binary::read_bytes(data, v + 40, hash_size)?.to_vec();

        Ok(EncryptionInfo::Rc4CryptoApi {
            key_bits,
            salt,
            encrypted_verifier,
            encrypted_verifier_hash,
        })
    }

    pub fn scheme_name(&self) -> &'static str {
        match self {
            EncryptionInfo::Xor { .. } => "XOR obfuscation",
            EncryptionInfo::Rc4Standard { .. } => "RC4",
            EncryptionInfo::Rc4CryptoApi { .. } => "RC4 CryptoAPI",
        }
    }

    /// Build the cipher for `password`, or `None` when it does not verify.
    pub fn verify(&self, password: &str) -> Option<Cipher> {
        match self {
            EncryptionInfo::Xor { key, verifier } => {
                let bytes = Zeroizing::new(xor::password_bytes(password));
                if bytes.is_empty() {
                    return None;
                }
                let derived = xor::create_key(&bytes);
                if derived != *key || xor::create_verifier(&bytes) != *verifier {
                    return None;
                }
                Some(Cipher::Xor {
                    array: xor::create_xor_array(&bytes, derived),
                })
            },
            EncryptionInfo::Rc4Standard {
                salt,
                encrypted_verifier,
                encrypted_verifier_hash,
            } => {
                let key = Rc4Key {
                    scheme: Rc4Scheme::Standard,
                    material: rc4::standard_key_material(password, salt),
                };
                let mut buf = Zeroizing::new([0u8; 32]);
                buf[..16].copy_from_slice(encrypted_verifier);
                buf[16..].copy_from_slice(encrypted_verifier_hash);
                key.block_cipher(0).apply_keystream(&mut buf[..]);
                (rc4::md5_bytes(&buf[..16])[..] == buf[16..]).then_some(Cipher::Rc4(key))
            },
            EncryptionInfo::Rc4CryptoApi {
                key_bits,
                salt,
                encrypted_verifier,
                encrypted_verifier_hash,
            } => {
                let key = Rc4Key {
                    scheme: Rc4Scheme::CryptoApi {
                        key_len: (*key_bits / 8) as usize,
                    },
                    material: rc4::cryptoapi_key_material(password, salt),
                };
                let mut buf = Zeroizing::new(Vec::with_capacity(36));
                buf.extend_from_slice(encrypted_verifier);
                buf.extend_from_slice(encrypted_verifier_hash);
                key.block_cipher(0).apply_keystream(&mut buf[..]);
                (rc4::sha1_bytes(&buf[..16])[..] == buf[16..36]).then_some(Cipher::Rc4(key))
            },
        }
    }
}

/// Try the built-in "VelvetSweatshop" password, then the caller's.
pub fn resolve(info: &EncryptionInfo, password: Option<&str>) -> XlsResult<Cipher> {
    if let Some(cipher) = info.verify(DEFAULT_PASSWORD) {
        debug!("{} workbook opened with the default password", info.scheme_name());
        return Ok(cipher);
    }
    match password {
        Some(pw) => info.verify(pw).ok_or(XlsError::InvalidPassword),
        None => Err(XlsError::InvalidPassword),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rc4Scheme {
    Standard,
    CryptoApi { key_len: usize },
}

/// Password-derived RC4 key material and the schedule turning it into block keys
#[derive(Clone)]
pub struct Rc4Key {
    scheme: Rc4Scheme,
    material: Zeroizing<Vec<u8>>,
}

impl Rc4Key {
    fn block_cipher(&self, block: u32) -> Rc4 {
        match self.scheme {
            Rc4Scheme::Standard => Rc4::new(&rc4::standard_block_key(&self.material, block)),
            Rc4Scheme::CryptoApi { key_len } => {
                Rc4::new(&rc4::cryptoapi_block_key(&self.material, block, key_len))
            },
        }
    }
}

impl std::fmt::Debug for Rc4Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rc4Key")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

/// A verified cipher ready to decrypt record payloads
#[derive(Debug, Clone)]
pub enum Cipher {
    Xor { array: [u8; 16] },
    Rc4(Rc4Key),
}

/// RC4 state positioned inside one 1024-byte block
#[derive(Debug, Clone)]
pub struct Keystream {
    block: u32,
    offset: usize,
    rc4: Rc4,
}

impl Rc4Key {
    /// Position `keystream` at absolute stream offset `position`, rekeying
    /// when the block changes or the state has already moved past it.
    fn align<'a>(&self, keystream: &'a mut Option<Keystream>, position: u64) -> &'a mut Keystream {
        let block = (position / RC4_BLOCK_SIZE as u64) as u32;
        let offset = (position % RC4_BLOCK_SIZE as u64) as usize;
        let reusable = keystream
            .as_ref()
            .is_some_and(|ks| ks.block == block && ks.offset <= offset);
        if !reusable {
            *keystream = None;
        }
        let ks = keystream.get_or_insert_with(|| Keystream {
            block,
            offset: 0,
            rc4: self.block_cipher(block),
        });
        ks.rc4.discard(offset - ks.offset);
        ks.offset = offset;
        ks
    }

    fn apply(&self, keystream: &mut Option<Keystream>, data: &mut [u8], position: u64) {
        let mut pos = position;
        let mut done = 0;
        while done < data.len() {
            let ks = self.align(keystream, pos);
            let take = (RC4_BLOCK_SIZE - ks.offset).min(data.len() - done);
            ks.rc4.apply_keystream(&mut data[done..done + take]);
            ks.offset += take;
            done += take;
            pos += take as u64;
        }
    }
}

impl Cipher {
    /// Realign the keystream so the next byte produced belongs to `position`.
    /// A no-op for XOR, which has no running state.
    pub fn seek(&self, keystream: &mut Option<Keystream>, position: u64) {
        if let Cipher::Rc4(key) = self {
            key.align(keystream, position);
        }
    }

    pub fn is_rc4(&self) -> bool {
        matches!(self, Cipher::Rc4(_))
    }

    /// Decrypt `data`, which starts at absolute stream offset `position` and
    /// is part of a record with `record_len` payload bytes.
    pub fn decrypt(
        &self,
        keystream: &mut Option<Keystream>,
        data: &mut [u8],
        position: u64,
        record_len: usize,
    ) {
        match self {
            Cipher::Xor { array } => xor::decrypt(array, data, position, record_len),
            Cipher::Rc4(key) => key.apply(keystream, data, position),
        }
    }
}
