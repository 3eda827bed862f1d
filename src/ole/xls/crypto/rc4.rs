//! RC4 keystream and the per-block key schedules of the two BIFF8 RC4 schemes.
//!
//! Both schemes rekey every 1024 bytes of the workbook stream. The standard
//! scheme derives block keys with MD5 from a 40-bit password hash; the
//! CryptoAPI scheme with SHA-1 from a spun password hash.

use md5::{Digest as _, Md5};
use sha1::Sha1;
use zeroize::{Zeroize, Zeroizing};

/// RC4 stream cipher state (KSA + PRGA)
#[derive(Clone)]
pub struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    /// `key` must not be empty.
    pub fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];
        for (i, v) in s.iter_mut().enumerate() {
            *v = i as u8;
        }
        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }
        Self { s, i: 0, j: 0 }
    }

    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for b in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let idx = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
            *b ^= self.s[idx as usize];
        }
    }

    /// Advance the keystream without producing output
    pub fn discard(&mut self, mut n: usize) {
        let mut scratch = [0u8; 64];
        while n > 0 {
            let take = n.min(scratch.len());
            self.apply_keystream(&mut scratch[..take]);
            n -= take;
        }
        scratch.zeroize();
    }
}

impl Zeroize for Rc4 {
    fn zeroize(&mut self) {
        self.s.zeroize();
        self.i = 0;
        self.j = 0;
    }
}

impl Drop for Rc4 {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for Rc4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rc4").finish_non_exhaustive()
    }
}

pub(crate) fn utf16le_bytes(password: &str) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(password.encode_utf16().flat_map(u16::to_le_bytes).collect())
}

/// Standard RC4 key material: the first 5 bytes of
/// `MD5((MD5(password)[..5] || salt) * 16)`.
pub fn standard_key_material(password: &str, salt: &[u8; 16]) -> Zeroizing<Vec<u8>> {
    let pw = utf16le_bytes(password);
    let mut h0 = Md5::digest(&pw[..]);

    let mut buf = Zeroizing::new(Vec::with_capacity(21 * 16));
    for _ in 0..16 {
        buf.extend_from_slice(&h0[..5]);
        buf.extend_from_slice(salt);
    }
    h0.as_mut_slice().zeroize();

    let mut h1 = Md5::digest(&buf[..]);
    let material = Zeroizing::new(h1[..5].to_vec());
    h1.as_mut_slice().zeroize();
    material
}

/// Standard RC4 block key: all 16 bytes of `MD5(material || block_le)`.
pub fn standard_block_key(material: &[u8], block: u32) -> Zeroizing<Vec<u8>> {
    let mut h = Md5::new();
    h.update(material);
    h.update(block.to_le_bytes());
    let mut digest = h.finalize();
    let key = Zeroizing::new(digest.to_vec());
    digest.as_mut_slice().zeroize();
    key
}

/// Number of SHA-1 rounds applied to the CryptoAPI password hash
pub const CRYPTOAPI_SPIN_COUNT: u32 = 50_000;

/// CryptoAPI key material: `SHA1(salt || password)` spun 50,000 times
/// as `SHA1(i_le || H)`.
pub fn cryptoapi_key_material(password: &str, salt: &[u8]) -> Zeroizing<Vec<u8>> {
    let pw = utf16le_bytes(password);
    let mut h: Sha1 = sha1::Digest::new_with_prefix(salt);
    sha1::Digest::update(&mut h, &pw[..]);
    let mut hash = Zeroizing::new(sha1_finalize(h));

    for i in 0..CRYPTOAPI_SPIN_COUNT {
        let mut h: Sha1 = sha1::Digest::new_with_prefix(i.to_le_bytes());
        sha1::Digest::update(&mut h, &hash[..]);
        let mut next = sha1_finalize(h);
        hash.copy_from_slice(&next);
        next.zeroize();
    }
    Zeroizing::new(hash.to_vec())
}

/// CryptoAPI block key: the first `key_len` bytes of `SHA1(material || block_le)`.
/// 40-bit keys are zero-padded to 16 bytes, as CryptoAPI does.
pub fn cryptoapi_block_key(material: &[u8], block: u32, key_len: usize) -> Zeroizing<Vec<u8>> {
    let mut h: Sha1 = sha1::Digest::new_with_prefix(material);
    sha1::Digest::update(&mut h, block.to_le_bytes());
    let mut digest = sha1_finalize(h);
    let mut key = digest[..key_len.min(digest.len())].to_vec();
    if key_len == 5 {
        key.resize(16, 0);
    }
    digest.zeroize();
    Zeroizing::new(key)
}

pub(crate) fn sha1_finalize(h: Sha1) -> [u8; 20] {
    let digest = sha1::Digest::finalize(h);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

pub(crate) fn sha1_bytes(data: &[u8]) -> [u8; 20] {
    let h: Sha1 = sha1::Digest::new_with_prefix(data);
    sha1_finalize(h)
}

pub(crate) fn md5_bytes(data: &[u8]) -> [u8; 16] {
    let digest = Md5::digest(data);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest);
    out
}
