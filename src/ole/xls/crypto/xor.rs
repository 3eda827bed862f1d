//! XOR obfuscation (method 1).
//!
//! The password yields a 16-bit key and verifier stored in FILEPASS, plus a
//! 16-byte array that every protected byte is XORed with and rotated.

const INITIAL_CODE: [u16; 15] = [
    0xE1F0, 0x1D0F, 0xCC9C, 0x84C0, 0x110C, 0x0E10, 0xF1CE, 0x313E, 0x1872, 0xE139, 0xD40F,
    0x84F9, 0x280C, 0xA96A, 0x4EC3,
];

const PAD_ARRAY: [u8; 15] = [
    0xBB, 0xFF, 0xFF, 0xBA, 0xFF, 0xFF, 0xB9, 0x80, 0x00, 0xBE, 0x0F, 0x00, 0xBF, 0x0F, 0x00,
];

const XOR_MATRIX: [u16; 105] = [
    0xAEFC, 0x4DD9, 0x9BB2, 0x2745, 0x4E8A, 0x9D14, 0x2A09, 0x7B61, 0xF6C2, 0xFDA5, 0xEB6B,
    0xC6F7, 0x9DCF, 0x2BBF, 0x4563, 0x8AC6, 0x05AD, 0x0B5A, 0x16B4, 0x2D68, 0x5AD0, 0x0375,
    0x06EA, 0x0DD4, 0x1BA8, 0x3750, 0x6EA0, 0xDD40, 0xD849, 0xA0B3, 0x5147, 0xA28E, 0x553D,
    0xAA7A, 0x44D5, 0x6F45, 0xDE8A, 0xAD35, 0x4A4B, 0x9496, 0x390D, 0x721A, 0xEB23, 0xC667,
    0x9CEF, 0x29FF, 0x53FE, 0xA7FC, 0x5FD9, 0x47D3, 0x8FA6, 0x0F6D, 0x1EDA, 0x3DB4, 0x7B68,
    0xF6D0, 0xB861, 0x60E3, 0xC1C6, 0x93AD, 0x377B, 0x6EF6, 0xDDEC, 0x45A0, 0x8B40, 0x06A1,
    0x0D42, 0x1A84, 0x3508, 0x6A10, 0xAA51, 0x4483, 0x8906, 0x022D, 0x045A, 0x08B4, 0x1168,
    0x76B4, 0xED68, 0xCAF1, 0x85C3, 0x1BA7, 0x374E, 0x6E9C, 0x3730, 0x6E60, 0xDCC0, 0xA9A1,
    0x4363, 0x86C6, 0x1DAD, 0x3331, 0x6662, 0xCCC4, 0x89A9, 0x0373, 0x06E6, 0x0DCC, 0x1021,
    0x2042, 0x4084, 0x8108, 0x1231, 0x2462, 0x48C4,
];

/// Password bytes used by the XOR scheme: one byte per UTF-16 unit (the
/// low byte unless it is zero), at most 15 of them.
pub fn password_bytes(password: &str) -> Vec<u8> {
    password
        .encode_utf16()
        .map(|unit| {
            let [lo, hi] = unit.to_le_bytes();
            if lo != 0 { lo } else { hi }
        })
        .take(15)
        .collect()
}

pub fn create_key(password: &[u8]) -> u16 {
    if password.is_empty() {
        return 0;
    }
    let mut key = INITIAL_CODE[password.len() - 1];
    let mut cur = XOR_MATRIX.len();
    for &byte in password.iter().rev() {
        let mut ch = byte;
        for _ in 0..7 {
            cur -= 1;
            if ch & 0x40 != 0 {
                key ^= XOR_MATRIX[cur];
            }
            ch <<= 1;
        }
    }
    key
}

pub fn create_verifier(password: &[u8]) -> u16 {
    let mut v: u16 = 0;
    let len = password.len() as u8;
    for &b in std::iter::once(&len).chain(password.iter()).rev() {
        v = (((v >> 14) & 1) | ((v << 1) & 0x7FFF)) ^ b as u16;
    }
    v ^ 0xCE4B
}

fn xor_ror(a: u8, b: u8) -> u8 {
    (a ^ b).rotate_right(1)
}

/// The 16-byte array protected bytes are combined with
pub fn create_xor_array(password: &[u8], key: u16) -> [u8; 16] {
    let mut arr = [0u8; 16];
    let len = password.len().min(15);
    let [key_lo, key_hi] = key.to_le_bytes();

    let mut idx = len;
    if len % 2 == 1 {
        arr[idx] = xor_ror(PAD_ARRAY[0], key_hi);
        idx -= 1;
        arr[idx] = xor_ror(password[len - 1], key_lo);
    }
    while idx > 0 {
        idx -= 1;
        arr[idx] = xor_ror(password[idx], key_hi);
        idx -= 1;
        arr[idx] = xor_ror(password[idx], key_lo);
    }

    // Padding fills from the end in pairs; an odd pad count overshoots by one.
    let mut idx = 15isize;
    let mut pad = 15 - len as isize;
    while pad > 0 {
        arr[idx as usize] = xor_ror(PAD_ARRAY[pad as usize], key_hi);
        idx -= 1;
        pad -= 1;
        arr[idx as usize] = xor_ror(PAD_ARRAY[pad as usize], key_lo);
        idx -= 1;
        pad -= 1;
    }
    arr
}

/// Decrypt `data` which starts at absolute stream `position` and belongs to
/// a record of `record_len` payload bytes.
pub fn decrypt(array: &[u8; 16], data: &mut [u8], position: u64, record_len: usize) {
    for (i, b) in data.iter_mut().enumerate() {
        let index = ((position + i as u64 + record_len as u64) % 16) as usize;
        *b = (*b ^ array[index]).rotate_right(5);
    }
}

#[cfg(test)]
pub(crate) fn encrypt(array: &[u8; 16], data: &mut [u8], position: u64, record_len: usize) {
    for (i, b) in data.iter_mut().enumerate() {
        let index = ((position + i as u64 + record_len as u64) % 16) as usize;
        *b = b.rotate_left(5) ^ array[index];
    }
}
