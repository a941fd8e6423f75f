//! CRC-32 as defined by the PNG specification (ISO 3309 / ITU-T V.42).

/// Reflected form of the CRC-32 polynomial.
const POLY: u32 = 0xEDB8_8320;

/// Lookup table for every byte value, built at compile time.
static TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { POLY ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

/// Feed `bytes` into a running (pre-inverted) CRC register.
fn update(mut acc: u32, bytes: &[u8]) -> u32 {
    for &b in bytes {
        acc = TABLE[((acc ^ b as u32) & 0xFF) as usize] ^ (acc >> 8);
    }
    acc
}

/// Compute the CRC-32 of `bytes`.
///
/// For a chunk this must be fed `type ++ data`, never the length field.
pub fn crc32(bytes: &[u8]) -> u32 {
    update(0xFFFF_FFFF, bytes) ^ 0xFFFF_FFFF
}

/// CRC over a chunk type and its data without concatenating them first.
pub(crate) fn chunk_crc(kind: &[u8; 4], data: &[u8]) -> u32 {
    update(update(0xFFFF_FFFF, kind), data) ^ 0xFFFF_FFFF
}
