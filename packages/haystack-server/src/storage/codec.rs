//! Little-endian field codecs for the data and index files.
//!
//! Per the design notes, the mmap regions are never overlaid with a
//! `#[repr(C)]` struct pointer cast; every multi-byte field is read and
//! written explicitly through these helpers instead. The cost is a
//! handful of `copy_from_slice` calls per access; the benefit is that
//! nothing here depends on the host's native endianness or struct
//! layout rules.

/// Reads a little-endian `u32` from `bytes[offset..offset+4]`.
#[must_use]
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

/// Writes `value` as little-endian into `bytes[offset..offset+4]`.
pub fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Reads a little-endian `u64` from `bytes[offset..offset+8]`.
#[must_use]
pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

/// Writes `value` as little-endian into `bytes[offset..offset+8]`.
pub fn write_u64(bytes: &mut [u8], offset: usize, value: u64) {
    bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
