//! Byte-level primitives shared by the MIDX reader and writer.
//!
//! These are unaware of chunk semantics; they only know about fixed-width
//! big-endian integers and raw OID copies, the same level the inline
//! `from_be_bytes`/`to_be_bytes` calls in `index.rs` and `revindex.rs`
//! operate at.

use git_hash::{HashAlgorithm, ObjectId};

use super::error::MidxError;

pub const MAGIC: u32 = 0x4d49_4458; // "MIDX"
pub const VERSION: u8 = 1;

pub const TAG_PNAM: u32 = 0x504e_414d;
pub const TAG_OIDF: u32 = 0x4f49_4446;
pub const TAG_OIDL: u32 = 0x4f49_444c;
pub const TAG_OOFF: u32 = 0x4f4f_4646;
pub const TAG_LOFF: u32 = 0x4c4f_4646;
pub const TAG_RIDX: u32 = 0x5249_4458;
pub const TAG_BTMP: u32 = 0x4254_4d50;

pub const HEADER_SIZE: u64 = 12;
pub const LOOKUP_ROW_SIZE: u64 = 12;
pub const LARGE_OFFSET_ESCAPE_BIT: u32 = 0x8000_0000;

/// Read a big-endian `u32` from `buf` at `pos`.
pub fn read_u32_be(buf: &[u8], pos: usize) -> Result<u32, MidxError> {
    let end = pos
        .checked_add(4)
        .ok_or_else(|| MidxError::MalformedFile("position overflow".into()))?;
    let slice = buf
        .get(pos..end)
        .ok_or_else(|| MidxError::MalformedFile("truncated while reading u32".into()))?;
    Ok(u32::from_be_bytes(slice.try_into().unwrap()))
}

/// Read a big-endian `u64` from `buf` at `pos`.
pub fn read_u64_be(buf: &[u8], pos: usize) -> Result<u64, MidxError> {
    let end = pos
        .checked_add(8)
        .ok_or_else(|| MidxError::MalformedFile("position overflow".into()))?;
    let slice = buf
        .get(pos..end)
        .ok_or_else(|| MidxError::MalformedFile("truncated while reading u64".into()))?;
    Ok(u64::from_be_bytes(slice.try_into().unwrap()))
}

/// Write a big-endian `u32` to `sink`.
pub fn write_u32_be(sink: &mut dyn std::io::Write, v: u32) -> Result<(), MidxError> {
    sink.write_all(&v.to_be_bytes())?;
    Ok(())
}

/// Write a big-endian `u64` to `sink`.
pub fn write_u64_be(sink: &mut dyn std::io::Write, v: u64) -> Result<(), MidxError> {
    sink.write_all(&v.to_be_bytes())?;
    Ok(())
}

/// Copy `oid-width` raw bytes from `src_buf` at `src_pos` into `dst_buf` at `dst_pos`.
pub fn copy_oid(src_buf: &[u8], src_pos: usize, dst_buf: &mut [u8], dst_pos: usize, oid_width: usize) {
    dst_buf[dst_pos..dst_pos + oid_width].copy_from_slice(&src_buf[src_pos..src_pos + oid_width]);
}

/// Read an [`ObjectId`] of `algo`'s width out of `buf` at `pos`.
pub fn read_oid(buf: &[u8], pos: usize, algo: HashAlgorithm) -> Result<ObjectId, MidxError> {
    let width = algo.digest_len();
    let end = pos
        .checked_add(width)
        .ok_or_else(|| MidxError::MalformedFile("position overflow".into()))?;
    let slice = buf
        .get(pos..end)
        .ok_or_else(|| MidxError::MalformedFile("truncated while reading OID".into()))?;
    ObjectId::from_bytes(slice, algo).map_err(MidxError::Hash)
}
