//! MIDX file parsing and the read-only lookup API.

use std::io::{Cursor, Read};
use std::path::Path;

use git_hash::hasher::Hasher;
use git_hash::{HashAlgorithm, ObjectId};
use memmap2::Mmap;

use super::codec::{
    read_oid, read_u32_be, read_u64_be, HEADER_SIZE, LARGE_OFFSET_ESCAPE_BIT, LOOKUP_ROW_SIZE,
    MAGIC, TAG_BTMP, TAG_LOFF, TAG_OIDF, TAG_OIDL, TAG_OOFF, TAG_PNAM, TAG_RIDX, VERSION,
};
use super::error::{ChunkTag, MidxError};

/// A non-fatal condition observed while opening or verifying a MIDX file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidxWarning {
    /// A chunk tag the reader doesn't recognize; its bytes were skipped.
    UnknownChunk(ChunkTag),
}

/// Parsed, immutable state of a multi-pack-index file.
pub struct MidxFile {
    hash_algorithm: HashAlgorithm,
    pack_count: u32,
    pack_names: Vec<String>,
    fanout: [u32; 256],
    oid_table: Vec<ObjectId>,
    ooff_table: Vec<(u32, u32)>,
    loff_table: Vec<u64>,
    ridx_table: Option<Vec<u32>>,
    ridx_pack_bounds: Option<Vec<(usize, usize)>>,
    #[allow(dead_code)] // retained for completeness; not consulted by any lookup yet
    btmp_table: Option<Vec<(u32, u32)>>,
    warnings: Vec<MidxWarning>,
    source_bytes: Vec<u8>,
    trailing_digest: Vec<u8>,
}

fn hash_algorithm_from_code(code: u8) -> Result<HashAlgorithm, MidxError> {
    match code {
        1 => Ok(HashAlgorithm::Sha1),
        2 => Ok(HashAlgorithm::Sha256),
        other => Err(MidxError::UnsupportedFormat(format!(
            "unknown hash-algorithm code {other}"
        ))),
    }
}

fn read_exact_tracked(
    source: &mut dyn Read,
    len: usize,
    track: &mut Vec<u8>,
) -> Result<Vec<u8>, MidxError> {
    let mut buf = vec![0u8; len];
    source.read_exact(&mut buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            MidxError::MalformedFile("unexpected end of file".into())
        } else {
            MidxError::Io(e)
        }
    })?;
    track.extend_from_slice(&buf);
    Ok(buf)
}

/// Parse a MIDX from `source`, validating structural invariants.
///
/// `source` need not be seekable; it is read exactly once, front to back.
pub fn open(source: &mut dyn Read) -> Result<MidxFile, MidxError> {
    let mut tracked = Vec::new();

    let header = read_exact_tracked(source, HEADER_SIZE as usize, &mut tracked)?;
    let magic = read_u32_be(&header, 0)?;
    if magic != MAGIC {
        return Err(MidxError::UnsupportedFormat("bad magic".into()));
    }
    let version = header[4];
    if version != VERSION {
        return Err(MidxError::UnsupportedFormat(format!(
            "unsupported version {version}"
        )));
    }
    let hash_algorithm = hash_algorithm_from_code(header[5])?;
    let chunk_count = header[6] as usize;
    // header[7] is reserved.
    let pack_count = read_u32_be(&header, 8)?;

    let lookup_bytes = read_exact_tracked(
        source,
        (chunk_count + 1) * LOOKUP_ROW_SIZE as usize,
        &mut tracked,
    )?;
    let mut rows = Vec::with_capacity(chunk_count + 1);
    for i in 0..=chunk_count {
        let pos = i * LOOKUP_ROW_SIZE as usize;
        let tag = read_u32_be(&lookup_bytes, pos)?;
        let start = read_u64_be(&lookup_bytes, pos + 4)?;
        rows.push((tag, start));
    }
    let body_start = HEADER_SIZE + (chunk_count as u64 + 1) * LOOKUP_ROW_SIZE;
    let mut previous_start = body_start;
    for &(_, start) in &rows {
        if start < previous_start {
            return Err(MidxError::MalformedFile(
                "chunk lookup offsets are not non-decreasing".into(),
            ));
        }
        previous_start = start;
    }
    if rows[0].1 != body_start {
        return Err(MidxError::MalformedFile(
            "first chunk does not start immediately after the lookup table".into(),
        ));
    }
    let (sentinel_tag, _) = rows[chunk_count];
    if sentinel_tag != 0 {
        return Err(MidxError::MalformedFile("lookup sentinel tag is not 0".into()));
    }

    let mut fanout: Option<[u32; 256]> = None;
    let mut oid_table: Option<Vec<ObjectId>> = None;
    let mut ooff_table: Option<Vec<(u32, u32)>> = None;
    let mut loff_table: Vec<u64> = Vec::new();
    let mut ridx_table: Option<Vec<u32>> = None;
    let mut btmp_table: Option<Vec<(u32, u32)>> = None;
    let mut pack_names: Option<Vec<String>> = None;
    let mut warnings = Vec::new();
    let mut seen_tags = std::collections::HashSet::new();

    for i in 0..chunk_count {
        let (tag, start) = rows[i];
        let (_, next_start) = rows[i + 1];
        let len = next_start
            .checked_sub(start)
            .ok_or_else(|| MidxError::MalformedFile("chunk length underflow".into()))?;
        if len > i32::MAX as u64 - 8 {
            return Err(MidxError::TooLarge);
        }

        if tag != 0 && !seen_tags.insert(tag) {
            return Err(MidxError::RepeatedChunk(ChunkTag::from_u32(tag)));
        }

        let body = read_exact_tracked(source, len as usize, &mut tracked)?;

        match tag {
            TAG_OIDF => {
                if len != 1024 {
                    return Err(MidxError::MalformedFile("OIDF is not 1024 bytes".into()));
                }
                let mut table = [0u32; 256];
                for (i, slot) in table.iter_mut().enumerate() {
                    *slot = read_u32_be(&body, i * 4)?;
                }
                for i in 1..256 {
                    if table[i] < table[i - 1] {
                        return Err(MidxError::MalformedFile("fanout is not monotone".into()));
                    }
                }
                fanout = Some(table);
            }
            TAG_OIDL => {
                let width = hash_algorithm.digest_len();
                if len as usize % width != 0 {
                    return Err(MidxError::MalformedFile(
                        "OIDL length is not a multiple of the OID width".into(),
                    ));
                }
                let count = len as usize / width;
                let mut table = Vec::with_capacity(count);
                let mut previous: Option<ObjectId> = None;
                for i in 0..count {
                    let oid = read_oid(&body, i * width, hash_algorithm)?;
                    if let Some(prev) = previous {
                        if oid <= prev {
                            return Err(MidxError::MalformedFile(
                                "OID table is not strictly ascending".into(),
                            ));
                        }
                    }
                    previous = Some(oid);
                    table.push(oid);
                }
                oid_table = Some(table);
            }
            TAG_OOFF => {
                if len as usize % 8 != 0 {
                    return Err(MidxError::MalformedFile(
                        "OOFF length is not a multiple of 8".into(),
                    ));
                }
                let count = len as usize / 8;
                let mut table = Vec::with_capacity(count);
                for i in 0..count {
                    let pos = i * 8;
                    let pack_ordinal = read_u32_be(&body, pos)?;
                    if pack_ordinal >= pack_count {
                        return Err(MidxError::MalformedFile(format!(
                            "OOFF entry references out-of-range pack ordinal {pack_ordinal}"
                        )));
                    }
                    let offset_word = read_u32_be(&body, pos + 4)?;
                    table.push((pack_ordinal, offset_word));
                }
                ooff_table = Some(table);
            }
            TAG_LOFF => {
                if len as usize % 8 != 0 {
                    return Err(MidxError::MalformedFile(
                        "LOFF length is not a multiple of 8".into(),
                    ));
                }
                let count = len as usize / 8;
                loff_table = (0..count)
                    .map(|i| read_u64_be(&body, i * 8))
                    .collect::<Result<_, _>>()?;
            }
            TAG_RIDX => {
                if len as usize % 4 != 0 {
                    return Err(MidxError::MalformedFile(
                        "RIDX length is not a multiple of 4".into(),
                    ));
                }
                let count = len as usize / 4;
                let table: Vec<u32> = (0..count)
                    .map(|i| read_u32_be(&body, i * 4))
                    .collect::<Result<_, _>>()?;
                ridx_table = Some(table);
            }
            TAG_BTMP => {
                if len as usize % 8 != 0 {
                    return Err(MidxError::MalformedFile(
                        "BTMP length is not a multiple of 8".into(),
                    ));
                }
                let count = len as usize / 8;
                let mut table = Vec::with_capacity(count);
                for i in 0..count {
                    let pos = i * 8;
                    let cumulative = read_u32_be(&body, pos)?;
                    let this_pack = read_u32_be(&body, pos + 4)?;
                    table.push((cumulative, this_pack));
                }
                btmp_table = Some(table);
            }
            TAG_PNAM => {
                let mut names = Vec::new();
                let mut start = 0usize;
                for (i, &b) in body.iter().enumerate() {
                    if b == 0 {
                        if i == start {
                            return Err(MidxError::MalformedFile("empty pack name".into()));
                        }
                        let name = std::str::from_utf8(&body[start..i])
                            .map_err(|_| MidxError::MalformedFile("pack name is not UTF-8".into()))?
                            .to_string();
                        names.push(name);
                        start = i + 1;
                    }
                }
                if start != body.len() {
                    return Err(MidxError::MalformedFile(
                        "PNAM body does not end on a name terminator".into(),
                    ));
                }
                pack_names = Some(names);
            }
            _ => {
                warnings.push(MidxWarning::UnknownChunk(ChunkTag::from_u32(tag)));
            }
        }
    }

    let digest_width = hash_algorithm.digest_len();
    let trailing_digest = read_exact_tracked(source, digest_width, &mut tracked)?;

    let fanout = fanout.ok_or(MidxError::MissingChunk(ChunkTag::from_u32(TAG_OIDF)))?;
    let oid_table = oid_table.ok_or(MidxError::MissingChunk(ChunkTag::from_u32(TAG_OIDL)))?;
    let ooff_table = ooff_table.ok_or(MidxError::MissingChunk(ChunkTag::from_u32(TAG_OOFF)))?;
    let pack_names = pack_names.ok_or(MidxError::MissingChunk(ChunkTag::from_u32(TAG_PNAM)))?;

    if fanout[255] as usize != oid_table.len() {
        return Err(MidxError::MalformedFile(
            "fanout[255] does not match the OID table length".into(),
        ));
    }
    if ooff_table.len() != oid_table.len() {
        return Err(MidxError::MalformedFile(
            "OOFF table length does not match the OID table length".into(),
        ));
    }
    if pack_count as usize != pack_names.len() {
        return Err(MidxError::PackCountMismatch {
            header: pack_count,
            names: pack_names.len() as u32,
        });
    }

    for &(_, offset_word) in &ooff_table {
        if offset_word & LARGE_OFFSET_ESCAPE_BIT != 0 {
            let index = (offset_word & !LARGE_OFFSET_ESCAPE_BIT) as usize;
            if index >= loff_table.len() {
                return Err(MidxError::MalformedFile(
                    "OOFF entry escapes into an out-of-range LOFF index".into(),
                ));
            }
        }
    }

    let ridx_pack_bounds = match &ridx_table {
        Some(ridx) => Some(build_ridx_bounds(ridx, &ooff_table, &loff_table, pack_count)?),
        None => None,
    };

    Ok(MidxFile {
        hash_algorithm,
        pack_count,
        pack_names,
        fanout,
        oid_table,
        ooff_table,
        loff_table,
        ridx_table,
        ridx_pack_bounds,
        btmp_table,
        warnings,
        source_bytes: tracked,
        trailing_digest,
    })
}

/// Groups contiguous runs of `ridx` by pack ordinal, validating that each run
/// is itself sorted by offset ascending and that the whole table is a
/// permutation of `[0, ridx.len())`.
fn build_ridx_bounds(
    ridx: &[u32],
    ooff: &[(u32, u32)],
    loff: &[u64],
    pack_count: u32,
) -> Result<Vec<(usize, usize)>, MidxError> {
    let offset_at = |pos: usize| -> Result<u64, MidxError> {
        decode_offset_word(ooff[pos].1, loff).ok_or_else(|| {
            MidxError::MalformedFile("OOFF entry escapes into an out-of-range LOFF index".into())
        })
    };

    let mut seen = vec![false; ridx.len()];
    let mut bounds = vec![(0usize, 0usize); pack_count as usize];
    let mut i = 0;
    while i < ridx.len() {
        let pos = ridx[i] as usize;
        if pos >= ooff.len() || seen[pos] {
            return Err(MidxError::MalformedFile(
                "RIDX is not a permutation of the MIDX positions".into(),
            ));
        }
        seen[pos] = true;

        let ordinal = ooff[pos].0 as usize;
        let start = i;
        let mut previous_offset = offset_at(pos)?;
        i += 1;
        while i < ridx.len() {
            let next_pos = ridx[i] as usize;
            if next_pos >= ooff.len() {
                return Err(MidxError::MalformedFile(
                    "RIDX references an out-of-range MIDX position".into(),
                ));
            }
            if ooff[next_pos].0 as usize != ordinal {
                break;
            }
            if seen[next_pos] {
                return Err(MidxError::MalformedFile(
                    "RIDX is not a permutation of the MIDX positions".into(),
                ));
            }
            seen[next_pos] = true;
            let next_offset = offset_at(next_pos)?;
            if next_offset < previous_offset {
                return Err(MidxError::MalformedFile(
                    "RIDX group is not sorted by offset ascending".into(),
                ));
            }
            previous_offset = next_offset;
            i += 1;
        }
        bounds[ordinal] = (start, i);
    }
    if seen.iter().any(|&s| !s) {
        return Err(MidxError::MalformedFile(
            "RIDX does not cover every MIDX position".into(),
        ));
    }
    Ok(bounds)
}

/// Decodes a raw OOFF offset word, following the large-offset escape through
/// `loff` when the high bit is set.
fn decode_offset_word(offset_word: u32, loff: &[u64]) -> Option<u64> {
    if offset_word & LARGE_OFFSET_ESCAPE_BIT != 0 {
        let index = (offset_word & !LARGE_OFFSET_ESCAPE_BIT) as usize;
        loff.get(index).copied()
    } else {
        Some(offset_word as u64)
    }
}

impl MidxFile {
    /// Mmap `path` and parse it through [`open`].
    pub fn open_from_path(path: &Path) -> Result<Self, MidxError> {
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let mut cursor = Cursor::new(&mmap[..]);
        open(&mut cursor)
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn pack_count(&self) -> u32 {
        self.pack_count
    }

    pub fn object_count(&self) -> u32 {
        self.oid_table.len() as u32
    }

    /// The cumulative fanout count at `byte`: the number of OIDs whose first
    /// byte is `<= byte`.
    pub fn fanout(&self, byte: u8) -> u32 {
        self.fanout[byte as usize]
    }

    /// Warnings collected while opening (currently: unknown chunk tags).
    pub fn warnings(&self) -> &[MidxWarning] {
        &self.warnings
    }

    pub fn pack_name(&self, ordinal: u32) -> Option<&str> {
        self.pack_names.get(ordinal as usize).map(String::as_str)
    }

    /// The ordinal of `name`, if it names one of this file's packs.
    pub fn pack_name_to_ordinal(&self, name: &str) -> Option<u32> {
        self.pack_names
            .binary_search_by(|n| n.as_str().cmp(name))
            .ok()
            .map(|i| i as u32)
    }

    /// Look up `oid`, returning its `(pack_ordinal, offset)` if present.
    pub fn lookup(&self, oid: &ObjectId) -> Option<(u32, u64)> {
        let b = oid.first_byte();
        let lo = if b == 0 { 0 } else { self.fanout[b as usize - 1] as usize };
        let hi = self.fanout[b as usize] as usize;
        let slice = &self.oid_table[lo..hi];
        let i = slice.binary_search(oid).ok()? + lo;
        let (pack_ordinal, offset_word) = self.ooff_table[i];
        let offset = decode_offset_word(offset_word, &self.loff_table)?;
        Some((pack_ordinal, offset))
    }

    /// Iterate `(oid, pack_ordinal, offset)` in ascending OID order.
    pub fn iter_by_oid(&self) -> impl Iterator<Item = (ObjectId, u32, u64)> + '_ {
        self.oid_table.iter().enumerate().map(move |(i, &oid)| {
            let (pack_ordinal, offset_word) = self.ooff_table[i];
            let offset = decode_offset_word(offset_word, &self.loff_table)
                .expect("offsets were bounds-checked during open()");
            (oid, pack_ordinal, offset)
        })
    }

    /// If RIDX is present, the MIDX position of the entry at `(pack_ordinal, offset)`.
    pub fn reverse_lookup(&self, pack_ordinal: u32, offset: u64) -> Option<u32> {
        let ridx = self.ridx_table.as_ref()?;
        let bounds = self.ridx_pack_bounds.as_ref()?;
        let (start, end) = *bounds.get(pack_ordinal as usize)?;
        let slice = &ridx[start..end];
        let found = slice
            .binary_search_by(|&midx_pos| {
                let (_, offset_word) = self.ooff_table[midx_pos as usize];
                let entry_offset =
                    decode_offset_word(offset_word, &self.loff_table).unwrap_or(u64::MAX);
                entry_offset.cmp(&offset)
            })
            .ok()?;
        Some(slice[found])
    }

    /// Recompute the file's digest over every byte read except the trailer
    /// and compare it to the stored trailer.
    pub fn verify(&self) -> Result<(), MidxError> {
        let digest = Hasher::digest(self.hash_algorithm, &self.source_bytes).map_err(MidxError::Hash)?;
        if digest.as_bytes() != self.trailing_digest.as_slice() {
            return Err(MidxError::MalformedFile(
                "trailing digest does not match file contents".into(),
            ));
        }
        Ok(())
    }
}

fn _assert_send_sync() {
    fn assert<T: Send + Sync>() {}
    assert::<MidxFile>();
}
