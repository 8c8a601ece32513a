//! MIDX file generation.

use std::io::Write;
use std::path::Path;

use git_hash::HashAlgorithm;
use git_utils::lockfile::LockFile;

use super::codec::{
    write_u32_be, write_u64_be, HEADER_SIZE, LARGE_OFFSET_ESCAPE_BIT, LOOKUP_ROW_SIZE, MAGIC,
    TAG_BTMP, TAG_LOFF, TAG_OIDF, TAG_OIDL, TAG_OOFF, TAG_PNAM, TAG_RIDX, VERSION,
};
use super::digest_sink::DigestingSink;
use super::error::MidxError;
use super::merge::PackIndexMerger;
use super::monitor::Monitor;

/// Which optional chunks to plan for a given write.
#[derive(Debug, Clone, Copy)]
pub struct MidxWriteOptions {
    /// Emit the RIDX (reverse index) chunk.
    pub include_reverse_index: bool,
    /// Emit the BTMP (bitmapped-packs info) chunk.
    ///
    /// Always planned by default — see the BTMP decision in `SPEC_FULL.md`.
    pub include_bitmap_info: bool,
}

impl Default for MidxWriteOptions {
    fn default() -> Self {
        Self {
            include_reverse_index: true,
            include_bitmap_info: true,
        }
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone)]
pub struct MidxWriteReport {
    pub bytes_written: u64,
    pub object_count: u32,
    pub pack_names: Vec<String>,
}

#[derive(Clone, Copy)]
enum ChunkKind {
    Oidf,
    Oidl,
    Ooff,
    Loff,
    Ridx,
    Btmp,
    Pnam,
}

impl ChunkKind {
    fn tag(self) -> u32 {
        match self {
            ChunkKind::Oidf => TAG_OIDF,
            ChunkKind::Oidl => TAG_OIDL,
            ChunkKind::Ooff => TAG_OOFF,
            ChunkKind::Loff => TAG_LOFF,
            ChunkKind::Ridx => TAG_RIDX,
            ChunkKind::Btmp => TAG_BTMP,
            ChunkKind::Pnam => TAG_PNAM,
        }
    }
}

struct PlannedChunk {
    kind: ChunkKind,
    size: u64,
}

/// Mutable state threaded through the OOFF/LOFF chunk-writer pair.
struct WriteContext {
    large_offsets: Vec<u64>,
}

/// Write a MIDX built from `merger` to `output`.
///
/// This is the low-level entry point used by property and scenario tests;
/// repository code should prefer [`write_to_path`], which writes through a
/// [`LockFile`] for atomicity.
pub fn write(
    monitor: &mut dyn Monitor,
    output: &mut dyn Write,
    merger: &PackIndexMerger,
    options: &MidxWriteOptions,
) -> Result<MidxWriteReport, MidxError> {
    let hash_algo = merger.hash_algorithm();
    let oid_width = hash_algo.digest_len() as u64;
    let digest_width = hash_algo.digest_len() as u64;

    let unique = merger.unique_object_count() as u64;
    let pack_count = merger.pack_count();

    let pnam_size: u64 = merger.pack_names().iter().map(|n| n.len() as u64 + 1).sum();

    let needs_loff = merger.needs_large_offsets_chunk();
    let large_count = merger.offsets_over_31_bits_count();

    let mut plan = vec![
        PlannedChunk { kind: ChunkKind::Oidf, size: 1024 },
        PlannedChunk { kind: ChunkKind::Oidl, size: unique * oid_width },
        PlannedChunk { kind: ChunkKind::Ooff, size: unique * 8 },
    ];
    if needs_loff {
        if large_count == 0 {
            return Err(MidxError::InternalError(
                "large-offset chunk planned with zero accumulated entries".into(),
            ));
        }
        plan.push(PlannedChunk { kind: ChunkKind::Loff, size: large_count * 8 });
    }
    if options.include_reverse_index {
        plan.push(PlannedChunk { kind: ChunkKind::Ridx, size: unique * 4 });
    }
    if options.include_bitmap_info {
        plan.push(PlannedChunk { kind: ChunkKind::Btmp, size: pack_count as u64 * 8 });
    }
    plan.push(PlannedChunk { kind: ChunkKind::Pnam, size: pnam_size });

    let chunk_count = plan.len() as u64;
    let body_size: u64 = plan.iter().map(|c| c.size).sum();
    let lookup_size = (chunk_count + 1) * LOOKUP_ROW_SIZE;
    let expected_total = HEADER_SIZE + lookup_size + body_size + digest_width;

    let mut sink = DigestingSink::new(output, hash_algo, monitor);

    write_header(&mut sink, hash_algo, chunk_count as u8, pack_count)?;
    write_lookup_table(&mut sink, &plan, HEADER_SIZE + lookup_size)?;

    let mut ctx = WriteContext { large_offsets: Vec::with_capacity(large_count as usize) };

    for chunk in &plan {
        match chunk.kind {
            ChunkKind::Oidf => write_oidf(&mut sink, merger)?,
            ChunkKind::Oidl => write_oidl(&mut sink, merger)?,
            ChunkKind::Ooff => write_ooff(&mut sink, merger, needs_loff, &mut ctx)?,
            ChunkKind::Loff => write_loff(&mut sink, &ctx)?,
            ChunkKind::Ridx => write_ridx(&mut sink, merger)?,
            ChunkKind::Btmp => write_btmp(&mut sink, merger)?,
            ChunkKind::Pnam => write_pnam(&mut sink, merger)?,
        }
    }

    let written_before_trailer = sink.length();
    let (output, digest) = sink.into_digest()?;
    output.write_all(digest.as_bytes())?;
    let actual_total = written_before_trailer + digest.as_bytes().len() as u64;

    if actual_total != expected_total {
        return Err(MidxError::InternalError(format!(
            "planned size {expected_total} does not match actual size {actual_total}"
        )));
    }

    Ok(MidxWriteReport {
        bytes_written: actual_total,
        object_count: unique as u32,
        pack_names: merger.pack_names().to_vec(),
    })
}

/// Write a MIDX for `merger` to `<pack_dir>/multi-pack-index`, atomically.
///
/// Writes through a [`LockFile`] at `<pack_dir>/multi-pack-index.lock` and
/// renames it into place on success; on any error the lock file is dropped,
/// which removes the partial output.
pub fn write_to_path(
    monitor: &mut dyn Monitor,
    pack_dir: &Path,
    merger: &PackIndexMerger,
    options: &MidxWriteOptions,
) -> Result<MidxWriteReport, MidxError> {
    let target = pack_dir.join("multi-pack-index");
    let mut lock = LockFile::acquire(&target)?;

    let report = write(monitor, &mut lock, merger, options)?;

    lock.commit()?;

    Ok(report)
}

fn write_header<W: Write>(
    sink: &mut DigestingSink<'_, W>,
    hash_algo: HashAlgorithm,
    chunk_count: u8,
    pack_count: u32,
) -> Result<(), MidxError> {
    let algo_code: u8 = match hash_algo {
        HashAlgorithm::Sha1 => 1,
        HashAlgorithm::Sha256 => 2,
    };
    let mut buf = Vec::with_capacity(12);
    write_u32_be(&mut buf, MAGIC)?;
    buf.push(VERSION);
    buf.push(algo_code);
    buf.push(chunk_count);
    buf.push(0); // reserved
    write_u32_be(&mut buf, pack_count)?;
    sink.write(&buf)
}

fn write_lookup_table<W: Write>(
    sink: &mut DigestingSink<'_, W>,
    plan: &[PlannedChunk],
    body_start: u64,
) -> Result<(), MidxError> {
    let mut offset = body_start;
    let mut buf = Vec::with_capacity((plan.len() + 1) * 12);
    for chunk in plan {
        write_u32_be(&mut buf, chunk.kind.tag())?;
        write_u64_be(&mut buf, offset)?;
        offset += chunk.size;
    }
    // Sentinel row.
    write_u32_be(&mut buf, 0)?;
    write_u64_be(&mut buf, offset)?;
    sink.write(&buf)
}

fn write_oidf<W: Write>(sink: &mut DigestingSink<'_, W>, merger: &PackIndexMerger) -> Result<(), MidxError> {
    let mut fanout = [0u32; 256];
    for entry in merger.by_oid_iterator() {
        fanout[entry.oid.first_byte() as usize] += 1;
    }
    for i in 1..256 {
        fanout[i] += fanout[i - 1];
    }
    let mut buf = Vec::with_capacity(1024);
    for count in fanout {
        write_u32_be(&mut buf, count)?;
    }
    sink.write(&buf)
}

fn write_oidl<W: Write>(sink: &mut DigestingSink<'_, W>, merger: &PackIndexMerger) -> Result<(), MidxError> {
    for entry in merger.by_oid_iterator() {
        sink.write(entry.oid.as_bytes())?;
    }
    Ok(())
}

fn write_ooff<W: Write>(
    sink: &mut DigestingSink<'_, W>,
    merger: &PackIndexMerger,
    needs_loff: bool,
    ctx: &mut WriteContext,
) -> Result<(), MidxError> {
    for entry in merger.by_oid_iterator() {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&entry.pack_ordinal.to_be_bytes());

        let offset_word = if needs_loff && entry.offset > i32::MAX as u64 {
            let index = ctx.large_offsets.len() as u32;
            ctx.large_offsets.push(entry.offset);
            index | LARGE_OFFSET_ESCAPE_BIT
        } else {
            entry.offset as u32
        };
        buf[4..8].copy_from_slice(&offset_word.to_be_bytes());
        sink.write(&buf)?;
    }
    Ok(())
}

fn write_loff<W: Write>(sink: &mut DigestingSink<'_, W>, ctx: &WriteContext) -> Result<(), MidxError> {
    let mut buf = Vec::with_capacity(ctx.large_offsets.len() * 8);
    for offset in &ctx.large_offsets {
        write_u64_be(&mut buf, *offset)?;
    }
    sink.write(&buf)
}

fn write_ridx<W: Write>(sink: &mut DigestingSink<'_, W>, merger: &PackIndexMerger) -> Result<(), MidxError> {
    let mut per_pack: Vec<Vec<(u64, u32)>> = vec![Vec::new(); merger.pack_count() as usize];
    for (midx_pos, entry) in merger.by_oid_iterator().enumerate() {
        per_pack[entry.pack_ordinal as usize].push((entry.offset, midx_pos as u32));
    }

    let mut buf = Vec::with_capacity(merger.unique_object_count() as usize * 4);
    for group in &mut per_pack {
        group.sort_by_key(|&(offset, _)| offset);
        for &(_, midx_pos) in group.iter() {
            buf.extend_from_slice(&midx_pos.to_be_bytes());
        }
    }
    sink.write(&buf)
}

fn write_btmp<W: Write>(sink: &mut DigestingSink<'_, W>, merger: &PackIndexMerger) -> Result<(), MidxError> {
    let mut cumulative = 0u32;
    let mut buf = Vec::with_capacity(merger.pack_count() as usize * 8);
    for &count in merger.objects_per_pack() {
        buf.extend_from_slice(&cumulative.to_be_bytes());
        buf.extend_from_slice(&count.to_be_bytes());
        cumulative += count;
    }
    sink.write(&buf)
}

fn write_pnam<W: Write>(sink: &mut DigestingSink<'_, W>, merger: &PackIndexMerger) -> Result<(), MidxError> {
    for name in merger.pack_names() {
        sink.write(name.as_bytes())?;
        sink.write_byte(0)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PackIndex;
    use crate::midx::merge::test_support::VecPackIndex;
    use crate::midx::merge::PackIndexSource;
    use crate::midx::monitor::NullMonitor;
    use crate::midx::read::open;
    use git_hash::ObjectId;
    use std::io::Cursor;

    fn oid(byte0: u8, last: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[0] = byte0;
        bytes[19] = last;
        ObjectId::from_bytes(&bytes, HashAlgorithm::Sha1).unwrap()
    }

    fn merger_from(packs: Vec<(&str, Vec<(ObjectId, u64)>)>) -> PackIndexMerger {
        let packs: Vec<(String, Box<dyn PackIndexSource>)> = packs
            .into_iter()
            .map(|(name, entries)| {
                (name.to_string(), Box::new(VecPackIndex::new(entries)) as Box<dyn PackIndexSource>)
            })
            .collect();
        PackIndexMerger::new(HashAlgorithm::Sha1, packs).unwrap()
    }

    #[test]
    fn minimal_single_object_file_matches_scenario_1() {
        let merger = merger_from(vec![("a.pack", vec![(oid(0x00, 0x01), 0x00)])]);
        let mut buf = Vec::new();
        let mut monitor = NullMonitor;
        let options = MidxWriteOptions {
            include_reverse_index: false,
            include_bitmap_info: false,
        };
        let report = write(&mut monitor, &mut buf, &merger, &options).unwrap();

        assert_eq!(&buf[0..4], &[0x4D, 0x49, 0x44, 0x58]);
        assert_eq!(buf[4], 1); // version
        assert_eq!(buf[5], 1); // hash-alg
        assert_eq!(buf[6], 4); // chunk count: OIDF, OIDL, OOFF, PNAM
        assert_eq!(buf[7], 0); // reserved
        assert_eq!(&buf[8..12], &[0, 0, 0, 1]); // pack-count

        assert_eq!(report.object_count, 1);
        assert_eq!(report.pack_names, vec!["a.pack".to_string()]);
        assert_eq!(report.bytes_written, buf.len() as u64);
    }

    #[test]
    fn roundtrips_through_reader() {
        let merger = merger_from(vec![
            ("a.pack", vec![(oid(0x01, 0x01), 100), (oid(0x02, 0x02), 50)]),
            ("b.pack", vec![(oid(0x03, 0x03), 10)]),
        ]);
        let mut buf = Vec::new();
        let mut monitor = NullMonitor;
        let report = write(&mut monitor, &mut buf, &merger, &MidxWriteOptions::default()).unwrap();
        assert_eq!(report.object_count, 3);

        let midx = open(&mut Cursor::new(buf)).unwrap();
        assert_eq!(midx.object_count(), 3);
        assert_eq!(midx.pack_count(), 2);

        let (pack_ordinal, offset) = midx.lookup(&oid(0x01, 0x01)).unwrap();
        assert_eq!(pack_ordinal, 0);
        assert_eq!(offset, 100);
    }

    #[test]
    fn large_offset_escape_roundtrips() {
        let merger = merger_from(vec![("a.pack", vec![(oid(0x01, 0x01), 0x1_0000_0000)])]);
        let mut buf = Vec::new();
        let mut monitor = NullMonitor;
        write(&mut monitor, &mut buf, &merger, &MidxWriteOptions::default()).unwrap();

        let midx = open(&mut Cursor::new(buf)).unwrap();
        let (_, offset) = midx.lookup(&oid(0x01, 0x01)).unwrap();
        assert_eq!(offset, 0x1_0000_0000);
    }

    #[test]
    fn two_large_offsets_in_oid_order() {
        let a = oid(0x01, 0x01);
        let b = oid(0x02, 0x02);
        let merger = merger_from(vec![(
            "a.pack",
            vec![(a, 0x8000_0000), (b, 0x1_0000_0005)],
        )]);
        let mut buf = Vec::new();
        let mut monitor = NullMonitor;
        write(&mut monitor, &mut buf, &merger, &MidxWriteOptions::default()).unwrap();
        let midx = open(&mut Cursor::new(buf)).unwrap();
        assert_eq!(midx.lookup(&a).unwrap().1, 0x8000_0000);
        assert_eq!(midx.lookup(&b).unwrap().1, 0x1_0000_0005);
    }

    #[test]
    fn deterministic_output_for_same_input() {
        let merger1 = merger_from(vec![("a.pack", vec![(oid(0x01, 0x01), 10)])]);
        let merger2 = merger_from(vec![("a.pack", vec![(oid(0x01, 0x01), 10)])]);
        let mut buf1 = Vec::new();
        let mut buf2 = Vec::new();
        let mut m1 = NullMonitor;
        let mut m2 = NullMonitor;
        write(&mut m1, &mut buf1, &merger1, &MidxWriteOptions::default()).unwrap();
        write(&mut m2, &mut buf2, &merger2, &MidxWriteOptions::default()).unwrap();
        assert_eq!(buf1, buf2);
    }

    #[test]
    fn write_to_path_is_atomic_via_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let merger = merger_from(vec![("a.pack", vec![(oid(0x01, 0x01), 10)])]);
        let mut monitor = NullMonitor;
        let report =
            write_to_path(&mut monitor, dir.path(), &merger, &MidxWriteOptions::default()).unwrap();
        assert_eq!(report.object_count, 1);

        let target = dir.path().join("multi-pack-index");
        assert!(target.is_file());
        assert!(!dir.path().join("multi-pack-index.lock").exists());
    }

    #[test]
    fn real_pack_index_source_plugs_in() {
        // Exercise `PackIndexSource for PackIndex` via the crate's own
        // synthetic-index test helper pattern (see `index.rs` tests).
        use git_hash::hasher::Hasher;
        use crate::{IDX_SIGNATURE, IDX_VERSION};

        let mut idx_buf = Vec::new();
        idx_buf.extend_from_slice(&IDX_SIGNATURE);
        idx_buf.extend_from_slice(&IDX_VERSION.to_be_bytes());
        let entry_oid = oid(0xab, 0x01);
        let mut fanout = [0u32; 256];
        fanout[0xab] = 1;
        for i in 0xab..256 {
            fanout[i] = 1;
        }
        for count in fanout {
            idx_buf.extend_from_slice(&count.to_be_bytes());
        }
        idx_buf.extend_from_slice(entry_oid.as_bytes());
        idx_buf.extend_from_slice(&0u32.to_be_bytes()); // crc
        idx_buf.extend_from_slice(&42u32.to_be_bytes()); // offset
        idx_buf.extend_from_slice(&[0u8; 20]); // pack checksum
        let mut hasher = Hasher::new(HashAlgorithm::Sha1);
        hasher.update(&idx_buf);
        let checksum = hasher.finalize().unwrap();
        idx_buf.extend_from_slice(checksum.as_bytes());

        let dir = tempfile::tempdir().unwrap();
        let idx_path = dir.path().join("pack-x.idx");
        std::fs::write(&idx_path, &idx_buf).unwrap();
        let pack_index = PackIndex::open(&idx_path).unwrap();

        assert_eq!(PackIndexSource::object_count(&pack_index), 1);
        assert_eq!(PackIndexSource::max_offset(&pack_index), 42);
        assert_eq!(PackIndexSource::oid_at(&pack_index, 0), entry_oid);
        assert_eq!(PackIndexSource::offset_at(&pack_index, 0), 42);
    }
}
