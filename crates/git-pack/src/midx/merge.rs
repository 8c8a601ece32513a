//! K-way merge over per-pack object indexes.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use git_hash::{HashAlgorithm, ObjectId};

use super::error::MidxError;

/// A source of (OID, offset) pairs sorted by OID, as exposed by a single
/// pack's index. Implemented here for [`crate::index::PackIndex`]; test
/// fixtures implement it directly over an in-memory `Vec`.
pub trait PackIndexSource {
    /// Total number of objects in this pack.
    fn object_count(&self) -> u32;
    /// The largest offset among this pack's objects (0 if empty).
    fn max_offset(&self) -> u64;
    /// The OID at sorted position `i`.
    fn oid_at(&self, i: u32) -> ObjectId;
    /// The offset at sorted position `i`.
    fn offset_at(&self, i: u32) -> u64;
}

impl PackIndexSource for crate::index::PackIndex {
    fn object_count(&self) -> u32 {
        self.num_objects()
    }

    fn max_offset(&self) -> u64 {
        (0..self.num_objects())
            .map(|i| self.offset_at_index(i))
            .max()
            .unwrap_or(0)
    }

    fn oid_at(&self, i: u32) -> ObjectId {
        self.oid_at_index(i)
    }

    fn offset_at(&self, i: u32) -> u64 {
        self.offset_at_index(i)
    }
}

/// One entry of a deduplicated merge result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedEntry {
    pub oid: ObjectId,
    pub pack_ordinal: u32,
    pub offset: u64,
}

struct Cursor {
    pack_ordinal: u32,
    pos: u32,
}

/// Min-heap key: order by OID ascending, then by pack ordinal ascending so
/// the smallest-named pack sorts first among duplicates.
struct HeapKey {
    oid: ObjectId,
    pack_ordinal: u32,
    cursor_index: usize,
}

impl PartialEq for HeapKey {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid && self.pack_ordinal == other.pack_ordinal
    }
}
impl Eq for HeapKey {}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.oid
            .cmp(&other.oid)
            .then_with(|| self.pack_ordinal.cmp(&other.pack_ordinal))
    }
}

/// Merges K already-sorted per-pack indexes into one deduplicated,
/// OID-ordered stream.
///
/// Pack ordinals are fixed at construction time by sorting pack names
/// ascending; they are stable for the lifetime of the merger.
pub struct PackIndexMerger {
    hash_algorithm: HashAlgorithm,
    pack_names: Vec<String>,
    sources: Vec<Box<dyn PackIndexSource>>,
    needs_large_offsets: bool,
    offsets_over_31_bits_count: u64,
    unique_object_count: u32,
    objects_per_pack: Vec<u32>,
}

impl PackIndexMerger {
    /// Build a merger from an insertion-ordered set of (pack name, source)
    /// pairs. Names are re-sorted ascending here; that sort fixes ordinals.
    ///
    /// `hash_algorithm` is supplied explicitly (rather than inferred from the
    /// first OID seen) so construction succeeds even when every supplied
    /// pack index happens to be empty.
    pub fn new(
        hash_algorithm: HashAlgorithm,
        packs: Vec<(String, Box<dyn PackIndexSource>)>,
    ) -> Result<Self, MidxError> {
        if packs.is_empty() {
            return Err(MidxError::InvalidInput("no pack indexes supplied".into()));
        }
        for (name, _) in &packs {
            if name.is_empty() {
                return Err(MidxError::InvalidInput("empty pack name".into()));
            }
        }

        let mut packs = packs;
        packs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut pack_names = Vec::with_capacity(packs.len());
        let mut sources = Vec::with_capacity(packs.len());
        for (name, source) in packs {
            pack_names.push(name);
            sources.push(source);
        }

        let needs_large_offsets = sources.iter().any(|s| s.max_offset() > u32::MAX as u64);

        let mut merger = Self {
            hash_algorithm,
            pack_names,
            sources,
            needs_large_offsets,
            offsets_over_31_bits_count: 0,
            unique_object_count: 0,
            objects_per_pack: Vec::new(),
        };

        // Counted post-dedup: `write_ooff`/`write_loff` only ever see the
        // entries `by_oid_iterator` actually yields, so a dropped duplicate's
        // large offset must not inflate this count (it would over-plan LOFF).
        let mut unique_object_count = 0u32;
        let mut objects_per_pack = vec![0u32; merger.sources.len()];
        let mut offsets_over_31_bits_count = 0u64;
        for entry in merger.by_oid_iterator() {
            unique_object_count += 1;
            objects_per_pack[entry.pack_ordinal as usize] += 1;
            if needs_large_offsets && entry.offset > i32::MAX as u64 {
                offsets_over_31_bits_count += 1;
            }
        }
        merger.unique_object_count = unique_object_count;
        merger.objects_per_pack = objects_per_pack;
        merger.offsets_over_31_bits_count = offsets_over_31_bits_count;

        Ok(merger)
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn pack_count(&self) -> u32 {
        self.sources.len() as u32
    }

    pub fn pack_names(&self) -> &[String] {
        &self.pack_names
    }

    pub fn unique_object_count(&self) -> u32 {
        self.unique_object_count
    }

    pub fn offsets_over_31_bits_count(&self) -> u64 {
        self.offsets_over_31_bits_count
    }

    pub fn needs_large_offsets_chunk(&self) -> bool {
        self.needs_large_offsets
    }

    pub fn objects_per_pack(&self) -> &[u32] {
        &self.objects_per_pack
    }

    /// Produce a fresh deduplicated, OID-ascending iterator over the merge.
    ///
    /// Each call re-drives the K-way merge from scratch over the owned
    /// sources; sources are borrowed, not consumed.
    pub fn by_oid_iterator(&self) -> MergeIter<'_> {
        let mut heap = BinaryHeap::with_capacity(self.sources.len());
        let mut cursors: Vec<Cursor> = self
            .sources
            .iter()
            .enumerate()
            .map(|(i, _)| Cursor {
                pack_ordinal: i as u32,
                pos: 0,
            })
            .collect();

        for (i, cursor) in cursors.iter().enumerate() {
            if cursor.pos < self.sources[i].object_count() {
                heap.push(Reverse(HeapKey {
                    oid: self.sources[i].oid_at(cursor.pos),
                    pack_ordinal: cursor.pack_ordinal,
                    cursor_index: i,
                }));
            }
        }

        MergeIter {
            merger: self,
            heap,
            cursors,
            last_yielded: None,
        }
    }
}

/// Iterator yielding deduplicated `(oid, pack_ordinal, offset)` triples in
/// ascending OID order.
pub struct MergeIter<'a> {
    merger: &'a PackIndexMerger,
    heap: BinaryHeap<Reverse<HeapKey>>,
    cursors: Vec<Cursor>,
    last_yielded: Option<ObjectId>,
}

impl<'a> Iterator for MergeIter<'a> {
    type Item = MergedEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Reverse(top) = self.heap.pop()?;
            let cursor_index = top.cursor_index;
            let source = &self.merger.sources[cursor_index];
            let pos = self.cursors[cursor_index].pos;
            let offset = source.offset_at(pos);

            self.cursors[cursor_index].pos += 1;
            let next_pos = self.cursors[cursor_index].pos;
            if next_pos < source.object_count() {
                self.heap.push(Reverse(HeapKey {
                    oid: source.oid_at(next_pos),
                    pack_ordinal: top.pack_ordinal,
                    cursor_index,
                }));
            }

            if self.last_yielded == Some(top.oid) {
                // Duplicate: the winning (smallest-ordinal) copy already won
                // because ties are broken by pack_ordinal in `HeapKey::cmp`,
                // and the heap yields entries in non-decreasing key order —
                // so this later copy is always the one to drop.
                continue;
            }

            self.last_yielded = Some(top.oid);
            return Some(MergedEntry {
                oid: top.oid,
                pack_ordinal: top.pack_ordinal,
                offset,
            });
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// An in-memory, pre-sorted [`PackIndexSource`] fixture.
    pub struct VecPackIndex {
        entries: Vec<(ObjectId, u64)>,
    }

    impl VecPackIndex {
        pub fn new(mut entries: Vec<(ObjectId, u64)>) -> Self {
            entries.sort_by_key(|(oid, _)| *oid);
            Self { entries }
        }
    }

    impl PackIndexSource for VecPackIndex {
        fn object_count(&self) -> u32 {
            self.entries.len() as u32
        }

        fn max_offset(&self) -> u64 {
            self.entries.iter().map(|(_, o)| *o).max().unwrap_or(0)
        }

        fn oid_at(&self, i: u32) -> ObjectId {
            self.entries[i as usize].0
        }

        fn offset_at(&self, i: u32) -> u64 {
            self.entries[i as usize].1
        }
    }
}
