//! Multi-pack index (MIDX) support.
//!
//! The MIDX format uses a chunk-based layout to index objects across
//! every pack in a repository's `objects/pack/` directory in one file,
//! replacing a per-pack `.idx` scan with a single fanout-and-binary-search
//! lookup. Format:
//!
//! ```text
//! Header: MIDX (4) | version (1) | hash-algo (1) | num_chunks (1) | reserved (1) | num_packs (4)
//! Chunk lookup table: [chunk_id (4) | offset (8)] × (num_chunks + 1), last entry is a tag-0 sentinel
//! Chunks (in this order): OIDF | OIDL | OOFF | LOFF? | RIDX? | BTMP? | PNAM
//! Trailer: digest (20 or 32 bytes, depending on hash-algo)
//! ```
//!
//! - [`codec`] — shared big-endian byte primitives and the chunk tag/layout
//!   constants both the reader and writer key off of.
//! - [`digest_sink`] — a [`Write`](std::io::Write) wrapper that hashes and
//!   counts everything passed through it, polling a [`monitor::Monitor`]
//!   periodically so long writes stay cancellable.
//! - [`monitor`] — the progress/cancellation collaborator the writer consumes.
//! - [`merge`] — the K-way merge over per-pack object indexes that produces
//!   the deduplicated, OID-ordered stream the writer serializes.
//! - [`write`] — chunk planning and serialization, plus an atomic,
//!   lock-file-backed `write_to_path`.
//! - [`read`] — streaming parse into an immutable [`read::MidxFile`] and its
//!   lookup API (`lookup`, `iter_by_oid`, `reverse_lookup`, `verify`, ...).
//! - [`error`] — the `MidxError` taxonomy shared by both directions.

pub mod codec;
pub mod digest_sink;
pub mod error;
pub mod merge;
pub mod monitor;
pub mod read;
pub mod write;

pub use error::{ChunkTag, MidxError};
pub use merge::{MergedEntry, PackIndexMerger, PackIndexSource};
pub use monitor::{Monitor, NullMonitor, ProgressMonitor};
pub use read::{open, MidxFile, MidxWarning};
pub use write::{write as write_midx, write_to_path, MidxWriteOptions, MidxWriteReport};
