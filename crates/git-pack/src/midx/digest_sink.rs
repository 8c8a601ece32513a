//! A writer that hashes and counts everything passed through it.

use std::io::Write;

use git_hash::hasher::Hasher;
use git_hash::{HashAlgorithm, ObjectId};

use super::error::MidxError;
use super::monitor::Monitor;

/// Cancellation is polled once per this many bytes written.
pub const BYTES_PER_CANCEL_CHECK: usize = 128 * 1024;

/// Wraps an inner [`Write`], forwarding every byte while updating a rolling
/// digest and a byte counter, and polling a [`Monitor`] for cancellation
/// every [`BYTES_PER_CANCEL_CHECK`] bytes.
pub struct DigestingSink<'m, W> {
    inner: W,
    hasher: Hasher,
    length: u64,
    monitor: &'m mut dyn Monitor,
    since_last_check: usize,
}

impl<'m, W: Write> DigestingSink<'m, W> {
    pub fn new(inner: W, algo: HashAlgorithm, monitor: &'m mut dyn Monitor) -> Self {
        Self {
            inner,
            hasher: Hasher::new(algo),
            length: 0,
            monitor,
            since_last_check: 0,
        }
    }

    /// Write a single byte.
    pub fn write_byte(&mut self, b: u8) -> Result<(), MidxError> {
        self.write(&[b])
    }

    /// Total bytes written so far.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn flush(&mut self) -> Result<(), MidxError> {
        self.inner.flush()?;
        Ok(())
    }

    /// Write `data`, internally chunking at the cancel-check boundary so a
    /// single large buffer still polls the monitor at the documented cadence.
    pub fn write(&mut self, data: &[u8]) -> Result<(), MidxError> {
        let mut remaining = data;
        while !remaining.is_empty() {
            let room = BYTES_PER_CANCEL_CHECK - self.since_last_check;
            let take = room.min(remaining.len());
            let (chunk, rest) = remaining.split_at(take);

            self.inner.write_all(chunk)?;
            self.hasher.update(chunk);
            self.length += chunk.len() as u64;
            self.since_last_check += chunk.len();
            self.monitor.update(self.length);

            if self.since_last_check >= BYTES_PER_CANCEL_CHECK {
                self.since_last_check = 0;
                if self.monitor.is_cancelled() {
                    return Err(MidxError::Cancelled);
                }
            }

            remaining = rest;
        }
        Ok(())
    }

    /// Finalize the rolling digest and hand back the inner sink, consuming
    /// this one.
    ///
    /// The trailer itself must not be fed back into the digest (per the
    /// format), so the caller writes the returned digest's bytes directly
    /// to the returned inner sink. The only caller in this crate invokes
    /// this once, as the last step before the trailer, after which nothing
    /// but the trailer bytes are written.
    pub fn into_digest(self) -> Result<(W, ObjectId), MidxError> {
        let digest = self.hasher.finalize().map_err(MidxError::Hash)?;
        Ok((self.inner, digest))
    }
}

impl<W> DigestingSink<'_, W> {
    /// Unwrap back to the inner sink, discarding hashing state. Used by
    /// callers that need the sink back without finalizing (e.g. on error).
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midx::monitor::NullMonitor;

    #[test]
    fn hashes_and_counts_bytes() {
        let mut out = Vec::new();
        let mut monitor = NullMonitor;
        let mut sink = DigestingSink::new(&mut out, HashAlgorithm::Sha1, &mut monitor);
        sink.write(b"hello").unwrap();
        sink.write(b" world").unwrap();
        assert_eq!(sink.length(), 11);
        let (_out, digest) = sink.into_digest().unwrap();
        let expected = Hasher::digest(HashAlgorithm::Sha1, b"hello world").unwrap();
        assert_eq!(digest, expected);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn write_byte_updates_length() {
        let mut out = Vec::new();
        let mut monitor = NullMonitor;
        let mut sink = DigestingSink::new(&mut out, HashAlgorithm::Sha1, &mut monitor);
        sink.write_byte(b'x').unwrap();
        assert_eq!(sink.length(), 1);
    }

    struct CancelAfter {
        calls: std::cell::Cell<u32>,
        cancel_at_call: u32,
    }

    impl Monitor for CancelAfter {
        fn is_cancelled(&self) -> bool {
            let n = self.calls.get() + 1;
            self.calls.set(n);
            n >= self.cancel_at_call
        }

        fn update(&mut self, _units: u64) {}
    }

    #[test]
    fn cancellation_observed_at_boundary() {
        let mut out = Vec::new();
        let mut monitor = CancelAfter {
            calls: std::cell::Cell::new(0),
            cancel_at_call: 1,
        };
        let mut sink = DigestingSink::new(&mut out, HashAlgorithm::Sha1, &mut monitor);
        let big = vec![0u8; BYTES_PER_CANCEL_CHECK * 2 + 10];
        let err = sink.write(&big).unwrap_err();
        assert!(matches!(err, MidxError::Cancelled));
    }

    #[test]
    fn large_write_is_chunked_at_boundary_without_cancellation() {
        let mut out = Vec::new();
        let mut monitor = NullMonitor;
        let mut sink = DigestingSink::new(&mut out, HashAlgorithm::Sha1, &mut monitor);
        let big = vec![7u8; BYTES_PER_CANCEL_CHECK * 3 + 1];
        sink.write(&big).unwrap();
        assert_eq!(sink.length(), big.len() as u64);
        assert_eq!(out.len(), big.len());
    }
}
