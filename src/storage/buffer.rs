//! The page-cache / buffer-manager collaborator (§6).
//!
//! The verifier never touches a file descriptor directly: it asks a
//! `BufferManager` to pin `(address, size)` and gets back either a pinned
//! page or a `Retry` signal (the page was rewritten concurrently and must be
//! re-pinned through the, by-then-updated, parent reference). This module
//! defines the trait plus a simple in-memory implementation used by tests
//! and by any embedder that has already slurped the file into memory.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result};
use crate::types::Address;

/// A page handle on loan from the buffer manager. Must be returned via
/// `BufferManager::unpin` on every exit path, success or failure.
#[derive(Debug, Clone)]
pub struct PinnedPage {
    pub address: Address,
    pub size: u32,
    pub data: Arc<[u8]>,
}

/// Outcome of a pin attempt.
pub enum PinOutcome {
    Pinned(PinnedPage),
    /// The page was rewritten since the caller last saw its reference.
    /// Not an error: the caller re-pins using the (already updated, via its
    /// parent) reference.
    Retry,
}

/// Bounds how many times the verifier will transparently re-pin on `Retry`
/// before giving up and treating it as a real I/O failure.
pub const MAX_PIN_RETRIES: u32 = 8;

pub trait BufferManager {
    fn pin(&mut self, address: Address, size: u32) -> Result<PinOutcome>;
    fn unpin(&mut self, page: PinnedPage);
}

/// Provides the file's total length; raw I/O goes through `BufferManager`.
pub trait FileHandle {
    fn file_size(&self) -> Result<u64>;
}

/// A `BufferManager` over a file already resident in memory. Good enough
/// for an offline verify pass over a snapshot, and for tests.
pub struct InMemoryBufferManager {
    file: Arc<Vec<u8>>,
    alloc_unit: u32,
    retry_once: HashMap<Address, u32>,
    outstanding_pins: i64,
}

impl InMemoryBufferManager {
    pub fn new(file: Arc<Vec<u8>>, alloc_unit: u32) -> Self {
        Self {
            file,
            alloc_unit,
            retry_once: HashMap::new(),
            outstanding_pins: 0,
        }
    }

    /// Test hook: the next `n` pin attempts at `address` return `Retry`
    /// before finally succeeding, exercising the retry loop.
    pub fn fail_next_pins(&mut self, address: Address, n: u32) {
        self.retry_once.insert(address, n);
    }

    /// Number of pins not yet matched by an `unpin`. Should be zero once a
    /// verify call returns, on every exit path.
    pub fn outstanding_pins(&self) -> i64 {
        self.outstanding_pins
    }

    pub fn file_len(&self) -> usize {
        self.file.len()
    }
}

impl BufferManager for InMemoryBufferManager {
    fn pin(&mut self, address: Address, size: u32) -> Result<PinOutcome> {
        if let Some(remaining) = self.retry_once.get_mut(&address) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(PinOutcome::Retry);
            }
            self.retry_once.remove(&address);
        }

        let start = address
            .checked_mul(self.alloc_unit as u64)
            .ok_or_else(|| Error::new(ErrorCode::IoErr))?;
        let end = start
            .checked_add(size as u64)
            .ok_or_else(|| Error::new(ErrorCode::IoErr))?;
        if end > self.file.len() as u64 {
            return Err(Error::with_message(
                ErrorCode::IoErr,
                format!(
                    "read of {} bytes at address {} runs past end of file",
                    size, address
                ),
            ));
        }
        let data: Arc<[u8]> = Arc::from(&self.file[start as usize..end as usize]);
        self.outstanding_pins += 1;
        Ok(PinOutcome::Pinned(PinnedPage { address, size, data }))
    }

    fn unpin(&mut self, _page: PinnedPage) {
        self.outstanding_pins -= 1;
    }
}

impl FileHandle for InMemoryBufferManager {
    fn file_size(&self) -> Result<u64> {
        Ok(self.file.len() as u64)
    }
}

/// A scratch buffer on loan from the session's scratch pool, used to hold
/// decompressed key/data bytes for the duration of one item's validation.
#[derive(Debug, Default)]
pub struct ScratchBuf(pub Vec<u8>);

pub trait ScratchPool {
    fn acquire(&mut self) -> ScratchBuf;
    fn release(&mut self, buf: ScratchBuf);
}

/// Freelist-backed scratch pool: released buffers are reused (after
/// truncating to zero length) instead of being reallocated per item.
#[derive(Default)]
pub struct VecScratchPool {
    free: Vec<ScratchBuf>,
}

impl ScratchPool for VecScratchPool {
    fn acquire(&mut self) -> ScratchBuf {
        self.free.pop().unwrap_or_default()
    }

    fn release(&mut self, mut buf: ScratchBuf) {
        buf.0.clear();
        self.free.push(buf);
    }
}
