//! External collaborators (§6): comparators, decompressors, the file handle,
//! the error sink and progress callback, and the `VerifyContext` that bundles
//! a verify call's live state (bitmap, last-leaf pin, first error).
//!
//! None of these types know anything about trees or pages -- they are the
//! seams the rest of the verifier is built against, so a host engine can
//! plug in its real comparator / real buffer manager without this crate
//! needing to know about SQL schemas, collations, or WAL state.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result, VerifyErrorKind};
use crate::storage::buffer::{BufferManager, PinOutcome, PinnedPage, ScratchBuf, ScratchPool};
use crate::storage::format::DEFAULT_ALLOC_UNIT;
use crate::types::{Address, Ref};

/// Orders two byte strings. The row comparator and the duplicate-value
/// comparator are both instances of this trait -- a verify session plugs in
/// whichever collation the database was created with.
pub trait Comparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Plain byte-wise comparison -- the default collation.
pub struct ByteCompare;

impl Comparator for ByteCompare {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Optional key/data decompressor. When configured, the item walker decodes
/// every key and duplicate-group value through it before comparing.
pub trait Decompressor: Send + Sync {
    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>>;
}

/// Receives every structural problem the verifier finds, tagged with the
/// page address and (where applicable) the item index within the page.
pub trait ErrorSink {
    fn report(&mut self, address: Option<Address>, item_index: Option<usize>, error: &Error);
}

/// One message recorded by `VecErrorSink`.
#[derive(Debug, Clone)]
pub struct VerifyMessage {
    pub address: Option<Address>,
    pub item_index: Option<usize>,
    pub kind: Option<VerifyErrorKind>,
    pub message: String,
}

/// An `ErrorSink` that just remembers every message, in order. What a CLI
/// or test harness reaches for when it wants to print (or assert on) the
/// full set of problems found in one run.
#[derive(Default)]
pub struct VecErrorSink {
    pub messages: Vec<VerifyMessage>,
}

impl ErrorSink for VecErrorSink {
    fn report(&mut self, address: Option<Address>, item_index: Option<usize>, error: &Error) {
        self.messages.push(VerifyMessage {
            address,
            item_index,
            kind: error.kind,
            message: error.message.clone(),
        });
    }
}

/// Reports traversal progress, e.g. "N pages visited". Named after the
/// phase being reported (`"tree"`, `"coverage"`) so a single callback can
/// distinguish the driver's stages.
pub trait ProgressCallback {
    fn progress(&mut self, name: &str, count: u64);
}

pub struct NoopProgress;

impl ProgressCallback for NoopProgress {
    fn progress(&mut self, _name: &str, _count: u64) {}
}

/// Database-wide configuration and collaborators the verifier needs for the
/// whole call: allocation unit, fixed record length, the two comparators,
/// optional decompressors, and where the root lives.
pub struct DbHandle {
    pub alloc_unit: u32,
    pub fixed_len: u32,
    pub recno_offset: u32,
    pub min_intl_page: u32,
    pub max_intl_page: u32,
    pub min_leaf_page: u32,
    pub max_leaf_page: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub row_comparator: Arc<dyn Comparator>,
    pub dup_comparator: Arc<dyn Comparator>,
    pub key_decompressor: Option<Arc<dyn Decompressor>>,
    pub data_decompressor: Option<Arc<dyn Decompressor>>,
    pub root: Ref,
}

impl DbHandle {
    /// A handle with binary comparators, no compression, and the default
    /// allocation unit -- convenient for tests and for databases that don't
    /// configure anything unusual.
    pub fn new(alloc_unit: u32, fixed_len: u32, root: Ref) -> Self {
        Self {
            alloc_unit,
            fixed_len,
            recno_offset: 0,
            min_intl_page: 0,
            max_intl_page: u32::MAX,
            min_leaf_page: 0,
            max_leaf_page: u32::MAX,
            major_version: 1,
            minor_version: 0,
            row_comparator: Arc::new(ByteCompare),
            dup_comparator: Arc::new(ByteCompare),
            key_decompressor: None,
            data_decompressor: None,
            root,
        }
    }
}

impl Default for DbHandle {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOC_UNIT, 0, Ref::new(0, 0))
    }
}

/// Live state for one `verify` call: the collaborators from §6, the
/// in-progress coverage bitmap, and the single rolling "last leaf" pin the
/// tree walker carries across sibling comparisons.
///
/// The file handle (§6) is deliberately not carried as a live field here:
/// the driver asks it for the file's length exactly once, to size the
/// coverage bitmap, before this context is built. Holding both a `&mut
/// BufferManager` and a `&FileHandle` over the same underlying object for
/// the whole call would alias a mutable and a shared borrow of the same
/// value -- the one piece of information the file handle provides outlives
/// it as `file_size`.
pub struct VerifyContext<'a> {
    pub db: &'a DbHandle,
    pub file_size: u64,
    pub bufmgr: &'a mut dyn BufferManager,
    pub scratch: &'a mut dyn ScratchPool,
    pub errors: &'a mut dyn ErrorSink,
    pub progress: Option<&'a mut dyn ProgressCallback>,
    pub dump: Option<&'a mut dyn std::io::Write>,
    pub bitmap: crate::util::bitvec::FragmentBitmap,
    pub pages_visited: u64,
}

impl<'a> VerifyContext<'a> {
    /// Pins `(address, size)`, transparently retrying a bounded number of
    /// times on the buffer manager's `Retry` signal (§4.2 step 1, §5).
    pub fn pin(&mut self, r: Ref) -> Result<PinnedPage> {
        for _ in 0..crate::storage::buffer::MAX_PIN_RETRIES {
            match self.bufmgr.pin(r.address, r.size)? {
                PinOutcome::Pinned(page) => return Ok(page),
                PinOutcome::Retry => continue,
            }
        }
        Err(Error::new(ErrorCode::Busy))
    }

    pub fn unpin(&mut self, page: PinnedPage) {
        self.bufmgr.unpin(page);
    }

    /// Records `error` with the sink, then returns it so the caller can
    /// `return Err(...)` in one expression.
    pub fn fail(&mut self, address: Option<Address>, item_index: Option<usize>, error: Error) -> Error {
        self.errors.report(address, item_index, &error);
        error
    }

    pub fn note_progress(&mut self, name: &str, count: u64) {
        if let Some(p) = self.progress.as_deref_mut() {
            p.progress(name, count);
        }
    }

    pub fn acquire_scratch(&mut self) -> ScratchBuf {
        self.scratch.acquire()
    }

    pub fn release_scratch(&mut self, buf: ScratchBuf) {
        self.scratch.release(buf);
    }
}
