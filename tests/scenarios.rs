//! Whole-file scenario tests: build a small database byte-for-byte in
//! memory (or, for one test, on disk) and run `verify()` end-to-end against
//! it. S1-S8 below are the concrete scenarios; the rest exercise boundary
//! shapes (single-page trees, an off-page duplicate subtree, empty/singleton
//! RCC pages, an overflow item whose size exactly matches its page) that
//! aren't covered by any one S-numbered case.

use std::sync::Arc;

use btverify::error::VerifyErrorKind;
use btverify::storage::buffer::{
    BufferManager, FileHandle, InMemoryBufferManager, PinOutcome, PinnedPage, VecScratchPool,
};
use btverify::storage::encoding::write_varint;
use btverify::storage::format::{ItemType, PageType, DESCRIPTOR_MAGIC, PAGE_HEADER_SIZE};
use btverify::verify::{verify, NoopProgress, VecErrorSink};
use btverify::{DbHandle, Ref};

const ALLOC_UNIT: u32 = 512;

fn write_header(page: &mut [u8], page_type: PageType, level: u8, start_recno: u64, datalen: u32, records: u64) {
    page[0] = page_type as u8;
    page[1] = level;
    page[24..32].copy_from_slice(&start_recno.to_le_bytes());
    page[32..36].copy_from_slice(&datalen.to_le_bytes());
    page[40..48].copy_from_slice(&records.to_le_bytes());
}

/// Builds a packed-item page (row/dup internal or leaf, column-variable)
/// exactly `PAGE_HEADER_SIZE + body.len()` bytes long. The item walker
/// scans all the way to the end of the body, so any trailing padding would
/// be parsed as one more, bogus item.
fn packed_page(page_type: PageType, level: u8, start_recno: u64, records: u64, body: &[u8]) -> Vec<u8> {
    let mut page = vec![0u8; PAGE_HEADER_SIZE + body.len()];
    write_header(&mut page, page_type, level, start_recno, 0, records);
    page[PAGE_HEADER_SIZE..].copy_from_slice(body);
    page
}

/// Builds a fixed-shape page (column-fixed/RCC, overflow) with an explicit
/// `datalen`, exactly `PAGE_HEADER_SIZE + body.len()` bytes long.
fn shaped_page(page_type: PageType, level: u8, start_recno: u64, datalen: u32, records: u64, body: &[u8]) -> Vec<u8> {
    let mut page = vec![0u8; PAGE_HEADER_SIZE + body.len()];
    write_header(&mut page, page_type, level, start_recno, datalen, records);
    page[PAGE_HEADER_SIZE..].copy_from_slice(body);
    page
}

fn item(item_type: ItemType, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![item_type as u8];
    write_varint(payload.len() as u64, &mut out);
    out.extend_from_slice(payload);
    out
}

fn off_ref(records: u64, address: u64, size: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(20);
    out.extend_from_slice(&records.to_le_bytes());
    out.extend_from_slice(&address.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out
}

fn ovfl_ref(address: u64, size: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&address.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out
}

fn descriptor_page(db: &DbHandle) -> Vec<u8> {
    let mut page = vec![0u8; ALLOC_UNIT as usize];
    page[0] = PageType::Descriptor as u8;
    let mut record = Vec::new();
    record.extend_from_slice(&DESCRIPTOR_MAGIC);
    record.extend_from_slice(&db.major_version.to_le_bytes());
    record.extend_from_slice(&db.minor_version.to_le_bytes());
    record.extend_from_slice(&db.min_intl_page.to_le_bytes());
    record.extend_from_slice(&db.max_intl_page.to_le_bytes());
    record.extend_from_slice(&db.min_leaf_page.to_le_bytes());
    record.extend_from_slice(&db.max_leaf_page.to_le_bytes());
    record.extend_from_slice(&db.fixed_len.to_le_bytes());
    record.extend_from_slice(&db.recno_offset.to_le_bytes());
    record.push(0); // flags
    record.extend_from_slice(&[0u8; 27]); // reserved, must stay zero
    page[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + record.len()].copy_from_slice(&record);
    page
}

/// Lays out a set of pages at fixed fragment addresses into one file
/// buffer. Anything not explicitly `put` -- an unreferenced fragment, or
/// the slack past a page's own tight size within its fragment -- stays
/// zero-filled, which `pin()` never reads past the requested size anyway.
struct FileBuilder {
    frags: Vec<Vec<u8>>,
}

impl FileBuilder {
    fn with_frags(n: usize) -> Self {
        Self { frags: vec![Vec::new(); n] }
    }

    fn put(&mut self, addr: u64, page: Vec<u8>) {
        assert!(page.len() <= ALLOC_UNIT as usize, "page does not fit in one allocation unit");
        self.frags[addr as usize] = page;
    }

    fn build(self) -> Vec<u8> {
        let mut out = vec![0u8; self.frags.len() * ALLOC_UNIT as usize];
        for (i, page) in self.frags.into_iter().enumerate() {
            let start = i * ALLOC_UNIT as usize;
            out[start..start + page.len()].copy_from_slice(&page);
        }
        out
    }
}

struct FixedFileSize(u64);

impl FileHandle for FixedFileSize {
    fn file_size(&self) -> btverify::Result<u64> {
        Ok(self.0)
    }
}

fn run_verify(db: &DbHandle, file: Vec<u8>) -> (btverify::Result<()>, VecErrorSink) {
    let file = Arc::new(file);
    let mut bufmgr = InMemoryBufferManager::new(file.clone(), db.alloc_unit);
    let mut scratch = VecScratchPool::default();
    let mut errors = VecErrorSink::default();
    let mut progress = NoopProgress;
    let handle = FixedFileSize(file.len() as u64);
    let outcome = verify(db, &mut bufmgr, &handle, &mut scratch, &mut errors, Some(&mut progress));
    (outcome, errors)
}

fn err_kind(result: &btverify::Result<()>) -> Option<VerifyErrorKind> {
    result.as_ref().err().and_then(|e| e.kind)
}

/// Two leaves under one routing internal page, ascending keys throughout,
/// every fragment covered exactly once.
fn well_formed_leaf(first: &[u8], first_val: &[u8], second: &[u8], second_val: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend(item(ItemType::Key, first));
    body.extend(item(ItemType::Data, first_val));
    body.extend(item(ItemType::Key, second));
    body.extend(item(ItemType::Data, second_val));
    packed_page(PageType::RowLeaf, 1, 0, 2, &body)
}

fn routing_root(entries: &[(&[u8], u64, u32)]) -> Vec<u8> {
    let mut body = Vec::new();
    let mut total_records = 0u64;
    for (key, address, size) in entries {
        body.extend(item(ItemType::Key, key));
        body.extend(item(ItemType::Off, &off_ref(2, *address, *size)));
        total_records += 2;
    }
    packed_page(PageType::RowInternal, 2, 0, total_records, &body)
}

// S1: a well-formed two-leaf tree verifies clean.
#[test]
fn s1_well_formed_tree_verifies() {
    let leaf2 = well_formed_leaf(b"a", b"1", b"b", b"2");
    let leaf3 = well_formed_leaf(b"c", b"3", b"d", b"4");
    let root = routing_root(&[(b"a", 2, leaf2.len() as u32), (b"c", 3, leaf3.len() as u32)]);

    let db = DbHandle::new(ALLOC_UNIT, 0, Ref::new(1, root.len() as u32));
    let mut file = FileBuilder::with_frags(4);
    file.put(0, descriptor_page(&db));
    file.put(1, root);
    file.put(2, leaf2);
    file.put(3, leaf3);

    let (outcome, errors) = run_verify(&db, file.build());
    assert!(outcome.is_ok(), "{:?}", errors.messages);
}

// S2: a leaf whose items aren't in strictly ascending order.
#[test]
fn s2_misordered_items_in_leaf_is_rejected() {
    let leaf2 = well_formed_leaf(b"b", b"2", b"a", b"1");
    let leaf3 = well_formed_leaf(b"c", b"3", b"d", b"4");
    let root = routing_root(&[(b"a", 2, leaf2.len() as u32), (b"c", 3, leaf3.len() as u32)]);

    let db = DbHandle::new(ALLOC_UNIT, 0, Ref::new(1, root.len() as u32));
    let mut file = FileBuilder::with_frags(4);
    file.put(0, descriptor_page(&db));
    file.put(1, root);
    file.put(2, leaf2);
    file.put(3, leaf3);

    let (outcome, _) = run_verify(&db, file.build());
    assert_eq!(err_kind(&outcome), Some(VerifyErrorKind::MisorderedItems));
}

// S3: leaf3's real first key sorts before the routing key the parent used
// to point at it -- items inside leaf3 are still ascending, so this is a
// boundary violation, not a misordering.
#[test]
fn s3_child_first_key_outside_routing_bound_is_a_boundary_violation() {
    let leaf2 = well_formed_leaf(b"a", b"1", b"b", b"2");
    let leaf3 = well_formed_leaf(b"a", b"3", b"d", b"4");
    let root = routing_root(&[(b"a", 2, leaf2.len() as u32), (b"c", 3, leaf3.len() as u32)]);

    let db = DbHandle::new(ALLOC_UNIT, 0, Ref::new(1, root.len() as u32));
    let mut file = FileBuilder::with_frags(4);
    file.put(0, descriptor_page(&db));
    file.put(1, root);
    file.put(2, leaf2);
    file.put(3, leaf3);

    let (outcome, _) = run_verify(&db, file.build());
    assert_eq!(err_kind(&outcome), Some(VerifyErrorKind::BoundaryViolation));
}

// S4: an otherwise well-formed tree with one extra fragment the tree never
// references.
#[test]
fn s4_unreferenced_fragment_is_missing_coverage() {
    let leaf2 = well_formed_leaf(b"a", b"1", b"b", b"2");
    let leaf3 = well_formed_leaf(b"c", b"3", b"d", b"4");
    let root = routing_root(&[(b"a", 2, leaf2.len() as u32), (b"c", 3, leaf3.len() as u32)]);

    let db = DbHandle::new(ALLOC_UNIT, 0, Ref::new(1, root.len() as u32));
    let mut file = FileBuilder::with_frags(5);
    file.put(0, descriptor_page(&db));
    file.put(1, root);
    file.put(2, leaf2);
    file.put(3, leaf3);
    // fragment 4 is left unreferenced.

    let (outcome, _) = run_verify(&db, file.build());
    assert_eq!(err_kind(&outcome), Some(VerifyErrorKind::MissingCoverage));
}

// S5: two routing entries pointing at the same child fragment.
#[test]
fn s5_routing_entries_sharing_a_child_is_duplicate_coverage() {
    let leaf = well_formed_leaf(b"a", b"1", b"b", b"2");
    let root = routing_root(&[(b"a", 2, leaf.len() as u32), (b"m", 2, leaf.len() as u32)]);

    let db = DbHandle::new(ALLOC_UNIT, 0, Ref::new(1, root.len() as u32));
    let mut file = FileBuilder::with_frags(3);
    file.put(0, descriptor_page(&db));
    file.put(1, root);
    file.put(2, leaf);

    let (outcome, _) = run_verify(&db, file.build());
    assert_eq!(err_kind(&outcome), Some(VerifyErrorKind::DuplicateCoverage));
}

// S6: the item's declared overflow size disagrees with the overflow page's
// own datalen.
#[test]
fn s6_overflow_item_size_disagreeing_with_page_datalen_is_rejected() {
    let mut ovfl_body = b"abcdefghij".to_vec(); // 10 real bytes
    ovfl_body.extend_from_slice(&[0u8; 6]); // padded out to the declared 16
    let overflow = shaped_page(PageType::Overflow, 1, 0, 10, 0, &ovfl_body);

    let mut root_body = Vec::new();
    root_body.extend(item(ItemType::KeyOvfl, &ovfl_ref(2, 16)));
    root_body.extend(item(ItemType::Data, b"x"));
    let root = packed_page(PageType::RowLeaf, 1, 0, 1, &root_body);

    let db = DbHandle::new(ALLOC_UNIT, 0, Ref::new(1, root.len() as u32));
    let mut file = FileBuilder::with_frags(3);
    file.put(0, descriptor_page(&db));
    file.put(1, root);
    file.put(2, overflow);

    let (outcome, _) = run_verify(&db, file.build());
    assert_eq!(err_kind(&outcome), Some(VerifyErrorKind::OverflowSizeMismatch));
}

// S7: two adjacent RCC entries share a payload and neither is a saturated
// run -- a missed compression opportunity.
#[test]
fn s7_adjacent_identical_rcc_entries_is_a_missed_compression() {
    let mut body = Vec::new();
    body.extend_from_slice(&1u16.to_le_bytes());
    body.extend_from_slice(&[9, 9]);
    body.extend_from_slice(&1u16.to_le_bytes());
    body.extend_from_slice(&[9, 9]);
    let root = shaped_page(PageType::ColRcc, 1, 1, 0, 2, &body);

    let db = DbHandle::new(ALLOC_UNIT, 2, Ref::new(1, root.len() as u32));
    let mut file = FileBuilder::with_frags(2);
    file.put(0, descriptor_page(&db));
    file.put(1, root);

    let (outcome, _) = run_verify(&db, file.build());
    assert_eq!(err_kind(&outcome), Some(VerifyErrorKind::BadRccCount));
}

// S8: the descriptor page on disk was written against a different set of
// page-size bounds than the handle the caller verifies with.
#[test]
fn s8_descriptor_page_size_bound_disagreeing_with_handle_is_rejected() {
    let mut db = DbHandle::new(ALLOC_UNIT, 0, Ref::new(0, 0));
    db.max_leaf_page = 4096;
    let mut encoded = DbHandle::new(ALLOC_UNIT, 0, Ref::new(0, 0));
    encoded.max_leaf_page = 8192;

    let mut file = FileBuilder::with_frags(1);
    file.put(0, descriptor_page(&encoded));

    let (outcome, _) = run_verify(&db, file.build());
    assert_eq!(err_kind(&outcome), Some(VerifyErrorKind::DescriptorMismatch));
}

// A single row-leaf page as the whole tree: root == leaf, height 1.
#[test]
fn single_leaf_root_is_a_valid_height_one_tree() {
    let root = well_formed_leaf(b"a", b"1", b"b", b"2");

    let db = DbHandle::new(ALLOC_UNIT, 0, Ref::new(1, root.len() as u32));
    let mut file = FileBuilder::with_frags(2);
    file.put(0, descriptor_page(&db));
    file.put(1, root);

    let (outcome, errors) = run_verify(&db, file.build());
    assert!(outcome.is_ok(), "{:?}", errors.messages);
}

// A row-leaf root carries one OFF item pointing at an off-page duplicate
// subtree; the subtree root gets no inherited key bounds.
#[test]
fn off_page_duplicate_subtree_is_verified_in_place() {
    let mut dup_body = Vec::new();
    dup_body.extend(item(ItemType::DataDup, b"x1"));
    dup_body.extend(item(ItemType::DataDup, b"x2"));
    let dup_leaf = packed_page(PageType::DupLeaf, 1, 0, 2, &dup_body);

    let mut root_body = Vec::new();
    root_body.extend(item(ItemType::Key, b"a"));
    root_body.extend(item(ItemType::Off, &off_ref(2, 2, dup_leaf.len() as u32)));
    let root = packed_page(PageType::RowLeaf, 1, 0, 1, &root_body);

    let db = DbHandle::new(ALLOC_UNIT, 0, Ref::new(1, root.len() as u32));
    let mut file = FileBuilder::with_frags(3);
    file.put(0, descriptor_page(&db));
    file.put(1, root);
    file.put(2, dup_leaf);

    let (outcome, errors) = run_verify(&db, file.build());
    assert!(outcome.is_ok(), "{:?}", errors.messages);
}

// An empty column-RCC page (zero records) is a legal, if unusual, leaf.
#[test]
fn empty_rcc_page_verifies() {
    let root = shaped_page(PageType::ColRcc, 1, 1, 0, 0, &[]);
    let db = DbHandle::new(ALLOC_UNIT, 2, Ref::new(1, root.len() as u32));
    let mut file = FileBuilder::with_frags(2);
    file.put(0, descriptor_page(&db));
    file.put(1, root);

    let (outcome, errors) = run_verify(&db, file.build());
    assert!(outcome.is_ok(), "{:?}", errors.messages);
}

// A column-RCC page with a single, unmergeable entry.
#[test]
fn single_entry_rcc_page_verifies() {
    let mut body = Vec::new();
    body.extend_from_slice(&1u16.to_le_bytes());
    body.extend_from_slice(&[5, 5]);
    let root = shaped_page(PageType::ColRcc, 1, 1, 0, 1, &body);
    let db = DbHandle::new(ALLOC_UNIT, 2, Ref::new(1, root.len() as u32));
    let mut file = FileBuilder::with_frags(2);
    file.put(0, descriptor_page(&db));
    file.put(1, root);

    let (outcome, errors) = run_verify(&db, file.build());
    assert!(outcome.is_ok(), "{:?}", errors.messages);
}

// The only shape resolve_overflow can now accept: the item's declared size
// exactly matches the overflow page's own datalen, with no trailing pad.
#[test]
fn overflow_item_with_matching_size_and_datalen_verifies() {
    let payload = b"abcd";
    let overflow = shaped_page(PageType::Overflow, 1, 0, payload.len() as u32, 0, payload);

    let mut root_body = Vec::new();
    root_body.extend(item(ItemType::KeyOvfl, &ovfl_ref(2, payload.len() as u32)));
    root_body.extend(item(ItemType::Data, b"x"));
    let root = packed_page(PageType::RowLeaf, 1, 0, 1, &root_body);

    let db = DbHandle::new(ALLOC_UNIT, 0, Ref::new(1, root.len() as u32));
    let mut file = FileBuilder::with_frags(3);
    file.put(0, descriptor_page(&db));
    file.put(1, root);
    file.put(2, overflow);

    let (outcome, errors) = run_verify(&db, file.build());
    assert!(outcome.is_ok(), "{:?}", errors.messages);
}

/// A `BufferManager` backed by a real file on disk, exercising the
/// `FileHandle`/`BufferManager` split against actual I/O rather than an
/// `Arc<Vec<u8>>` snapshot.
struct FileBackedBufferManager {
    file: std::fs::File,
    alloc_unit: u32,
}

impl FileBackedBufferManager {
    fn new(file: std::fs::File, alloc_unit: u32) -> Self {
        Self { file, alloc_unit }
    }
}

impl BufferManager for FileBackedBufferManager {
    fn pin(&mut self, address: btverify::Address, size: u32) -> btverify::Result<PinOutcome> {
        use std::io::{Read, Seek, SeekFrom};

        let start = address
            .checked_mul(self.alloc_unit as u64)
            .ok_or_else(|| btverify::Error::new(btverify::ErrorCode::IoErr))?;
        self.file
            .seek(SeekFrom::Start(start))
            .map_err(|e| btverify::Error::with_message(btverify::ErrorCode::IoErr, e.to_string()))?;
        let mut buf = vec![0u8; size as usize];
        self.file
            .read_exact(&mut buf)
            .map_err(|e| btverify::Error::with_message(btverify::ErrorCode::IoErr, e.to_string()))?;
        Ok(PinOutcome::Pinned(PinnedPage { address, size, data: Arc::from(buf) }))
    }

    fn unpin(&mut self, _page: PinnedPage) {}
}

struct RealFileHandle(u64);

impl FileHandle for RealFileHandle {
    fn file_size(&self) -> btverify::Result<u64> {
        Ok(self.0)
    }
}

// Round-trips a verify call against an actual file on disk instead of an
// in-memory buffer.
#[test]
fn verify_runs_against_a_real_file_on_disk() {
    use std::io::Write as _;

    let root = well_formed_leaf(b"a", b"1", b"b", b"2");

    let db = DbHandle::new(ALLOC_UNIT, 0, Ref::new(1, root.len() as u32));
    let mut file = FileBuilder::with_frags(2);
    file.put(0, descriptor_page(&db));
    file.put(1, root);
    let bytes = file.build();

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(&bytes).expect("write temp file");
    tmp.flush().expect("flush temp file");
    let handle = tmp.reopen().expect("reopen temp file");

    let mut bufmgr = FileBackedBufferManager::new(handle, db.alloc_unit);
    let mut scratch = VecScratchPool::default();
    let mut errors = VecErrorSink::default();
    let file_size = RealFileHandle(bytes.len() as u64);

    let outcome = verify(&db, &mut bufmgr, &file_size, &mut scratch, &mut errors, None);
    assert!(outcome.is_ok(), "{:?}", errors.messages);
}
