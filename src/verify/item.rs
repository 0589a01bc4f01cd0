//! The item walker (§4.4): walks the packed, tagged-record body shared by
//! row-internal, row-leaf, dup-internal, dup-leaf, and column-variable
//! pages, checking each item's bounds, type legality, length rule, and
//! (where applicable) strict ordering against the items already seen.
//!
//! Keys and duplicate-group values are tracked through a 3-slot rotating
//! cursor (`current` / `last_key` / `last_data`) so that at most three
//! materialized byte views -- and at most three held overflow pins -- are
//! ever alive at once, no matter how long the page is.

use crate::error::{Error, Result, VerifyErrorKind};
use crate::storage::encoding::read_varint;
use crate::storage::format::{
    ItemType, OffRef, OverflowRef, PageType, OFF_REF_SIZE, OVFL_REF_SIZE, PAGE_HEADER_SIZE,
};
use crate::types::Ref;
use crate::verify::page::validate_page;
use crate::verify::session::VerifyContext;
use crate::verify::tree;

/// A routing entry collected while walking a row-internal or dup-internal
/// page: the key that sorts before everything in `child`, and the child
/// pointer itself.
#[derive(Debug, Clone)]
pub struct RoutingEntry {
    pub key: Vec<u8>,
    pub child: Ref,
    pub child_records: u64,
}

/// What the item walker found on one page.
#[derive(Debug, Clone, Default)]
pub struct ItemWalkResult {
    /// Populated only for row-internal / dup-internal pages.
    pub entries: Vec<RoutingEntry>,
    /// First ordered key (row-leaf) or duplicate value (dup-leaf) seen on
    /// the page -- used by the caller for the parent-boundary check.
    pub first_key: Option<Vec<u8>>,
    /// Last ordered key / duplicate value seen on the page.
    pub last_key: Option<Vec<u8>>,
}

#[derive(Default)]
struct Slot {
    occupied: bool,
    bytes: Vec<u8>,
}

impl Slot {
    fn release(&mut self) {
        self.occupied = false;
    }
}

/// The rotating 3-slot cursor. Slot identity is just an array index;
/// "rotation" reassigns which index plays which role instead of copying
/// bytes between them, so the three backing buffers are reused for the
/// life of the page.
struct ItemCursor {
    slots: [Slot; 3],
    last_key: Option<usize>,
    last_data: Option<usize>,
}

impl ItemCursor {
    fn new() -> Self {
        Self {
            slots: Default::default(),
            last_key: None,
            last_data: None,
        }
    }

    fn free_slot(&self) -> usize {
        for i in 0..3 {
            if Some(i) != self.last_key && Some(i) != self.last_data {
                return i;
            }
        }
        unreachable!("3 slots, at most 2 roles assigned")
    }

    fn release_all(&mut self) {
        for slot in &mut self.slots {
            slot.release();
        }
    }
}

/// Resolves an overflow reference: validates the referenced page as a
/// first-class page (so it gets coverage-marked and its own body checked),
/// confirms the pointing item's recorded size matches the page's own
/// `datalen`, and returns the owned payload bytes. `validate_page` already
/// copies the overflow body out before unpinning, so there is no live pin
/// left to carry into the item cursor.
///
/// `ovfl.size` records the payload length, not the page's on-disk extent --
/// the header is implicit on top of it, so the page is pinned over
/// `PAGE_HEADER_SIZE + ovfl.size` bytes and `ovfl.size` is compared against
/// the resulting `datalen` directly.
fn resolve_overflow(
    ctx: &mut VerifyContext,
    page_index: u64,
    item_index: usize,
    ovfl: OverflowRef,
) -> Result<Vec<u8>> {
    let page_size = PAGE_HEADER_SIZE as u32 + ovfl.size;
    let r = Ref::new(ovfl.address, page_size);
    let validated = validate_page(ctx, r).map_err(|e| ctx.fail(Some(page_index), Some(item_index), e))?;
    let datalen = validated.header.datalen;
    if datalen != ovfl.size {
        let err = Error::verify(
            VerifyErrorKind::OverflowSizeMismatch,
            format!(
                "item records overflow size {} but the overflow page's datalen is {}",
                ovfl.size, datalen
            ),
        );
        return Err(ctx.fail(Some(page_index), Some(item_index), err));
    }
    match validated.body {
        crate::verify::page::PageBody::Overflow(bytes) => Ok(bytes),
        _ => unreachable!("validate_page(Overflow ref) always returns PageBody::Overflow"),
    }
}

/// Decodes `bytes` through the configured key/data decompressor, if any.
/// The decoded form is built up in a buffer on loan from the session's
/// scratch pool (§4.4 step 6: "decode into the slot's dedicated scratch
/// buffer") rather than allocating fresh for every item; the buffer is
/// handed back to the pool, emptied, before returning the decoded bytes as
/// an owned `Vec<u8>` the caller's cursor slot takes ownership of.
fn decompress_if_configured(
    ctx: &mut VerifyContext,
    is_key: bool,
    bytes: &[u8],
) -> Result<Option<Vec<u8>>> {
    let decompressor = if is_key {
        ctx.db.key_decompressor.clone()
    } else {
        ctx.db.data_decompressor.clone()
    };
    let Some(d) = decompressor else {
        return Ok(None);
    };
    let mut buf = ctx.acquire_scratch();
    buf.0.clear();
    let decoded = match d.decompress(bytes, bytes.len()) {
        Ok(v) => v,
        Err(e) => {
            ctx.release_scratch(buf);
            return Err(e);
        }
    };
    buf.0.extend_from_slice(&decoded);
    let result = std::mem::take(&mut buf.0);
    ctx.release_scratch(buf);
    Ok(Some(result))
}

enum OrderClass {
    /// Compared against `last_key`, using the row or dup comparator
    /// depending on the concrete item type.
    Key,
    /// Compared against `last_data`, using the dup comparator.
    DupData,
    /// Not order-checked at all (plain column/row values, deletions).
    None,
}

fn order_class(item_type: ItemType) -> OrderClass {
    use ItemType::*;
    match item_type {
        Key | KeyOvfl | KeyDup | KeyDupOvfl => OrderClass::Key,
        DataDup | DataDupOvfl => OrderClass::DupData,
        Data | DataOvfl | Del | Off => OrderClass::None,
    }
}

fn comparator_for<'a>(ctx: &'a VerifyContext, item_type: ItemType) -> &'a dyn crate::verify::session::Comparator {
    use ItemType::*;
    match item_type {
        Key | KeyOvfl => ctx.db.row_comparator.as_ref(),
        _ => ctx.db.dup_comparator.as_ref(),
    }
}

/// Walks the packed item body of a row-internal, row-leaf, dup-internal,
/// dup-leaf, or column-variable page.
pub fn walk_items(
    ctx: &mut VerifyContext,
    page_index: u64,
    body: &[u8],
    page_type: PageType,
) -> Result<ItemWalkResult> {
    let mut cursor = ItemCursor::new();
    let mut pending_key: Option<Vec<u8>> = None;
    let mut entries = Vec::new();
    let mut first_key: Option<Vec<u8>> = None;

    let mut offset = 0usize;
    let mut item_index = 0usize;
    let walk_result = (|| -> Result<()> {
        while offset < body.len() {
            let item_type_byte = body[offset];
            let item_type = ItemType::from_u8(item_type_byte).ok_or_else(|| {
                Error::verify(
                    VerifyErrorKind::IllegalType,
                    format!("item {} has unrecognized type tag {}", item_index, item_type_byte),
                )
            })?;
            let (length, len_bytes) = read_varint(body, offset + 1).ok_or_else(|| {
                Error::verify(VerifyErrorKind::EndOfPage, "item length varint runs past end of page")
            })?;
            let header_len = 1 + len_bytes;
            let payload_start = offset.checked_add(header_len).ok_or_else(|| {
                Error::verify(VerifyErrorKind::EndOfPage, "item header overflows page offset")
            })?;
            let payload_end = payload_start.checked_add(length as usize).ok_or_else(|| {
                Error::verify(VerifyErrorKind::EndOfPage, "item length overflows page offset")
            })?;
            if payload_end > body.len() {
                return Err(Error::verify(
                    VerifyErrorKind::EndOfPage,
                    format!("item {} payload runs past end of page", item_index),
                ));
            }

            if !item_type.legal_on(page_type) {
                return Err(Error::verify(
                    VerifyErrorKind::TypePageMismatch,
                    format!("item type {:?} is not legal on page type {:?}", item_type, page_type),
                ));
            }

            match item_type {
                ItemType::Del => {
                    if length != 0 {
                        return Err(Error::verify(VerifyErrorKind::BadLength, "DEL item carries a payload"));
                    }
                }
                ItemType::Off => {
                    if length as usize != OFF_REF_SIZE {
                        return Err(Error::verify(VerifyErrorKind::BadLength, "OFF item is not OFF_REF_SIZE bytes"));
                    }
                }
                t if t.is_overflow() => {
                    if length as usize != OVFL_REF_SIZE {
                        return Err(Error::verify(
                            VerifyErrorKind::BadLength,
                            "overflow item payload is not OVFL_REF_SIZE bytes",
                        ));
                    }
                }
                _ => {}
            }

            let payload = &body[payload_start..payload_end];

            match item_type {
                ItemType::Key | ItemType::KeyDup | ItemType::Data | ItemType::DataDup => {
                    let decoded = decompress_if_configured(
                        ctx,
                        matches!(item_type, ItemType::Key | ItemType::KeyDup),
                        payload,
                    )?;
                    let bytes = decoded.unwrap_or_else(|| payload.to_vec());
                    handle_materialized(ctx, &mut cursor, item_type, item_index, bytes, &mut pending_key, &mut first_key)?;
                }
                ItemType::KeyOvfl | ItemType::KeyDupOvfl | ItemType::DataOvfl | ItemType::DataDupOvfl => {
                    let ovfl = OverflowRef::parse(payload).expect("payload length already checked");
                    let raw = resolve_overflow(ctx, page_index, item_index, ovfl)?;
                    let is_key = matches!(item_type, ItemType::KeyOvfl | ItemType::KeyDupOvfl);
                    let decoded = decompress_if_configured(ctx, is_key, &raw)?;
                    let bytes = decoded.unwrap_or(raw);
                    handle_materialized(ctx, &mut cursor, item_type, item_index, bytes, &mut pending_key, &mut first_key)?;
                }
                ItemType::Del => {}
                ItemType::Off => {
                    let off = OffRef::parse(payload).expect("payload length already checked");
                    let child = Ref::new(off.address, off.size);
                    match page_type {
                        PageType::RowInternal | PageType::DupInternal => {
                            let key = pending_key.take().ok_or_else(|| {
                                Error::verify(
                                    VerifyErrorKind::BadHeader,
                                    format!("OFF item {} has no preceding routing key", item_index),
                                )
                            })?;
                            entries.push(RoutingEntry {
                                key,
                                child,
                                child_records: off.records,
                            });
                        }
                        PageType::RowLeaf => {
                            tree::walk(
                                ctx,
                                child,
                                tree::KeyBounds::none(),
                                tree::Expectation {
                                    level: None,
                                    records: Some(off.records),
                                    start_recno: None,
                                },
                            )?;
                        }
                        _ => unreachable!("legal_on(Off) restricts to the three arms above"),
                    }
                }
            }

            offset = payload_end;
            item_index += 1;
        }
        Ok(())
    })();

    cursor.release_all();
    walk_result.map_err(|e| ctx.fail(Some(page_index), Some(item_index), e))?;

    Ok(ItemWalkResult {
        entries,
        first_key,
        last_key: None,
    }
    .finish(&cursor))
}

impl ItemWalkResult {
    /// Fills `last_key` from whichever cursor slot (key or dup-data) was
    /// touched last -- the item walker doesn't know in advance which
    /// category a leaf page will end on.
    fn finish(mut self, cursor: &ItemCursor) -> Self {
        let idx = cursor.last_key.or(cursor.last_data);
        self.last_key = idx.map(|i| cursor.slots[i].bytes.clone());
        self
    }
}

fn handle_materialized(
    ctx: &mut VerifyContext,
    cursor: &mut ItemCursor,
    item_type: ItemType,
    item_index: usize,
    bytes: Vec<u8>,
    pending_key: &mut Option<Vec<u8>>,
    first_key: &mut Option<Vec<u8>>,
) -> Result<()> {
    match order_class(item_type) {
        OrderClass::Key => {
            if let Some(prev_idx) = cursor.last_key {
                let cmp = comparator_for(ctx, item_type).compare(&cursor.slots[prev_idx].bytes, &bytes);
                if cmp != std::cmp::Ordering::Less {
                    return Err(Error::verify(
                        VerifyErrorKind::MisorderedItems,
                        format!("item {} is not strictly greater than the previous key", item_index),
                    ));
                }
            }
            let target = cursor.free_slot();
            cursor.slots[target].release();
            cursor.slots[target] = Slot {
                occupied: true,
                bytes: bytes.clone(),
            };
            cursor.last_key = Some(target);
            if first_key.is_none() {
                *first_key = Some(bytes.clone());
            }
            *pending_key = Some(bytes);
        }
        OrderClass::DupData => {
            if let Some(prev_idx) = cursor.last_data {
                let cmp = ctx.db.dup_comparator.compare(&cursor.slots[prev_idx].bytes, &bytes);
                if cmp != std::cmp::Ordering::Less {
                    return Err(Error::verify(
                        VerifyErrorKind::MisorderedItems,
                        format!("item {} is not strictly greater than the previous duplicate value", item_index),
                    ));
                }
            }
            let target = cursor.free_slot();
            cursor.slots[target].release();
            cursor.slots[target] = Slot {
                occupied: true,
                bytes: bytes.clone(),
            };
            cursor.last_data = Some(target);
            if first_key.is_none() {
                *first_key = Some(bytes);
            }
        }
        OrderClass::None => {
            // Plain values (column-variable / row-leaf data, deletions):
            // resolved and bounds-checked above, nothing further to track.
        }
    }
    Ok(())
}
