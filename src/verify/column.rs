//! Body validators for the page flavors that are *not* packed tagged-item
//! records: column-internal's fixed `WT_OFF`-style entries (§4.3.3),
//! column-fixed and column-RCC's fixed-length records (§4.3.4, §4.3.5), and
//! the overflow page's single blob plus zero padding (§4.3.6).

use crate::error::{Error, Result, VerifyErrorKind};
use crate::storage::format::{OffRef, PageHeader, COL_OFF_ENTRY_SIZE};
use crate::types::Ref;

/// One child pointer out of a column-internal page. Column trees have no
/// explicit keys -- the record-number ranges are reconstructed from
/// `child_records` as the tree walker threads `start_recno` through.
#[derive(Debug, Clone, Copy)]
pub struct ColChildEntry {
    pub child: Ref,
    pub child_records: u64,
}

/// Validates a column-internal body: a run of fixed-size entries, each
/// naming a child's `(address, size)` and how many records it covers.
pub fn validate_col_internal(body: &[u8]) -> Result<Vec<ColChildEntry>> {
    if body.len() % COL_OFF_ENTRY_SIZE != 0 {
        return Err(Error::verify(
            VerifyErrorKind::EndOfPage,
            "column-internal body is not a whole number of entries",
        ));
    }
    let mut entries = Vec::with_capacity(body.len() / COL_OFF_ENTRY_SIZE);
    for chunk in body.chunks_exact(COL_OFF_ENTRY_SIZE) {
        let off = OffRef::parse(chunk).expect("chunk is exactly COL_OFF_ENTRY_SIZE");
        if off.records == 0 {
            return Err(Error::verify(
                VerifyErrorKind::RecordCountMismatch,
                "column-internal entry covers zero records",
            ));
        }
        entries.push(ColChildEntry {
            child: Ref::new(off.address, off.size),
            child_records: off.records,
        });
    }
    Ok(entries)
}

/// Marker byte a tombstoned fixed-length record starts with; the remaining
/// `fixed_len - 1` bytes must be zero (§4.3.4, §4.3.5).
pub const FIXED_TOMBSTONE_MARKER: u8 = 0xff;

fn check_tombstone_tail(record: &[u8]) -> bool {
    record[0] == FIXED_TOMBSTONE_MARKER && record[1..].iter().all(|&b| b == 0)
}

/// Validates a column-fixed body: `header.records` back-to-back records of
/// exactly `fixed_len` bytes each. A record whose first byte is the
/// tombstone marker must have an all-zero tail.
pub fn validate_col_fixed(body: &[u8], header: &PageHeader, fixed_len: u32) -> Result<()> {
    if fixed_len == 0 {
        return Err(Error::verify(
            VerifyErrorKind::DescriptorMismatch,
            "column-fixed page but database fixed_len is zero",
        ));
    }
    let fixed_len = fixed_len as usize;
    let expected = header.records as usize * fixed_len;
    if body.len() < expected {
        return Err(Error::verify(
            VerifyErrorKind::EndOfPage,
            "column-fixed body shorter than records * fixed_len",
        ));
    }
    for i in 0..header.records as usize {
        let record = &body[i * fixed_len..(i + 1) * fixed_len];
        if record[0] == FIXED_TOMBSTONE_MARKER && !check_tombstone_tail(record) {
            return Err(Error::verify(
                VerifyErrorKind::BadDeleteFormat,
                format!("fixed record {} has tombstone marker but a non-zero tail", i),
            ));
        }
    }
    Ok(())
}

/// Validates a column-RCC body: a run of `{repeat_count: u16, record:
/// [u8; fixed_len]}` entries whose repeat counts sum to `header.records`
/// (§4.3.5). Per the spec's explicit open question, adjacent entries with
/// identical payloads are only flagged when the first entry's repeat count
/// did *not* already saturate at `u16::MAX` -- a maxed-out run is a
/// legitimate continuation, not a missed compression opportunity.
pub fn validate_col_rcc(body: &[u8], header: &PageHeader, fixed_len: u32) -> Result<()> {
    if fixed_len == 0 {
        return Err(Error::verify(
            VerifyErrorKind::DescriptorMismatch,
            "column-RCC page but database fixed_len is zero",
        ));
    }
    let fixed_len = fixed_len as usize;
    let entry_len = 2 + fixed_len;
    let mut offset = 0usize;
    let mut total: u64 = 0;
    let mut prev: Option<(u16, &[u8])> = None;
    while offset < body.len() {
        if offset + entry_len > body.len() {
            return Err(Error::verify(
                VerifyErrorKind::EndOfPage,
                "column-RCC entry runs past end of page",
            ));
        }
        let repeat_count = u16::from_le_bytes([body[offset], body[offset + 1]]);
        let record = &body[offset + 2..offset + entry_len];
        if repeat_count == 0 {
            return Err(Error::verify(
                VerifyErrorKind::BadRccCount,
                "column-RCC entry has a zero repeat count",
            ));
        }
        if record[0] == FIXED_TOMBSTONE_MARKER && !check_tombstone_tail(record) {
            return Err(Error::verify(
                VerifyErrorKind::BadDeleteFormat,
                "column-RCC tombstone entry has a non-zero tail",
            ));
        }
        if let Some((prev_count, prev_record)) = prev {
            if prev_count != u16::MAX && prev_record == record {
                return Err(Error::verify(
                    VerifyErrorKind::BadRccCount,
                    "adjacent column-RCC entries share a payload and should have been merged",
                ));
            }
        }
        total += repeat_count as u64;
        prev = Some((repeat_count, record));
        offset += entry_len;
    }
    if total != header.records {
        return Err(Error::verify(
            VerifyErrorKind::RecordCountMismatch,
            format!(
                "column-RCC repeat counts sum to {} but header records is {}",
                total, header.records
            ),
        ));
    }
    Ok(())
}

/// Validates an overflow page's body: `header.datalen` payload bytes,
/// `header.datalen > 0` (§4.3.6 -- an overflow item is only worth its own
/// page when it has content), and an all-zero pad out to the page's full
/// allocated size.
pub fn validate_overflow(body: &[u8], header: &PageHeader) -> Result<Vec<u8>> {
    if header.datalen == 0 {
        return Err(Error::verify(
            VerifyErrorKind::OverflowEmpty,
            "overflow page has zero datalen",
        ));
    }
    let datalen = header.datalen as usize;
    if datalen > body.len() {
        return Err(Error::verify(
            VerifyErrorKind::EndOfPage,
            "overflow datalen runs past end of page",
        ));
    }
    if body[datalen..].iter().any(|&b| b != 0) {
        return Err(Error::verify(
            VerifyErrorKind::OverflowTrailingGarbage,
            "overflow page pad bytes past datalen are non-zero",
        ));
    }
    Ok(body[..datalen].to_vec())
}
