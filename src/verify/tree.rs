//! The depth-first tree walker (§4.2): recurses from a root reference down
//! through internal pages to leaves, threading the key range (or, for
//! column stores, the record-number range) each child is allowed to cover,
//! and checking level/record-count/start-recno agreement between what a
//! parent recorded and what the child's own header says about itself.

use crate::error::{Error, Result, VerifyErrorKind};
use crate::storage::format::PageType;
use crate::types::Ref;
use crate::verify::comparator::{check_lower_bound, check_upper_bound};
use crate::verify::page::{validate_page, PageBody};
use crate::verify::session::{Comparator, VerifyContext};

/// The key range a child is allowed to occupy, inherited from its parent.
/// `None` on both ends at the true root and at an off-page duplicate
/// subtree's root, which define their own self-contained range.
#[derive(Debug, Clone, Default)]
pub struct KeyBounds {
    pub lower: Option<Vec<u8>>,
    pub upper: Option<Vec<u8>>,
}

impl KeyBounds {
    pub fn none() -> Self {
        Self::default()
    }
}

/// What the parent already knows about the child being recursed into, to
/// be cross-checked against the child page's own header.
#[derive(Debug, Clone, Default)]
pub struct Expectation {
    pub level: Option<u8>,
    pub records: Option<u64>,
    pub start_recno: Option<u64>,
}

fn comparator_for_page<'a>(ctx: &'a VerifyContext, page_type: PageType) -> &'a dyn Comparator {
    match page_type {
        PageType::DupInternal | PageType::DupLeaf => ctx.db.dup_comparator.as_ref(),
        _ => ctx.db.row_comparator.as_ref(),
    }
}

/// Walks the subtree rooted at `r`.
pub fn walk(ctx: &mut VerifyContext, r: Ref, bounds: KeyBounds, expect: Expectation) -> Result<()> {
    let validated = validate_page(ctx, r)?;
    let header = validated.header;

    if let Some(level) = expect.level {
        if header.level != level {
            return Err(ctx.fail(
                Some(r.address),
                None,
                Error::verify(
                    VerifyErrorKind::LevelMismatch,
                    format!("child page has level {} but its parent expected {}", header.level, level),
                ),
            ));
        }
    }
    if let Some(records) = expect.records {
        if header.records != records {
            return Err(ctx.fail(
                Some(r.address),
                None,
                Error::verify(
                    VerifyErrorKind::RecordCountMismatch,
                    format!(
                        "child page records {} does not match the {} its parent recorded",
                        header.records, records
                    ),
                ),
            ));
        }
    }
    if let Some(start_recno) = expect.start_recno {
        if header.start_recno != start_recno {
            return Err(ctx.fail(
                Some(r.address),
                None,
                Error::verify(
                    VerifyErrorKind::StartRecnoMismatch,
                    format!(
                        "child page start_recno {} does not match the {} its parent recorded",
                        header.start_recno, start_recno
                    ),
                ),
            ));
        }
    }

    if expect.start_recno.is_none() && header.page_type.is_column_store() && header.start_recno != 1 {
        return Err(ctx.fail(
            Some(r.address),
            None,
            Error::verify(
                VerifyErrorKind::StartRecnoMismatch,
                format!("root column-store page has start_recno {} instead of 1", header.start_recno),
            ),
        ));
    }

    if matches!(
        header.page_type,
        PageType::RowInternal | PageType::RowLeaf | PageType::DupInternal | PageType::DupLeaf
    ) && header.start_recno != 0
    {
        return Err(ctx.fail(
            Some(r.address),
            None,
            Error::verify(VerifyErrorKind::StartRecnoMismatch, "row/dup page has a non-zero start_recno"),
        ));
    }

    match validated.body {
        PageBody::Descriptor(_) => {
            return Err(ctx.fail(
                Some(r.address),
                None,
                Error::verify(VerifyErrorKind::TypePageMismatch, "descriptor page encountered inside the tree"),
            ));
        }
        PageBody::Overflow(_) => {
            return Err(ctx.fail(
                Some(r.address),
                None,
                Error::verify(VerifyErrorKind::TypePageMismatch, "overflow page encountered as a tree node"),
            ));
        }
        PageBody::ColFixed | PageBody::ColRcc => {
            // Leaves: fully validated by `validate_page`, nothing to recurse into.
        }
        PageBody::ColInternal(entries) => {
            let child_level = header.level.checked_sub(1).ok_or_else(|| {
                ctx.fail(
                    Some(r.address),
                    None,
                    Error::verify(VerifyErrorKind::LevelMismatch, "column-internal page has level zero"),
                )
            })?;
            let mut recno = header.start_recno;
            for entry in &entries {
                walk(
                    ctx,
                    entry.child,
                    KeyBounds::none(),
                    Expectation {
                        level: Some(child_level),
                        records: Some(entry.child_records),
                        start_recno: Some(recno),
                    },
                )?;
                recno += entry.child_records;
            }
            if recno - header.start_recno != header.records {
                return Err(ctx.fail(
                    Some(r.address),
                    None,
                    Error::verify(
                        VerifyErrorKind::RecordCountMismatch,
                        "column-internal children's record counts do not sum to the page's own records field",
                    ),
                ));
            }
        }
        PageBody::Items(result) if header.page_type.is_internal() => {
            let child_level = header.level.checked_sub(1).ok_or_else(|| {
                ctx.fail(
                    Some(r.address),
                    None,
                    Error::verify(VerifyErrorKind::LevelMismatch, "internal page has level zero"),
                )
            })?;

            if let (Some(lower), Some(first)) = (&bounds.lower, result.entries.first()) {
                let cmp = comparator_for_page(ctx, header.page_type);
                check_lower_bound(cmp, lower, &first.key, false)
                    .map_err(|e| ctx.fail(Some(r.address), None, e))?;
            }
            if let (Some(upper), Some(last)) = (&bounds.upper, result.entries.last()) {
                let cmp = comparator_for_page(ctx, header.page_type);
                check_upper_bound(cmp, &last.key, upper).map_err(|e| ctx.fail(Some(r.address), None, e))?;
            }

            let n = result.entries.len();
            for (i, entry) in result.entries.iter().enumerate() {
                let lower = Some(entry.key.clone());
                let upper = if i + 1 < n {
                    Some(result.entries[i + 1].key.clone())
                } else {
                    bounds.upper.clone()
                };
                walk(
                    ctx,
                    entry.child,
                    KeyBounds { lower, upper },
                    Expectation {
                        level: Some(child_level),
                        records: Some(entry.child_records),
                        start_recno: None,
                    },
                )?;
            }
        }
        PageBody::Items(result) => {
            // Leaf flavors: row-leaf, dup-leaf, column-variable.
            let strict_lower = header.page_type == PageType::DupLeaf;
            if let (Some(lower), Some(first)) = (&bounds.lower, &result.first_key) {
                let cmp = comparator_for_page(ctx, header.page_type);
                check_lower_bound(cmp, lower, first, strict_lower)
                    .map_err(|e| ctx.fail(Some(r.address), None, e))?;
            }
            if let (Some(upper), Some(last)) = (&bounds.upper, &result.last_key) {
                let cmp = comparator_for_page(ctx, header.page_type);
                check_upper_bound(cmp, last, upper).map_err(|e| ctx.fail(Some(r.address), None, e))?;
            }
        }
    }

    Ok(())
}
