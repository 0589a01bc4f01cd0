//! Per-page validation (§4.3): pins a page, claims its fragment coverage,
//! validates the header, and dispatches to the body validator for its
//! concrete page type. This is the one place that turns a `(address,
//! size)` reference into checked, owned data the tree walker and item
//! walker can use without re-deriving it.

use std::io::Write as _;

use crate::error::{Error, Result, VerifyErrorKind};
use crate::storage::format::{
    units_for, DescriptorRecord, PageHeader, PageType, LEAF_LEVEL, NO_LEVEL, PAGE_HEADER_SIZE,
};
use crate::types::Ref;
use crate::verify::column;
use crate::verify::item::{self, ItemWalkResult};
use crate::verify::session::VerifyContext;

/// The validated, type-specific contents of a page's body.
pub enum PageBody {
    Descriptor(DescriptorRecord),
    ColInternal(Vec<column::ColChildEntry>),
    ColFixed,
    ColRcc,
    /// Shared by every packed tagged-item page flavor (row/dup
    /// internal/leaf, column-variable) -- which fields of `ItemWalkResult`
    /// matter depends on the page type the caller already knows.
    Items(ItemWalkResult),
    Overflow(Vec<u8>),
}

pub struct ValidatedPage {
    pub header: PageHeader,
    pub body: PageBody,
}

fn check_level_shape(header: &PageHeader) -> Result<()> {
    match header.page_type {
        PageType::Descriptor => {
            if header.level != NO_LEVEL {
                return Err(Error::verify(
                    VerifyErrorKind::LevelMismatch,
                    "descriptor page has a non-zero level",
                ));
            }
        }
        t if t.is_leaf() => {
            if header.level != LEAF_LEVEL {
                return Err(Error::verify(
                    VerifyErrorKind::LevelMismatch,
                    format!("leaf page has level {} instead of {}", header.level, LEAF_LEVEL),
                ));
            }
        }
        t if t.is_internal() => {
            if header.level <= LEAF_LEVEL {
                return Err(Error::verify(
                    VerifyErrorKind::LevelMismatch,
                    format!("internal page has leaf-or-below level {}", header.level),
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_descriptor(ctx: &VerifyContext, record: &DescriptorRecord) -> Result<()> {
    let db = ctx.db;
    if record.major_version != db.major_version || record.minor_version != db.minor_version {
        return Err(Error::verify(
            VerifyErrorKind::DescriptorMismatch,
            format!(
                "descriptor version {}.{} does not match the database handle's {}.{}",
                record.major_version, record.minor_version, db.major_version, db.minor_version
            ),
        ));
    }
    if record.min_intl_page != db.min_intl_page
        || record.max_intl_page != db.max_intl_page
        || record.min_leaf_page != db.min_leaf_page
        || record.max_leaf_page != db.max_leaf_page
    {
        return Err(Error::verify(
            VerifyErrorKind::DescriptorMismatch,
            "descriptor page-size bounds do not match the database handle",
        ));
    }
    if record.fixed_len != db.fixed_len {
        return Err(Error::verify(
            VerifyErrorKind::DescriptorMismatch,
            format!(
                "descriptor fixed_len {} does not match the database handle's {}",
                record.fixed_len, db.fixed_len
            ),
        ));
    }
    if record.recno_offset != db.recno_offset {
        return Err(Error::verify(
            VerifyErrorKind::DescriptorMismatch,
            "descriptor recno_offset does not match the database handle",
        ));
    }
    Ok(())
}

/// Pins `r`, claims its fragment coverage, and validates its header and
/// body. Always unpins before returning, success or failure -- the body
/// variants only ever carry owned data extracted from the page.
pub fn validate_page(ctx: &mut VerifyContext, r: Ref) -> Result<ValidatedPage> {
    let units = units_for(r.size, ctx.db.alloc_unit);
    ctx.bitmap.mark(r.address, units).map_err(|e| ctx.fail(Some(r.address), None, e))?;

    let page = ctx.pin(r).map_err(|e| ctx.fail(Some(r.address), None, e))?;
    ctx.pages_visited += 1;
    ctx.note_progress("pages", ctx.pages_visited);

    let result = (|| -> Result<ValidatedPage> {
        let header = PageHeader::parse(&page.data)?;
        check_level_shape(&header)?;
        if let Some(w) = ctx.dump.as_deref_mut() {
            let _ = writeln!(
                w,
                "addr={} size={} type={:?} level={} records={}",
                r.address, r.size, header.page_type, header.level, header.records
            );
        }
        let body = &page.data[PAGE_HEADER_SIZE..];

        let body = match header.page_type {
            PageType::Descriptor => {
                let record = DescriptorRecord::parse(body)?;
                check_descriptor(ctx, &record)?;
                PageBody::Descriptor(record)
            }
            PageType::ColInternal => PageBody::ColInternal(column::validate_col_internal(body)?),
            PageType::ColFixed => {
                column::validate_col_fixed(body, &header, ctx.db.fixed_len)?;
                PageBody::ColFixed
            }
            PageType::ColRcc => {
                column::validate_col_rcc(body, &header, ctx.db.fixed_len)?;
                PageBody::ColRcc
            }
            PageType::Overflow => PageBody::Overflow(column::validate_overflow(body, &header)?),
            t @ (PageType::RowInternal
            | PageType::RowLeaf
            | PageType::DupInternal
            | PageType::DupLeaf
            | PageType::ColVariable) => {
                PageBody::Items(item::walk_items(ctx, r.address, body, t)?)
            }
        };
        Ok(ValidatedPage { header, body })
    })();

    ctx.unpin(page);
    result.map_err(|e| ctx.fail(Some(r.address), None, e))
}
