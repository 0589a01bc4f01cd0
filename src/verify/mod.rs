//! The offline structural verifier (§4.1): the public entry point that
//! allocates the fragment coverage bitmap, checks the descriptor page,
//! walks the tree from its root, and reports a missing-coverage error if
//! any fragment of the file was never claimed by a page.
//!
//! Submodules mirror the spec's own layering: `session` holds the external
//! collaborator traits and the per-call context; `page` validates one page
//! at a time; `item` walks a page's packed tagged-item body; `column`
//! validates the fixed-shape column and overflow bodies; `comparator`
//! holds the boundary-check helper; `tree` is the recursive walk.

pub mod column;
pub mod comparator;
pub mod item;
pub mod page;
pub mod session;
pub mod tree;

use crate::error::{Error, Result, VerifyErrorKind};
use crate::storage::buffer::{BufferManager, FileHandle, ScratchPool};
use crate::util::bitvec::FragmentBitmap;
use crate::types::Ref;

pub use session::{
    ByteCompare, Comparator, DbHandle, Decompressor, ErrorSink, NoopProgress, ProgressCallback,
    VecErrorSink, VerifyContext, VerifyMessage,
};

/// Runs a full structural verify pass over the database described by `db`,
/// pinning pages through `bufmgr` and reporting every problem found to
/// `errors`. Returns the first error encountered; `errors` may also have
/// accumulated more specific, nested reports about the same failure (e.g.
/// both the overflow page's own complaint and the item that pointed to it).
#[allow(clippy::too_many_arguments)]
pub fn verify(
    db: &DbHandle,
    bufmgr: &mut dyn BufferManager,
    file: &dyn FileHandle,
    scratch: &mut dyn ScratchPool,
    errors: &mut dyn ErrorSink,
    progress: Option<&mut dyn ProgressCallback>,
) -> Result<()> {
    let file_size = file.file_size()?;
    let frags = file_size.div_ceil(db.alloc_unit as u64);
    let bitmap = FragmentBitmap::new(frags)?;

    let mut ctx = VerifyContext {
        db,
        file_size,
        bufmgr,
        scratch,
        errors,
        progress,
        dump: None,
        bitmap,
        pages_visited: 0,
    };

    verify_with_context(&mut ctx)
}

/// As `verify`, but lets the caller supply an already-built `VerifyContext`
/// (for instance one with a dump writer attached). Exposed separately so
/// tests and CLI tooling don't have to thread every collaborator through
/// `verify`'s longer signature just to add a dump sink.
pub fn verify_with_context(ctx: &mut VerifyContext) -> Result<()> {
    let descriptor_ref = Ref::new(0, ctx.db.alloc_unit);
    let validated = page::validate_page(ctx, descriptor_ref)?;
    if !matches!(validated.body, page::PageBody::Descriptor(_)) {
        return Err(ctx.fail(
            Some(0),
            None,
            Error::verify(
                VerifyErrorKind::DescriptorMismatch,
                "first page of the file is not the descriptor page",
            ),
        ));
    }

    tree::walk(ctx, ctx.db.root, tree::KeyBounds::none(), tree::Expectation::default())?;

    let gaps = ctx.bitmap.gaps();
    if let Some(first) = gaps.first() {
        let err = Error::verify(
            VerifyErrorKind::MissingCoverage,
            format!(
                "{} uncovered fragment range(s); first is {} fragment(s) starting at {}",
                gaps.len(),
                first.count,
                first.start
            ),
        );
        return Err(ctx.fail(None, None, err));
    }

    Ok(())
}
