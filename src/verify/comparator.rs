//! The boundary comparator helper (§4.5): given the comparator a subtree is
//! keyed under, checks a child's first/last observed key against the key
//! range its parent promised it would occupy. Kept separate from the tree
//! walker so the two distinct failure modes -- "my first key sorts before
//! what my parent pointed me in as" and "my last key doesn't sort before
//! my next sibling's routing key" -- stay textually distinct and easy to
//! attribute correctly.

use std::cmp::Ordering;

use crate::error::{Error, Result, VerifyErrorKind};
use crate::verify::session::Comparator;

/// Checks a subtree's first key against the lower bound its parent
/// promised. `strict` is `true` for duplicate-leaf values (which must sort
/// strictly after the routing value) and `false` for ordinary keys (which
/// may equal the routing key that introduced them).
pub fn check_lower_bound(cmp: &dyn Comparator, lower: &[u8], first: &[u8], strict: bool) -> Result<()> {
    let ord = cmp.compare(lower, first);
    let ok = if strict { ord == Ordering::Less } else { ord != Ordering::Greater };
    if !ok {
        return Err(Error::verify(
            VerifyErrorKind::BoundaryViolation,
            "subtree's first key sorts before the routing key that points to it",
        ));
    }
    Ok(())
}

/// Checks a subtree's last key against the upper bound its parent
/// promised -- the routing key of the next sibling, or the inherited
/// upper bound for a rightmost child. Always strict: a key equal to the
/// next sibling's routing key would belong under that sibling instead.
pub fn check_upper_bound(cmp: &dyn Comparator, last: &[u8], upper: &[u8]) -> Result<()> {
    if cmp.compare(last, upper) != Ordering::Less {
        return Err(Error::verify(
            VerifyErrorKind::BoundaryViolation,
            "subtree's last key does not sort before the next routing key",
        ));
    }
    Ok(())
}
