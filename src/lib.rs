//! Offline structural verifier for a WiredTiger-style on-disk B-tree.
//!
//! Walks a database file from its descriptor page down through the tree
//! rooted at a given reference, checking page headers, item ordering,
//! parent/child key-range agreement, and fragment coverage, without ever
//! writing to the file. See `verify::verify` for the entry point and
//! `verify::session` for the collaborator traits a host engine implements.

#![allow(dead_code)]

pub mod error;
pub mod storage;
pub mod types;
pub mod util;
pub mod verify;

pub use error::{Error, ErrorCode, Result, VerifyErrorKind};
pub use types::{Address, FragCount, RecNo, Ref};
pub use verify::{verify, verify_with_context, DbHandle, VerifyContext, VerifyMessage};
