//! On-disk page format: header layout, page/item type tags, and the small
//! fixed-size records (overflow reference, off-page reference, descriptor
//! record) the verifier needs to decode without help from the page parser.
//!
//! Field widths and offsets here are this crate's own choice -- the spec
//! leaves the exact byte layout to "the engine" and only fixes the
//! invariants. See `DESIGN.md` for the open-question resolution.

use crate::error::{Error, Result, VerifyErrorKind};
use crate::storage::encoding::{read_u16, read_u32, read_u64};
use crate::types::Address;

/// Smallest addressable block of the file. Chosen to match the common
/// minimum sector size; real deployments would make this configurable, but
/// the verifier only ever needs to know the value the database was created
/// with (carried on `DbHandle::alloc_unit`).
pub const DEFAULT_ALLOC_UNIT: u32 = 512;

/// Fixed size of every page header, regardless of page type.
pub const PAGE_HEADER_SIZE: usize = 48;

/// Sentinel `level` meaning "not a tree level" -- used by the descriptor
/// page and, during the tree walk, to say "this call is the root: learn the
/// true height from the child we're about to pin".
pub const NO_LEVEL: u8 = 0;

/// The `level` every leaf page (of any flavor) carries.
pub const LEAF_LEVEL: u8 = 1;

/// Page type tag, stored in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    Descriptor = 0,
    ColInternal = 1,
    ColFixed = 2,
    ColRcc = 3,
    ColVariable = 4,
    RowInternal = 5,
    RowLeaf = 6,
    DupInternal = 7,
    DupLeaf = 8,
    Overflow = 9,
}

impl PageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => PageType::Descriptor,
            1 => PageType::ColInternal,
            2 => PageType::ColFixed,
            3 => PageType::ColRcc,
            4 => PageType::ColVariable,
            5 => PageType::RowInternal,
            6 => PageType::RowLeaf,
            7 => PageType::DupInternal,
            8 => PageType::DupLeaf,
            9 => PageType::Overflow,
            _ => return None,
        })
    }

    /// Items are packed, tagged records on these page bodies; every other
    /// page type has a type-specific fixed-shape body (§4.3.3-4.3.6).
    pub fn is_variable_item_page(self) -> bool {
        matches!(
            self,
            PageType::RowInternal
                | PageType::RowLeaf
                | PageType::DupInternal
                | PageType::DupLeaf
                | PageType::ColVariable
        )
    }

    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            PageType::ColFixed
                | PageType::ColRcc
                | PageType::ColVariable
                | PageType::DupLeaf
                | PageType::RowLeaf
                | PageType::Overflow
        )
    }

    pub fn is_internal(self) -> bool {
        matches!(
            self,
            PageType::ColInternal | PageType::RowInternal | PageType::DupInternal
        )
    }

    pub fn is_column_store(self) -> bool {
        matches!(
            self,
            PageType::ColInternal | PageType::ColFixed | PageType::ColRcc | PageType::ColVariable
        )
    }
}

/// Item type tag for the packed, tagged record format shared by row, dup,
/// and column-variable page bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ItemType {
    Key = 1,
    KeyOvfl = 2,
    KeyDup = 3,
    KeyDupOvfl = 4,
    Data = 5,
    DataOvfl = 6,
    DataDup = 7,
    DataDupOvfl = 8,
    Del = 9,
    Off = 10,
}

impl ItemType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => ItemType::Key,
            2 => ItemType::KeyOvfl,
            3 => ItemType::KeyDup,
            4 => ItemType::KeyDupOvfl,
            5 => ItemType::Data,
            6 => ItemType::DataOvfl,
            7 => ItemType::DataDup,
            8 => ItemType::DataDupOvfl,
            9 => ItemType::Del,
            10 => ItemType::Off,
            _ => return None,
        })
    }

    pub fn is_overflow(self) -> bool {
        matches!(
            self,
            ItemType::KeyOvfl | ItemType::KeyDupOvfl | ItemType::DataOvfl | ItemType::DataDupOvfl
        )
    }

    /// Which page types this item type is legal on (table in §4.4).
    pub fn legal_on(self, page: PageType) -> bool {
        use ItemType::*;
        use PageType::*;
        match self {
            Key | KeyOvfl => matches!(page, RowInternal | RowLeaf),
            KeyDup | KeyDupOvfl => matches!(page, DupInternal),
            Data | DataOvfl => matches!(page, ColVariable | RowLeaf),
            DataDup | DataDupOvfl => matches!(page, DupLeaf | RowLeaf),
            Del => matches!(page, ColVariable),
            Off => matches!(page, RowInternal | RowLeaf | DupInternal),
        }
    }
}

/// Parsed, validated page header.
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub page_type: PageType,
    pub level: u8,
    pub flags: u8,
    pub start_recno: u64,
    pub datalen: u32,
    pub records: u64,
}

impl PageHeader {
    /// Parses and checks the reserved-field invariants (§4.3: `lsn == 0`,
    /// `unused == 0`, recognized type). Level-vs-type consistency is
    /// checked separately by the page validator so it can be attributed to
    /// the right error kind.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < PAGE_HEADER_SIZE {
            return Err(Error::verify(
                VerifyErrorKind::BadHeader,
                "page shorter than the fixed header",
            ));
        }
        let raw_type = data[0];
        let level = data[1];
        let flags = data[2];
        let unused = &data[3..5];
        let lsn0 = read_u64(data, 8).unwrap();
        let lsn1 = read_u64(data, 16).unwrap();
        let start_recno = read_u64(data, 24).unwrap();
        let datalen = read_u32(data, 32).unwrap();
        let records = read_u64(data, 40).unwrap();

        if unused != [0, 0] {
            return Err(Error::verify(
                VerifyErrorKind::BadHeader,
                "reserved 'unused' header bytes are non-zero",
            ));
        }
        if lsn0 != 0 || lsn1 != 0 {
            return Err(Error::verify(
                VerifyErrorKind::BadHeader,
                "reserved 'lsn' header field is non-zero",
            ));
        }
        let page_type = PageType::from_u8(raw_type).ok_or_else(|| {
            Error::verify(
                VerifyErrorKind::BadHeader,
                format!("unrecognized page type tag {}", raw_type),
            )
        })?;

        Ok(PageHeader {
            page_type,
            level,
            flags,
            start_recno,
            datalen,
            records,
        })
    }
}

/// Size in bytes of an encoded overflow reference (`OFF`/`*_OVFL` payload).
pub const OVFL_REF_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowRef {
    pub address: Address,
    pub size: u32,
}

impl OverflowRef {
    pub fn parse(data: &[u8]) -> Option<Self> {
        let address = read_u64(data, 0)?;
        let size = read_u32(data, 8)?;
        Some(Self { address, size })
    }
}

/// Size in bytes of an encoded off-page (`OFF`) reference.
pub const OFF_REF_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffRef {
    pub records: u64,
    pub address: Address,
    pub size: u32,
}

impl OffRef {
    pub fn parse(data: &[u8]) -> Option<Self> {
        let records = read_u64(data, 0)?;
        let address = read_u64(data, 8)?;
        let size = read_u32(data, 16)?;
        Some(Self {
            records,
            address,
            size,
        })
    }
}

/// Fixed-size `WT_OFF`-style entry on a column-internal page body: just an
/// off-page reference, record count included.
pub const COL_OFF_ENTRY_SIZE: usize = OFF_REF_SIZE;

/// Magic stamped at the start of the descriptor record.
pub const DESCRIPTOR_MAGIC: [u8; 8] = *b"BTVERFY1";

/// Size of the descriptor record occupying the descriptor page body.
pub const DESCRIPTOR_RECORD_SIZE: usize = 64;

bitflags::bitflags! {
    /// Flags carried in the descriptor record's reserved flags byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescriptorFlags: u8 {
        /// Column-store fixed-length pages use the repeat-count-compressed
        /// (`RCC`) body layout rather than one record per slot.
        const REPEAT_COUNT = 0x01;
    }
}

/// The descriptor page's body: database-wide format parameters, checked
/// against the handle's configured values (§4.3.1).
#[derive(Debug, Clone, Copy)]
pub struct DescriptorRecord {
    pub major_version: u16,
    pub minor_version: u16,
    pub min_intl_page: u32,
    pub max_intl_page: u32,
    pub min_leaf_page: u32,
    pub max_leaf_page: u32,
    pub fixed_len: u32,
    pub recno_offset: u32,
    pub flags: DescriptorFlags,
}

impl DescriptorRecord {
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < DESCRIPTOR_RECORD_SIZE {
            return Err(Error::verify(
                VerifyErrorKind::DescriptorMismatch,
                "descriptor page body shorter than the descriptor record",
            ));
        }
        if body[0..8] != DESCRIPTOR_MAGIC {
            return Err(Error::verify(
                VerifyErrorKind::DescriptorMismatch,
                "descriptor magic does not match",
            ));
        }
        let major_version = read_u16(body, 8).unwrap();
        let minor_version = read_u16(body, 10).unwrap();
        let min_intl_page = read_u32(body, 12).unwrap();
        let max_intl_page = read_u32(body, 16).unwrap();
        let min_leaf_page = read_u32(body, 20).unwrap();
        let max_leaf_page = read_u32(body, 24).unwrap();
        let fixed_len = read_u32(body, 28).unwrap();
        let recno_offset = read_u32(body, 32).unwrap();
        let raw_flags = body[36];
        let flags = DescriptorFlags::from_bits(raw_flags).ok_or_else(|| {
            Error::verify(
                VerifyErrorKind::DescriptorMismatch,
                format!("descriptor flags byte {:#x} has unrecognized bits set", raw_flags),
            )
        })?;
        let reserved = &body[37..DESCRIPTOR_RECORD_SIZE];
        if reserved.iter().any(|&b| b != 0) {
            return Err(Error::verify(
                VerifyErrorKind::DescriptorMismatch,
                "descriptor reserved span is non-zero",
            ));
        }
        if flags.contains(DescriptorFlags::REPEAT_COUNT) && fixed_len == 0 {
            return Err(Error::verify(
                VerifyErrorKind::DescriptorMismatch,
                "repeat-count flag set but fixed_len is zero",
            ));
        }
        Ok(Self {
            major_version,
            minor_version,
            min_intl_page,
            max_intl_page,
            min_leaf_page,
            max_leaf_page,
            fixed_len,
            recno_offset,
            flags,
        })
    }
}

/// Rounds `addr_units_for(size)` -- the number of allocation units a
/// `(address, size)` pair occupies.
pub fn units_for(size: u32, alloc_unit: u32) -> u64 {
    (size as u64).div_ceil(alloc_unit as u64)
}
