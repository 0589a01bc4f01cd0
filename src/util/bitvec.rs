//! Bit vector and the fragment coverage bitmap built on top of it.

use crate::error::{Error, ErrorCode, VerifyErrorKind};
use crate::types::{Address, FragCount};

/// A growable-at-construction bit vector, indexed by `u64` so that it can
/// address terabyte-class files without running into `usize`/`int` width
/// limits on 32-bit hosts.
#[derive(Clone, Debug, Default)]
pub struct BitVec {
    bits: Vec<u64>,
    len: u64,
}

const WORD_BITS: u64 = 64;

impl BitVec {
    pub fn new(len: u64) -> Self {
        let words = len.div_ceil(WORD_BITS) as usize;
        Self {
            bits: vec![0; words],
            len,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, idx: u64) -> bool {
        if idx >= self.len {
            return false;
        }
        let word = self.bits[(idx / WORD_BITS) as usize];
        let mask = 1u64 << (idx % WORD_BITS);
        (word & mask) != 0
    }

    pub fn set(&mut self, idx: u64, value: bool) {
        if idx >= self.len {
            return;
        }
        let word_idx = (idx / WORD_BITS) as usize;
        let mask = 1u64 << (idx % WORD_BITS);
        if value {
            self.bits[word_idx] |= mask;
        } else {
            self.bits[word_idx] &= !mask;
        }
    }
}

/// Maximum number of fragments this bitmap can address. Chosen generously
/// above any realistic file; existing purely so `FragmentBitmap::new` has a
/// concrete failure mode instead of attempting an unbounded allocation.
pub const MAX_FRAGMENTS: FragCount = 1 << 48;

/// One bit per allocation unit in the file. Bit `i` set means allocation
/// unit `i` has already been claimed by some reachable page.
pub struct FragmentBitmap {
    bits: BitVec,
}

/// A maximal run of contiguous unset bits, reported by the coverage scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRange {
    pub start: Address,
    pub count: FragCount,
}

impl FragmentBitmap {
    pub fn new(frags: FragCount) -> crate::error::Result<Self> {
        if frags > MAX_FRAGMENTS {
            return Err(Error::verify(
                VerifyErrorKind::FileTooLarge,
                format!(
                    "file requires {} fragments, exceeds addressable range {}",
                    frags, MAX_FRAGMENTS
                ),
            ));
        }
        Ok(Self {
            bits: BitVec::new(frags),
        })
    }

    pub fn frags(&self) -> FragCount {
        self.bits.len()
    }

    /// Marks `[start, start+count)` as covered. Returns an error (without
    /// rolling back bits already set by this call) if any bit in the range
    /// was already set -- the caller is expected to abort the page on such
    /// an error, not keep walking it.
    pub fn mark(&mut self, start: Address, count: FragCount) -> crate::error::Result<()> {
        for i in 0..count {
            let idx = start + i;
            if idx >= self.bits.len() {
                return Err(Error::verify(
                    VerifyErrorKind::EndOfFile,
                    format!("fragment {} lies beyond end of file", idx),
                ));
            }
            if self.bits.get(idx) {
                return Err(Error::verify(
                    VerifyErrorKind::DuplicateCoverage,
                    format!("fragment {} claimed by more than one page", idx),
                ));
            }
            self.bits.set(idx, true);
        }
        Ok(())
    }

    /// Scans the full bitmap and returns one range per maximal run of
    /// unset (uncovered) bits.
    pub fn gaps(&self) -> Vec<FragmentRange> {
        let mut gaps = Vec::new();
        let mut run_start: Option<Address> = None;
        for idx in 0..self.bits.len() {
            if self.bits.get(idx) {
                if let Some(start) = run_start.take() {
                    gaps.push(FragmentRange {
                        start,
                        count: idx - start,
                    });
                }
            } else if run_start.is_none() {
                run_start = Some(idx);
            }
        }
        if let Some(start) = run_start {
            gaps.push(FragmentRange {
                start,
                count: self.bits.len() - start,
            });
        }
        gaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitvec_basic_get_set() {
        let mut bv = BitVec::new(100);
        assert!(!bv.get(5));
        bv.set(5, true);
        assert!(bv.get(5));
        bv.set(5, false);
        assert!(!bv.get(5));
    }

    #[test]
    fn bitvec_out_of_range_is_a_noop() {
        let mut bv = BitVec::new(8);
        bv.set(100, true);
        assert!(!bv.get(100));
    }

    #[test]
    fn fragment_bitmap_rejects_double_claim() {
        let mut bm = FragmentBitmap::new(16).unwrap();
        bm.mark(0, 4).unwrap();
        let err = bm.mark(2, 2).unwrap_err();
        assert_eq!(err.kind, Some(VerifyErrorKind::DuplicateCoverage));
    }

    #[test]
    fn fragment_bitmap_reports_gaps() {
        let mut bm = FragmentBitmap::new(10).unwrap();
        bm.mark(0, 2).unwrap();
        bm.mark(5, 3).unwrap();
        let gaps = bm.gaps();
        assert_eq!(
            gaps,
            vec![
                FragmentRange { start: 2, count: 3 },
                FragmentRange { start: 8, count: 2 },
            ]
        );
    }

    #[test]
    fn fully_covered_bitmap_has_no_gaps() {
        let mut bm = FragmentBitmap::new(5).unwrap();
        bm.mark(0, 5).unwrap();
        assert!(bm.gaps().is_empty());
    }

    #[test]
    fn file_too_large_is_rejected_up_front() {
        let err = FragmentBitmap::new(MAX_FRAGMENTS + 1).unwrap_err();
        assert_eq!(err.kind, Some(VerifyErrorKind::FileTooLarge));
    }
}
