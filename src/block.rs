//! Block codec: the header word shared by every block in the arena.
//!
//! ```text
//!   31                                   2   1   0
//!   ┌────────────────────────────────────┬───┬───┐
//!   │          size (multiple of 8)      │ p │ a │
//!   └────────────────────────────────────┴───┴───┘
//!                                          │   └── a: this block is allocated
//!                                          └────── p: previous block is allocated
//! ```
//!
//! Free blocks repeat the raw size in their last word (the footer) so the
//! block after them can find their header by stepping backwards.

use std::fmt;

/// Width of a header or footer word.
pub const WSIZE: usize = 4;

/// Double word: block sizes and payload addresses are multiples of this.
pub const DSIZE: usize = 8;

/// Packed size and status bits of one block.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Header(u32);

impl Header {
  const ALLOC: u32 = 0b01;
  const PREV_ALLOC: u32 = 0b10;
  const STATUS_MASK: u32 = Self::ALLOC | Self::PREV_ALLOC;

  /// The end marker: size 0, allocated.
  pub const SENTINEL: Self = Self(Self::ALLOC);

  /// Largest block size a header can record.
  pub const MAX_SIZE: usize = (u32::MAX & !(DSIZE as u32 - 1)) as usize;

  /// Packs `size` and both status bits.
  ///
  /// `size` must be a multiple of [`DSIZE`] no larger than [`Header::MAX_SIZE`].
  #[inline]
  pub const fn new(
    size: usize,
    allocated: bool,
    prev_allocated: bool,
  ) -> Self {
    debug_assert!(size % DSIZE == 0 && size <= Self::MAX_SIZE);

    let mut word = size as u32;
    if allocated {
      word |= Self::ALLOC;
    }
    if prev_allocated {
      word |= Self::PREV_ALLOC;
    }
    Self(word)
  }

  /// A footer word. Only the size is meaningful.
  #[inline]
  pub const fn footer(size: usize) -> Self {
    Self::new(size, false, false)
  }

  #[inline]
  pub const fn from_raw(word: u32) -> Self {
    Self(word)
  }

  #[inline]
  pub const fn raw(self) -> u32 {
    self.0
  }

  /// Total block size in bytes, header included.
  #[inline]
  pub const fn size(self) -> usize {
    (self.0 & !Self::STATUS_MASK) as usize
  }

  #[inline]
  pub const fn is_allocated(self) -> bool {
    self.0 & Self::ALLOC != 0
  }

  #[inline]
  pub const fn is_prev_allocated(self) -> bool {
    self.0 & Self::PREV_ALLOC != 0
  }

  #[inline]
  pub const fn is_sentinel(self) -> bool {
    self.0 == Self::SENTINEL.0
  }

  #[inline]
  #[must_use]
  pub const fn with_allocated(
    self,
    allocated: bool,
  ) -> Self {
    Self::new(self.size(), allocated, self.is_prev_allocated())
  }

  #[inline]
  #[must_use]
  pub const fn with_prev_allocated(
    self,
    prev_allocated: bool,
  ) -> Self {
    Self::new(self.size(), self.is_allocated(), prev_allocated)
  }

  #[inline]
  #[must_use]
  pub const fn with_size(
    self,
    size: usize,
  ) -> Self {
    Self::new(size, self.is_allocated(), self.is_prev_allocated())
  }
}

impl fmt::Debug for Header {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Header")
      .field("size", &self.size())
      .field("allocated", &self.is_allocated())
      .field("prev_allocated", &self.is_prev_allocated())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_pack() {
    // Allocated 24 byte block: 25 after a free block, 27 after an allocated one.
    assert_eq!(Header::new(24, true, false).raw(), 25);
    assert_eq!(Header::new(24, true, true).raw(), 27);

    // Free 24 byte block: 24 after a free block, 26 after an allocated one.
    assert_eq!(Header::new(24, false, false).raw(), 24);
    assert_eq!(Header::new(24, false, true).raw(), 26);

    assert_eq!(Header::footer(24).raw(), 24);
  }

  #[test]
  fn test_unpack() {
    let header = Header::from_raw(27);

    assert_eq!(header.size(), 24);
    assert!(header.is_allocated());
    assert!(header.is_prev_allocated());

    let header = Header::from_raw(4088 | 0b10);

    assert_eq!(header.size(), 4088);
    assert!(!header.is_allocated());
    assert!(header.is_prev_allocated());
  }

  #[test]
  fn test_status_updates_keep_size() {
    let header = Header::new(40, false, true);

    let allocated = header.with_allocated(true);
    assert_eq!(allocated.size(), 40);
    assert!(allocated.is_allocated());
    assert!(allocated.is_prev_allocated());

    let orphaned = allocated.with_prev_allocated(false);
    assert_eq!(orphaned.raw(), 41);

    let grown = orphaned.with_size(64);
    assert_eq!(grown.raw(), 65);
  }

  #[test]
  fn test_sentinel() {
    assert!(Header::SENTINEL.is_sentinel());
    assert_eq!(Header::SENTINEL.size(), 0);
    assert!(Header::SENTINEL.is_allocated());
    assert!(!Header::new(8, true, false).is_sentinel());
    assert!(!Header::new(8, true, true).is_sentinel());
  }
}
