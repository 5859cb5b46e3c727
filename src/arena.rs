use std::{io, ptr::NonNull, slice};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap, munmap};

use log::error;

use crate::{
  block::{Header, WSIZE},
  error::InitError,
};

const FALLBACK_PAGE_SIZE: usize = 4096;

/// Page size reported by the OS.
pub fn page_size() -> usize {
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

  if size > 0 {
    size as usize
  } else {
    FALLBACK_PAGE_SIZE
  }
}

/// A private, zero-filled read/write mapping owned for its whole lifetime.
///
/// All access goes through byte offsets and is bounds-checked: reads report
/// `None` past the end, writes past the end are logged and skipped.
pub(crate) struct Arena {
  base: NonNull<u8>,
  len: usize,
}

impl Arena {
  /// Maps `len` bytes. `len` must be a non-zero multiple of the page size.
  pub(crate) fn map(len: usize) -> Result<Self, InitError> {
    let addr = unsafe {
      mmap(
        std::ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if addr == MAP_FAILED {
      return Err(InitError::MapFailed {
        size: len,
        source: io::Error::last_os_error(),
      });
    }

    let base = NonNull::new(addr as *mut u8).ok_or_else(|| InitError::MapFailed {
      size: len,
      source: io::Error::from(io::ErrorKind::OutOfMemory),
    })?;

    Ok(Self { base, len })
  }

  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.len
  }

  #[inline]
  pub(crate) fn base_addr(&self) -> usize {
    self.base.as_ptr() as usize
  }

  /// Address of the byte at `offset`.
  #[inline]
  pub(crate) fn ptr_at(
    &self,
    offset: usize,
  ) -> *mut u8 {
    debug_assert!(offset <= self.len);
    self.base.as_ptr().wrapping_add(offset)
  }

  /// Offset of `addr` inside the mapping, if it lies inside it.
  #[inline]
  pub(crate) fn offset_of(
    &self,
    addr: usize,
  ) -> Option<usize> {
    addr
      .checked_sub(self.base_addr())
      .filter(|offset| *offset < self.len)
  }

  pub(crate) fn bytes(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self.base.as_ptr(), self.len) }
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
  }

  /// Reads the word at `offset`, or `None` if it does not fit in the mapping.
  pub(crate) fn read(
    &self,
    offset: usize,
  ) -> Option<Header> {
    let end = offset.checked_add(WSIZE)?;
    let word = self.bytes().get(offset..end)?;

    let mut raw = [0u8; WSIZE];
    raw.copy_from_slice(word);

    Some(Header::from_raw(u32::from_ne_bytes(raw)))
  }

  /// Writes the word at `offset`. A word that does not fit in the mapping is
  /// reported and dropped.
  pub(crate) fn write(
    &mut self,
    offset: usize,
    header: Header,
  ) {
    let word = offset
      .checked_add(WSIZE)
      .and_then(|end| self.bytes_mut().get_mut(offset..end));

    match word {
      Some(word) => word.copy_from_slice(&header.raw().to_ne_bytes()),
      None => error!("arena: write at offset {} past the end of the mapping", offset),
    }
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    unsafe {
      munmap(self.base.as_ptr() as *mut c_void, self.len);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_page_size() {
    let page = page_size();

    assert!(page >= 4096);
    assert!(page.is_power_of_two());
  }

  #[test]
  fn test_map_is_zeroed_and_page_aligned() {
    let arena = Arena::map(page_size()).unwrap();

    assert_eq!(arena.base_addr() % page_size(), 0);
    assert!(arena.bytes().iter().all(|byte| *byte == 0));
  }

  #[test]
  fn test_word_access() {
    let mut arena = Arena::map(page_size()).unwrap();
    let last = arena.len() - WSIZE;

    arena.write(0, Header::new(16, true, true));
    arena.write(last, Header::SENTINEL);

    assert_eq!(arena.read(0), Some(Header::new(16, true, true)));
    assert_eq!(arena.read(last), Some(Header::SENTINEL));
    assert_eq!(arena.read(last + 1), None);
    assert_eq!(arena.read(usize::MAX), None);
  }

  #[test]
  fn test_map_failure() {
    let denied = Arena::map(1 << 62);

    assert!(matches!(
      denied,
      Err(InitError::MapFailed { size, .. }) if size == 1 << 62
    ));
  }

  #[test]
  fn test_write_past_end_is_dropped() {
    let mut arena = Arena::map(page_size()).unwrap();
    let len = arena.len();

    arena.write(len - 2, Header::SENTINEL);
    arena.write(len, Header::SENTINEL);
    arena.write(usize::MAX - 1, Header::SENTINEL);

    assert!(arena.bytes().iter().all(|byte| *byte == 0));
  }

  #[test]
  fn test_offset_of() {
    let arena = Arena::map(page_size()).unwrap();
    let base = arena.base_addr();

    assert_eq!(arena.offset_of(base), Some(0));
    assert_eq!(arena.offset_of(base + 8), Some(8));
    assert_eq!(arena.offset_of(base + arena.len()), None);
    assert_eq!(arena.offset_of(base - 1), None);
  }
}
