use std::ptr;

use log::{debug, error, info, trace, warn};

use crate::{
  align, align_to,
  arena::{self, Arena},
  block::{DSIZE, Header, WSIZE},
  error::{FreeError, InitError},
};

/// Largest region `init` accepts. Keeps every block size inside a header word
/// with room left for page rounding.
pub const MAX_REGION: usize = i32::MAX as usize;

/// Offset of the first block header. Skipping one word puts every payload on a
/// double-word boundary.
pub(crate) const HEAP_START: usize = WSIZE;

/// A best-fit heap over a single fixed-size mapping.
///
/// ```text
///   offset 0    4                                           len-4   len
///   ┌───────────┬──────────────────────────────────────────────┬──────┐
///   │  padding  │ block │ block │ ...                  │ block │ end  │
///   └───────────┴──────────────────────────────────────────────┴──────┘
///               ▲                                              ▲
///          HEAP_START                                       heap_end
/// ```
///
/// Blocks are addressed by their offset from the start of the mapping. The
/// handle is neither `Send` nor `Sync`.
pub struct Heap {
  arena: Option<Arena>,
}

/// Writes decided by a release, applied only once every read succeeded.
struct Coalesce {
  start: usize,
  header: Header,
  successor: Option<(usize, Header)>,
  footer: Option<usize>,
}

impl Heap {
  pub const fn new() -> Self {
    Self { arena: None }
  }

  pub fn is_initialized(&self) -> bool {
    self.arena.is_some()
  }

  /// Usable bytes: the mapping minus the alignment skip and end mark.
  pub fn capacity(&self) -> usize {
    self.arena.as_ref().map_or(0, |arena| arena.len() - DSIZE)
  }

  /// Bytes obtained from the OS.
  pub fn mapped_size(&self) -> usize {
    self.arena.as_ref().map_or(0, Arena::len)
  }

  /// The whole mapping, padding and end mark included.
  pub fn as_bytes(&self) -> &[u8] {
    self.arena.as_ref().map_or(&[][..], Arena::bytes)
  }

  pub(crate) fn arena(&self) -> Option<&Arena> {
    self.arena.as_ref()
  }

  /// Offset of the end mark, one past the last usable byte.
  pub(crate) fn heap_end(&self) -> usize {
    HEAP_START + self.capacity()
  }

  /// Maps `size` bytes, rounded up to whole pages, and lays out one free
  /// block spanning everything but the alignment skip and the end mark.
  pub fn init(
    &mut self,
    size: usize,
  ) -> Result<(), InitError> {
    self.init_with(size, Arena::map)
  }

  /// `init` with the OS mapping step supplied by the caller.
  fn init_with(
    &mut self,
    size: usize,
    map: impl FnOnce(usize) -> Result<Arena, InitError>,
  ) -> Result<(), InitError> {
    if self.arena.is_some() {
      warn!("init: heap has allocated space during a previous call");
      return Err(InitError::AlreadyInitialized);
    }

    if size == 0 {
      warn!("init: requested block size is not positive");
      return Err(InitError::ZeroSize);
    }

    if size > MAX_REGION {
      warn!("init: requested size {} exceeds {}", size, MAX_REGION);
      return Err(InitError::TooLarge { size });
    }

    let page = arena::page_size();
    let mapped = align_to!(size, page);
    let mut arena = map(mapped).inspect_err(|err| error!("init: {}", err))?;

    let usable = mapped - DSIZE;
    let heap_end = HEAP_START + usable;

    arena.write(HEAP_START, Header::new(usable, false, true));
    arena.write(heap_end - WSIZE, Header::footer(usable));
    arena.write(heap_end, Header::SENTINEL);

    info!(
      "init: requested {} bytes, mapped {} bytes at {:#x}, usable {} bytes",
      size,
      mapped,
      arena.base_addr(),
      usable
    );

    self.arena = Some(arena);
    Ok(())
  }

  /// Block size needed for a `size` byte payload: one header word plus the
  /// payload, rounded up to a double word.
  fn required_block_size(size: usize) -> Option<usize> {
    let total = size.checked_add(WSIZE)?;
    (total <= Header::MAX_SIZE).then(|| align!(total))
  }

  /// Smallest free block that holds `required` bytes. The first of several
  /// equally small candidates wins.
  fn find_best_fit(
    arena: &Arena,
    heap_end: usize,
    required: usize,
  ) -> Option<(usize, Header)> {
    let mut current = HEAP_START;
    let mut best: Option<(usize, Header)> = None;

    while current < heap_end {
      let Some(header) = arena.read(current) else {
        error!("alloc: unreadable header at offset {}", current);
        return None;
      };

      if header.is_sentinel() {
        break;
      }

      let size = header.size();
      if size == 0 || size % DSIZE != 0 || current + size > heap_end {
        error!("alloc: bad block of size {} at offset {}", size, current);
        return None;
      }

      if !header.is_allocated() && size >= required {
        trace!("alloc: candidate at offset {} of size {}", current, size);

        if size == required {
          return Some((current, header));
        }

        if best.is_none_or(|(_, best)| size < best.size()) {
          best = Some((current, header));
        }
      }

      current += size;
    }

    best
  }

  /// Allocates a block for `size` payload bytes using best fit.
  ///
  /// Returns the payload address, always double-word aligned, or null if
  /// `size` is zero, the heap is uninitialized, or no free block is large
  /// enough. A failed call leaves the heap untouched.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if size < 1 {
      warn!("alloc: rejected size {}", size);
      return ptr::null_mut();
    }

    let Some(required) = Self::required_block_size(size) else {
      warn!("alloc: size {} cannot be represented", size);
      return ptr::null_mut();
    };

    let heap_end = self.heap_end();
    let Some(arena) = self.arena.as_mut() else {
      warn!("alloc: heap is not initialized");
      return ptr::null_mut();
    };

    let Some((offset, header)) = Self::find_best_fit(arena, heap_end, required) else {
      warn!("alloc: no free block of {} bytes for a {} byte request", required, size);
      return ptr::null_mut();
    };

    let found = header.size();
    if found == required {
      arena.write(offset, header.with_allocated(true));

      let next = offset + found;
      if next < heap_end {
        if let Some(successor) = arena.read(next) {
          arena.write(next, successor.with_prev_allocated(true));
        }
      }

      debug!("alloc: exact fit of {} bytes at offset {}", found, offset);
    } else {
      let remainder = offset + required;
      let remainder_size = found - required;

      arena.write(offset, Header::new(required, true, header.is_prev_allocated()));
      arena.write(remainder, Header::new(remainder_size, false, true));
      arena.write(remainder + remainder_size - WSIZE, Header::footer(remainder_size));

      debug!(
        "alloc: split {} bytes at offset {} into {} allocated + {} free",
        found, offset, required, remainder_size
      );
    }

    arena.ptr_at(offset + WSIZE)
  }

  /// Locates the free block ending right before the header at `offset` by
  /// reading its footer, and checks that the header found there agrees.
  fn footer_lookup(
    arena: &Arena,
    offset: usize,
  ) -> Result<(usize, Header), FreeError> {
    let corrupted = |at: usize| {
      error!("free: corrupted predecessor of block at offset {}", at);
      FreeError::Corrupted { offset: at }
    };

    let footer_at = offset.checked_sub(WSIZE).filter(|at| *at >= HEAP_START);
    let footer = footer_at
      .and_then(|at| arena.read(at))
      .ok_or_else(|| corrupted(offset))?;

    let size = footer.size();
    let start = offset
      .checked_sub(size)
      .filter(|start| size != 0 && *start >= HEAP_START)
      .ok_or_else(|| corrupted(offset))?;

    let header = arena.read(start).ok_or_else(|| corrupted(offset))?;
    if header.is_allocated() || header.size() != size {
      return Err(corrupted(offset));
    }

    Ok((start, header))
  }

  /// Works out the merged block for the header at `offset`. Reads only.
  fn plan_coalesce(
    arena: &Arena,
    heap_end: usize,
    offset: usize,
    header: Header,
  ) -> Result<Coalesce, FreeError> {
    let corrupted = |at: usize| {
      error!("free: corrupted block chain at offset {}", at);
      FreeError::Corrupted { offset: at }
    };

    let mut size = header.size();
    if size == 0 || size % DSIZE != 0 || offset + size > heap_end {
      return Err(corrupted(offset));
    }

    let next = offset + size;
    let next_header = arena.read(next).ok_or_else(|| corrupted(next))?;

    if !next_header.is_allocated() {
      let next_size = next_header.size();
      if next_size == 0 || next_size % DSIZE != 0 || next + next_size > heap_end {
        return Err(corrupted(next));
      }

      trace!("free: absorbing next block of {} bytes at offset {}", next_size, next);
      size += next_size;
    }

    let mut start = offset;
    let mut prev_allocated = header.is_prev_allocated();

    if !prev_allocated {
      let (prev, prev_header) = Self::footer_lookup(arena, offset)?;

      trace!(
        "free: merging into previous block of {} bytes at offset {}",
        prev_header.size(),
        prev
      );
      size += prev_header.size();
      start = prev;
      prev_allocated = prev_header.is_prev_allocated();
    }

    let after = start + size;
    let successor = match arena.read(after) {
      Some(successor) if !successor.is_sentinel() => Some((after, successor)),
      Some(_) => None,
      None => return Err(corrupted(after)),
    };

    let footer = after - WSIZE;

    Ok(Coalesce {
      start,
      header: Header::new(size, false, prev_allocated),
      successor,
      footer: (footer < heap_end).then_some(footer),
    })
  }

  /// Releases the block whose payload starts at `ptr` and coalesces it with
  /// free neighbours on both sides.
  ///
  /// Every check runs before anything is written, so an `Err` leaves the heap
  /// exactly as it was.
  pub fn deallocate(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), FreeError> {
    let addr = ptr as usize;

    if ptr.is_null() {
      warn!("free: null pointer");
      return Err(FreeError::Null);
    }

    if addr % DSIZE != 0 {
      warn!("free: misaligned pointer {:#x}", addr);
      return Err(FreeError::Misaligned { addr });
    }

    let heap_end = self.heap_end();
    let Some(arena) = self.arena.as_mut() else {
      warn!("free: heap is not initialized");
      return Err(FreeError::Uninitialized);
    };

    let Some(payload) = arena
      .offset_of(addr)
      .filter(|offset| (HEAP_START..heap_end).contains(offset))
    else {
      warn!("free: pointer {:#x} lies outside the heap", addr);
      return Err(FreeError::OutOfRange { addr });
    };

    let offset = payload - WSIZE;
    let header = arena.read(offset).ok_or(FreeError::Corrupted { offset })?;

    if !header.is_allocated() {
      warn!("free: double free of {:#x}", addr);
      return Err(FreeError::DoubleFree { addr });
    }

    let plan = Self::plan_coalesce(arena, heap_end, offset, header)?;

    // A block absorbed into its predecessor keeps a stale header; it must
    // still read as free so a second release is caught.
    if plan.start != offset {
      arena.write(offset, header.with_allocated(false));
    }
    arena.write(plan.start, plan.header);

    if let Some((at, successor)) = plan.successor {
      arena.write(at, successor.with_prev_allocated(false));
    }

    if let Some(at) = plan.footer {
      arena.write(at, Header::footer(plan.header.size()));
    }

    debug!(
      "free: released {} bytes at offset {}, free block now {} bytes at offset {}",
      header.size(),
      offset,
      plan.header.size(),
      plan.start
    );

    Ok(())
  }
}

impl Default for Heap {
  fn default() -> Self {
    Self::new()
  }
}
