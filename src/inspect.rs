//! Read-only views of the block chain.

use std::fmt;

use crate::{
  arena::Arena,
  block::{DSIZE, Header, WSIZE},
  error::CheckError,
  heap::{HEAP_START, Heap},
};

/// One block as decoded from its header (and footer, when free).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Offset of the header from the start of the mapping.
  pub offset: usize,
  /// Address of the header.
  pub addr: usize,
  pub size: usize,
  pub allocated: bool,
  pub prev_allocated: bool,
  /// Size recorded in the footer of a free block.
  pub footer: Option<usize>,
}

impl BlockInfo {
  /// Address of the first payload byte.
  pub fn payload(&self) -> usize {
    self.addr + WSIZE
  }

  /// Address of the last byte of the block.
  pub fn end(&self) -> usize {
    self.addr + self.size - 1
  }
}

/// Iterator over the blocks of a [`Heap`] in address order.
///
/// Stops at the end mark, or early at the first header that cannot describe a
/// block inside the heap. [`Heap::check`] reports the latter.
pub struct Blocks<'h> {
  arena: Option<&'h Arena>,
  current: usize,
  heap_end: usize,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let arena = self.arena?;
    let header = arena.read(self.current).filter(|header| !header.is_sentinel());

    let block = header.and_then(|header| {
      let size = header.size();
      let end = self.current + size;

      if size == 0 || end > self.heap_end {
        return None;
      }

      let footer = (!header.is_allocated())
        .then(|| arena.read(end - WSIZE))
        .flatten()
        .map(Header::size);

      Some(BlockInfo {
        offset: self.current,
        addr: arena.base_addr() + self.current,
        size,
        allocated: header.is_allocated(),
        prev_allocated: header.is_prev_allocated(),
        footer,
      })
    });

    match block {
      Some(block) => {
        self.current += block.size;
        Some(block)
      }
      None => {
        self.arena = None;
        None
      }
    }
  }
}

/// Byte totals over all blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub blocks: usize,
  pub used: usize,
  pub free: usize,
}

impl HeapStats {
  pub fn total(&self) -> usize {
    self.used + self.free
  }

  fn record(
    &mut self,
    block: &BlockInfo,
  ) {
    self.blocks += 1;
    if block.allocated {
      self.used += block.size;
    } else {
      self.free += block.size;
    }
  }
}

/// Printable block table, see [`Heap::dump`].
pub struct HeapDump<'h> {
  heap: &'h Heap,
}

fn status(allocated: bool) -> &'static str {
  if allocated { "alloc" } else { "FREE " }
}

impl fmt::Display for HeapDump<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let rule = "-".repeat(80);
    let stars = "*".repeat(80);

    writeln!(f, "{:*^80}", " HEAP: Block List ")?;
    writeln!(f, "No.\tStatus\tPrev\tt_Begin\t\tt_End\t\tt_Size")?;
    writeln!(f, "{}", rule)?;

    let mut stats = HeapStats::default();
    for (index, block) in self.heap.blocks().enumerate() {
      stats.record(&block);

      writeln!(
        f,
        "{}\t{}\t{}\t{:#010x}\t{:#010x}\t{:4}",
        index + 1,
        status(block.allocated),
        status(block.prev_allocated),
        block.addr,
        block.end(),
        block.size
      )?;
    }

    writeln!(f, "{}", rule)?;
    writeln!(f, "{}", stars)?;
    writeln!(f, "Total used size = {:4}", stats.used)?;
    writeln!(f, "Total free size = {:4}", stats.free)?;
    writeln!(f, "Total size      = {:4}", stats.total())?;
    writeln!(f, "{}", stars)
  }
}

impl Heap {
  /// Walks the block chain from the first block to the end mark.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      arena: self.arena(),
      current: HEAP_START,
      heap_end: self.heap_end(),
    }
  }

  pub fn stats(&self) -> HeapStats {
    self.blocks().fold(HeapStats::default(), |mut stats, block| {
      stats.record(&block);
      stats
    })
  }

  /// Table of every block with its status, bounds and size, followed by
  /// used/free totals.
  pub fn dump(&self) -> HeapDump<'_> {
    HeapDump { heap: self }
  }

  /// Verifies the block chain: sizes are positive double-word multiples, the
  /// walk ends exactly on the end mark, every previous-allocated bit matches
  /// its predecessor, no two free blocks touch, and free footers match their
  /// headers.
  pub fn check(&self) -> Result<HeapStats, CheckError> {
    let arena = self.arena().ok_or(CheckError::Uninitialized)?;
    let heap_end = self.heap_end();

    let mut stats = HeapStats::default();
    let mut offset = HEAP_START;
    let mut prev_allocated = true;

    while offset < heap_end {
      let header = arena
        .read(offset)
        .ok_or(CheckError::Overrun { offset, size: 0 })?;
      let size = header.size();

      if header.is_sentinel() || size == 0 || size % DSIZE != 0 {
        return Err(CheckError::BadSize { offset, size });
      }

      if offset + size > heap_end {
        return Err(CheckError::Overrun { offset, size });
      }

      if header.is_prev_allocated() != prev_allocated {
        return Err(CheckError::PrevBitMismatch { offset });
      }

      if !header.is_allocated() {
        if !prev_allocated {
          return Err(CheckError::AdjacentFree { offset });
        }

        let footer = arena.read(offset + size - WSIZE).map_or(0, Header::size);
        if footer != size {
          return Err(CheckError::FooterMismatch {
            offset,
            header: size,
            footer,
          });
        }
      }

      stats.blocks += 1;
      if header.is_allocated() {
        stats.used += size;
      } else {
        stats.free += size;
      }

      prev_allocated = header.is_allocated();
      offset += size;
    }

    if arena.read(offset) != Some(Header::SENTINEL) {
      return Err(CheckError::MissingSentinel { offset });
    }

    Ok(stats)
  }
}
