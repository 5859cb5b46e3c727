use std::io;

/// Failure to set up a [`Heap`](crate::Heap).
#[derive(Debug, thiserror::Error)]
pub enum InitError {
  #[error("heap has allocated space during a previous call")]
  AlreadyInitialized,
  #[error("requested region size is not positive")]
  ZeroSize,
  #[error("requested region size {size} exceeds the largest supported region")]
  TooLarge { size: usize },
  #[error("mmap cannot allocate {size} bytes")]
  MapFailed {
    size: usize,
    #[source]
    source: io::Error,
  },
}

/// Rejected release. The heap is left untouched whenever one is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FreeError {
  #[error("null pointer")]
  Null,
  #[error("pointer {addr:#x} is not double-word aligned")]
  Misaligned { addr: usize },
  #[error("heap is not initialized")]
  Uninitialized,
  #[error("pointer {addr:#x} lies outside the heap")]
  OutOfRange { addr: usize },
  #[error("block at {addr:#x} is already free")]
  DoubleFree { addr: usize },
  #[error("corrupted block chain at offset {offset}")]
  Corrupted { offset: usize },
}

/// First invariant violation found by [`Heap::check`](crate::Heap::check).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
  #[error("heap is not initialized")]
  Uninitialized,
  #[error("block at offset {offset} has invalid size {size}")]
  BadSize { offset: usize, size: usize },
  #[error("block at offset {offset} of size {size} runs past the end of the heap")]
  Overrun { offset: usize, size: usize },
  #[error("block at offset {offset} disagrees with its predecessor's status")]
  PrevBitMismatch { offset: usize },
  #[error("free block at offset {offset} follows another free block")]
  AdjacentFree { offset: usize },
  #[error("free block at offset {offset} has header size {header} but footer size {footer}")]
  FooterMismatch {
    offset: usize,
    header: usize,
    footer: usize,
  },
  #[error("no end mark at offset {offset}")]
  MissingSentinel { offset: usize },
}
