//! # tagalloc - A Boundary-Tag Best-Fit Allocator
//!
//! This crate provides a `malloc`/`free` style allocator over a single fixed
//! size region mapped once from the OS with `mmap(2)`. Free space is tracked
//! implicitly: every block carries a header, free blocks also carry a footer,
//! and the allocator walks the chain of blocks itself. No separate free list
//! is kept.
//!
//! ## Overview
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌────┬────────────┬──────────────────┬──────┬────────────────────┬─────┐
//!   │pad │  A (used)  │     B (free)     │  C   │      D (free)      │ end │
//!   └────┴────────────┴──────────────────┴──────┴────────────────────┴─────┘
//!    4 B                                                              4 B
//!
//!   Allocation scans every block and takes the smallest free one that fits
//!   (best fit), splitting off the unused tail as a new free block.
//!   Release merges the block with free neighbours on both sides.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── arena      - OS mapping and bounds-checked word access (internal)
//!   ├── block      - Header codec: size + status bits in one word
//!   ├── error      - InitError, FreeError, CheckError
//!   ├── heap       - Heap: init, allocate, deallocate
//!   └── inspect    - Block iterator, stats, dump and consistency check
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tagalloc::Heap;
//!
//! let mut heap = Heap::new();
//! heap.init(4096).expect("mmap failed");
//!
//! let ptr = heap.allocate(24) as *mut u64;
//! assert!(!ptr.is_null());
//!
//! unsafe { ptr.write(42) };
//!
//! heap.deallocate(ptr as *mut u8).expect("invalid free");
//! println!("{}", heap.dump());
//! ```
//!
//! ## How It Works
//!
//! Every block starts with a 4 byte header. The size is a multiple of 8, so
//! the two low bits are free to hold status:
//!
//! ```text
//!   Allocated Block:                     Free Block:
//!   ┌──────────────────────────┐         ┌──────────────────────────┐
//!   │ header: size | p | 1     │         │ header: size | p | 0     │
//!   ├──────────────────────────┤         ├──────────────────────────┤
//!   │                          │         │                          │
//!   │        payload           │         │        (unused)          │
//!   │                          │         │                          │
//!   │                          │         ├──────────────────────────┤
//!   │                          │         │ footer: size             │
//!   └──────────────────────────┘         └──────────────────────────┘
//!
//!   p = 1 when the block right before this one is allocated.
//! ```
//!
//! The footer lets a block being released find the header of a free block
//! before it: read the word right before its own header, step back by that
//! size. The `p` bit says whether that footer exists at all.
//!
//! The first header sits 4 bytes into the mapping so that every payload is
//! 8 byte aligned. A header word of `1` (size 0, allocated) marks the end of
//! the heap.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Heap` is neither `Send` nor `Sync`
//! - **Fixed size**: the region is never grown or shrunk
//! - **Double-word alignment**: payloads are 8 byte aligned, never more
//! - **Unix-only**: Requires `libc` for `mmap`/`munmap`
//!
//! ## Logging
//!
//! Decisions are reported through the [`log`] facade: `info` for
//! initialization, `debug` for each allocation and release, `warn` for
//! rejected requests and `error` for a corrupted chain. Install any logger to
//! see them.

pub mod align;
mod arena;
pub mod block;
mod error;
mod heap;
mod inspect;

pub use arena::page_size;
pub use block::Header;
pub use error::{CheckError, FreeError, InitError};
pub use heap::{Heap, MAX_REGION};
pub use inspect::{BlockInfo, Blocks, HeapDump, HeapStats};
