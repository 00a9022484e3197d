//! # ffalloc - A First-Fit Heap Allocator
//!
//! This crate provides a **first-fit, coalescing heap** that manages one
//! growable region of address space, by default the process data segment
//! grown with `sbrk`.
//!
//! ## Overview
//!
//! Every block carries an in-band header. Headers form a single
//! address-ordered, doubly linked list:
//!
//! ```text
//!   Heap Layout:
//!
//!   base                                                          boundary
//!   ▼                                                                  ▼
//!   ┌────────┬─────────┬────────┬─────────┬────────┬───────────────────┐
//!   │ Header │ Payload │ Header │ Payload │ Header │      Payload      │
//!   │ used   │  (32)   │ free   │  (16)   │ used   │       (...)       │
//!   └────────┴─────────┴────────┴─────────┴────────┴───────────────────┘
//!        └──── next ────►   └──── next ────►
//!        ◄──── prev ─────┘  ◄──── prev ─────┘
//! ```
//!
//! - **Allocation** scans from the first block and takes the first free block
//!   that is large enough, splitting off whatever is left over.
//! - **Growth** happens only when nothing fits; requests to the operating
//!   system are rounded up to a 4096-byte quantum.
//! - **Deallocation** validates the header sentinel, marks the block free and
//!   merges it with free neighbours, so no two adjacent blocks are ever free.
//!
//! ## Crate Structure
//!
//! ```text
//!   ffalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Block header layout (internal)
//!   ├── config     - HeapConfig
//!   ├── error      - HeapError
//!   ├── growth     - Grow trait, Sbrk and Arena
//!   ├── heap       - Heap state, growth, introspection
//!   ├── allocate   - First-fit search and splitting (internal)
//!   └── deallocate - Validation and coalescing (internal)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use ffalloc::{Arena, Heap};
//!
//! let mut heap = Heap::new(Arena::with_capacity(64 * 1024));
//!
//! let ptr = heap.allocate(30).unwrap();
//! unsafe { ptr.as_ptr().write_bytes(0xAB, 30) };
//!
//! heap.deallocate(ptr.as_ptr());
//! assert_eq!(heap.allocate(30).unwrap(), ptr);
//! ```
//!
//! `Heap::default()` grows the real program break instead.
//!
//! ## Splitting
//!
//! ```text
//!   Before allocate(30) on a fresh 4096-byte block:
//!   ┌────────┬──────────────────────────────────────────────────────┐
//!   │ Header │                   free (4096 - H)                    │
//!   └────────┴──────────────────────────────────────────────────────┘
//!
//!   After:
//!   ┌────────┬────────────┬────────┬──────────────────────────────────┐
//!   │ Header │ used (32)  │ Header │       free (4096 - 2H - 32)      │
//!   └────────┴────────────┴────────┴──────────────────────────────────┘
//!             ▲
//!             └── Pointer returned to user
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Heap` takes `&mut self`; share it behind a lock
//! - **4-byte alignment**: larger alignments are refused
//! - **Never shrinks**: memory is not returned to the operating system
//!
//! ## Errors
//!
//! [`Heap::allocate`] fails only with [`HeapError::OutOfMemory`].
//! [`Heap::deallocate`] never fails: unknown, misaligned, corrupted or
//! already-freed pointers are logged and ignored. [`Heap::try_deallocate`]
//! reports the reason instead.

pub mod align;
mod allocate;
mod block;
mod config;
mod deallocate;
mod error;
mod growth;
mod heap;

pub use block::HEADER_SIZE;
pub use config::{DEFAULT_GROWTH_QUANTUM, HeapConfig};
pub use error::HeapError;
pub use growth::{Arena, Grow, Sbrk};
pub use heap::{BlockInfo, Blocks, Heap, HeapStats};
