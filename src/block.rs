use std::mem;

use static_assertions::const_assert_eq;

use crate::align::ALIGNMENT;

/// Marker written into every header this allocator creates.
pub const MAGIC: u32 = 0xdead_beef;

/// Size in bytes of the metadata prefixed to every block.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Link value meaning "no neighbour".
const NIL: usize = usize::MAX;

const FREE: u32 = 1;
const USED: u32 = 0;

// Payloads start right after a header, so the header must not break the quantum.
const_assert_eq!(HEADER_SIZE % ALIGNMENT, 0);

/// In-band block header.
///
/// Every field is a plain integer so that any bit pattern read back from the
/// heap is a valid `Block`; validation happens on the values, not the types.
/// Links are byte offsets from the heap base.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  pub size: usize,
  next: usize,
  prev: usize,
  state: u32,
  pub magic: u32,
}

impl Block {
  /// A fresh free block at the end of the list.
  pub fn new(
    size: usize,
    prev: Option<usize>,
  ) -> Self {
    Self {
      size,
      next: NIL,
      prev: prev.unwrap_or(NIL),
      state: FREE,
      magic: MAGIC,
    }
  }

  pub fn is_free(&self) -> bool {
    self.state == FREE
  }

  pub fn set_free(
    &mut self,
    free: bool,
  ) {
    self.state = if free { FREE } else { USED };
  }

  pub fn next(&self) -> Option<usize> {
    (self.next != NIL).then_some(self.next)
  }

  pub fn set_next(
    &mut self,
    next: Option<usize>,
  ) {
    self.next = next.unwrap_or(NIL);
  }

  pub fn prev(&self) -> Option<usize> {
    (self.prev != NIL).then_some(self.prev)
  }

  pub fn set_prev(
    &mut self,
    prev: Option<usize>,
  ) {
    self.prev = prev.unwrap_or(NIL);
  }

  pub fn has_magic(&self) -> bool {
    self.magic == MAGIC
  }

  /// Offset one past the payload of a block whose header sits at `offset`.
  pub fn end(
    &self,
    offset: usize,
  ) -> usize {
    offset + HEADER_SIZE + self.size
  }
}
