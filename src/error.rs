use crate::align::ALIGNMENT;

/// Failures reported by the heap.
///
/// Addresses carried by the pointer variants are absolute, as handed to
/// [`Heap::try_deallocate`](crate::Heap::try_deallocate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
  #[error("out of memory: cannot satisfy a request of {requested} bytes")]
  OutOfMemory { requested: usize },
  #[error("pointer {0:#x} does not belong to the heap")]
  InvalidPointer(usize),
  #[error("block header behind {0:#x} failed validation")]
  Corruption(usize),
  #[error("block at {0:#x} is already free")]
  DoubleFree(usize),
  #[error("alignment {0} exceeds the supported {ALIGNMENT}-byte boundary")]
  UnsupportedAlignment(usize),
  #[error("growth quantum {0} must be a power of two large enough for one block")]
  InvalidGrowthQuantum(usize),
}
