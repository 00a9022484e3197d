use std::{alloc::Layout, ptr::NonNull};

use log::trace;

use crate::{
  align::{ALIGNMENT, payload_size},
  block::{Block, HEADER_SIZE},
  error::HeapError,
  growth::Grow,
  heap::Heap,
};

impl<G: Grow> Heap<G> {
  /// Hands out at least `size` bytes aligned to [`ALIGNMENT`].
  ///
  /// The first free block large enough wins. Oversized blocks are split and
  /// the heap grows when nothing fits. A request of zero bytes still gets one
  /// quantum.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, HeapError> {
    let out_of_memory = HeapError::OutOfMemory { requested: size };
    let rounded = payload_size(size).ok_or(out_of_memory)?;

    let offset = match self.tail() {
      None => self.grow(rounded),
      Some(_) => self.find_fit(rounded),
    }
    .map_err(|_| out_of_memory)?;

    self.update(offset, |block| block.set_free(false));

    if self.header(offset).size - rounded > HEADER_SIZE {
      self.split(offset, rounded);
    }

    let payload = self.payload(offset);
    trace!("allocated {size} bytes at {payload:?}");

    Ok(payload)
  }

  /// Same as [`allocate`](Heap::allocate), for callers holding a [`Layout`].
  pub fn allocate_layout(
    &mut self,
    layout: Layout,
  ) -> Result<NonNull<u8>, HeapError> {
    if layout.align() > ALIGNMENT {
      return Err(HeapError::UnsupportedAlignment(layout.align()));
    }

    self.allocate(layout.size())
  }

  fn find_fit(
    &mut self,
    size: usize,
  ) -> Result<usize, HeapError> {
    let mut cursor = self.head();

    while let Some(offset) = cursor {
      let block = self.header(offset);

      if block.is_free() && block.size >= size {
        return Ok(offset);
      }
      cursor = block.next();
    }

    let grown = self.grow(size)?;

    // A free tail right before the new region joins it.
    Ok(self.coalesce_prev(grown))
  }

  /// Shrinks the block at `offset` to `size` bytes and turns the rest into a
  /// free block right behind it.
  fn split(
    &mut self,
    offset: usize,
    size: usize,
  ) {
    let block = self.header(offset);
    let remainder = offset + HEADER_SIZE + size;

    let mut rest = Block::new(block.size - size - HEADER_SIZE, Some(offset));
    rest.set_next(block.next());
    self.write_header(remainder, rest);

    match block.next() {
      Some(next) => self.update(next, |b| b.set_prev(Some(remainder))),
      None => self.set_tail(remainder),
    }

    self.update(offset, |b| {
      b.size = size;
      b.set_next(Some(remainder));
    });

    trace!("split block {offset:#x} into {size} and {} bytes", rest.size);
  }
}

#[cfg(test)]
mod tests {
  use std::ptr;

  use super::*;
  use crate::{config::HeapConfig, growth::Arena};

  fn arena_heap(capacity: usize) -> Heap<Arena> {
    Heap::new(Arena::with_capacity(capacity))
  }

  fn sizes(heap: &Heap<Arena>) -> Vec<(usize, bool)> {
    heap.blocks().map(|block| (block.size, block.free)).collect()
  }

  #[test]
  fn test_first_allocations_share_one_growth() {
    let mut heap = arena_heap(4 * 4096);

    let first = heap.allocate(30).unwrap();
    let second = heap.allocate(10).unwrap();

    assert_eq!(heap.growth().requests(), &[4096]);
    assert_eq!(second.as_ptr() as usize - first.as_ptr() as usize, 32 + HEADER_SIZE);
    assert_eq!(
      sizes(&heap),
      vec![
        (32, false),
        (12, false),
        (4096 - 3 * HEADER_SIZE - 32 - 12, true)
      ]
    );
    assert_eq!(heap.verify(), Ok(()));
  }

  #[test]
  fn test_payloads_are_aligned_and_disjoint() {
    let mut heap = arena_heap(4 * 4096);

    let requests = [1, 7, 0, 13, 64, 3];
    let pointers: Vec<_> = requests.iter().map(|size| heap.allocate(*size).unwrap()).collect();

    for (i, (pointer, size)) in pointers.iter().zip(requests).enumerate() {
      assert_eq!(pointer.as_ptr() as usize % ALIGNMENT, 0);
      unsafe { ptr::write_bytes(pointer.as_ptr(), i as u8 + 1, size.max(ALIGNMENT)) };
    }

    for (i, (pointer, size)) in pointers.iter().zip(requests).enumerate() {
      for byte in 0..size.max(ALIGNMENT) {
        assert_eq!(unsafe { *pointer.as_ptr().add(byte) }, i as u8 + 1);
      }
    }

    assert_eq!(heap.verify(), Ok(()));
  }

  #[test]
  fn test_zero_size_gets_a_quantum() {
    let mut heap = arena_heap(4096);

    heap.allocate(0).unwrap();

    assert_eq!(heap.blocks().next().map(|block| block.size), Some(ALIGNMENT));
  }

  #[test]
  fn test_exact_fit_is_not_split() {
    let mut heap = arena_heap(4096);

    let remainder = 4096 - HEADER_SIZE;
    heap.allocate(remainder).unwrap();

    assert_eq!(sizes(&heap), vec![(remainder, false)]);
  }

  #[test]
  fn test_small_leftover_is_not_split() {
    let mut heap = arena_heap(4096);

    // Leaves exactly one header's worth, too little for another block.
    heap.allocate(4096 - 2 * HEADER_SIZE).unwrap();

    assert_eq!(sizes(&heap), vec![(4096 - HEADER_SIZE, false)]);
  }

  #[test]
  fn test_growth_when_nothing_fits() {
    let mut heap = arena_heap(4 * 4096);

    heap.allocate(4000).unwrap();
    heap.allocate(4000).unwrap();
    heap.allocate(5000).unwrap();

    assert_eq!(heap.growth().requests(), &[4096, 4096, 8192]);
    assert!(heap.growth().requests().iter().all(|bytes| *bytes > 0 && bytes % 4096 == 0));
    assert_eq!(heap.verify(), Ok(()));
  }

  #[test]
  fn test_growth_extends_free_tail() {
    let mut heap = arena_heap(4 * 4096);

    let first = heap.allocate(16).unwrap();
    let tail = heap.blocks().last().unwrap();
    assert!(tail.free);

    // Too big for the free tail: the fresh region is merged into it.
    let big = heap.allocate(6000).unwrap();

    assert_eq!(big, tail.payload);
    assert_eq!(heap.growth().requests(), &[4096, 8192]);
    assert_eq!(heap.blocks().next().map(|block| block.payload), Some(first));
    assert_eq!(heap.verify(), Ok(()));
  }

  #[test]
  fn test_out_of_memory() {
    let mut heap = arena_heap(4096);

    let first = heap.allocate(100).unwrap();
    let before = sizes(&heap);

    assert_eq!(
      heap.allocate(8000),
      Err(HeapError::OutOfMemory { requested: 8000 })
    );
    assert_eq!(sizes(&heap), before);
    assert_eq!(heap.verify(), Ok(()));

    // The remainder is still usable after a refused growth.
    let second = heap.allocate(100).unwrap();
    assert!(second > first);
  }

  #[test]
  fn test_out_of_memory_on_empty_heap() {
    let mut heap = arena_heap(0);

    assert_eq!(heap.allocate(1), Err(HeapError::OutOfMemory { requested: 1 }));
    assert!(!heap.is_initialized());
  }

  #[test]
  fn test_huge_request_overflows_to_out_of_memory() {
    let mut heap = arena_heap(4096);

    assert_eq!(
      heap.allocate(usize::MAX),
      Err(HeapError::OutOfMemory {
        requested: usize::MAX
      })
    );
  }

  #[test]
  fn test_custom_growth_quantum() {
    let config = HeapConfig::default().with_growth_quantum(256).unwrap();
    let mut heap = Heap::with_config(Arena::with_capacity(4096), config);
    assert_eq!(heap.config().growth_quantum(), 256);

    heap.allocate(10).unwrap();
    heap.allocate(300).unwrap();

    assert_eq!(heap.growth().requests(), &[256, 512]);
  }

  #[test]
  fn test_allocate_layout() {
    let mut heap = arena_heap(4096);

    let value = heap.allocate_layout(Layout::new::<u32>()).unwrap().cast::<u32>();
    unsafe {
      value.write(0xDEADBEEF);
      assert_eq!(value.read(), 0xDEADBEEF);
    }

    assert_eq!(
      heap.allocate_layout(Layout::from_size_align(8, 16).unwrap()),
      Err(HeapError::UnsupportedAlignment(16))
    );
  }
}
