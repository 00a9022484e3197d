//! Sources of fresh address space for a [`Heap`](crate::Heap).

use std::ptr::{self, NonNull};

use libc::{c_void, intptr_t, sbrk};

use crate::align::ALIGNMENT;

/// Extends the region managed by a heap.
///
/// # Safety
///
/// A `Some(ptr)` returned from [`grow`](Grow::grow) must point to `bytes`
/// writable bytes, aligned to [`ALIGNMENT`], that nobody else uses for as
/// long as the implementor is alive. A grant must never start below the end
/// of an earlier one. `None` means the region cannot grow and nothing was
/// granted.
pub unsafe trait Grow {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Option<NonNull<u8>>;
}

/// Grows the process data segment with `sbrk(2)`.
///
/// Assumes a single thread moves the program break at a time. If something
/// else moves it between two grants, the heap sees a gap and keeps working.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sbrk;

unsafe impl Grow for Sbrk {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Option<NonNull<u8>> {
    let failed = usize::MAX as *mut c_void;

    unsafe {
      let current = sbrk(0);
      if current == failed {
        return None;
      }

      let pad = (current as usize).wrapping_neg() & (ALIGNMENT - 1);
      let increment = bytes
        .checked_add(pad)
        .and_then(|total| intptr_t::try_from(total).ok())?;

      let address = sbrk(increment);
      if address == failed {
        return None;
      }

      NonNull::new((address as *mut u8).add(pad))
    }
  }
}

/// A fixed-capacity region carved out of one up-front allocation.
///
/// Grants are contiguous and the arena refuses to grow past its capacity,
/// which makes heap behaviour deterministic. Every request is recorded.
#[derive(Debug)]
pub struct Arena {
  memory: NonNull<u64>,
  words: usize,
  capacity: usize,
  used: usize,
  requests: Vec<usize>,
}

impl Arena {
  pub fn with_capacity(capacity: usize) -> Self {
    let words = capacity.div_ceil(8);
    let memory: &mut [u64] = Box::leak(vec![0u64; words].into_boxed_slice());

    Self {
      memory: NonNull::from(memory).cast::<u64>(),
      words,
      capacity,
      used: 0,
      requests: Vec::new(),
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.used
  }

  /// Sizes of every growth request, granted or refused, in call order.
  pub fn requests(&self) -> &[usize] {
    &self.requests
  }
}

unsafe impl Grow for Arena {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Option<NonNull<u8>> {
    self.requests.push(bytes);

    if bytes > self.capacity - self.used {
      return None;
    }

    let start = unsafe { self.memory.cast::<u8>().add(self.used) };
    self.used += bytes;

    Some(start)
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    let memory = ptr::slice_from_raw_parts_mut(self.memory.as_ptr(), self.words);

    drop(unsafe { Box::from_raw(memory) });
  }
}
