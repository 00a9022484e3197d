use log::{trace, warn};

use crate::{
  align::ALIGNMENT,
  block::{Block, HEADER_SIZE},
  error::HeapError,
  growth::Grow,
  heap::Heap,
};

impl<G: Grow> Heap<G> {
  /// Returns a block to the heap, merging it with free neighbours.
  ///
  /// Pointers the heap does not recognise are ignored and logged; see
  /// [`try_deallocate`](Heap::try_deallocate) for the reasons.
  pub fn deallocate(
    &mut self,
    ptr: *mut u8,
  ) {
    if let Err(error) = self.try_deallocate(ptr) {
      warn!("ignored deallocation of {ptr:?}: {error}");
    }
  }

  /// Like [`deallocate`](Heap::deallocate), but tells the caller why a
  /// pointer was rejected. A rejected pointer never changes the heap.
  ///
  /// - [`HeapError::InvalidPointer`]: null, outside the heap, in memory the
  ///   heap never owned, or off the quantum.
  /// - [`HeapError::Corruption`]: no intact header precedes the pointer.
  /// - [`HeapError::DoubleFree`]: the block is already free.
  pub fn try_deallocate(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), HeapError> {
    let offset = self.locate(ptr)?;

    if self.header(offset).is_free() {
      return Err(HeapError::DoubleFree(ptr as usize));
    }

    self.update(offset, |block| block.set_free(true));
    self.coalesce_next(offset);
    let survivor = self.coalesce_prev(offset);

    trace!(
      "freed {ptr:?}, block {survivor:#x} now spans {} bytes",
      self.header(survivor).size
    );

    Ok(())
  }

  /// Whether `ptr` is the payload of a block this heap created.
  pub fn validate(
    &self,
    ptr: *const u8,
  ) -> bool {
    self.locate(ptr).is_ok()
  }

  /// Maps a payload pointer back to its header offset, checking the sentinel
  /// and that the neighbours link back to it.
  fn locate(
    &self,
    ptr: *const u8,
  ) -> Result<usize, HeapError> {
    let address = ptr as usize;
    let invalid = HeapError::InvalidPointer(address);
    let corrupt = HeapError::Corruption(address);

    if !self.is_initialized() {
      return Err(invalid);
    }

    let payload = address
      .checked_sub(self.base_address())
      .filter(|offset| (HEADER_SIZE..self.boundary()).contains(offset) && offset % ALIGNMENT == 0)
      .ok_or(invalid)?;
    let offset = payload - HEADER_SIZE;

    if self.in_gap(offset..payload) {
      return Err(invalid);
    }

    let block = self.header_at(offset).filter(Block::has_magic).ok_or(corrupt)?;
    let end = payload
      .checked_add(block.size)
      .filter(|end| *end <= self.boundary())
      .ok_or(corrupt)?;

    let linked_back = match block.prev() {
      None => offset == 0,
      Some(prev) => {
        prev < offset
          && self
            .header_at(prev)
            .is_some_and(|prev| prev.has_magic() && prev.next() == Some(offset))
      }
    };
    let linked_forward = match block.next() {
      None => self.tail() == Some(offset),
      Some(next) => {
        next >= end
          && self
            .header_at(next)
            .is_some_and(|next| next.has_magic() && next.prev() == Some(offset))
      }
    };

    if !(linked_back && linked_forward) {
      return Err(corrupt);
    }

    Ok(offset)
  }
}
