use std::{ops::Range, ptr::NonNull};

use log::{debug, trace, warn};

use crate::{
  align::ALIGNMENT,
  align_to,
  block::{Block, HEADER_SIZE},
  config::HeapConfig,
  error::HeapError,
  growth::{Grow, Sbrk},
};

/// A first-fit heap over memory obtained from a [`Grow`] implementation.
///
/// Blocks form one address-ordered, doubly linked list. The first block
/// always sits at offset zero of the first grant; every link is a byte
/// offset from there.
pub struct Heap<G: Grow = Sbrk> {
  growth: G,
  config: HeapConfig,
  base: NonNull<u8>,
  boundary: usize,
  tail: Option<usize>,
  /// Address ranges inside the boundary that were never granted to us.
  gaps: Vec<Range<usize>>,
}

/// A snapshot of one block, as seen by [`Heap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Header offset from the heap base.
  pub offset: usize,
  pub payload: NonNull<u8>,
  pub size: usize,
  pub free: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  pub blocks: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub used_bytes: usize,
  /// Bytes from the base to the current boundary, headers and gaps included.
  pub heap_bytes: usize,
}

impl Default for Heap<Sbrk> {
  fn default() -> Self {
    Self::new(Sbrk)
  }
}

impl<G: Grow> Heap<G> {
  pub fn new(growth: G) -> Self {
    Self::with_config(growth, HeapConfig::default())
  }

  pub fn with_config(
    growth: G,
    config: HeapConfig,
  ) -> Self {
    Self {
      growth,
      config,
      base: NonNull::dangling(),
      boundary: 0,
      tail: None,
      gaps: Vec::new(),
    }
  }

  pub fn growth(&self) -> &G {
    &self.growth
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn is_initialized(&self) -> bool {
    self.tail.is_some()
  }

  pub(crate) fn head(&self) -> Option<usize> {
    self.tail.map(|_| 0)
  }

  pub(crate) fn tail(&self) -> Option<usize> {
    self.tail
  }

  pub(crate) fn set_tail(
    &mut self,
    offset: usize,
  ) {
    self.tail = Some(offset);
  }

  pub(crate) fn base_address(&self) -> usize {
    self.base.as_ptr() as usize
  }

  pub(crate) fn boundary(&self) -> usize {
    self.boundary
  }

  /// Appends a free block able to hold `payload` bytes, growing the region by
  /// a whole number of growth quanta. Returns the new block's offset.
  pub(crate) fn grow(
    &mut self,
    payload: usize,
  ) -> Result<usize, HeapError> {
    let out_of_memory = HeapError::OutOfMemory { requested: payload };
    let quantum = self.config.growth_quantum();

    let bytes = payload
      .checked_add(HEADER_SIZE)
      .and_then(|total| align_to!(total, quantum))
      .ok_or(out_of_memory)?;

    let region = self.growth.grow(bytes).ok_or(out_of_memory)?;

    let offset = if self.tail.is_none() {
      self.base = region;
      0
    } else {
      let offset = (region.as_ptr() as usize)
        .checked_sub(self.base_address())
        .filter(|offset| *offset >= self.boundary)
        .ok_or(out_of_memory)?;

      if offset != self.boundary {
        warn!(
          "heap grew non-contiguously, leaving a {} byte gap at offset {:#x}",
          offset - self.boundary,
          self.boundary
        );
        self.gaps.push(self.boundary..offset);
      }

      offset
    };

    self.boundary = offset + bytes;
    self.write_header(offset, Block::new(bytes - HEADER_SIZE, self.tail));

    if let Some(tail) = self.tail {
      self.update(tail, |block| block.set_next(Some(offset)));
    }
    self.tail = Some(offset);

    debug!("extended heap by {bytes} bytes, new block at offset {offset:#x}");

    Ok(offset)
  }

  /// Reads the header at `offset`, or `None` if it would cross the boundary
  /// or touch a gap.
  pub(crate) fn header_at(
    &self,
    offset: usize,
  ) -> Option<Block> {
    self.tail?;

    let end = offset.checked_add(HEADER_SIZE)?;
    if end > self.boundary || self.in_gap(offset..end) {
      return None;
    }

    Some(unsafe { self.base.as_ptr().add(offset).cast::<Block>().read_unaligned() })
  }

  /// Whether any byte of `range` lies in memory someone else owns.
  pub(crate) fn in_gap(
    &self,
    range: Range<usize>,
  ) -> bool {
    self
      .gaps
      .iter()
      .any(|gap| gap.start < range.end && range.start < gap.end)
  }

  /// Reads a header known to be on the list.
  pub(crate) fn header(
    &self,
    offset: usize,
  ) -> Block {
    debug_assert!(self.tail.is_some() && offset + HEADER_SIZE <= self.boundary);

    unsafe { self.base.as_ptr().add(offset).cast::<Block>().read_unaligned() }
  }

  pub(crate) fn write_header(
    &mut self,
    offset: usize,
    block: Block,
  ) {
    debug_assert!(offset + HEADER_SIZE <= self.boundary);
    debug_assert_eq!(offset % ALIGNMENT, 0);

    unsafe { self.base.as_ptr().add(offset).cast::<Block>().write_unaligned(block) }
  }

  pub(crate) fn update(
    &mut self,
    offset: usize,
    f: impl FnOnce(&mut Block),
  ) {
    let mut block = self.header(offset);
    f(&mut block);
    self.write_header(offset, block);
  }

  /// Address handed to the caller for the block at `offset`.
  pub(crate) fn payload(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    unsafe { self.base.add(offset + HEADER_SIZE) }
  }

  fn is_adjacent(
    &self,
    front: usize,
    back: usize,
  ) -> bool {
    self.header(front).end(front) == back
  }

  /// Folds `back` into `front`. Both must be free and address-adjacent.
  fn merge(
    &mut self,
    front: usize,
    back: usize,
  ) -> usize {
    let absorbed = self.header(back);

    self.update(front, |block| {
      block.size += HEADER_SIZE + absorbed.size;
      block.set_next(absorbed.next());
    });

    match absorbed.next() {
      Some(next) => self.update(next, |block| block.set_prev(Some(front))),
      None => self.tail = Some(front),
    }

    // Stale pointers to the absorbed block must no longer validate.
    self.update(back, |block| block.magic = 0);

    trace!("merged block {back:#x} into {front:#x}");

    front
  }

  /// Merges the free block at `offset` with a free successor, if any.
  pub(crate) fn coalesce_next(
    &mut self,
    offset: usize,
  ) {
    if let Some(next) = self.header(offset).next() {
      if self.header(next).is_free() && self.is_adjacent(offset, next) {
        self.merge(offset, next);
      }
    }
  }

  /// Merges the free block at `offset` into a free predecessor, if any, and
  /// returns the offset of the surviving block.
  pub(crate) fn coalesce_prev(
    &mut self,
    offset: usize,
  ) -> usize {
    match self.header(offset).prev() {
      Some(prev) if self.header(prev).is_free() && self.is_adjacent(prev, offset) => {
        self.merge(prev, offset)
      }
      _ => offset,
    }
  }

  /// Walks the block list in address order.
  pub fn blocks(&self) -> Blocks<'_, G> {
    Blocks {
      heap: self,
      cursor: self.head(),
    }
  }

  pub fn stats(&self) -> HeapStats {
    self.blocks().fold(
      HeapStats {
        heap_bytes: self.boundary,
        ..HeapStats::default()
      },
      |mut stats, block| {
        stats.blocks += 1;
        if block.free {
          stats.free_blocks += 1;
          stats.free_bytes += block.size;
        } else {
          stats.used_bytes += block.size;
        }
        stats
      },
    )
  }

  /// Checks every list invariant, reporting the first offending block.
  pub fn verify(&self) -> Result<(), HeapError> {
    let mut cursor = self.head();
    let mut previous: Option<(usize, Block)> = None;

    while let Some(offset) = cursor {
      let corrupt = HeapError::Corruption(self.base_address() + offset + HEADER_SIZE);
      let block = self.header_at(offset).ok_or(corrupt)?;

      if !block.has_magic() || block.size < ALIGNMENT || block.size % ALIGNMENT != 0 {
        return Err(corrupt);
      }
      if block.end(offset) > self.boundary {
        return Err(corrupt);
      }
      if block.prev() != previous.map(|(offset, _)| offset) {
        return Err(corrupt);
      }
      if let Some((prev_offset, prev)) = previous {
        let touching = prev.end(prev_offset) == offset;
        if prev.end(prev_offset) > offset || (touching && prev.is_free() && block.is_free()) {
          return Err(corrupt);
        }
      }

      previous = Some((offset, block));
      cursor = block.next();
    }

    if previous.map(|(offset, _)| offset) != self.tail {
      return Err(HeapError::Corruption(self.base_address()));
    }

    Ok(())
  }
}

pub struct Blocks<'a, G: Grow> {
  heap: &'a Heap<G>,
  cursor: Option<usize>,
}

impl<G: Grow> Iterator for Blocks<'_, G> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let offset = self.cursor?;
    let block = self.heap.header_at(offset)?;

    // Links only ever point forward; anything else is a damaged list.
    self.cursor = block.next().filter(|next| *next > offset);

    Some(BlockInfo {
      offset,
      payload: self.heap.payload(offset),
      size: block.size,
      free: block.is_free(),
    })
  }
}
