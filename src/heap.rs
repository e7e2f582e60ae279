//! Buddy engine over a single host buffer.
//!
//! Every block starts with a [`Block`] header. Free blocks form a circular,
//! doubly linked list, sorted by address, and the anchor is the
//! lowest-addressed free block. All links are byte offsets into the buffer.
//! Each dereference checks bounds, and loads of free blocks also check the
//! tag.
//!
//! ```text
//!   128-byte arena after allocate(10):
//!
//!   0        32        64                 128
//!   ┌────────┬─────────┬──────────────────┐
//!   │ ALLOC  │  FREE   │       FREE       │
//!   │  32    │   32    │        64        │
//!   └────────┴─────────┴──────────────────┘
//!               ▲  │ ▲        │
//!     anchor ───┘  └─┼────────┘ next
//!                    └───────── prev (and wraps around)
//! ```

use std::ptr::{self, NonNull};

use crate::{
  align::is_buddy_aligned,
  block::{Block, HEADER_SIZE, MIN_BLOCK_SIZE},
  error::ArenaError,
  host::HostBuffer,
  stats::FreeBlock,
};

pub(crate) struct Heap {
  memory: HostBuffer,
  anchor: u32,
}

impl Heap {
  /// Takes ownership of `memory` and installs one free block spanning it.
  pub fn new(memory: HostBuffer) -> Result<Self, ArenaError> {
    let capacity = memory.len() as u32;
    let mut heap = Self { memory, anchor: 0 };

    heap.store(0, Block::free(capacity, 0, 0))?;

    Ok(heap)
  }

  pub fn capacity(&self) -> u32 {
    self.memory.len() as u32
  }

  pub fn anchor(&self) -> u32 {
    self.anchor
  }

  /// Carves a block for `n` payload bytes and returns its header offset.
  pub fn allocate(
    &mut self,
    n: u32,
  ) -> Result<u32, ArenaError> {
    if n == 0 {
      return Err(ArenaError::ZeroSize);
    }

    let capacity = self.capacity();
    let limit = (capacity / 2).saturating_sub(HEADER_SIZE);

    if n > limit {
      return Err(ArenaError::RequestTooLarge {
        requested: n,
        limit,
        capacity,
      });
    }

    let need = n + HEADER_SIZE;

    // A lone free block must survive the allocation, so it has to split at
    // least once.
    let head = self.free_header(self.anchor)?;
    if head.next == self.anchor && head.size / 2 < need {
      return Err(ArenaError::NoFit { requested: n });
    }

    let Some((offset, mut size)) = self.best_fit(need)? else {
      return Err(ArenaError::NoFit { requested: n });
    };

    while size / 2 >= need {
      self.split(offset)?;
      size /= 2;
    }

    self.unlink(offset)?;
    self.store(offset, Block::allocated(size))?;

    Ok(offset)
  }

  /// Returns the block at `offset` to the free list and merges buddies.
  ///
  /// Returns the size of the released block.
  pub fn release(
    &mut self,
    offset: u32,
  ) -> Result<u32, ArenaError> {
    let block = self.allocated_header(offset)?;
    let successor = self.successor_of(offset)?;
    let before = self.free_header(successor)?.prev;

    self.store(offset, Block::free(block.size, successor, before))?;
    self.set_next(before, offset)?;
    self.set_prev(successor, offset)?;

    if offset < self.anchor {
      self.anchor = offset;
    }

    self.coalesce(offset)?;

    Ok(block.size)
  }

  /// Maps a payload pointer back to the offset of its header.
  pub fn header_offset(
    &self,
    payload: NonNull<u8>,
  ) -> Result<u32, ArenaError> {
    let address = payload.as_ptr() as usize;

    if !self.memory.contains(address, HEADER_SIZE as usize) {
      return Err(ArenaError::ForeignPointer { address });
    }

    Ok((address - self.memory.as_ptr() as usize) as u32 - HEADER_SIZE)
  }

  /// Pointer to the payload of the block whose header sits at `offset`.
  pub fn payload(
    &self,
    offset: u32,
  ) -> NonNull<u8> {
    debug_assert!(offset + HEADER_SIZE < self.capacity());

    unsafe { self.memory.as_non_null().add((offset + HEADER_SIZE) as usize) }
  }

  pub fn free_blocks(&self) -> Result<Vec<FreeBlock>, ArenaError> {
    self
      .free_list()
      .map(|entry| entry.map(|(offset, block)| FreeBlock { offset, size: block.size }))
      .collect()
  }

  fn free_list(&self) -> FreeList<'_> {
    FreeList {
      heap: self,
      cursor: Some(self.anchor),
      remaining: self.capacity() / MIN_BLOCK_SIZE + 1,
    }
  }

  /// Smallest free block holding `need` bytes. Ties go to the block met
  /// first when walking from the anchor.
  fn best_fit(
    &self,
    need: u32,
  ) -> Result<Option<(u32, u32)>, ArenaError> {
    let mut best: Option<(u32, u32)> = None;

    for entry in self.free_list() {
      let (offset, block) = entry?;

      if block.size >= need && best.is_none_or(|(_, size)| block.size < size) {
        best = Some((offset, block.size));
      }
    }

    Ok(best)
  }

  /// Halves the free block at `offset`. The upper half is linked right after
  /// it.
  fn split(
    &mut self,
    offset: u32,
  ) -> Result<(), ArenaError> {
    let block = self.free_header(offset)?;
    let half = block.size / 2;
    let upper = offset + half;
    let after = block.next;

    self.free_header(after)?;
    self.store(upper, Block::free(half, after, offset))?;
    // When the list held only this block, `after == offset` and this also
    // rewrites our own `prev`.
    self.set_prev(after, upper)?;

    let mut block = self.load(offset)?;
    block.size = half;
    block.next = upper;
    self.store(offset, block)?;

    tracing::trace!(offset, upper, size = half, "split block");

    Ok(())
  }

  fn unlink(
    &mut self,
    offset: u32,
  ) -> Result<(), ArenaError> {
    let block = self.free_header(offset)?;

    debug_assert_ne!(block.next, offset, "the last free block is never handed out");

    if offset == self.anchor {
      self.anchor = block.next;
    }

    self.set_next(block.prev, block.next)?;
    self.set_prev(block.next, block.prev)
  }

  /// First free block above `offset`, or the anchor when there is none.
  fn successor_of(
    &self,
    offset: u32,
  ) -> Result<u32, ArenaError> {
    for entry in self.free_list() {
      let (at, _) = entry?;

      if at > offset {
        return Ok(at);
      }
    }

    Ok(self.anchor)
  }

  fn coalesce(
    &mut self,
    mut offset: u32,
  ) -> Result<(), ArenaError> {
    while let Some(lower) = self.mergeable_pair(offset)? {
      self.merge(lower)?;
      offset = lower;
    }

    Ok(())
  }

  /// Lower offset of a buddy pair that `offset` can merge into, checking the
  /// forward neighbour first.
  ///
  /// Neither direction may wrap around the anchor.
  fn mergeable_pair(
    &self,
    offset: u32,
  ) -> Result<Option<u32>, ArenaError> {
    let capacity = self.capacity();
    let block = self.free_header(offset)?;

    let next = self.free_header(block.next)?;
    if block.next != self.anchor
      && block.next.wrapping_sub(offset) == block.size
      && next.size == block.size
      && is_buddy_aligned(offset, block.size, capacity)
    {
      return Ok(Some(offset));
    }

    let prev = self.free_header(block.prev)?;
    if offset != self.anchor
      && offset.wrapping_sub(block.prev) == prev.size
      && prev.size == block.size
      && is_buddy_aligned(block.prev, prev.size, capacity)
    {
      return Ok(Some(block.prev));
    }

    Ok(None)
  }

  /// Folds the block after `lower` into it and wipes the absorbed header.
  fn merge(
    &mut self,
    lower: u32,
  ) -> Result<(), ArenaError> {
    let block = self.free_header(lower)?;
    let upper = block.next;
    let absorbed = self.free_header(upper)?;
    let size = block.size * 2;

    self.store(upper, Block::zeroed())?;
    self.store(lower, Block::free(size, absorbed.next, block.prev))?;
    self.set_prev(absorbed.next, lower)?;

    tracing::trace!(offset = lower, absorbed = upper, size, "merged buddies");

    Ok(())
  }

  fn set_next(
    &mut self,
    offset: u32,
    next: u32,
  ) -> Result<(), ArenaError> {
    let mut block = self.free_header(offset)?;
    block.next = next;
    self.store(offset, block)
  }

  fn set_prev(
    &mut self,
    offset: u32,
    prev: u32,
  ) -> Result<(), ArenaError> {
    let mut block = self.free_header(offset)?;
    block.prev = prev;
    self.store(offset, block)
  }

  fn free_header(
    &self,
    offset: u32,
  ) -> Result<Block, ArenaError> {
    let block = self.load(offset)?;

    if !block.is_free() {
      return Err(ArenaError::Corruption { offset, tag: block.tag });
    }

    Ok(block)
  }

  fn allocated_header(
    &self,
    offset: u32,
  ) -> Result<Block, ArenaError> {
    let block = self.load(offset)?;

    let sane = block.is_allocated()
      && block.size.is_power_of_two()
      && block.size >= MIN_BLOCK_SIZE
      && offset.is_multiple_of(block.size)
      && u64::from(offset) + u64::from(block.size) <= u64::from(self.capacity());

    if !sane {
      return Err(ArenaError::InvalidRelease { offset, tag: block.tag });
    }

    Ok(block)
  }

  fn header_at(
    &self,
    offset: u32,
  ) -> Result<*mut Block, ArenaError> {
    let capacity = self.capacity();

    match offset.checked_add(HEADER_SIZE) {
      Some(end) if end <= capacity => {
        let header = unsafe { self.memory.as_ptr().add(offset as usize) };
        Ok(header.cast())
      }
      _ => Err(ArenaError::LinkOutOfBounds { offset, capacity }),
    }
  }

  fn load(
    &self,
    offset: u32,
  ) -> Result<Block, ArenaError> {
    let header = self.header_at(offset)?;

    Ok(unsafe { ptr::read_unaligned(header) })
  }

  fn store(
    &mut self,
    offset: u32,
    block: Block,
  ) -> Result<(), ArenaError> {
    let header = self.header_at(offset)?;

    unsafe { ptr::write_unaligned(header, block) };

    Ok(())
  }
}

/// Walks the free list once, starting at the anchor.
///
/// The walk gives up with [`ArenaError::FreeListCycle`] after more steps than
/// the arena could hold blocks.
struct FreeList<'a> {
  heap: &'a Heap,
  cursor: Option<u32>,
  remaining: u32,
}

impl Iterator for FreeList<'_> {
  type Item = Result<(u32, Block), ArenaError>;

  fn next(&mut self) -> Option<Self::Item> {
    let offset = self.cursor.take()?;

    if self.remaining == 0 {
      return Some(Err(ArenaError::FreeListCycle));
    }
    self.remaining -= 1;

    let block = match self.heap.free_header(offset) {
      Ok(block) => block,
      Err(err) => return Some(Err(err)),
    };

    if block.next != self.heap.anchor {
      self.cursor = Some(block.next);
    }

    Some(Ok((offset, block)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::{ALLOCATED_TAG, FREE_TAG};

  fn heap(capacity: u32) -> Heap {
    Heap::new(HostBuffer::zeroed(capacity as usize).unwrap()).unwrap()
  }

  fn layout(heap: &Heap) -> Vec<(u32, u32)> {
    heap
      .free_blocks()
      .unwrap()
      .into_iter()
      .map(|block| (block.offset, block.size))
      .collect()
  }

  #[test]
  fn test_new_installs_single_free_block() {
    let heap = heap(128);

    assert_eq!(heap.anchor(), 0);
    assert_eq!(heap.load(0).unwrap(), Block::free(128, 0, 0));
    assert_eq!(layout(&heap), vec![(0, 128)]);
  }

  #[test]
  fn test_split_keeps_lower_half_and_links_upper() {
    let mut heap = heap(128);

    heap.split(0).unwrap();

    assert_eq!(heap.load(0).unwrap(), Block::free(64, 64, 64));
    assert_eq!(heap.load(64).unwrap(), Block::free(64, 0, 0));

    heap.split(0).unwrap();

    assert_eq!(layout(&heap), vec![(0, 32), (32, 32), (64, 64)]);
    assert_eq!(heap.load(64).unwrap().prev, 32);
  }

  #[test]
  fn test_allocate_splits_to_smallest_class() {
    let mut heap = heap(128);

    let offset = heap.allocate(10).unwrap();

    assert_eq!(offset, 0);
    assert_eq!(heap.load(0).unwrap(), Block::allocated(32));
    assert_eq!(heap.anchor(), 32);
    assert_eq!(layout(&heap), vec![(32, 32), (64, 64)]);
  }

  #[test]
  fn test_best_fit_prefers_smallest_block() {
    let mut heap = heap(256);

    // Leaves free blocks of 32 @ 32, 64 @ 64 and 128 @ 128.
    assert_eq!(heap.allocate(10).unwrap(), 0);

    // 40 + 16 bytes fits the 64-byte block exactly.
    assert_eq!(heap.allocate(40).unwrap(), 64);
    assert_eq!(layout(&heap), vec![(32, 32), (128, 128)]);

    // Another small request lands in the 32-byte remnant, not the 128.
    assert_eq!(heap.allocate(10).unwrap(), 32);
    assert_eq!(layout(&heap), vec![(128, 128)]);
  }

  #[test]
  fn test_best_fit_tie_goes_to_lowest_address() {
    let mut heap = heap(256);

    let a = heap.allocate(10).unwrap();
    let b = heap.allocate(10).unwrap();
    let c = heap.allocate(40).unwrap();
    let d = heap.allocate(10).unwrap();
    assert_eq!((a, b, c, d), (0, 32, 64, 128));

    // Two 32-byte blocks whose buddies are both still allocated.
    heap.release(a).unwrap();
    assert_eq!(layout(&heap), vec![(0, 32), (160, 32), (192, 64)]);

    assert_eq!(heap.allocate(10).unwrap(), 0);
    assert_eq!(layout(&heap), vec![(160, 32), (192, 64)]);
  }

  #[test]
  fn test_lone_block_must_split() {
    let mut heap = heap(128);

    assert_eq!(heap.allocate(48).unwrap(), 0);
    assert_eq!(layout(&heap), vec![(64, 64)]);

    assert_eq!(heap.allocate(48), Err(ArenaError::NoFit { requested: 48 }));
    assert_eq!(heap.allocate(16).unwrap(), 64);
    assert_eq!(layout(&heap), vec![(96, 32)]);

    // Nothing fits in the last block without splitting it away.
    assert_eq!(heap.allocate(1), Err(ArenaError::NoFit { requested: 1 }));
  }

  #[test]
  fn test_request_limits() {
    let mut heap = heap(128);

    assert_eq!(heap.allocate(0), Err(ArenaError::ZeroSize));
    assert_eq!(
      heap.allocate(49),
      Err(ArenaError::RequestTooLarge {
        requested: 49,
        limit: 48,
        capacity: 128,
      })
    );
    assert_eq!(layout(&heap), vec![(0, 128)]);
  }

  #[test]
  fn test_release_inserts_in_address_order() {
    let mut heap = heap(256);

    let a = heap.allocate(10).unwrap();
    let b = heap.allocate(10).unwrap();
    let c = heap.allocate(10).unwrap();
    assert_eq!((a, b, c), (0, 32, 64));
    assert_eq!(layout(&heap), vec![(96, 32), (128, 128)]);

    heap.release(b).unwrap();
    assert_eq!(layout(&heap), vec![(32, 32), (96, 32), (128, 128)]);
    assert_eq!(heap.anchor(), 32);

    heap.release(a).unwrap();
    assert_eq!(layout(&heap), vec![(0, 64), (96, 32), (128, 128)]);
    assert_eq!(heap.anchor(), 0);
  }

  #[test]
  fn test_release_cascades_to_full_arena() {
    let mut heap = heap(128);

    let offset = heap.allocate(10).unwrap();
    heap.release(offset).unwrap();

    assert_eq!(layout(&heap), vec![(0, 128)]);
    assert_eq!(heap.load(0).unwrap(), Block::free(128, 0, 0));

    // Merged-away headers are wiped.
    assert_eq!(heap.load(32).unwrap(), Block::zeroed());
    assert_eq!(heap.load(64).unwrap(), Block::zeroed());
  }

  #[test]
  fn test_misaligned_neighbours_do_not_merge() {
    let mut heap = heap(256);

    let a = heap.allocate(10).unwrap();
    let b = heap.allocate(10).unwrap();
    let c = heap.allocate(10).unwrap();
    let d = heap.allocate(10).unwrap();
    assert_eq!((a, b, c, d), (0, 32, 64, 96));

    // 32 and 64 are adjacent and equal in size, but a 64-byte block at 32
    // would straddle two buddy pairs.
    heap.release(b).unwrap();
    heap.release(c).unwrap();
    assert_eq!(layout(&heap), vec![(32, 32), (64, 32), (128, 128)]);

    heap.release(a).unwrap();
    assert_eq!(layout(&heap), vec![(0, 64), (64, 32), (128, 128)]);

    heap.release(d).unwrap();
    assert_eq!(layout(&heap), vec![(0, 256)]);
  }

  #[test]
  fn test_release_rejects_non_allocated_header() {
    let mut heap = heap(128);

    let offset = heap.allocate(10).unwrap();
    heap.release(offset).unwrap();

    assert_eq!(
      heap.release(offset),
      Err(ArenaError::InvalidRelease {
        offset,
        tag: FREE_TAG,
      })
    );
  }

  #[test]
  fn test_release_rejects_bogus_size() {
    let mut heap = heap(128);

    let offset = heap.allocate(10).unwrap();
    heap.store(offset, Block { size: 48, ..Block::allocated(32) }).unwrap();

    assert_eq!(
      heap.release(offset),
      Err(ArenaError::InvalidRelease {
        offset,
        tag: ALLOCATED_TAG,
      })
    );
  }

  #[test]
  fn test_corrupted_free_header_is_detected() {
    let mut heap = heap(128);

    heap.allocate(10).unwrap();
    heap.store(32, Block { tag: 0x1234_5678, ..Block::free(32, 64, 64) }).unwrap();

    assert_eq!(
      heap.allocate(10),
      Err(ArenaError::Corruption {
        offset: 32,
        tag: 0x1234_5678,
      })
    );
  }

  #[test]
  fn test_out_of_bounds_link_is_detected() {
    let mut heap = heap(128);

    heap.allocate(10).unwrap();
    heap.store(64, Block::free(64, 4096, 32)).unwrap();

    assert_eq!(
      heap.free_blocks(),
      Err(ArenaError::LinkOutOfBounds {
        offset: 4096,
        capacity: 128,
      })
    );
  }

  #[test]
  fn test_cycle_is_detected() {
    let mut heap = heap(128);

    heap.allocate(10).unwrap();
    // 64 points back at 32 instead of wrapping to the anchor.
    heap.store(32, Block::free(32, 64, 64)).unwrap();
    heap.store(64, Block::free(64, 32, 32)).unwrap();
    heap.anchor = 0;
    heap.store(0, Block::free(32, 32, 64)).unwrap();

    assert_eq!(heap.free_blocks(), Err(ArenaError::FreeListCycle));
  }

  #[test]
  fn test_header_offset() {
    let heap = heap(128);
    let base = heap.memory.as_non_null();

    let payload = unsafe { base.add(16) };
    assert_eq!(heap.header_offset(payload), Ok(0));
    assert_eq!(heap.payload(0), payload);

    let outside = unsafe { base.add(8) };
    assert_eq!(
      heap.header_offset(outside),
      Err(ArenaError::ForeignPointer {
        address: outside.as_ptr() as usize,
      })
    );
  }
}
