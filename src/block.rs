use std::mem;

/// Tag carried by a block that sits on the free list.
pub const FREE_TAG: u32 = 0xDEAD_BEEF;

/// Tag carried by a block that has been handed out.
pub const ALLOCATED_TAG: u32 = 0xBEEF_DEAD;

/// Link value parked in `next` / `prev` while a block is allocated.
pub const DETACHED: u32 = u32::MAX;

/// Bytes taken by a [`Block`] header in front of every payload.
pub const HEADER_SIZE: u32 = mem::size_of::<Block>() as u32;

/// Smallest block the allocator can produce: one header plus one byte,
/// rounded up to a power of two.
pub const MIN_BLOCK_SIZE: u32 = (HEADER_SIZE + 1).next_power_of_two();

/// Header stored at the lowest address of every block.
///
/// Links are byte offsets from the arena base, not pointers.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
  pub tag: u32,
  pub size: u32,
  pub next: u32,
  pub prev: u32,
}

impl Block {
  pub fn free(
    size: u32,
    next: u32,
    prev: u32,
  ) -> Self {
    Self {
      tag: FREE_TAG,
      size,
      next,
      prev,
    }
  }

  pub fn allocated(size: u32) -> Self {
    Self {
      tag: ALLOCATED_TAG,
      size,
      next: DETACHED,
      prev: DETACHED,
    }
  }

  /// Header left behind at the upper half of a merged pair.
  pub fn zeroed() -> Self {
    Self {
      tag: 0,
      size: 0,
      next: 0,
      prev: 0,
    }
  }

  pub fn is_free(&self) -> bool {
    self.tag == FREE_TAG
  }

  pub fn is_allocated(&self) -> bool {
    self.tag == ALLOCATED_TAG
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_header_layout() {
    assert_eq!(HEADER_SIZE, 16);
    assert_eq!(MIN_BLOCK_SIZE, 32);
    assert_eq!(mem::align_of::<Block>(), 4);
  }

  #[test]
  fn test_tags() {
    assert!(Block::free(64, 0, 0).is_free());
    assert!(Block::allocated(64).is_allocated());

    let zeroed = Block::zeroed();
    assert!(!zeroed.is_free());
    assert!(!zeroed.is_allocated());
  }
}
