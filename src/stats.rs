//! Read-only views of arena state for diagnostics.

use std::fmt;

/// One entry of the free list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeBlock {
  /// Byte offset of the block header from the arena base.
  pub offset: u32,
  /// Block size in bytes, header included.
  pub size: u32,
}

/// Snapshot of arena occupancy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
  /// Arena size in bytes.
  pub capacity: u32,
  /// Offset of the lowest-addressed free block.
  pub anchor: u32,
  /// Number of blocks on the free list.
  pub free_blocks: usize,
  /// Sum of free block sizes, headers included.
  pub free_bytes: u64,
  /// Size of the largest free block.
  pub largest_free: u32,
}

impl ArenaStats {
  pub(crate) fn from_free_list(
    capacity: u32,
    anchor: u32,
    blocks: &[FreeBlock],
  ) -> Self {
    Self {
      capacity,
      anchor,
      free_blocks: blocks.len(),
      free_bytes: blocks.iter().map(|block| u64::from(block.size)).sum(),
      largest_free: blocks.iter().map(|block| block.size).max().unwrap_or(0),
    }
  }

  /// Bytes currently handed out, headers included.
  pub fn allocated_bytes(&self) -> u64 {
    u64::from(self.capacity) - self.free_bytes
  }

  /// Returns `true` when the whole arena is one free block.
  pub fn is_fully_coalesced(&self) -> bool {
    self.free_blocks == 1 && self.largest_free == self.capacity
  }
}

impl fmt::Display for ArenaStats {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "capacity {} bytes, anchor at {}, {} free block(s) totalling {} bytes, largest {} bytes",
      self.capacity, self.anchor, self.free_blocks, self.free_bytes, self.largest_free
    )
  }
}
