//! Error types for the suballocator.

/// Errors reported by [`Arena`](crate::Arena) operations.
///
/// Variants split into two classes, and [`ArenaError::is_fatal`] says which
/// class a value belongs to. Recoverable errors leave the arena untouched.
/// Fatal errors mean the free list can no longer be trusted. Those are handled
/// by the arena's [`FatalPolicy`](crate::FatalPolicy).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
  /// Zero-byte allocations are never served.
  #[error("cannot allocate zero bytes")]
  ZeroSize,

  /// The request plus its header exceeds half the arena.
  #[error("request of {requested} bytes exceeds the {limit}-byte limit of a {capacity}-byte arena")]
  RequestTooLarge {
    requested: u32,
    limit: u32,
    capacity: u32,
  },

  /// No free block can be split down to hold the request.
  #[error("no free block can hold {requested} bytes")]
  NoFit { requested: u32 },

  /// The requested arena size is above the configured maximum.
  #[error("arena size {requested} exceeds the maximum of {maximum} bytes")]
  ArenaTooLarge { requested: u32, maximum: u32 },

  /// The rounded arena capacity cannot hold a single block header.
  #[error("arena capacity {capacity} cannot hold a {header}-byte block header")]
  ArenaTooSmall { capacity: u32, header: u32 },

  /// The host refused to provide backing memory.
  #[error("host could not provide {bytes} bytes of backing memory")]
  HostExhausted { bytes: usize },

  #[error("arena is already initialized")]
  AlreadyInitialized,

  #[error("arena is not initialized")]
  NotInitialized,

  /// A free-list header carried something other than the free tag.
  #[error("heap corruption at offset {offset}: tag {tag:#010x}")]
  Corruption { offset: u32, tag: u32 },

  /// A free-list link points outside the arena.
  #[error("free-list link {offset} is outside the {capacity}-byte arena")]
  LinkOutOfBounds { offset: u32, capacity: u32 },

  /// Walking the free list never returned to the anchor.
  #[error("free list does not return to its anchor")]
  FreeListCycle,

  /// A released pointer does not belong to the arena's payload range.
  #[error("pointer {address:#x} does not belong to this arena")]
  ForeignPointer { address: usize },

  /// A released pointer does not head an allocated block.
  #[error("attempt to release non-allocated memory at offset {offset} (tag {tag:#010x})")]
  InvalidRelease { offset: u32, tag: u32 },

  /// An earlier fatal error left the arena unusable.
  #[error("arena is poisoned by an earlier fatal error")]
  Poisoned,
}

impl ArenaError {
  /// Returns `true` for invariant violations and misuse, which the arena
  /// cannot recover from.
  pub fn is_fatal(&self) -> bool {
    !matches!(
      self,
      Self::ZeroSize
        | Self::RequestTooLarge { .. }
        | Self::NoFit { .. }
        | Self::ArenaTooLarge { .. }
        | Self::ArenaTooSmall { .. }
    )
  }
}
