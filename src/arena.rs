use std::{process, ptr::NonNull};

use crate::{
  block::HEADER_SIZE,
  config::{ArenaConfig, FatalPolicy},
  error::ArenaError,
  heap::Heap,
  host::HostBuffer,
  size_class,
  stats::{ArenaStats, FreeBlock},
};

/// A fixed-capacity buddy suballocator over one host buffer.
///
/// The arena starts out uninitialized. [`Arena::init`] obtains the backing
/// buffer once, and [`Arena::teardown`] (or dropping the arena) returns it.
/// In between, [`Arena::allocate`] and [`Arena::release`] never touch the host
/// allocator.
pub struct Arena {
  config: ArenaConfig,
  heap: Option<Heap>,
  poisoned: bool,
}

impl Arena {
  pub fn new() -> Self {
    Self::with_config(ArenaConfig::default())
  }

  pub fn with_config(config: ArenaConfig) -> Self {
    Self {
      config,
      heap: None,
      poisoned: false,
    }
  }

  /// Acquires a zero-filled buffer of `size` bytes rounded up to a power of
  /// two, and makes it one free block.
  pub fn init(
    &mut self,
    size: u32,
  ) -> Result<(), ArenaError> {
    self.ensure_usable()?;

    let result = self.try_init(size);
    self.settle(result)
  }

  /// Hands out a block with room for `n` payload bytes.
  ///
  /// The recoverable failures are [`ArenaError::ZeroSize`],
  /// [`ArenaError::RequestTooLarge`] and [`ArenaError::NoFit`]. All of them
  /// leave the arena unchanged.
  pub fn allocate(
    &mut self,
    n: u32,
  ) -> Result<NonNull<u8>, ArenaError> {
    self.ensure_usable()?;

    let result = self.try_allocate(n);
    self.settle(result)
  }

  /// Returns a block obtained from [`Arena::allocate`].
  ///
  /// Releasing anything else (a foreign pointer, an interior pointer, or the
  /// same block twice) is a fatal error.
  pub fn release(
    &mut self,
    ptr: NonNull<u8>,
  ) -> Result<(), ArenaError> {
    self.ensure_usable()?;

    let result = self.try_release(ptr);
    self.settle(result)
  }

  /// Hands the backing buffer back to the host.
  ///
  /// Works on a poisoned arena too, and leaves it uninitialized and usable
  /// again.
  pub fn teardown(&mut self) -> Result<(), ArenaError> {
    let result = match self.heap.take() {
      Some(heap) => {
        tracing::debug!(capacity = heap.capacity(), "arena torn down");
        drop(heap);
        self.poisoned = false;
        Ok(())
      }
      None => Err(ArenaError::NotInitialized),
    };

    self.settle(result)
  }

  /// Fails with [`ArenaError::Poisoned`] once a fatal error has been seen.
  pub fn stats(&self) -> Result<ArenaStats, ArenaError> {
    self.ensure_usable()?;

    let heap = self.heap()?;
    let blocks = heap.free_blocks()?;

    Ok(ArenaStats::from_free_list(
      heap.capacity(),
      heap.anchor(),
      &blocks,
    ))
  }

  /// The free list in list order, starting at the anchor.
  pub fn free_blocks(&self) -> Result<Vec<FreeBlock>, ArenaError> {
    self.ensure_usable()?;

    self.heap()?.free_blocks()
  }

  /// Logs the current [`ArenaStats`] at `info` level.
  pub fn dump_stats(&self) {
    match self.stats() {
      Ok(stats) => tracing::info!(%stats, "arena stats"),
      Err(err) => tracing::info!(error = %err, "arena stats unavailable"),
    }
  }

  /// Arena size in bytes, or `None` before [`Arena::init`].
  pub fn capacity(&self) -> Option<u32> {
    self.heap.as_ref().map(Heap::capacity)
  }

  pub fn is_initialized(&self) -> bool {
    self.heap.is_some()
  }

  pub fn is_poisoned(&self) -> bool {
    self.poisoned
  }

  pub fn config(&self) -> &ArenaConfig {
    &self.config
  }

  fn try_init(
    &mut self,
    size: u32,
  ) -> Result<(), ArenaError> {
    if self.heap.is_some() {
      return Err(ArenaError::AlreadyInitialized);
    }

    let maximum = self.config.capacity_limit();
    if size > maximum {
      return Err(ArenaError::ArenaTooLarge {
        requested: size,
        maximum,
      });
    }

    let capacity = size_class!(size);
    if capacity < HEADER_SIZE {
      return Err(ArenaError::ArenaTooSmall {
        capacity,
        header: HEADER_SIZE,
      });
    }

    let memory = HostBuffer::zeroed(capacity as usize)?;
    self.heap = Some(Heap::new(memory)?);

    tracing::debug!(requested = size, capacity, "arena initialized");

    Ok(())
  }

  fn try_allocate(
    &mut self,
    n: u32,
  ) -> Result<NonNull<u8>, ArenaError> {
    let heap = self.heap_mut()?;
    let offset = heap.allocate(n)?;

    tracing::debug!(
      requested = n,
      offset,
      anchor = heap.anchor(),
      "allocated block"
    );

    Ok(heap.payload(offset))
  }

  fn try_release(
    &mut self,
    ptr: NonNull<u8>,
  ) -> Result<(), ArenaError> {
    let heap = self.heap_mut()?;
    let offset = heap.header_offset(ptr)?;
    let size = heap.release(offset)?;

    tracing::debug!(offset, size, anchor = heap.anchor(), "released block");

    Ok(())
  }

  fn heap(&self) -> Result<&Heap, ArenaError> {
    self.heap.as_ref().ok_or(ArenaError::NotInitialized)
  }

  fn heap_mut(&mut self) -> Result<&mut Heap, ArenaError> {
    self.heap.as_mut().ok_or(ArenaError::NotInitialized)
  }

  fn ensure_usable(&self) -> Result<(), ArenaError> {
    if self.poisoned {
      return Err(ArenaError::Poisoned);
    }

    Ok(())
  }

  /// Routes fatal errors through the configured [`FatalPolicy`].
  fn settle<T>(
    &mut self,
    result: Result<T, ArenaError>,
  ) -> Result<T, ArenaError> {
    match result {
      Err(err) if err.is_fatal() => Err(self.fail(err)),
      other => other,
    }
  }

  fn fail(
    &mut self,
    err: ArenaError,
  ) -> ArenaError {
    tracing::error!(error = %err, "arena invariant violated");

    match self.config.on_fatal {
      FatalPolicy::Abort => {
        eprintln!("suballoc: {err}");
        process::abort()
      }
      FatalPolicy::Poison => {
        self.poisoned = true;
        err
      }
    }
  }
}

impl Default for Arena {
  fn default() -> Self {
    Self::new()
  }
}
