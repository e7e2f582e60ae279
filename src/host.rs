use std::ptr::NonNull;

use crate::error::ArenaError;

/// Zero-filled backing memory obtained from the host with `calloc(3)`.
///
/// The region is handed back with `free(3)` when the buffer is dropped.
pub struct HostBuffer {
  ptr: NonNull<u8>,
  len: usize,
}

impl HostBuffer {
  pub fn zeroed(len: usize) -> Result<Self, ArenaError> {
    let raw = unsafe { libc::calloc(len, 1) } as *mut u8;

    match NonNull::new(raw) {
      Some(ptr) => Ok(Self { ptr, len }),
      None => Err(ArenaError::HostExhausted { bytes: len }),
    }
  }

  pub fn as_ptr(&self) -> *mut u8 {
    self.ptr.as_ptr()
  }

  pub fn as_non_null(&self) -> NonNull<u8> {
    self.ptr
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// Returns whether `addr` falls inside `[base + from, base + len)`.
  pub fn contains(
    &self,
    addr: usize,
    from: usize,
  ) -> bool {
    let base = self.ptr.as_ptr() as usize;

    addr >= base + from && addr < base + self.len
  }
}

impl Drop for HostBuffer {
  fn drop(&mut self) {
    unsafe { libc::free(self.ptr.as_ptr().cast()) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_zeroed() {
    let buffer = HostBuffer::zeroed(256).unwrap();

    assert_eq!(buffer.len(), 256);

    let bytes = unsafe { std::slice::from_raw_parts(buffer.as_ptr(), buffer.len()) };
    assert!(bytes.iter().all(|&byte| byte == 0));
  }

  #[test]
  fn test_contains() {
    let buffer = HostBuffer::zeroed(64).unwrap();
    let base = buffer.as_ptr() as usize;

    assert!(buffer.contains(base, 0));
    assert!(buffer.contains(base + 63, 0));
    assert!(!buffer.contains(base + 64, 0));
    assert!(!buffer.contains(base + 15, 16));
    assert!(buffer.contains(base + 16, 16));
  }
}
