/// Rounds a `u32` up to the smallest power of two that is not below it.
///
/// Powers of two are returned unchanged, and `0` rounds to `1`. The caller
/// must keep the input at or below `1 << 31`.
///
/// # Examples
///
/// ```rust
/// use suballoc::size_class;
///
/// assert_eq!(size_class!(100u32), 128);
/// assert_eq!(size_class!(64u32), 64);
/// assert_eq!(size_class!(0u32), 1);
/// ```
#[macro_export]
macro_rules! size_class {
  ($value:expr) => {
    u32::next_power_of_two($value)
  };
}

/// Checks whether a block at `offset` of `size` bytes may merge with its upper
/// buddy.
///
/// Stepping from `offset` in strides of the merged size (`2 * size`) has to
/// land exactly on `capacity`. If it does not, the merged block would sit at
/// a position no larger block can ever start from.
pub fn is_buddy_aligned(
  offset: u32,
  size: u32,
  capacity: u32,
) -> bool {
  let merged = u64::from(size) * 2;
  let offset = u64::from(offset);
  let capacity = u64::from(capacity);

  offset < capacity && (capacity - offset) % merged == 0
}
