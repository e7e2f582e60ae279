//! Arena configuration parameters.

/// What an arena does when it detects a broken invariant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FatalPolicy {
  /// Print a diagnostic to stderr and abort the process.
  #[default]
  Abort,
  /// Return the error and refuse every later operation except teardown.
  Poison,
}

/// Configuration for an [`Arena`](crate::Arena).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
  /// Largest size `init` accepts, in bytes.
  ///
  /// Default and upper bound: `1 << 31`, the largest power of two a `u32`
  /// offset can address.
  pub max_capacity: u32,

  /// Reaction to heap corruption and misuse.
  pub on_fatal: FatalPolicy,
}

impl ArenaConfig {
  /// Hard ceiling on arena capacity.
  pub const MAX_CAPACITY: u32 = 1 << 31;

  pub fn new() -> Self {
    Self {
      max_capacity: Self::MAX_CAPACITY,
      on_fatal: FatalPolicy::default(),
    }
  }

  /// Sets the largest accepted arena size, clamped to [`Self::MAX_CAPACITY`].
  pub fn with_max_capacity(
    mut self,
    max_capacity: u32,
  ) -> Self {
    self.max_capacity = max_capacity.min(Self::MAX_CAPACITY);
    self
  }

  pub fn with_fatal_policy(
    mut self,
    on_fatal: FatalPolicy,
  ) -> Self {
    self.on_fatal = on_fatal;
    self
  }

  /// The effective size limit, never above [`Self::MAX_CAPACITY`].
  pub fn capacity_limit(&self) -> u32 {
    self.max_capacity.min(Self::MAX_CAPACITY)
  }
}

impl Default for ArenaConfig {
  fn default() -> Self {
    Self::new()
  }
}
