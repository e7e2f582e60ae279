//! # suballoc - A Fixed-Capacity Buddy Suballocator
//!
//! This crate manages sub-allocations inside **one** buffer obtained from the
//! host a single time. After [`Arena::init`], every [`Arena::allocate`] and
//! [`Arena::release`] is served from that buffer with a buddy scheme, and the
//! host allocator is not called again until [`Arena::teardown`].
//!
//! ## Overview
//!
//! ```text
//!   Buddy Splitting:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                              ARENA (128)                             │
//!   └──────────────────────────────────────────────────────────────────────┘
//!                                    │ allocate(10): 10 + 16 header = 26
//!                                    ▼
//!   ┌──────────────────────────────────┬───────────────────────────────────┐
//!   │               64                 │             64 (free)             │
//!   └──────────────────────────────────┴───────────────────────────────────┘
//!                   │ still ≥ 2 × 26, halve again
//!                   ▼
//!   ┌────────────────┬─────────────────┬───────────────────────────────────┐
//!   │  32 (handed    │   32 (free)     │             64 (free)             │
//!   │      out)      │                 │                                   │
//!   └────────────────┴─────────────────┴───────────────────────────────────┘
//!
//!   Releasing the 32 merges it with its free buddy, and the resulting 64
//!   merges again, back to one 128-byte block.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   suballoc
//!   ├── align      - Size-class macro (size_class!) and buddy alignment
//!   ├── arena      - Arena: lifecycle, fatal-error policy, public API
//!   ├── block      - Block header layout and tag sentinels (internal)
//!   ├── config     - ArenaConfig and FatalPolicy
//!   ├── error      - ArenaError
//!   ├── heap       - Free list, best fit, splitting, coalescing (internal)
//!   ├── host       - calloc/free backed buffer (internal)
//!   └── stats      - ArenaStats and FreeBlock snapshots
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use suballoc::{Arena, ArenaConfig, FatalPolicy};
//!
//! let mut arena = Arena::with_config(ArenaConfig::new().with_fatal_policy(FatalPolicy::Poison));
//! arena.init(100).unwrap();
//! assert_eq!(arena.capacity(), Some(128));
//!
//! let ptr = arena.allocate(10).unwrap();
//! unsafe { ptr.as_ptr().write_bytes(0x2A, 10) };
//!
//! arena.release(ptr).unwrap();
//! assert!(arena.stats().unwrap().is_fully_coalesced());
//!
//! arena.teardown().unwrap();
//! ```
//!
//! ## Block Layout
//!
//! ```text
//!   Single Block:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         Payload                │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ tag: FREE/ALLOC │  │  ┌──────────────────────────┐  │
//!   │  │ size: 2^k       │  │  │                          │  │
//!   │  │ next: offset    │  │  │  2^k - 16 bytes usable   │  │
//!   │  │ prev: offset    │  │  │                          │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │      16 bytes         │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! Links are offsets from the arena base. Each time a free header is read,
//! its offset is bounds-checked and its tag checked.
//!
//! ## Errors
//!
//! Fit failures (zero-sized or oversized requests, no block available) are
//! ordinary errors and leave the arena unchanged. Corruption and misuse
//! (double release, foreign pointers, teardown without init) are fatal. By
//! default they abort the process. With [`FatalPolicy::Poison`] they are
//! returned instead, and the arena refuses further work until torn down.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Arena` is neither `Send` nor `Sync`
//! - **Half-arena ceiling**: a request plus its header must fit in half the
//!   arena, and the last free block is never handed out
//! - **Power-of-two accounting**: every block is rounded up to a power of two
//! - **Unix-only**: the backing buffer comes from `libc::calloc`

pub mod align;
mod arena;
mod block;
mod config;
mod error;
mod heap;
mod host;
mod stats;

pub use arena::Arena;
pub use block::HEADER_SIZE;
pub use config::{ArenaConfig, FatalPolicy};
pub use error::ArenaError;
pub use stats::{ArenaStats, FreeBlock};
