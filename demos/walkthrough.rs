use std::io::Read;

use suballoc::{Arena, ArenaConfig, FatalPolicy};

/// Waits until the user presses ENTER, so the arena can be inspected between
/// steps (set `RUST_LOG=suballoc=trace` to watch splits and merges).
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_free_list(
  label: &str,
  arena: &Arena,
) {
  println!("[{label}] free list:");
  match arena.free_blocks() {
    Ok(blocks) => {
      for block in blocks {
        println!("    offset {:>5}  size {:>5}", block.offset, block.size);
      }
    }
    Err(err) => println!("    unavailable: {err}"),
  }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let mut arena = Arena::with_config(ArenaConfig::new().with_fatal_policy(FatalPolicy::Poison));

  // --------------------------------------------------------------------
  // 1) Reserve the backing buffer. 1000 rounds up to 1024.
  // --------------------------------------------------------------------
  arena.init(1000)?;
  println!("[1] Arena initialized with {:?} bytes", arena.capacity());
  print_free_list("1", &arena);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) A small request splits the arena down to a 32-byte block.
  // --------------------------------------------------------------------
  let small = arena.allocate(10)?;
  unsafe { small.as_ptr().write_bytes(0xAB, 10) };
  println!("\n[2] allocate(10) -> {small:?}");
  print_free_list("2", &arena);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) A medium request is served by best fit from the remnants.
  // --------------------------------------------------------------------
  let medium = arena.allocate(100)?;
  println!("\n[3] allocate(100) -> {medium:?}");
  print_free_list("3", &arena);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Requests above half the arena are refused without side effects.
  // --------------------------------------------------------------------
  match arena.allocate(600) {
    Ok(ptr) => println!("\n[4] allocate(600) unexpectedly returned {ptr:?}"),
    Err(err) => println!("\n[4] allocate(600) refused: {err}"),
  }
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Releasing both blocks coalesces the buddies back into one block.
  // --------------------------------------------------------------------
  arena.release(small)?;
  print_free_list("5a", &arena);
  arena.release(medium)?;
  print_free_list("5b", &arena);
  arena.dump_stats();
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) Releasing the same block twice is detected and poisons the arena.
  // --------------------------------------------------------------------
  if let Err(err) = arena.release(small) {
    println!("\n[6] double release detected: {err}");
  }
  println!("[6] arena poisoned? {}", arena.is_poisoned());

  // --------------------------------------------------------------------
  // 7) Teardown hands the buffer back to the host.
  // --------------------------------------------------------------------
  arena.teardown()?;
  println!("\n[7] Arena torn down, initialized = {}", arena.is_initialized());

  Ok(())
}
