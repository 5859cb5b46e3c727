use std::{env, io::Read, ptr};

use log::info;
use tagalloc::Heap;
use tracing_subscriber::EnvFilter;

/// Walkthrough settings, read from the environment.
struct DemoConfig {
  /// TAGALLOC_HEAP_SIZE: bytes requested from `init`.
  heap_size: usize,
  /// TAGALLOC_LOG: an `EnvFilter` directive such as `debug` or `tagalloc=trace`.
  log_filter: String,
  /// TAGALLOC_PAUSE: wait for ENTER between steps when set.
  pause: bool,
}

impl DemoConfig {
  fn from_env() -> Self {
    let heap_size = env::var("TAGALLOC_HEAP_SIZE")
      .ok()
      .and_then(|value| value.parse().ok())
      .unwrap_or(4096);

    let log_filter = env::var("TAGALLOC_LOG").unwrap_or_else(|_| "info".to_string());

    Self {
      heap_size,
      log_filter,
      pause: env::var_os("TAGALLOC_PAUSE").is_some(),
    }
  }
}

/// Parses a `TAGALLOC_LOG` directive, falling back to `info`.
fn env_filter(directive: &str) -> EnvFilter {
  EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a `tracing` subscriber on stderr. It also picks up the `log`
/// records the heap emits.
fn init_logging(config: &DemoConfig) {
  if let Err(err) = tracing_subscriber::fmt()
    .with_env_filter(env_filter(&config.log_filter))
    .with_writer(std::io::stderr)
    .try_init()
  {
    eprintln!("logging: {}", err);
  }
}

/// Waits until the user presses ENTER, so the heap can be inspected with
/// tools like `pmap` or `gdb` between steps.
fn block_until_enter_pressed(config: &DemoConfig) {
  if !config.pause {
    return;
  }

  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_alloc(
  size: usize,
  addr: *mut u8,
) {
  println!(
    "Allocated {} bytes, address = {:?}, aligned = {}",
    size,
    addr,
    addr as usize % 8 == 0
  );
}

fn main() {
  let config = DemoConfig::from_env();

  init_logging(&config);

  let mut heap = Heap::new();

  if let Err(err) = heap.init(config.heap_size) {
    eprintln!("init: {}", err);
    std::process::exit(1);
  }

  info!(
    "page size {}, mapped {} bytes, {} usable",
    tagalloc::page_size(),
    heap.mapped_size(),
    heap.capacity()
  );

  // Initial heap: one free block spanning everything.
  print!("{}", heap.dump());
  block_until_enter_pressed(&config);

  // --------------------------------------------------------------------
  // 1) Allocate space for a u32. 4 bytes + 4 byte header = one 8 byte block.
  // --------------------------------------------------------------------
  let first_block = heap.allocate(4);
  println!("\n[1] Allocate u32");
  print_alloc(4, first_block);

  let first_ptr = first_block as *mut u32;
  unsafe { first_ptr.write(0xDEADBEEF) };
  println!("[1] Value written to first_block = 0x{:X}", unsafe { first_ptr.read() });

  block_until_enter_pressed(&config);

  // --------------------------------------------------------------------
  // 2) Allocate 12 bytes: 12 + 4 rounds to a 16 byte block.
  // --------------------------------------------------------------------
  let second_block = heap.allocate(12);
  println!("\n[2] Allocate [u8; 12]");
  print_alloc(12, second_block);

  unsafe { ptr::write_bytes(second_block, 0xAB, 12) };
  println!("[2] Initialized second block with 0xAB");

  // --------------------------------------------------------------------
  // 3) Allocate a [u16; 16] and a u64 behind it.
  // --------------------------------------------------------------------
  let third_block = heap.allocate(32);
  println!("\n[3] Allocate [u16; 16]");
  print_alloc(32, third_block);

  let third_ptr = third_block as *mut u16;
  for i in 0..16 {
    unsafe { third_ptr.add(i).write(i as u16) };
  }

  let fourth_block = heap.allocate(8);
  println!("\n[3] Allocate u64");
  print_alloc(8, fourth_block);

  print!("{}", heap.dump());
  block_until_enter_pressed(&config);

  // --------------------------------------------------------------------
  // 4) Free the 12 byte block and then the [u16; 16] next to it.
  //    The two free blocks merge immediately.
  // --------------------------------------------------------------------
  if let Err(err) = heap.deallocate(second_block) {
    eprintln!("[4] free: {}", err);
  }
  if let Err(err) = heap.deallocate(third_block) {
    eprintln!("[4] free: {}", err);
  }
  println!("\n[4] Freed second and third block");

  print!("{}", heap.dump());
  block_until_enter_pressed(&config);

  // --------------------------------------------------------------------
  // 5) Best fit: a 12 byte request reuses the merged hole, not the tail.
  // --------------------------------------------------------------------
  let fifth_block = heap.allocate(12);
  println!("\n[5] Allocate [u8; 12] (check reuse of freed block)");
  print_alloc(12, fifth_block);

  println!(
    "[5] fifth_block == second_block? {}",
    if fifth_block == second_block {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );

  // --------------------------------------------------------------------
  // 6) Invalid frees are rejected without touching the heap.
  // --------------------------------------------------------------------
  if let Err(err) = heap.deallocate(third_block) {
    println!("\n[6] Freeing a stale pointer: {}", err);
  }
  if let Err(err) = heap.deallocate(first_block.wrapping_add(2)) {
    println!("[6] Freeing a misaligned pointer: {}", err);
  }

  // --------------------------------------------------------------------
  // 7) A request larger than the heap fails with a null pointer.
  // --------------------------------------------------------------------
  let too_big = heap.allocate(heap.capacity());
  println!("\n[7] Allocate {} bytes -> null? {}", heap.capacity(), too_big.is_null());

  // --------------------------------------------------------------------
  // 8) Free everything: the heap collapses back into one free block.
  // --------------------------------------------------------------------
  for block in [first_block, fourth_block, fifth_block] {
    if let Err(err) = heap.deallocate(block) {
      eprintln!("[8] free: {}", err);
    }
  }

  match heap.check() {
    Ok(stats) => println!("\n[8] Heap consistent, {} block(s), {} bytes free", stats.blocks, stats.free),
    Err(err) => println!("\n[8] Heap corrupted: {}", err),
  }
  print!("{}", heap.dump());

  println!("\nEnd of example. The mapping is released when the heap is dropped.");
}
