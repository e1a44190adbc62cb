use std::io::Read;
use std::ptr;

use raligned::{AlignedAllocator, Error, ErrorMode, StaticError};
use tracing_subscriber::EnvFilter;

static CONFIG_MISSING: StaticError = StaticError::new("configuration file is missing");

/// Waits until the user presses ENTER.
/// Handy for inspecting the process with `pmap` or `gdb` between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints where a user block landed and how it relates to its alignment.
fn print_block(
  label: &str,
  user: *mut u8,
  alignment: usize,
) {
  println!(
    "[{}] address = {:?}, address % {} = {}",
    label,
    user,
    alignment,
    user as usize % alignment
  );
}

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { libc::sbrk(0) },
  );
}

fn main() {
  // RUST_LOG=raligned=trace shows every allocation the demo makes.
  tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

  let allocator = AlignedAllocator::new();

  print_program_break("start");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) 10 bytes aligned to 64, more than malloc promises.
  // --------------------------------------------------------------------
  let first = match allocator.allocate(10, 64) {
    Ok(user) => user.as_ptr(),
    Err(error) => {
      eprintln!("{:#}", allocator.report(error));
      return;
    },
  };
  println!("\n[1] Allocate 10 bytes aligned to 64");
  print_block("1", first, 64);

  unsafe {
    ptr::write_bytes(first, 0xAB, 10);
  }
  println!("[1] Filled with 0xAB");

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Grow it. The alignment is remembered, only the size is given.
  // --------------------------------------------------------------------
  let second = match unsafe { allocator.reallocate_zeroed(first, 4096) } {
    Ok(user) => user.as_ptr(),
    Err(error) => {
      eprintln!("{:#}", allocator.report(error));
      return;
    },
  };
  println!("\n[2] Reallocate to 4096 bytes, zeroing the new tail");
  print_block("2", second, 64);
  unsafe {
    println!("[2] byte 0 = {:#X}, byte 10 = {:#X}", *second, *second.add(10));
  }

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) A page-aligned block.
  // --------------------------------------------------------------------
  print_program_break("before page alloc");
  let mut page = match allocator.allocate_zeroed(64 * 1024, 4096) {
    Ok(user) => user.as_ptr(),
    Err(error) => {
      eprintln!("{:#}", allocator.report(error));
      return;
    },
  };
  println!("\n[3] Allocate 64 KiB aligned to 4096");
  print_block("3", page, 4096);
  print_program_break("after page alloc");

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Invalid requests come back as errors, reported either way.
  // --------------------------------------------------------------------
  let rejected = allocator.allocate(16, 0).unwrap_err();
  println!("\n[4] allocate(16, 0) -> {}", rejected);
  println!("[4] dynamic report: {:?}", allocator.report(rejected.clone()));
  println!("[4] static report:  {}", rejected.report(ErrorMode::Static));

  let mut chain = Error::from_static(&CONFIG_MISSING);
  if let Err(error) = chain.push(Error::new("while starting the demo")) {
    eprintln!("{error}");
  }
  println!("[4] chained: {:#}", chain);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Free everything. `release` nulls the slot, so a second call is a
  //    no-op.
  // --------------------------------------------------------------------
  unsafe {
    allocator.free(second);
    allocator.release(&mut page);
    allocator.release(&mut page);
  }
  println!("\n[5] Freed all blocks, page slot is now {:?}", page);

  println!("\n[6] End of example.");
}
