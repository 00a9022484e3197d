use std::io::Read;

use ffalloc::Heap;
use libc::sbrk;
use log::{LevelFilter, Log, Metadata, Record};

/// Prints every heap event to stdout as `[LEVEL] target: message`.
struct StdoutLogger;

impl Log for StdoutLogger {
  fn enabled(
    &self,
    _metadata: &Metadata,
  ) -> bool {
    true
  }

  fn log(
    &self,
    record: &Record,
  ) {
    println!("[{}] {}: {}", record.level(), record.target(), record.args());
  }

  fn flush(&self) {}
}

static LOGGER: StdoutLogger = StdoutLogger;

/// Waits until the user presses ENTER, so the program break can be inspected
/// with `pmap` or `gdb` between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn print_blocks(heap: &Heap) {
  for block in heap.blocks() {
    println!(
      "    block @{:#06x} payload {:?} size {:>5} {}",
      block.offset,
      block.payload,
      block.size,
      if block.free { "free" } else { "used" }
    );
  }
}

fn main() {
  if log::set_logger(&LOGGER).is_ok() {
    log::set_max_level(LevelFilter::Trace);
  }

  let mut heap: Heap = Heap::default();

  print_program_break("start");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) The first allocation grows the heap by one 4096-byte quantum and
  //    splits the fresh block into a 32-byte used block and a free rest.
  // --------------------------------------------------------------------
  let Ok(first) = heap.allocate(30) else {
    println!("out of memory");
    return;
  };
  println!("\n[1] allocate(30) = {first:?}");
  print_blocks(&heap);
  print_program_break("after first allocation");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) The second allocation is carved out of the free remainder; the
  //    program break does not move.
  // --------------------------------------------------------------------
  let Ok(second) = heap.allocate(10) else {
    println!("out of memory");
    return;
  };
  println!("\n[2] allocate(10) = {second:?}");
  print_blocks(&heap);
  print_program_break("after second allocation");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Freeing both merges everything back into one free block.
  // --------------------------------------------------------------------
  heap.deallocate(first.as_ptr());
  heap.deallocate(second.as_ptr());
  println!("\n[3] freed both");
  print_blocks(&heap);

  // --------------------------------------------------------------------
  // 4) A second free of the same pointer is logged and ignored.
  // --------------------------------------------------------------------
  heap.deallocate(second.as_ptr());
  println!("\n[4] stats: {:?}", heap.stats());

  println!("\n[5] End of example. The heap never shrinks; the OS reclaims it at exit.");
}
