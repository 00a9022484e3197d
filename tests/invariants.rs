use std::ptr::NonNull;

use ffalloc::{Arena, HEADER_SIZE, Heap, HeapError};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
  Allocate(usize),
  Free(prop::sample::Index),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    3 => (0usize..600).prop_map(Op::Allocate),
    2 => any::<prop::sample::Index>().prop_map(Op::Free),
  ]
}

struct Live {
  ptr: NonNull<u8>,
  size: usize,
  tag: u8,
}

fn fill(live: &Live) {
  unsafe { live.ptr.as_ptr().write_bytes(live.tag, live.size) };
}

fn intact(live: &Live) -> bool {
  (0..live.size).all(|i| unsafe { *live.ptr.as_ptr().add(i) } == live.tag)
}

proptest! {
  #[test]
  fn random_workloads_keep_the_list_sound(ops in prop::collection::vec(op(), 1..200)) {
    let mut heap = Heap::new(Arena::with_capacity(64 * 1024));
    let mut live: Vec<Live> = Vec::new();

    for (step, op) in ops.into_iter().enumerate() {
      match op {
        Op::Allocate(size) => match heap.allocate(size) {
          Ok(ptr) => {
            prop_assert_eq!(ptr.as_ptr() as usize % 4, 0);
            let entry = Live { ptr, size, tag: step as u8 };
            fill(&entry);
            live.push(entry);
          }
          Err(error) => prop_assert_eq!(error, HeapError::OutOfMemory { requested: size }),
        },
        Op::Free(index) if !live.is_empty() => {
          let entry = live.swap_remove(index.index(live.len()));
          prop_assert_eq!(heap.try_deallocate(entry.ptr.as_ptr()), Ok(()));
        }
        Op::Free(_) => {}
      }

      prop_assert_eq!(heap.verify(), Ok(()));
      prop_assert!(live.iter().all(intact));

      let blocks: Vec<_> = heap.blocks().collect();
      for entry in &live {
        let block = blocks.iter().find(|block| block.payload == entry.ptr);
        prop_assert!(block.is_some_and(|block| !block.free && block.size >= entry.size));
      }
    }

    prop_assert!(heap.growth().requests().iter().all(|bytes| *bytes > 0 && bytes % 4096 == 0));
  }

  #[test]
  fn freed_block_is_reselected(
    sizes in prop::collection::vec(0usize..400, 1..24),
    released in prop::collection::vec(any::<prop::sample::Index>(), 0..12),
    size in 0usize..512,
  ) {
    let mut heap = Heap::new(Arena::with_capacity(64 * 1024));
    let mut pointers: Vec<_> = sizes.iter().map(|size| heap.allocate(*size).unwrap()).collect();

    for index in released {
      if pointers.is_empty() {
        break;
      }
      let ptr = pointers.swap_remove(index.index(pointers.len()));
      heap.deallocate(ptr.as_ptr());
    }

    let first = heap.allocate(size).unwrap();
    let requests = heap.growth().requests().len();

    heap.deallocate(first.as_ptr());
    let second = heap.allocate(size).unwrap();

    prop_assert_eq!(second, first);
    prop_assert_eq!(heap.growth().requests().len(), requests);
  }

  #[test]
  fn draining_the_heap_leaves_one_free_block(sizes in prop::collection::vec(0usize..2000, 1..40)) {
    let mut heap = Heap::new(Arena::with_capacity(256 * 1024));
    let pointers: Vec<_> = sizes.iter().map(|size| heap.allocate(*size).unwrap()).collect();

    for ptr in pointers.iter().rev() {
      heap.deallocate(ptr.as_ptr());
    }

    let stats = heap.stats();
    prop_assert_eq!(stats.blocks, 1);
    prop_assert_eq!(stats.heap_bytes, heap.growth().used());
    prop_assert_eq!(stats.free_bytes, heap.growth().used() - HEADER_SIZE);
  }
}
