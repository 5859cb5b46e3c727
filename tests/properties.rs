use proptest::prelude::*;
use tagalloc::Heap;

const HEAP_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone)]
enum Op {
  Alloc(usize),
  Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    3 => (1usize..=512).prop_map(Op::Alloc),
    2 => any::<usize>().prop_map(Op::Free),
  ]
}

struct Live {
  ptr: *mut u8,
  len: usize,
  tag: u8,
}

fn assert_intact(live: &[Live]) {
  for allocation in live {
    let bytes = unsafe { std::slice::from_raw_parts(allocation.ptr, allocation.len) };
    assert!(
      bytes.iter().all(|byte| *byte == allocation.tag),
      "payload at {:p} was overwritten",
      allocation.ptr
    );
  }
}

proptest! {
  #[test]
  fn chain_stays_consistent(ops in prop::collection::vec(op(), 1..200)) {
    let mut heap = Heap::new();
    heap.init(HEAP_SIZE).unwrap();
    let capacity = heap.capacity();

    let mut live: Vec<Live> = Vec::new();
    let mut next_tag = 1u8;

    for op in ops {
      match op {
        Op::Alloc(len) => {
          let before = heap.as_bytes().to_vec();
          let ptr = heap.allocate(len);

          if ptr.is_null() {
            prop_assert_eq!(heap.as_bytes(), &before[..]);
          } else {
            prop_assert_eq!(ptr as usize % 8, 0);

            unsafe { std::ptr::write_bytes(ptr, next_tag, len) };
            live.push(Live { ptr, len, tag: next_tag });
            next_tag = next_tag.wrapping_add(1).max(1);
          }
        }
        Op::Free(pick) => {
          if live.is_empty() {
            continue;
          }

          let allocation = live.swap_remove(pick % live.len());
          prop_assert!(heap.deallocate(allocation.ptr).is_ok());
        }
      }

      let stats = heap.check().map_err(|err| TestCaseError::fail(err.to_string()))?;
      prop_assert_eq!(stats.total(), capacity);
      assert_intact(&live);
    }

    for allocation in live.drain(..) {
      prop_assert!(heap.deallocate(allocation.ptr).is_ok());
    }

    let blocks: Vec<_> = heap.blocks().collect();
    prop_assert_eq!(blocks.len(), 1);
    prop_assert_eq!(blocks[0].size, capacity);
    prop_assert!(!blocks[0].allocated);
  }

  #[test]
  fn round_trip_restores_chain(
    prefix in prop::collection::vec(1usize..=256, 0..16),
    len in 1usize..=1024,
  ) {
    let mut heap = Heap::new();
    heap.init(HEAP_SIZE).unwrap();

    for size in prefix {
      heap.allocate(size);
    }

    let before: Vec<_> = heap.blocks().collect();
    let ptr = heap.allocate(len);

    if !ptr.is_null() {
      prop_assert!(heap.deallocate(ptr).is_ok());
    }

    let after: Vec<_> = heap.blocks().collect();
    prop_assert_eq!(before, after);
  }

  #[test]
  fn second_release_fails(sizes in prop::collection::vec(1usize..=128, 1..32), pick in any::<usize>()) {
    let mut heap = Heap::new();
    heap.init(HEAP_SIZE).unwrap();

    let ptrs: Vec<_> = sizes.iter().map(|size| heap.allocate(*size)).collect();
    let target = ptrs[pick % ptrs.len()];
    prop_assume!(!target.is_null());

    prop_assert!(heap.deallocate(target).is_ok());
    prop_assert!(heap.deallocate(target).is_err());
    prop_assert!(heap.check().is_ok());
  }
}
