#![no_main]
use libfuzzer_sys::fuzz_target;
use segalloc_core::{AllocatorConfig, SearchPolicy, SegHeap, VecArena};

// Each 4-byte chunk is one operation: kind, slot, then a little-endian size.
fuzz_target!(|data: &[u8]| {
    let Some((&first, ops)) = data.split_first() else {
        return;
    };
    let policy = if first & 1 == 0 {
        SearchPolicy::SkipSparse
    } else {
        SearchPolicy::Sequential
    };
    let mut heap = SegHeap::new(
        VecArena::with_limit(4 << 20),
        AllocatorConfig::quiet().with_search(policy),
    );
    heap.init().unwrap();
    let mut slots = [0usize; 32];

    for chunk in ops.chunks_exact(4) {
        let slot = usize::from(chunk[1]) % slots.len();
        let size = usize::from(u16::from_le_bytes([chunk[2], chunk[3]]));

        match chunk[0] % 5 {
            0 | 1 => {
                if slots[slot] == 0 {
                    if let Ok(ptr) = heap.allocate(size) {
                        assert_eq!(ptr % 16, 0);
                        slots[slot] = ptr;
                    }
                }
            }
            2 => {
                if slots[slot] != 0 {
                    heap.release(slots[slot]).unwrap();
                    slots[slot] = 0;
                }
            }
            3 => match heap.resize(slots[slot], size) {
                Ok(Some(ptr)) => slots[slot] = ptr,
                Ok(None) => slots[slot] = 0,
                Err(_) => {}
            },
            _ => {
                // Arbitrary offsets must be rejected or freed, never corrupt.
                let live = slots.contains(&size);
                let result = heap.release(size);
                if live {
                    assert!(result.is_ok());
                    for s in slots.iter_mut().filter(|s| **s == size) {
                        *s = 0;
                    }
                }
            }
        }
        heap.check_heap().unwrap();
    }
});
