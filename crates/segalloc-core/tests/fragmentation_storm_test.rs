use segalloc_core::{AllocError, AllocatorConfig, ArenaProvider, SearchPolicy, SegHeap, VecArena};

const STORM_OPS: usize = 4_000;

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

#[derive(Clone, Copy, Debug)]
struct Live {
    ptr: usize,
    len: usize,
    tag: u8,
}

fn stamp(heap: &mut SegHeap<VecArena>, live: Live) {
    heap.payload_mut(live.ptr).unwrap()[..live.len].fill(live.tag);
}

fn verify(heap: &SegHeap<VecArena>, live: Live) {
    let payload = heap.payload(live.ptr).unwrap();
    assert!(
        payload[..live.len].iter().all(|&b| b == live.tag),
        "payload {:#x} (tag {}) was overwritten",
        live.ptr,
        live.tag
    );
}

fn pick_size(rng: &mut XorShift64) -> usize {
    match rng.gen_range(0, 9) {
        0..=5 => rng.gen_range(1, 256),
        6..=8 => rng.gen_range(257, 4096),
        _ => rng.gen_range(4097, 40_000),
    }
}

fn run_storm(seed: u64, policy: SearchPolicy) -> (usize, u64) {
    let config = AllocatorConfig::quiet().with_search(policy);
    let mut heap = SegHeap::new(VecArena::new(), config);
    heap.init().unwrap();
    let mut rng = XorShift64::new(seed);
    let mut slots: Vec<Option<Live>> = vec![None; 64];
    let mut next_tag = 1u8;

    for step in 0..STORM_OPS {
        let slot = rng.gen_range(0, slots.len() - 1);
        match (slots[slot], rng.gen_range(0, 3)) {
            (None, _) => {
                let len = pick_size(&mut rng);
                let ptr = heap.allocate(len).unwrap();
                assert_eq!(ptr % 16, 0, "step {step}");
                assert!(ptr + len <= heap.arena().len());
                let live = Live { ptr, len, tag: next_tag };
                next_tag = next_tag.wrapping_add(1).max(1);
                stamp(&mut heap, live);
                slots[slot] = Some(live);
            }
            (Some(live), 0) => {
                verify(&heap, live);
                let len = pick_size(&mut rng);
                let ptr = heap.resize(live.ptr, len).unwrap().unwrap();
                let moved = Live { ptr, len, tag: live.tag };
                let kept = Live {
                    len: live.len.min(len),
                    ..moved
                };
                verify(&heap, kept);
                stamp(&mut heap, moved);
                slots[slot] = Some(moved);
            }
            (Some(live), _) => {
                verify(&heap, live);
                heap.release(live.ptr).unwrap();
                slots[slot] = None;
            }
        }
        if let Err(err) = heap.check_heap() {
            panic!("seed {seed:#x} step {step}: {err}");
        }
    }

    for live in slots.iter().flatten() {
        verify(&heap, *live);
        heap.release(live.ptr).unwrap();
    }
    let report = heap.check_heap().unwrap();
    assert_eq!(report.allocated_blocks, 0);
    assert!(report.free_blocks <= 1);
    (heap.arena().len(), heap.stats().growths)
}

#[test]
fn random_churn_keeps_every_invariant() {
    for seed in [0x5EED_0001, 0xDEAD_BEEF, 0x0123_4567_89AB_CDEF] {
        run_storm(seed, SearchPolicy::SkipSparse);
    }
}

#[test]
fn sequential_policy_survives_the_same_churn() {
    for seed in [0x5EED_0001, 0xDEAD_BEEF] {
        run_storm(seed, SearchPolicy::Sequential);
    }
}

#[test]
fn storms_are_deterministic_per_seed() {
    let a = run_storm(0xC0FF_EE00, SearchPolicy::SkipSparse);
    let b = run_storm(0xC0FF_EE00, SearchPolicy::SkipSparse);
    assert_eq!(a, b);
}

#[test]
fn stale_pointers_are_rejected_during_churn() {
    let mut heap = SegHeap::new(VecArena::new(), AllocatorConfig::quiet());
    heap.init().unwrap();
    let mut rng = XorShift64::new(0xBAD_F00D);
    let mut freed = Vec::new();
    let mut live = Vec::new();
    for _ in 0..500 {
        live.push(heap.allocate(pick_size(&mut rng)).unwrap());
        if live.len() > 8 {
            let victim = live.swap_remove(rng.gen_range(0, live.len() - 1));
            heap.release(victim).unwrap();
            freed.push(victim);
        }
    }
    let live_set: std::collections::HashSet<_> = live.iter().copied().collect();
    for ptr in freed.into_iter().filter(|ptr| !live_set.contains(ptr)) {
        let before = heap.arena().len();
        match heap.release(ptr) {
            Err(AllocError::DoubleFree { .. }) | Err(AllocError::InvalidPointer { .. }) => {}
            Ok(()) => panic!("stale pointer {ptr:#x} released twice"),
            Err(other) => panic!("unexpected error {other}"),
        }
        assert_eq!(heap.arena().len(), before);
    }
    assert!(heap.check_consistency());
}
