//! Process-level configuration read from the environment.
//!
//! `SEGALLOC_SEARCH` selects the class search policy of the process-wide
//! heap (`skip-sparse` or `sequential`, parsed loosely). It is read once.

use std::sync::atomic::{AtomicU8, Ordering};

use segalloc_core::SearchPolicy;

/// Environment variable naming the search policy.
pub const SEARCH_ENV: &str = "SEGALLOC_SEARCH";

// Atomic cache: 0=unresolved, 1=skip-sparse, 2=sequential, 255=resolving.
// std::env::var allocates, and the allocation may land back in this crate's
// global allocator, so resolution must not block on itself.
static CACHED_POLICY: AtomicU8 = AtomicU8::new(0);

const POLICY_UNRESOLVED: u8 = 0;
const POLICY_SKIP_SPARSE: u8 = 1;
const POLICY_SEQUENTIAL: u8 = 2;
const POLICY_RESOLVING: u8 = 255;

fn policy_to_u8(policy: SearchPolicy) -> u8 {
    match policy {
        SearchPolicy::SkipSparse => POLICY_SKIP_SPARSE,
        SearchPolicy::Sequential => POLICY_SEQUENTIAL,
    }
}

fn u8_to_policy(v: u8) -> SearchPolicy {
    match v {
        POLICY_SEQUENTIAL => SearchPolicy::Sequential,
        _ => SearchPolicy::SkipSparse,
    }
}

/// Configured search policy (reads the environment on first call, caches
/// thereafter).
///
/// A reentrant call that arrives while the environment is being read sees
/// the default policy.
#[must_use]
pub fn search_policy() -> SearchPolicy {
    let cached = CACHED_POLICY.load(Ordering::Relaxed);
    if cached != POLICY_UNRESOLVED && cached != POLICY_RESOLVING {
        return u8_to_policy(cached);
    }
    if cached == POLICY_RESOLVING {
        return SearchPolicy::default();
    }

    if CACHED_POLICY
        .compare_exchange(
            POLICY_UNRESOLVED,
            POLICY_RESOLVING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        let v = CACHED_POLICY.load(Ordering::Relaxed);
        return if v != POLICY_UNRESOLVED && v != POLICY_RESOLVING {
            u8_to_policy(v)
        } else {
            SearchPolicy::default()
        };
    }

    let policy = std::env::var(SEARCH_ENV)
        .map(|v| SearchPolicy::from_str_loose(&v))
        .unwrap_or_default();
    CACHED_POLICY.store(policy_to_u8(policy), Ordering::Release);
    policy
}
