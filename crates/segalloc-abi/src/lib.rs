// Exported functions take raw C pointers; the engine validates each one.
#![allow(clippy::missing_safety_doc)]
//! # segalloc-abi
//!
//! Process-level boundary for the segalloc engine.
//!
//! ```text
//! Rust / C caller -> SegAllocator (one mutex) -> SegHeap<MmapArena> -> mmap region
//! ```
//!
//! [`MmapArena`] reserves one large anonymous mapping up front and commits it
//! lazily, so block addresses never move when the heap grows. [`SegAllocator`]
//! translates between real addresses and engine offsets and implements
//! [`GlobalAlloc`](std::alloc::GlobalAlloc). The `segalloc_*` C symbols expose
//! a process-wide instance.
//!
//! Exported symbols carry a `segalloc_` prefix and never shadow libc, so the
//! crate's own tests run on the system allocator.

pub mod config;
pub mod global;
pub mod malloc_abi;
pub mod mmap_arena;

pub use global::{DEFAULT_RESERVE_BYTES, SegAllocator};
pub use mmap_arena::MmapArena;
