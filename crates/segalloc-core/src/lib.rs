//! # segalloc-core
//!
//! Segregated free-list allocator engine.
//!
//! The engine manages one contiguous, growable arena obtained from an
//! [`ArenaProvider`]. All metadata lives inside the arena and is addressed by
//! arena-relative offsets, so this crate needs no `unsafe` code: providers
//! that hand out real memory (see `segalloc-abi`) are the only place raw
//! addresses appear.
//!
//! The engine is single-owner. [`SegHeap`] operations take `&mut self` and
//! perform no internal locking; callers that share a heap across threads
//! must serialize access themselves (the ABI layer wraps it in one mutex).

#![deny(unsafe_code)]

pub mod arena;
pub mod config;
pub mod error;
pub mod malloc;

pub use arena::{ArenaProvider, VecArena};
pub use config::{AllocatorConfig, SearchPolicy};
pub use error::{AllocError, ArenaError, CorruptionKind};
pub use malloc::{AllocatorLogLevel, AllocatorLogRecord, BlockInfo, HeapReport, HeapStats, SegHeap};
