//! Memory allocation.
//!
//! Implements the malloc family over a single growable arena:
//! - Free blocks are kept in 24 segregated, doubly-linked lists. Classes
//!   0-15 hold one exact span each; classes 16-23 hold power-of-two ranges.
//! - Every block carries one metadata word. Free blocks also carry a footer
//!   so a right neighbour can find them; allocated blocks do not.
//! - Freed blocks are coalesced immediately with free neighbours.
//! - When no list can serve a request, the arena grows by exactly one block.

pub mod allocator;
pub mod block;
pub mod check;
pub mod free_list;
pub mod log;
mod release;
mod resize;
pub mod size_class;

pub use allocator::SegHeap;
pub use block::BlockWord;
pub use check::{BlockInfo, BlockIter, HeapReport};
pub use free_list::FreeListIndex;
pub use log::{AllocatorLogLevel, AllocatorLogRecord, HeapStats, LIFECYCLE_LOG_CAPACITY};
