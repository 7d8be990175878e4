//! Allocator lifecycle records.
//!
//! Each engine decision can append one structured record. Records carry a
//! monotonic decision id, a correlation id and a snapshot of the heap
//! counters at the time of the event, so a drained log can be replayed as an
//! explanation of what the allocator did.
//!
//! An undrained log keeps at most [`LIFECYCLE_LOG_CAPACITY`] records. When
//! full, the oldest half is discarded and counted as dropped.

/// Records retained before the oldest half is discarded.
pub const LIFECYCLE_LOG_CAPACITY: usize = 4096;

/// Allocator lifecycle log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AllocatorLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl AllocatorLogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Running counters kept by the heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Successful allocations (including those made by resize/zeroed paths).
    pub allocations: u64,
    /// Successful releases.
    pub releases: u64,
    /// Successful arena growths, not counting init.
    pub growths: u64,
    /// Placements that split a larger free block.
    pub splits: u64,
    /// Releases that merged with at least one neighbour.
    pub coalesces: u64,
    /// Placements served from an exact class.
    pub exact_hits: u64,
    /// Placements served from a range class.
    pub range_hits: u64,
    /// Rejected release/resize calls.
    pub rejected: u64,
    /// Allocated blocks currently live.
    pub live_blocks: usize,
    /// Payload bytes of live blocks (after alignment padding).
    pub live_bytes: usize,
}

/// Structured allocator lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorLogRecord {
    /// Monotonic decision/event id.
    pub decision_id: u64,
    /// Correlation id for this lifecycle record.
    pub trace_id: String,
    /// Severity level.
    pub level: AllocatorLogLevel,
    /// API symbol (`malloc`, `free`, `realloc`, `calloc`, `init`, `reset`).
    pub symbol: &'static str,
    /// Event kind (`alloc`, `grow`, `split`, `coalesce`, ...).
    pub event: &'static str,
    /// Payload offset involved in the event.
    pub ptr: Option<usize>,
    /// Size value involved in the event.
    pub size: Option<usize>,
    /// Size class involved in the event.
    pub class: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Free-form details for debugging.
    pub details: String,
    /// Counter snapshot taken when the record was written.
    pub stats: HeapStats,
    /// Arena length when the record was written.
    pub arena_bytes: usize,
}

/// In-memory sink for lifecycle records.
#[derive(Debug)]
pub(crate) struct LifecycleLog {
    enabled: bool,
    capacity: usize,
    next_decision_id: u64,
    dropped: u64,
    records: Vec<AllocatorLogRecord>,
}

/// Fields of a record that vary per call site.
pub(crate) struct Event<'a> {
    pub level: AllocatorLogLevel,
    pub symbol: &'static str,
    pub event: &'static str,
    pub ptr: Option<usize>,
    pub size: Option<usize>,
    pub class: Option<usize>,
    pub outcome: &'static str,
    pub details: std::fmt::Arguments<'a>,
}

impl LifecycleLog {
    pub(crate) fn new(enabled: bool) -> Self {
        Self::with_capacity(enabled, LIFECYCLE_LOG_CAPACITY)
    }

    pub(crate) fn with_capacity(enabled: bool, capacity: usize) -> Self {
        Self {
            enabled,
            capacity: capacity.max(2),
            next_decision_id: 1,
            dropped: 0,
            records: Vec::new(),
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn record(&mut self, event: Event<'_>, stats: HeapStats, arena_bytes: usize) {
        if !self.enabled {
            return;
        }
        if self.records.len() >= self.capacity {
            let evict = self.capacity / 2;
            self.records.drain(..evict);
            self.dropped += evict as u64;
        }
        let decision_id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        self.records.push(AllocatorLogRecord {
            decision_id,
            trace_id: format!("core::segalloc::{}::{:016x}", event.symbol, decision_id),
            level: event.level,
            symbol: event.symbol,
            event: event.event,
            ptr: event.ptr,
            size: event.size,
            class: event.class,
            outcome: event.outcome,
            details: event.details.to_string(),
            stats,
            arena_bytes,
        });
    }

    pub(crate) fn records(&self) -> &[AllocatorLogRecord] {
        &self.records
    }

    /// Records discarded because the log filled up before being drained.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }

    pub(crate) fn drain(&mut self) -> Vec<AllocatorLogRecord> {
        std::mem::take(&mut self.records)
    }
}
