//! Trace replay against a fresh heap.
//!
//! Every live slot carries a byte pattern derived from its id. The pattern
//! is checked before a slot is freed or resized, so any overlap between
//! blocks or any lost byte during relocation shows up as an integrity error
//! on the line that exposed it.

use serde::Serialize;
use segalloc_core::arena::DEFAULT_VEC_ARENA_LIMIT;
use segalloc_core::{
    AllocError, AllocatorConfig, AllocatorLogRecord, ArenaProvider, SearchPolicy, SegHeap,
    VecArena,
};

use crate::error::HarnessError;
use crate::trace::{Trace, TraceOp};

/// Knobs for one replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    pub policy: SearchPolicy,
    /// Upper bound on the arena, in bytes.
    pub arena_limit: usize,
    /// Run the full heap checker after every operation.
    pub check_each_op: bool,
    /// Collect engine lifecycle records.
    pub lifecycle_logging: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            policy: SearchPolicy::default(),
            arena_limit: DEFAULT_VEC_ARENA_LIMIT,
            check_each_op: true,
            lifecycle_logging: false,
        }
    }
}

/// Summary of a successful replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    pub trace_sha256: String,
    pub policy: &'static str,
    pub ops: usize,
    pub allocs: usize,
    pub frees: usize,
    pub reallocs: usize,
    pub callocs: usize,
    pub growths: u64,
    pub splits: u64,
    pub coalesces: u64,
    pub exact_hits: u64,
    pub range_hits: u64,
    /// Largest sum of requested bytes live at once.
    pub peak_live_bytes: usize,
    pub final_arena_bytes: usize,
    /// `peak_live_bytes / final_arena_bytes`.
    pub peak_utilization: f64,
    pub heap_checks: usize,
    pub final_live_blocks: usize,
    pub final_free_blocks: usize,
    pub final_free_bytes: usize,
    pub largest_free: usize,
}

/// Report plus the lifecycle records, each tagged with its trace line.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub report: ReplayReport,
    pub records: Vec<(usize, AllocatorLogRecord)>,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    ptr: usize,
    size: usize,
}

fn pattern_byte(id: u32, index: usize) -> u8 {
    (id.wrapping_mul(0x9E37_79B9) >> 24) as u8 ^ index as u8
}

struct Replayer {
    heap: SegHeap<VecArena>,
    slots: Vec<Option<Slot>>,
    live_bytes: usize,
    peak_live_bytes: usize,
    heap_checks: usize,
    check_each_op: bool,
    records: Vec<(usize, AllocatorLogRecord)>,
}

impl Replayer {
    fn slot(&mut self, id: u32) -> &mut Option<Slot> {
        let index = id as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        &mut self.slots[index]
    }

    fn fill(&mut self, id: u32, slot: Slot, from: usize) -> Result<(), AllocError> {
        let payload = self.heap.payload_mut(slot.ptr)?;
        for (index, byte) in payload[..slot.size].iter_mut().enumerate().skip(from) {
            *byte = pattern_byte(id, index);
        }
        Ok(())
    }

    /// First byte of the first `len` bytes of `slot` that lost its pattern.
    fn first_mismatch(&self, id: u32, slot: Slot, len: usize) -> Option<usize> {
        let payload = self.heap.payload(slot.ptr).ok()?;
        payload[..len.min(slot.size)]
            .iter()
            .enumerate()
            .find(|&(index, &byte)| byte != pattern_byte(id, index))
            .map(|(index, _)| index)
    }

    fn verify(&self, line: usize, id: u32, slot: Slot, len: usize) -> Result<(), HarnessError> {
        if self.heap.payload(slot.ptr).is_err() {
            return Err(HarnessError::Integrity {
                line,
                id,
                offset: 0,
            });
        }
        match self.first_mismatch(id, slot, len) {
            Some(offset) => Err(HarnessError::Integrity { line, id, offset }),
            None => Ok(()),
        }
    }

    fn place(&mut self, line: usize, id: u32, slot: Slot, fill_from: usize) -> Result<(), HarnessError> {
        if slot.ptr % 16 != 0 {
            return Err(HarnessError::Misaligned {
                line,
                id,
                ptr: slot.ptr,
            });
        }
        self.fill(id, slot, fill_from)
            .map_err(|source| HarnessError::Corruption { line, source })?;
        *self.slot(id) = Some(slot);
        self.live_bytes += slot.size;
        self.peak_live_bytes = self.peak_live_bytes.max(self.live_bytes);
        Ok(())
    }

    fn run(&mut self, line: usize, op: TraceOp) -> Result<(), HarnessError> {
        let fail = |source| HarnessError::Alloc {
            line,
            op: op.symbol(),
            id: op.id(),
            source,
        };
        match op {
            TraceOp::Alloc { id, size } => {
                if self.slot(id).is_some() {
                    return Err(HarnessError::IdInUse { line, id });
                }
                if size == 0 {
                    return Ok(());
                }
                let ptr = self.heap.allocate(size).map_err(fail)?;
                self.place(line, id, Slot { ptr, size }, 0)?;
            }
            TraceOp::Calloc { id, count, size } => {
                if self.slot(id).is_some() {
                    return Err(HarnessError::IdInUse { line, id });
                }
                if count == 0 || size == 0 {
                    return Ok(());
                }
                let ptr = self.heap.zeroed_allocate(count, size).map_err(fail)?;
                let slot = Slot {
                    ptr,
                    size: count * size,
                };
                let payload = self
                    .heap
                    .payload(ptr)
                    .map_err(|source| HarnessError::Corruption { line, source })?;
                if let Some(offset) = payload[..slot.size].iter().position(|&b| b != 0) {
                    return Err(HarnessError::Integrity { line, id, offset });
                }
                self.place(line, id, slot, 0)?;
            }
            TraceOp::Free { id } => {
                let Some(slot) = *self.slot(id) else {
                    return Err(HarnessError::UnknownId { line, id });
                };
                self.verify(line, id, slot, slot.size)?;
                self.heap.release(slot.ptr).map_err(fail)?;
                *self.slot(id) = None;
                self.live_bytes -= slot.size;
            }
            TraceOp::Realloc { id, size } => {
                let old = *self.slot(id);
                if let Some(slot) = old {
                    self.verify(line, id, slot, slot.size)?;
                }
                let old_ptr = old.map_or(0, |slot| slot.ptr);
                if old_ptr == 0 && size == 0 {
                    return Ok(());
                }
                let moved = self.heap.resize(old_ptr, size).map_err(fail)?;
                let kept = old.map_or(0, |slot| slot.size.min(size));
                if let Some(slot) = old {
                    self.live_bytes -= slot.size;
                    *self.slot(id) = None;
                }
                if let Some(ptr) = moved {
                    let slot = Slot { ptr, size };
                    self.verify(line, id, slot, kept)?;
                    self.place(line, id, slot, kept)?;
                }
            }
        }
        Ok(())
    }
}

/// Replays `trace` against a fresh [`VecArena`]-backed heap.
pub fn replay(trace: &Trace, options: &DriverOptions) -> Result<ReplayOutcome, HarnessError> {
    let config = AllocatorConfig::default()
        .with_search(options.policy)
        .with_lifecycle_logging(options.lifecycle_logging);
    let mut heap = SegHeap::new(VecArena::with_limit(options.arena_limit), config);
    heap.init()
        .map_err(|source| HarnessError::Init { line: 0, source })?;

    let mut replayer = Replayer {
        records: heap
            .drain_lifecycle_logs()
            .into_iter()
            .map(|record| (0, record))
            .collect(),
        heap,
        slots: vec![None; trace.max_id().map_or(0, |id| id as usize + 1)],
        live_bytes: 0,
        peak_live_bytes: 0,
        heap_checks: 0,
        check_each_op: options.check_each_op,
    };

    let (mut allocs, mut frees, mut reallocs, mut callocs) = (0, 0, 0, 0);
    for &(line, op) in &trace.ops {
        match op {
            TraceOp::Alloc { .. } => allocs += 1,
            TraceOp::Free { .. } => frees += 1,
            TraceOp::Realloc { .. } => reallocs += 1,
            TraceOp::Calloc { .. } => callocs += 1,
        }
        let result = replayer.run(line, op);
        let drained = replayer.heap.drain_lifecycle_logs();
        replayer
            .records
            .extend(drained.into_iter().map(|record| (line, record)));
        result?;
        if replayer.check_each_op {
            replayer.heap_checks += 1;
            replayer
                .heap
                .check_heap()
                .map_err(|source| HarnessError::Corruption { line, source })?;
        }
    }

    let last_line = trace.ops.last().map_or(0, |(line, _)| *line);
    let summary = replayer
        .heap
        .check_heap()
        .map_err(|source| HarnessError::Corruption {
            line: last_line,
            source,
        })?;
    let stats = replayer.heap.stats();
    let final_arena_bytes = replayer.heap.arena().len();
    let peak_utilization = if final_arena_bytes == 0 {
        0.0
    } else {
        replayer.peak_live_bytes as f64 / final_arena_bytes as f64
    };

    let report = ReplayReport {
        trace_sha256: trace.sha256.clone(),
        policy: options.policy.as_str(),
        ops: trace.ops.len(),
        allocs,
        frees,
        reallocs,
        callocs,
        growths: stats.growths,
        splits: stats.splits,
        coalesces: stats.coalesces,
        exact_hits: stats.exact_hits,
        range_hits: stats.range_hits,
        peak_live_bytes: replayer.peak_live_bytes,
        final_arena_bytes,
        peak_utilization,
        heap_checks: replayer.heap_checks,
        final_live_blocks: summary.allocated_blocks,
        final_free_blocks: summary.free_blocks,
        final_free_bytes: summary.free_bytes,
        largest_free: summary.largest_free,
    };
    Ok(ReplayOutcome {
        report,
        records: replayer.records,
    })
}
