//! Tooling around the segalloc engine.
//!
//! This crate provides:
//! - Trace parsing: the classic allocator-driver script format
//! - Replay: run a trace against a fresh heap, verifying payload integrity
//!   and heap consistency after every operation
//! - Storm generation: seeded random traces for soak runs
//! - Structured logging: JSONL export and validation of lifecycle records

#![forbid(unsafe_code)]

pub mod driver;
pub mod error;
pub mod structured_log;
pub mod trace;

pub use driver::{DriverOptions, ReplayOutcome, ReplayReport, replay};
pub use error::HarnessError;
pub use trace::{Trace, TraceOp, TraceParseError, generate_storm, parse_trace};
