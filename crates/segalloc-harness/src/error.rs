//! Harness error type.

use segalloc_core::AllocError;
use thiserror::Error;

use crate::trace::TraceParseError;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Parse(#[from] TraceParseError),
    #[error("line {line}: heap init failed: {source}")]
    Init { line: usize, source: AllocError },
    #[error("line {line}: {op} of id {id} failed: {source}")]
    Alloc {
        line: usize,
        op: &'static str,
        id: u32,
        source: AllocError,
    },
    #[error("line {line}: id {id} was never allocated")]
    UnknownId { line: usize, id: u32 },
    #[error("line {line}: id {id} already holds a live block")]
    IdInUse { line: usize, id: u32 },
    #[error("line {line}: payload of id {id} corrupted at byte {offset}")]
    Integrity { line: usize, id: u32, offset: usize },
    #[error("line {line}: id {id} got misaligned payload {ptr:#x}")]
    Misaligned { line: usize, id: u32, ptr: usize },
    #[error("line {line}: heap check failed: {source}")]
    Corruption { line: usize, source: AllocError },
}

impl HarnessError {
    /// Process exit code used by the CLI.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) | Self::Json(_) => 2,
            Self::Parse(_) | Self::UnknownId { .. } | Self::IdInUse { .. } => 3,
            Self::Init { .. } | Self::Alloc { .. } => 4,
            Self::Integrity { .. } | Self::Misaligned { .. } | Self::Corruption { .. } => 5,
        }
    }
}
