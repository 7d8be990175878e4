//! Allocation trace scripts.
//!
//! One operation per line, ids name allocation slots:
//!
//! ```text
//! # comment
//! a <id> <bytes>       allocate
//! f <id>               free
//! r <id> <bytes>       realloc
//! c <id> <n> <size>    calloc
//! ```

use std::fmt::Write as _;

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    Alloc { id: u32, size: usize },
    Free { id: u32 },
    Realloc { id: u32, size: usize },
    Calloc { id: u32, count: usize, size: usize },
}

impl TraceOp {
    #[must_use]
    pub const fn id(self) -> u32 {
        match self {
            Self::Alloc { id, .. }
            | Self::Free { id }
            | Self::Realloc { id, .. }
            | Self::Calloc { id, .. } => id,
        }
    }

    /// C symbol the operation exercises.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Alloc { .. } => "malloc",
            Self::Free { .. } => "free",
            Self::Realloc { .. } => "realloc",
            Self::Calloc { .. } => "calloc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceParseError {
    #[error("line {line}: unknown operation '{op}'")]
    UnknownOp { line: usize, op: String },
    #[error("line {line}: missing {field}")]
    MissingField { line: usize, field: &'static str },
    #[error("line {line}: invalid number '{text}' for {field}")]
    BadNumber {
        line: usize,
        field: &'static str,
        text: String,
    },
    #[error("line {line}: unexpected trailing token '{text}'")]
    Trailing { line: usize, text: String },
}

/// A parsed trace. Each op keeps its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub ops: Vec<(usize, TraceOp)>,
    /// SHA-256 of the source text, lowercase hex.
    pub sha256: String,
}

impl Trace {
    /// Largest id used, if any.
    #[must_use]
    pub fn max_id(&self) -> Option<u32> {
        self.ops.iter().map(|(_, op)| op.id()).max()
    }

    /// Renders the trace back to script text.
    #[must_use]
    pub fn to_text(&self) -> String {
        render(self.ops.iter().map(|(_, op)| *op))
    }
}

fn render(ops: impl Iterator<Item = TraceOp>) -> String {
    let mut out = String::new();
    for op in ops {
        // Writing to a String cannot fail.
        let _ = match op {
            TraceOp::Alloc { id, size } => writeln!(out, "a {id} {size}"),
            TraceOp::Free { id } => writeln!(out, "f {id}"),
            TraceOp::Realloc { id, size } => writeln!(out, "r {id} {size}"),
            TraceOp::Calloc { id, count, size } => writeln!(out, "c {id} {count} {size}"),
        };
    }
    out
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn number<T: std::str::FromStr>(
    tokens: &mut std::str::SplitWhitespace<'_>,
    line: usize,
    field: &'static str,
) -> Result<T, TraceParseError> {
    let text = tokens
        .next()
        .ok_or(TraceParseError::MissingField { line, field })?;
    text.parse().map_err(|_| TraceParseError::BadNumber {
        line,
        field,
        text: text.to_string(),
    })
}

/// Parses trace text. Blank lines and `#` comments are skipped.
pub fn parse_trace(text: &str) -> Result<Trace, TraceParseError> {
    let mut ops = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        let mut tokens = content.split_whitespace();
        let Some(kind) = tokens.next() else {
            continue;
        };
        let op = match kind {
            "a" => TraceOp::Alloc {
                id: number(&mut tokens, line, "id")?,
                size: number(&mut tokens, line, "size")?,
            },
            "f" => TraceOp::Free {
                id: number(&mut tokens, line, "id")?,
            },
            "r" => TraceOp::Realloc {
                id: number(&mut tokens, line, "id")?,
                size: number(&mut tokens, line, "size")?,
            },
            "c" => TraceOp::Calloc {
                id: number(&mut tokens, line, "id")?,
                count: number(&mut tokens, line, "count")?,
                size: number(&mut tokens, line, "size")?,
            },
            other => {
                return Err(TraceParseError::UnknownOp {
                    line,
                    op: other.to_string(),
                });
            }
        };
        if let Some(extra) = tokens.next() {
            return Err(TraceParseError::Trailing {
                line,
                text: extra.to_string(),
            });
        }
        ops.push((line, op));
    }
    Ok(Trace {
        ops,
        sha256: sha256_hex(text.as_bytes()),
    })
}

#[derive(Debug, Clone, Copy)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift.
        Self {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound.max(1) as u64) as usize
    }
}

/// Seeded random workload of `ops` operations over `slots` ids, sizes up to
/// `max_size`. Every id still live at the end is freed, so the trace leaves
/// the heap empty.
#[must_use]
pub fn generate_storm(seed: u64, ops: usize, slots: u32, max_size: usize) -> Trace {
    let mut rng = XorShift64::new(seed);
    let slots = slots.max(1);
    let max_size = max_size.max(1);
    let mut live = vec![false; slots as usize];
    let mut script = Vec::with_capacity(ops + slots as usize);

    let size = |rng: &mut XorShift64| {
        // Mostly small requests.
        match rng.below(8) {
            0..=4 => 1 + rng.below(max_size.min(256)),
            5 | 6 => 1 + rng.below(max_size.min(4096)),
            _ => 1 + rng.below(max_size),
        }
    };

    for _ in 0..ops {
        let id = rng.below(slots as usize) as u32;
        let op = if live[id as usize] {
            match rng.below(4) {
                0 => TraceOp::Realloc {
                    id,
                    size: size(&mut rng),
                },
                _ => TraceOp::Free { id },
            }
        } else if rng.below(5) == 0 {
            let count = 1 + rng.below(16);
            TraceOp::Calloc {
                id,
                count,
                size: size(&mut rng).div_ceil(count),
            }
        } else {
            TraceOp::Alloc {
                id,
                size: size(&mut rng),
            }
        };
        live[id as usize] = !matches!(op, TraceOp::Free { .. });
        script.push(op);
    }
    for (id, _) in live.iter().enumerate().filter(|(_, live)| **live) {
        script.push(TraceOp::Free { id: id as u32 });
    }

    let text = render(script.iter().copied());
    Trace {
        sha256: sha256_hex(text.as_bytes()),
        ops: script
            .into_iter()
            .enumerate()
            .map(|(index, op)| (index + 1, op))
            .collect(),
    }
}

/// Parses a decimal or `0x`-prefixed integer, ignoring `_` separators.
pub fn parse_u64_loose(text: &str) -> Option<u64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
    match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => cleaned.parse().ok(),
    }
}
