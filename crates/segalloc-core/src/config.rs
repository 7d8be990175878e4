//! Allocator configuration.
//!
//! The search policy decides how the allocation engine advances through the
//! size classes after a miss:
//! - `skip-sparse` (default): after the first empty exact-size class, jump
//!   two classes ahead once, then advance one class at a time.
//! - `sequential`: always advance one class at a time.

/// Class-advancement policy of the allocation search.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchPolicy {
    /// One-time skip of two classes after the first empty exact class.
    #[default]
    SkipSparse,
    /// Uniform single-class advancement.
    Sequential,
}

impl SearchPolicy {
    /// Parse from string (case-insensitive). Unknown values fall back to the
    /// default policy.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "linear" | "uniform" | "step" => Self::Sequential,
            _ => Self::SkipSparse,
        }
    }

    /// Stable name used in logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SkipSparse => "skip-sparse",
            Self::Sequential => "sequential",
        }
    }
}

/// Per-heap configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
    pub search: SearchPolicy,
    /// Record an [`AllocatorLogRecord`](crate::AllocatorLogRecord) per
    /// engine decision. Must stay off when the heap backs the process
    /// allocator, since recording allocates. An undrained log is capped at
    /// [`LIFECYCLE_LOG_CAPACITY`](crate::malloc::LIFECYCLE_LOG_CAPACITY).
    pub lifecycle_logging: bool,
    /// Confirm on every release and resize that the pointer names a block
    /// start by walking the heap. Linear in the number of blocks. Without it
    /// a forged allocated header inside a live payload is not detected.
    pub verify_release: bool,
}

impl AllocatorConfig {
    /// Configuration with lifecycle recording disabled.
    #[must_use]
    pub const fn quiet() -> Self {
        Self {
            search: SearchPolicy::SkipSparse,
            lifecycle_logging: false,
            verify_release: false,
        }
    }

    #[must_use]
    pub const fn with_search(mut self, search: SearchPolicy) -> Self {
        self.search = search;
        self
    }

    #[must_use]
    pub const fn with_lifecycle_logging(mut self, enabled: bool) -> Self {
        self.lifecycle_logging = enabled;
        self
    }

    #[must_use]
    pub const fn with_release_verification(mut self, enabled: bool) -> Self {
        self.verify_release = enabled;
        self
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            search: SearchPolicy::default(),
            lifecycle_logging: true,
            verify_release: false,
        }
    }
}
