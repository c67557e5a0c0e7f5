//! Fault taxonomy for the guarded heap.
//!
//! Every variant is fatal when raised by an allocator operation; the
//! `Display` text is the diagnostic line written to stderr before abort.
//! Only [`HeapAllocator::check`](crate::HeapAllocator::check) hands a
//! fault back to the caller.

use std::fmt;

use crate::provenance::{BlockKind, Provenance};

/// The operation that was running when a fault was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardOp {
    Malloc,
    Calloc,
    Realloc,
    Free,
    Check,
}

impl GuardOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Malloc => "malloc",
            Self::Calloc => "calloc",
            Self::Realloc => "realloc",
            Self::Free => "free",
            Self::Check => "check",
        }
    }
}

impl fmt::Display for GuardOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A detected heap fault.
///
/// Addresses are stored as `usize` so the value stays `Send + Sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GuardFault {
    /// The raw heap could not satisfy a fresh allocation.
    #[error(
        "Failed to {op} {size} bytes (debug size={raw_size}) in {site}: errno={errno}"
    )]
    RawAllocFailed {
        op: GuardOp,
        size: usize,
        raw_size: usize,
        errno: i32,
        site: Provenance,
    },

    /// The raw heap could not resize an existing block.
    #[error(
        "Failed to realloc {size} bytes (debug size={raw_size}, initial address={old_ptr:#x}, previous size={old_size}) in {site}: errno={errno}"
    )]
    RawReallocFailed {
        size: usize,
        raw_size: usize,
        old_ptr: usize,
        old_size: usize,
        errno: i32,
        site: Provenance,
    },

    /// The marker in front of the payload is gone. Nothing else in the
    /// header is trusted, so only the checking site is reported.
    #[error(
        "Heap memory corruption ahead of block at {ptr:#x} detected before '{op}' call in {site}: header marker destroyed"
    )]
    HeaderCorrupted {
        op: GuardOp,
        ptr: usize,
        site: Provenance,
    },

    /// The marker after the payload is gone; the header is intact.
    #[error(
        "Heap memory overrun before '{op}' call in {site}: block of size={size} at {ptr:#x} (debug size={raw_size}), allocated in {origin} by {}",
        .kind.map_or("?", BlockKind::symbol)
    )]
    FooterCorrupted {
        op: GuardOp,
        ptr: usize,
        size: usize,
        raw_size: usize,
        /// `None` when the kind byte in the header is not a known kind.
        kind: Option<BlockKind>,
        origin: Provenance,
        site: Provenance,
    },
}

impl GuardFault {
    /// Operation during which the fault surfaced.
    #[must_use]
    pub const fn op(&self) -> GuardOp {
        match self {
            Self::RawAllocFailed { op, .. }
            | Self::HeaderCorrupted { op, .. }
            | Self::FooterCorrupted { op, .. } => *op,
            Self::RawReallocFailed { .. } => GuardOp::Realloc,
        }
    }

    /// True for marker mismatches, false for raw heap exhaustion.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::HeaderCorrupted { .. } | Self::FooterCorrupted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Provenance {
        Provenance::new("main.c", "main", 7)
    }

    #[test]
    fn footer_message_carries_origin_and_sizes() {
        let fault = GuardFault::FooterCorrupted {
            op: GuardOp::Free,
            ptr: 0x1000,
            size: 16,
            raw_size: 88,
            kind: Some(BlockKind::Allocate),
            origin: Provenance::new("alloc.c", "make_buf", 3),
            site: site(),
        };
        let msg = fault.to_string();
        assert!(msg.contains("Heap memory overrun before 'free'"), "{msg}");
        assert!(msg.contains("size=16"), "{msg}");
        assert!(msg.contains("debug size=88"), "{msg}");
        assert!(msg.contains("at 0x1000"), "{msg}");
        assert!(msg.contains("allocated in alloc.c:make_buf@3 by malloc"), "{msg}");
        assert!(fault.is_corruption());
        assert_eq!(fault.op(), GuardOp::Free);
    }

    #[test]
    fn unknown_kind_prints_question_mark() {
        let fault = GuardFault::FooterCorrupted {
            op: GuardOp::Realloc,
            ptr: 0x1000,
            size: 8,
            raw_size: 80,
            kind: None,
            origin: Provenance::new("alloc.c", "make_buf", 3),
            site: site(),
        };
        let msg = fault.to_string();
        assert!(msg.ends_with("allocated in alloc.c:make_buf@3 by ?"), "{msg}");
    }

    #[test]
    fn header_message_is_minimal() {
        let fault = GuardFault::HeaderCorrupted {
            op: GuardOp::Realloc,
            ptr: 0x2000,
            site: site(),
        };
        let msg = fault.to_string();
        assert!(msg.contains("ahead of block at 0x2000"), "{msg}");
        assert!(msg.contains("'realloc'"), "{msg}");
        assert!(!msg.contains("size="), "{msg}");
    }

    #[test]
    fn exhaustion_is_not_corruption() {
        let fault = GuardFault::RawAllocFailed {
            op: GuardOp::Calloc,
            size: 64,
            raw_size: 136,
            errno: 12,
            site: site(),
        };
        assert!(!fault.is_corruption());
        assert_eq!(
            fault.to_string(),
            "Failed to calloc 64 bytes (debug size=136) in main.c:main@7: errno=12"
        );

        let realloc = GuardFault::RawReallocFailed {
            size: 32,
            raw_size: 104,
            old_ptr: 0x40,
            old_size: 8,
            errno: 12,
            site: site(),
        };
        assert_eq!(realloc.op(), GuardOp::Realloc);
        assert!(realloc.to_string().contains("initial address=0x40"));
    }
}
