//! # guardmalloc-core
//!
//! Debug heap wrapper that surrounds every allocation with a header and a
//! footer carrying an 8-byte marker, and records where each live block came
//! from.
//!
//! # Block layout
//!
//! ```text
//! raw ─► ┌──────────────────────────────┬────────┐
//!        │ BlockMeta (site, size, kind) │ MARKER │  HEADER_SIZE bytes
//!        ├──────────────────────────────┴────────┤
//!        │ payload (what the caller sees)         │  size bytes
//!        ├────────┬───────────────────────────────┘
//!        │ MARKER │                                  FOOTER_SIZE bytes
//!        └────────┘
//! ```
//!
//! The payload pointer is always `raw + HEADER_SIZE`. Reallocate and free
//! check both markers before touching the raw block; a mismatch writes one
//! diagnostic line to stderr and aborts the process.
//!
//! # Composition
//!
//! Calling code depends on [`HeapAllocator`]. [`GuardedAllocator`] is the
//! instrumented implementation, [`PassthroughAllocator`] forwards straight to
//! the raw heap. Both sit on top of a [`RawHeap`] (by default [`LibcHeap`]).
//! [`GuardedGlobal`] installs the guarded heap as a Rust `#[global_allocator]`.
//!
//! ```no_run
//! use guardmalloc_core::{GuardedAllocator, HeapAllocatorExt, LibcHeap};
//!
//! static HEAP: GuardedAllocator<LibcHeap> = GuardedAllocator::new(LibcHeap);
//!
//! unsafe {
//!     let p = HEAP.malloc(16);
//!     p.write_bytes(0x5A, 16);
//!     HEAP.release(p);
//! }
//! ```

pub mod allocator;
pub mod block;
pub mod config;
pub mod diag;
pub mod fault;
pub mod global;
pub mod provenance;
pub mod raw;
pub mod stats;

pub use allocator::{
    GuardedAllocator, HeapAllocator, HeapAllocatorExt, PassthroughAllocator, system_allocator,
    system_stats,
};
pub use block::{BlockInfo, FOOTER_SIZE, HEADER_SIZE, MARKER, MARKER_LEN, RAW_ALIGN};
pub use config::{GuardMode, guard_mode, trace_enabled};
pub use fault::{GuardFault, GuardOp};
pub use global::GuardedGlobal;
pub use provenance::{BlockKind, Provenance};
pub use raw::{LibcHeap, RawHeap};
pub use stats::{GuardStats, GuardStatsSnapshot};
