//! `#[global_allocator]` adapter.
//!
//! ```no_run
//! use guardmalloc_core::GuardedGlobal;
//!
//! #[global_allocator]
//! static GLOBAL: GuardedGlobal = GuardedGlobal::new();
//! ```
//!
//! Layouts whose alignment exceeds [`RAW_ALIGN`] cannot be served from a
//! `malloc` block plus header, so they go straight to [`System`] unguarded.
//! `dealloc` and `realloc` receive the same layout, so the routing is stable
//! for the life of each block.

use std::alloc::{GlobalAlloc, Layout, System};

use crate::allocator::{GuardedAllocator, HeapAllocator};
use crate::block::RAW_ALIGN;
use crate::provenance::Provenance;
use crate::raw::LibcHeap;
use crate::stats::GuardStats;

/// Recorded as the origin of every block the global allocator hands out.
pub const GLOBAL_SITE: Provenance = Provenance::new("<global_alloc>", "GlobalAlloc", 0);

pub struct GuardedGlobal {
    heap: GuardedAllocator<LibcHeap>,
}

impl GuardedGlobal {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heap: GuardedAllocator::new(LibcHeap),
        }
    }

    #[must_use]
    pub fn stats(&self) -> &GuardStats {
        self.heap.stats()
    }

    /// The guarded heap behind this adapter.
    #[must_use]
    pub fn heap(&self) -> &GuardedAllocator<LibcHeap> {
        &self.heap
    }

    #[inline]
    fn bypass(layout: Layout) -> bool {
        layout.align() > RAW_ALIGN
    }
}

impl Default for GuardedGlobal {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: guarded blocks come from the platform malloc, which aligns to
// RAW_ALIGN, and HEADER_SIZE is a multiple of RAW_ALIGN; stricter layouts are
// delegated to System for their whole lifetime.
unsafe impl GlobalAlloc for GuardedGlobal {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if Self::bypass(layout) {
            // SAFETY: forwarded contract.
            return unsafe { System.alloc(layout) };
        }
        // SAFETY: Layout caps size at isize::MAX, far from wrapping.
        unsafe { self.heap.allocate(layout.size(), GLOBAL_SITE) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if Self::bypass(layout) {
            // SAFETY: forwarded contract.
            return unsafe { System.alloc_zeroed(layout) };
        }
        // SAFETY: as in `alloc`.
        unsafe { self.heap.allocate_zeroed(1, layout.size(), GLOBAL_SITE) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if Self::bypass(layout) {
            // SAFETY: the block came from System.alloc with this layout.
            return unsafe { System.dealloc(ptr, layout) };
        }
        // SAFETY: the block came from `self.heap`.
        unsafe { self.heap.free(ptr, GLOBAL_SITE) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if Self::bypass(layout) {
            // SAFETY: forwarded contract.
            return unsafe { System.realloc(ptr, layout, new_size) };
        }
        // SAFETY: the block came from `self.heap`; new_size obeys the Layout cap.
        unsafe { self.heap.reallocate(ptr, new_size, GLOBAL_SITE) }
    }
}
