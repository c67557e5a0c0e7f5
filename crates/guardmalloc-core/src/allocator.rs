//! The allocator abstraction and its two implementations.
//!
//! Calling code depends on [`HeapAllocator`] and is handed either a
//! [`GuardedAllocator`] or a [`PassthroughAllocator`] at composition time.
//! Nothing rebinds the process-wide `malloc` symbols.

use crate::block::{self, BlockInfo};
use crate::config::GuardMode;
use crate::diag;
use crate::fault::{GuardFault, GuardOp};
use crate::provenance::{BlockKind, Provenance};
use crate::raw::{LibcHeap, RawHeap};
use crate::stats::GuardStats;

/// The four heap operations, each tagged with the call site.
///
/// # Known limitations
///
/// Size arithmetic (`count * size`, and the guarded layer's
/// `header + size + footer`) wraps instead of failing. A wrapped size
/// produces a raw block that is too small, so callers must not pass sizes
/// anywhere near `usize::MAX`; this is part of each method's safety contract.
pub trait HeapAllocator {
    /// Returns a block of `size` bytes. Never returns null from the guarded
    /// implementation: raw heap exhaustion aborts the process.
    ///
    /// # Safety
    ///
    /// `size` plus the allocator's overhead must not overflow `usize`. The
    /// result must be released through this same allocator.
    unsafe fn allocate(&self, size: usize, site: Provenance) -> *mut u8;

    /// Returns `count * size` zeroed bytes.
    ///
    /// # Safety
    ///
    /// `count * size` plus overhead must not overflow `usize`.
    unsafe fn allocate_zeroed(&self, count: usize, size: usize, site: Provenance) -> *mut u8;

    /// Resizes `ptr` to `new_size` bytes, or allocates when `ptr` is null.
    /// The old pointer is invalid afterwards, even if the address is reused.
    ///
    /// # Safety
    ///
    /// `ptr` is null or a live pointer from this allocator; `new_size` obeys
    /// the same bound as in [`HeapAllocator::allocate`].
    unsafe fn reallocate(&self, ptr: *mut u8, new_size: usize, site: Provenance) -> *mut u8;

    /// Releases `ptr`. Null is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` is null or a live pointer from this allocator, and is never used
    /// again.
    unsafe fn free(&self, ptr: *mut u8, site: Provenance);

    /// Non-fatal validation of a live block. Unguarded implementations have
    /// no metadata and report `Ok(None)`, as does a null pointer.
    ///
    /// # Safety
    ///
    /// `ptr` is null or a live pointer from this allocator.
    unsafe fn check(&self, ptr: *const u8, site: Provenance) -> Result<Option<BlockInfo>, GuardFault> {
        let _ = (ptr, site);
        Ok(None)
    }

    /// Whether blocks carry markers and are validated.
    fn is_guarded(&self) -> bool;
}

/// [`HeapAllocator`] calls that take the call site from `#[track_caller]`.
pub trait HeapAllocatorExt: HeapAllocator {
    /// # Safety
    /// As [`HeapAllocator::allocate`].
    #[track_caller]
    unsafe fn malloc(&self, size: usize) -> *mut u8 {
        // SAFETY: forwarded contract.
        unsafe { self.allocate(size, Provenance::caller()) }
    }

    /// # Safety
    /// As [`HeapAllocator::allocate_zeroed`].
    #[track_caller]
    unsafe fn calloc(&self, count: usize, size: usize) -> *mut u8 {
        // SAFETY: forwarded contract.
        unsafe { self.allocate_zeroed(count, size, Provenance::caller()) }
    }

    /// # Safety
    /// As [`HeapAllocator::reallocate`].
    #[track_caller]
    unsafe fn realloc(&self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        // SAFETY: forwarded contract.
        unsafe { self.reallocate(ptr, new_size, Provenance::caller()) }
    }

    /// Named `release` so it cannot be confused with [`HeapAllocator::free`].
    ///
    /// # Safety
    /// As [`HeapAllocator::free`].
    #[track_caller]
    unsafe fn release(&self, ptr: *mut u8) {
        // SAFETY: forwarded contract.
        unsafe { self.free(ptr, Provenance::caller()) }
    }
}

impl<A: HeapAllocator + ?Sized> HeapAllocatorExt for A {}

// ---------------------------------------------------------------------------
// Guarded
// ---------------------------------------------------------------------------

/// Wraps every block in header/footer markers and validates them on
/// reallocate and free. Detected corruption aborts the process.
///
/// Holds no mutable block state; callers serialize access to blocks the
/// same way they would with the raw heap.
#[derive(Debug)]
pub struct GuardedAllocator<R: RawHeap = LibcHeap> {
    raw: R,
    stats: GuardStats,
}

impl<R: RawHeap> GuardedAllocator<R> {
    #[must_use]
    pub const fn new(raw: R) -> Self {
        Self {
            raw,
            stats: GuardStats::new(),
        }
    }

    #[must_use]
    pub fn raw_heap(&self) -> &R {
        &self.raw
    }

    #[must_use]
    pub fn stats(&self) -> &GuardStats {
        &self.stats
    }

    /// Validates the block behind `ptr`, aborting on any marker mismatch.
    ///
    /// # Safety
    ///
    /// `ptr` is a non-null pointer previously returned by this allocator.
    pub unsafe fn validate(&self, ptr: *const u8, op: GuardOp, site: Provenance) -> BlockInfo {
        // SAFETY: forwarded contract; header bytes precede every payload we return.
        match unsafe { block::inspect(ptr, op, site) } {
            Ok(info) => {
                self.stats.on_check_passed();
                info
            }
            Err(fault) => diag::fatal(fault),
        }
    }
}

impl<R: RawHeap> HeapAllocator for GuardedAllocator<R> {
    unsafe fn allocate(&self, size: usize, site: Provenance) -> *mut u8 {
        let raw_size = block::raw_size_for(size);
        // SAFETY: plain raw heap request.
        let raw = unsafe { self.raw.malloc(raw_size) };
        if raw.is_null() {
            diag::fatal(GuardFault::RawAllocFailed {
                op: GuardOp::Malloc,
                size,
                raw_size,
                errno: self.raw.last_errno(),
                site,
            });
        }
        // SAFETY: `raw` spans raw_size_for(size) bytes.
        let payload = unsafe { block::seal(raw, size, BlockKind::Allocate, site) };
        self.stats.on_allocate(size);
        diag::trace(format_args!("malloc {size} bytes at {payload:p} ({site})"));
        payload
    }

    unsafe fn allocate_zeroed(&self, count: usize, size: usize, site: Provenance) -> *mut u8 {
        let total = count.wrapping_mul(size);
        let raw_size = block::raw_size_for(total);
        // SAFETY: plain raw heap request; the whole raw block comes back zeroed.
        let raw = unsafe { self.raw.calloc(raw_size, 1) };
        if raw.is_null() {
            diag::fatal(GuardFault::RawAllocFailed {
                op: GuardOp::Calloc,
                size: total,
                raw_size,
                errno: self.raw.last_errno(),
                site,
            });
        }
        // SAFETY: `raw` spans raw_size_for(total) bytes; sealing only touches
        // header and footer, the payload stays zero.
        let payload = unsafe { block::seal(raw, total, BlockKind::AllocateZeroed, site) };
        self.stats.on_allocate_zeroed(total);
        diag::trace(format_args!(
            "calloc {count} x {size} bytes at {payload:p} ({site})"
        ));
        payload
    }

    unsafe fn reallocate(&self, ptr: *mut u8, new_size: usize, site: Provenance) -> *mut u8 {
        let (old_raw, old_size) = if ptr.is_null() {
            (std::ptr::null_mut(), 0)
        } else {
            // SAFETY: caller passes a live pointer from this allocator.
            let info = unsafe { self.validate(ptr, GuardOp::Realloc, site) };
            (info.raw, info.payload_size)
        };

        let raw_size = block::raw_size_for(new_size);
        // SAFETY: `old_raw` is null or the validated raw block.
        let raw = unsafe { self.raw.realloc(old_raw, raw_size) };
        if raw.is_null() {
            diag::fatal(GuardFault::RawReallocFailed {
                size: new_size,
                raw_size,
                old_ptr: ptr as usize,
                old_size,
                errno: self.raw.last_errno(),
                site,
            });
        }
        // SAFETY: `raw` spans raw_size_for(new_size) bytes; the raw heap kept
        // the payload bytes up to min(old_size, new_size).
        let payload = unsafe { block::seal(raw, new_size, BlockKind::Reallocate, site) };
        self.stats.on_reallocate(old_size, new_size);
        diag::trace(format_args!(
            "realloc {ptr:p} ({old_size} bytes) to {new_size} bytes at {payload:p} ({site})"
        ));
        payload
    }

    unsafe fn free(&self, ptr: *mut u8, site: Provenance) {
        if ptr.is_null() {
            return;
        }
        // SAFETY: caller passes a live pointer from this allocator.
        let info = unsafe { self.validate(ptr, GuardOp::Free, site) };
        // SAFETY: validated raw block from this heap.
        unsafe { self.raw.free(info.raw) };
        self.stats.on_free(info.payload_size);
        diag::trace(format_args!(
            "free {} bytes at {ptr:p}, allocated in {} by {} ({site})",
            info.payload_size,
            info.origin,
            info.kind.map_or("?", BlockKind::symbol),
        ));
    }

    unsafe fn check(&self, ptr: *const u8, site: Provenance) -> Result<Option<BlockInfo>, GuardFault> {
        if ptr.is_null() {
            return Ok(None);
        }
        // SAFETY: caller passes a live pointer from this allocator.
        let info = unsafe { block::inspect(ptr, GuardOp::Check, site) }?;
        self.stats.on_check_passed();
        Ok(Some(info))
    }

    fn is_guarded(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Passthrough
// ---------------------------------------------------------------------------

/// Forwards every call to the raw heap: no header, no footer, no checks,
/// and a null result on exhaustion.
#[derive(Debug, Default)]
pub struct PassthroughAllocator<R: RawHeap = LibcHeap> {
    raw: R,
}

impl<R: RawHeap> PassthroughAllocator<R> {
    #[must_use]
    pub const fn new(raw: R) -> Self {
        Self { raw }
    }
}

impl<R: RawHeap> HeapAllocator for PassthroughAllocator<R> {
    unsafe fn allocate(&self, size: usize, _site: Provenance) -> *mut u8 {
        // SAFETY: forwarded contract.
        unsafe { self.raw.malloc(size) }
    }

    unsafe fn allocate_zeroed(&self, count: usize, size: usize, _site: Provenance) -> *mut u8 {
        // SAFETY: forwarded contract.
        unsafe { self.raw.calloc(count, size) }
    }

    unsafe fn reallocate(&self, ptr: *mut u8, new_size: usize, _site: Provenance) -> *mut u8 {
        // SAFETY: forwarded contract.
        unsafe { self.raw.realloc(ptr, new_size) }
    }

    unsafe fn free(&self, ptr: *mut u8, _site: Provenance) {
        // SAFETY: forwarded contract.
        unsafe { self.raw.free(ptr) }
    }

    fn is_guarded(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Process-wide instances
// ---------------------------------------------------------------------------

static SYSTEM_GUARDED: GuardedAllocator<LibcHeap> = GuardedAllocator::new(LibcHeap);
static SYSTEM_PASSTHROUGH: PassthroughAllocator<LibcHeap> = PassthroughAllocator::new(LibcHeap);

/// The libc-backed allocator for `mode`.
///
/// Both instances live for the whole process; pick one per process (see
/// [`guard_mode`](crate::guard_mode)) and never mix their blocks.
#[must_use]
pub fn system_allocator(mode: GuardMode) -> &'static (dyn HeapAllocator + Sync) {
    if mode.validation_enabled() {
        &SYSTEM_GUARDED
    } else {
        &SYSTEM_PASSTHROUGH
    }
}

/// Counters of the process-wide guarded instance.
#[must_use]
pub fn system_stats() -> &'static GuardStats {
    SYSTEM_GUARDED.stats()
}
