//! ABI layer for the debug allocation entry points.
//!
//! Each `gm_debug_*` call records its C call site and dispatches to the
//! process-wide [`HeapAllocator`]. In guarded mode corruption and raw heap
//! exhaustion abort with a diagnostic on stderr; in passthrough mode the
//! calls behave exactly like the libc functions they wrap.

use std::ffi::{c_char, c_int, c_void};

use guardmalloc_core::{GuardFault, GuardMode, HeapAllocator, Provenance, guard_mode, system_allocator};

use crate::util::site;

/// `gm_check` result: block intact, or nothing to check.
pub const GM_CHECK_OK: c_int = 0;
/// `gm_check` result: the marker in front of the payload was overwritten.
pub const GM_CHECK_HEADER_CORRUPT: c_int = 1;
/// `gm_check` result: the marker behind the payload was overwritten.
pub const GM_CHECK_FOOTER_CORRUPT: c_int = 2;

#[inline]
fn configured_mode() -> GuardMode {
    if cfg!(feature = "passthrough") {
        GuardMode::Passthrough
    } else {
        guard_mode()
    }
}

/// The implementation every entry point in this process dispatches to.
#[must_use]
pub fn active_allocator() -> &'static (dyn HeapAllocator + Sync) {
    system_allocator(configured_mode())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn gm_debug_malloc(
    file: *const c_char,
    function: *const c_char,
    line: c_int,
    size: usize,
) -> *mut c_void {
    // SAFETY: header macros pass string literals.
    let site = unsafe { site(file, function, line) };
    // SAFETY: size bound is the C caller's responsibility, as with malloc.
    unsafe { active_allocator().allocate(size, site).cast() }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn gm_debug_calloc(
    file: *const c_char,
    function: *const c_char,
    line: c_int,
    nmemb: usize,
    size: usize,
) -> *mut c_void {
    // SAFETY: header macros pass string literals.
    let site = unsafe { site(file, function, line) };
    // SAFETY: as in gm_debug_malloc.
    unsafe { active_allocator().allocate_zeroed(nmemb, size, site).cast() }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn gm_debug_realloc(
    file: *const c_char,
    function: *const c_char,
    line: c_int,
    ptr: *mut c_void,
    size: usize,
) -> *mut c_void {
    // SAFETY: header macros pass string literals.
    let site = unsafe { site(file, function, line) };
    // SAFETY: `ptr` is null or came from gm_debug_* in this process.
    unsafe { active_allocator().reallocate(ptr.cast(), size, site).cast() }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn gm_debug_free(
    file: *const c_char,
    function: *const c_char,
    line: c_int,
    ptr: *mut c_void,
) {
    // SAFETY: header macros pass string literals.
    let site = unsafe { site(file, function, line) };
    // SAFETY: `ptr` is null or came from gm_debug_* in this process.
    unsafe { active_allocator().free(ptr.cast(), site) }
}

/// Non-fatal marker check of a live block.
///
/// Returns [`GM_CHECK_OK`] for intact blocks, for null, and always in
/// passthrough mode.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn gm_check(ptr: *const c_void) -> c_int {
    let site = Provenance::new("<gm_check>", "gm_check", 0);
    // SAFETY: `ptr` is null or came from gm_debug_* in this process.
    match unsafe { active_allocator().check(ptr.cast(), site) } {
        Ok(_) => GM_CHECK_OK,
        Err(GuardFault::HeaderCorrupted { .. }) => GM_CHECK_HEADER_CORRUPT,
        Err(_) => GM_CHECK_FOOTER_CORRUPT,
    }
}

/// 1 when blocks carry markers, 0 in passthrough mode.
#[unsafe(no_mangle)]
pub extern "C" fn gm_is_guarded() -> c_int {
    c_int::from(active_allocator().is_guarded())
}

/// Sum of payload bytes currently handed out by the guarded heap.
#[unsafe(no_mangle)]
pub extern "C" fn gm_live_bytes() -> u64 {
    guardmalloc_core::system_stats().snapshot().live_bytes
}
