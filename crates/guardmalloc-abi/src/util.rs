use std::ffi::{CStr, c_char, c_int};

use guardmalloc_core::Provenance;
use guardmalloc_core::provenance::NOT_AVAILABLE;

/// Borrow a C string for the rest of the process.
///
/// Null and non-UTF-8 strings become `"N/A"`.
///
/// # Safety
///
/// `ptr` is null or a NUL-terminated string that is never freed or modified,
/// which holds for the `__FILE__`/`__func__` literals the header macros pass.
pub(crate) unsafe fn static_str(ptr: *const c_char) -> &'static str {
    if ptr.is_null() {
        return NOT_AVAILABLE;
    }
    // SAFETY: non-null, NUL-terminated, static per the caller contract.
    let s: &'static CStr = unsafe { CStr::from_ptr(ptr) };
    s.to_str().unwrap_or(NOT_AVAILABLE)
}

/// Call-site record from the three leading arguments of every `gm_debug_*`.
///
/// # Safety
///
/// As [`static_str`] for both strings.
pub(crate) unsafe fn site(file: *const c_char, function: *const c_char, line: c_int) -> Provenance {
    // SAFETY: forwarded contract.
    let (file, function) = unsafe { (static_str(file), static_str(function)) };
    Provenance::new(file, function, u32::try_from(line).unwrap_or(0))
}
