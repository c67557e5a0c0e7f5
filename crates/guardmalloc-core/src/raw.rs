//! The underlying system allocator seam.

use std::ffi::c_void;

/// A C-style heap: the four calls the guarded layer delegates to.
///
/// # Safety
///
/// Implementations must honour the C allocator contract: a non-null result
/// is valid for reads and writes of the requested size and aligned to
/// [`RAW_ALIGN`](crate::RAW_ALIGN); `calloc` memory is zero-filled;
/// `realloc(null, n)` behaves as `malloc(n)` and preserves contents up to the
/// smaller size; `free(null)` is a no-op.
pub unsafe trait RawHeap {
    /// # Safety
    /// The result must eventually go back through `free` or `realloc`.
    unsafe fn malloc(&self, size: usize) -> *mut u8;

    /// # Safety
    /// As [`RawHeap::malloc`].
    unsafe fn calloc(&self, count: usize, size: usize) -> *mut u8;

    /// # Safety
    /// `ptr` is null or a live block from this heap.
    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8;

    /// # Safety
    /// `ptr` is null or a live block from this heap.
    unsafe fn free(&self, ptr: *mut u8);

    /// `errno` left behind by the last failed call on this thread.
    fn last_errno(&self) -> i32 {
        std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
    }
}

/// The platform `malloc` family, through `libc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcHeap;

// SAFETY: forwards to the platform allocator, which is the contract.
unsafe impl RawHeap for LibcHeap {
    #[inline]
    unsafe fn malloc(&self, size: usize) -> *mut u8 {
        // SAFETY: direct call to the libc allocator.
        unsafe { libc::malloc(size).cast() }
    }

    #[inline]
    unsafe fn calloc(&self, count: usize, size: usize) -> *mut u8 {
        // SAFETY: direct call to the libc allocator.
        unsafe { libc::calloc(count, size).cast() }
    }

    #[inline]
    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        // SAFETY: caller passes null or a live libc block.
        unsafe { libc::realloc(ptr.cast::<c_void>(), size).cast() }
    }

    #[inline]
    unsafe fn free(&self, ptr: *mut u8) {
        // SAFETY: caller passes null or a live libc block.
        unsafe { libc::free(ptr.cast::<c_void>()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RAW_ALIGN;

    #[test]
    fn libc_heap_honours_contract() {
        let heap = LibcHeap;
        // SAFETY: every block below is released before returning.
        unsafe {
            let p = heap.malloc(40);
            assert!(!p.is_null());
            assert_eq!(p as usize % RAW_ALIGN, 0);
            p.write_bytes(0x11, 40);

            let q = heap.realloc(p, 400);
            assert!(!q.is_null());
            assert_eq!(*q.add(39), 0x11);
            heap.free(q);

            let z = heap.calloc(8, 8);
            assert!(!z.is_null());
            assert!(std::slice::from_raw_parts(z, 64).iter().all(|&b| b == 0));
            heap.free(z);

            heap.free(std::ptr::null_mut());
        }
    }
}
