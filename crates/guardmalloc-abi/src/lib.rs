// Every export takes raw pointers from C callers; the guarded heap validates
// what it can at runtime, so per-function safety docs would only repeat the
// C contract.
#![allow(clippy::missing_safety_doc)]
//! # guardmalloc-abi
//!
//! `extern "C"` boundary for the guarded heap. Builds a `cdylib` and a
//! `staticlib`; C code includes `include/guardmalloc.h`, which routes
//! `gm_malloc` and friends here with `__FILE__`, `__func__` and `__LINE__`
//! when `GUARDMALLOC_DEBUG` is defined.
//!
//! ```text
//! C caller -> gm_debug_* (this crate) -> HeapAllocator (guarded | passthrough) -> libc heap
//! ```
//!
//! The exported names never collide with `malloc`/`free`, so the crate is
//! safe to link into test binaries as-is.

pub mod malloc_abi;
mod util;

pub use malloc_abi::active_allocator;
