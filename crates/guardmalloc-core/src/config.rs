//! Runtime mode configuration.
//!
//! The mode is set via the `GUARDMALLOC_MODE` environment variable:
//! - `guarded` (default): every block carries header/footer markers and is
//!   validated on reallocate and free.
//! - `off`: pure passthrough to the raw heap, no overhead, no checks.
//!
//! `GUARDMALLOC_TRACE=1` additionally writes one stderr line per operation.
//!
//! Both values are read once and cached for the life of the process. Blocks
//! from one mode must never reach the other, so the cache is never reset
//! outside of tests.

use std::ffi::CStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable selecting [`GuardMode`].
pub const MODE_ENV: &str = "GUARDMALLOC_MODE";

/// Environment variable enabling per-operation trace lines.
pub const TRACE_ENV: &str = "GUARDMALLOC_TRACE";

const MODE_ENV_C: &CStr = c"GUARDMALLOC_MODE";
const TRACE_ENV_C: &CStr = c"GUARDMALLOC_TRACE";

/// Which allocator implementation callers get.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardMode {
    /// Header/footer markers plus validation.
    #[default]
    Guarded,
    /// Direct calls into the raw heap.
    Passthrough,
}

const PASSTHROUGH_SPELLINGS: &[&str] = &["off", "none", "passthrough", "release", "disabled", "0"];
const TRACE_ON_SPELLINGS: &[&str] = &["1", "true", "on", "yes"];

fn matches_any(raw: &str, spellings: &[&str]) -> bool {
    let raw = raw.trim();
    spellings.iter().any(|s| raw.eq_ignore_ascii_case(s))
}

impl GuardMode {
    /// Parse from string (case-insensitive). Unknown values select `Guarded`.
    /// Does not allocate.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        if matches_any(s, PASSTHROUGH_SPELLINGS) {
            Self::Passthrough
        } else {
            Self::Guarded
        }
    }

    /// Canonical spelling, accepted back by [`GuardMode::from_str_loose`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Guarded => "guarded",
            Self::Passthrough => "off",
        }
    }

    /// Whether blocks carry markers in this mode.
    #[must_use]
    pub const fn validation_enabled(self) -> bool {
        matches!(self, Self::Guarded)
    }
}

// 0=unresolved, 1=Guarded, 2=Passthrough, 255=resolving.
// The mode decides the block layout, so every caller must see the same value:
// losers of the resolution race wait for the winner instead of guessing.
static CACHED_MODE: AtomicU8 = AtomicU8::new(0);

// 0=unresolved, 1=off, 2=on, 255=resolving.
static CACHED_TRACE: AtomicU8 = AtomicU8::new(0);

const UNRESOLVED: u8 = 0;
const RESOLVING: u8 = 255;

const MODE_GUARDED: u8 = 1;
const MODE_PASSTHROUGH: u8 = 2;

const TRACE_OFF: u8 = 1;
const TRACE_ON: u8 = 2;

fn mode_to_u8(mode: GuardMode) -> u8 {
    match mode {
        GuardMode::Guarded => MODE_GUARDED,
        GuardMode::Passthrough => MODE_PASSTHROUGH,
    }
}

fn u8_to_mode(v: u8) -> GuardMode {
    match v {
        MODE_PASSTHROUGH => GuardMode::Passthrough,
        _ => GuardMode::Guarded,
    }
}

fn parse_trace_env(raw: &str) -> bool {
    matches_any(raw, TRACE_ON_SPELLINGS)
}

/// Run `f` on the value of environment variable `name`.
///
/// Goes through `getenv(3)` and borrows the C string in place, so nothing is
/// allocated and the allocator is never re-entered. Non-UTF-8 values read as
/// unset.
fn with_env<T>(name: &CStr, f: impl FnOnce(Option<&str>) -> T) -> T {
    // SAFETY: `name` is NUL-terminated; getenv returns null or a C string
    // owned by the environment.
    let value = unsafe { libc::getenv(name.as_ptr()) };
    if value.is_null() {
        return f(None);
    }
    // SAFETY: non-null result of getenv, valid until the environment changes.
    let value = unsafe { CStr::from_ptr(value) };
    f(value.to_str().ok())
}

#[inline]
fn is_resolved(v: u8) -> bool {
    v != UNRESOLVED && v != RESOLVING
}

/// Resolve a cached value, running `read` on first use.
///
/// Exactly one caller runs `read`. Every other caller that arrives while it
/// is in flight spins until the value is published, so all callers agree.
/// `read` must not call back into this cache.
fn resolve_cached(cache: &AtomicU8, read: impl FnOnce() -> u8) -> u8 {
    let cached = cache.load(Ordering::Acquire);
    if is_resolved(cached) {
        return cached;
    }

    if cached == UNRESOLVED
        && cache
            .compare_exchange(UNRESOLVED, RESOLVING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    {
        let resolved = read();
        cache.store(resolved, Ordering::Release);
        return resolved;
    }

    loop {
        let v = cache.load(Ordering::Acquire);
        if is_resolved(v) {
            return v;
        }
        std::hint::spin_loop();
        std::thread::yield_now();
    }
}

/// The configured mode (reads `GUARDMALLOC_MODE` on first call).
#[must_use]
pub fn guard_mode() -> GuardMode {
    u8_to_mode(resolve_cached(&CACHED_MODE, || {
        with_env(MODE_ENV_C, |v| mode_to_u8(v.map(GuardMode::from_str_loose).unwrap_or_default()))
    }))
}

/// Whether per-operation trace lines are enabled (reads `GUARDMALLOC_TRACE`
/// on first call).
#[must_use]
pub fn trace_enabled() -> bool {
    resolve_cached(&CACHED_TRACE, || {
        with_env(TRACE_ENV_C, |v| {
            if v.is_some_and(parse_trace_env) {
                TRACE_ON
            } else {
                TRACE_OFF
            }
        })
    }) == TRACE_ON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_modes() {
        assert_eq!(GuardMode::from_str_loose("guarded"), GuardMode::Guarded);
        assert_eq!(GuardMode::from_str_loose("GUARDED"), GuardMode::Guarded);
        assert_eq!(GuardMode::from_str_loose("debug"), GuardMode::Guarded);
        assert_eq!(GuardMode::from_str_loose("off"), GuardMode::Passthrough);
        assert_eq!(GuardMode::from_str_loose(" Off "), GuardMode::Passthrough);
        assert_eq!(GuardMode::from_str_loose("passthrough"), GuardMode::Passthrough);
        assert_eq!(GuardMode::from_str_loose("none"), GuardMode::Passthrough);
        assert_eq!(GuardMode::from_str_loose("bogus"), GuardMode::Guarded);
    }

    #[test]
    fn canonical_spelling_round_trips() {
        for mode in [GuardMode::Guarded, GuardMode::Passthrough] {
            assert_eq!(GuardMode::from_str_loose(mode.as_str()), mode);
        }
    }

    #[test]
    fn default_is_guarded() {
        assert_eq!(GuardMode::default(), GuardMode::Guarded);
        assert!(GuardMode::Guarded.validation_enabled());
        assert!(!GuardMode::Passthrough.validation_enabled());
    }

    #[test]
    fn trace_parser() {
        assert!(parse_trace_env("1"));
        assert!(parse_trace_env("TRUE"));
        assert!(parse_trace_env("on"));
        assert!(!parse_trace_env("0"));
        assert!(!parse_trace_env(""));
        assert!(!parse_trace_env("off"));
    }

    #[test]
    fn cached_mode_is_process_sticky_until_cache_reset() {
        let previous = CACHED_MODE.swap(MODE_PASSTHROUGH, Ordering::SeqCst);
        assert_eq!(guard_mode(), GuardMode::Passthrough);
        assert_eq!(guard_mode(), GuardMode::Passthrough);

        CACHED_MODE.store(MODE_GUARDED, Ordering::SeqCst);
        assert_eq!(guard_mode(), GuardMode::Guarded);

        CACHED_MODE.store(previous, Ordering::SeqCst);
    }

    #[test]
    fn env_names_agree() {
        assert_eq!(MODE_ENV_C.to_str(), Ok(MODE_ENV));
        assert_eq!(TRACE_ENV_C.to_str(), Ok(TRACE_ENV));
    }

    #[test]
    fn missing_variable_reads_as_unset() {
        let seen = with_env(c"GUARDMALLOC_TEST_SURELY_UNSET_VARIABLE", |v| v.map(str::len));
        assert_eq!(seen, None);
    }

    #[test]
    fn first_caller_resolves_once() {
        let cache = AtomicU8::new(UNRESOLVED);
        assert_eq!(resolve_cached(&cache, || MODE_PASSTHROUGH), MODE_PASSTHROUGH);
        assert_eq!(
            resolve_cached(&cache, || panic!("resolved twice")),
            MODE_PASSTHROUGH
        );
    }

    #[test]
    fn caller_during_resolution_waits_for_published_value() {
        use std::sync::mpsc;
        use std::time::Duration;

        let cache = AtomicU8::new(RESOLVING);
        std::thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            let cache = &cache;
            scope.spawn(move || {
                let seen = resolve_cached(cache, || panic!("winner already reading"));
                tx.send(seen).unwrap();
            });

            let early = rx.recv_timeout(Duration::from_millis(50));
            cache.store(MODE_PASSTHROUGH, Ordering::Release);
            assert!(early.is_err(), "answered {early:?} before the mode was known");
            let seen = rx.recv_timeout(Duration::from_secs(10)).unwrap();
            assert_eq!(u8_to_mode(seen), GuardMode::Passthrough);
        });
    }

    #[test]
    fn block_allocated_during_resolution_frees_in_the_same_mode() {
        use crate::allocator::{HeapAllocator, system_allocator};
        use crate::provenance::Provenance;

        let cache = AtomicU8::new(RESOLVING);
        let site = Provenance::new("config.rs", "test", 0);
        std::thread::scope(|scope| {
            let cache = &cache;
            let early = scope.spawn(move || {
                let mode = u8_to_mode(resolve_cached(cache, || MODE_GUARDED));
                // SAFETY: fresh allocation from the process-wide heap.
                let p = unsafe { system_allocator(mode).allocate(16, site) };
                (mode, p as usize)
            });
            std::thread::sleep(std::time::Duration::from_millis(20));
            cache.store(MODE_PASSTHROUGH, Ordering::Release);

            let (early_mode, p) = early.join().unwrap();
            let late_mode = u8_to_mode(resolve_cached(cache, || MODE_GUARDED));
            assert_eq!(early_mode, late_mode);
            // SAFETY: `p` came from the allocator for the same mode.
            unsafe { system_allocator(late_mode).free(p as *mut u8, site) };
        });
    }
}
