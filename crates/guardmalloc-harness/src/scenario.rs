//! Scenario catalog.
//!
//! Each scenario is a short heap program plus what a correct allocator must
//! do with it in each mode. Scenarios that corrupt memory only run guarded:
//! against the plain heap the same writes are undefined behavior.

use guardmalloc_core::{
    GuardMode, GuardedAllocator, HeapAllocator, LibcHeap, PassthroughAllocator, Provenance,
    RawHeap,
};

use crate::error::HarnessError;

/// What the child process must do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// Exit 0 with no allocator diagnostics.
    Clean,
    /// Die from `SIGABRT` with every needle present on stderr.
    Abort { stderr_contains: &'static [&'static str] },
}

pub type ScenarioFn = fn(&dyn HeapFactory) -> Result<(), HarnessError>;

pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub guarded: Expectation,
    /// `None`: not meaningful without guards (the program is UB there).
    pub passthrough: Option<Expectation>,
    pub run: ScenarioFn,
}

impl Scenario {
    #[must_use]
    pub fn expectation(&self, mode: GuardMode) -> Option<Expectation> {
        match mode {
            GuardMode::Guarded => Some(self.guarded),
            GuardMode::Passthrough => self.passthrough,
        }
    }

    /// Runs the scenario body in this process.
    pub fn execute(&self, mode: GuardMode) -> Result<(), HarnessError> {
        (self.run)(&ModeFactory(mode))
    }
}

/// Builds the allocator a scenario runs against, over a chosen raw heap.
pub trait HeapFactory {
    fn libc(&self) -> Box<dyn HeapAllocator>;
    fn exhausted(&self) -> Box<dyn HeapAllocator>;
    fn no_grow(&self) -> Box<dyn HeapAllocator>;
}

struct ModeFactory(GuardMode);

impl ModeFactory {
    fn wrap<R: RawHeap + 'static>(&self, raw: R) -> Box<dyn HeapAllocator> {
        match self.0 {
            GuardMode::Guarded => Box::new(GuardedAllocator::new(raw)),
            GuardMode::Passthrough => Box::new(PassthroughAllocator::new(raw)),
        }
    }
}

impl HeapFactory for ModeFactory {
    fn libc(&self) -> Box<dyn HeapAllocator> {
        self.wrap(LibcHeap)
    }
    fn exhausted(&self) -> Box<dyn HeapAllocator> {
        self.wrap(ExhaustedHeap)
    }
    fn no_grow(&self) -> Box<dyn HeapAllocator> {
        self.wrap(NoGrowHeap)
    }
}

/// Raw heap with nothing left to give.
pub struct ExhaustedHeap;

// SAFETY: never returns memory; free only accepts null.
unsafe impl RawHeap for ExhaustedHeap {
    unsafe fn malloc(&self, _size: usize) -> *mut u8 {
        std::ptr::null_mut()
    }
    unsafe fn calloc(&self, _count: usize, _size: usize) -> *mut u8 {
        std::ptr::null_mut()
    }
    unsafe fn realloc(&self, _ptr: *mut u8, _size: usize) -> *mut u8 {
        std::ptr::null_mut()
    }
    unsafe fn free(&self, _ptr: *mut u8) {}
    fn last_errno(&self) -> i32 {
        libc::ENOMEM
    }
}

/// Raw heap that serves fresh blocks but refuses every resize.
pub struct NoGrowHeap;

// SAFETY: malloc/calloc/free forward to libc; realloc fails without
// touching the old block, as C realloc does.
unsafe impl RawHeap for NoGrowHeap {
    unsafe fn malloc(&self, size: usize) -> *mut u8 {
        // SAFETY: forwarded.
        unsafe { LibcHeap.malloc(size) }
    }
    unsafe fn calloc(&self, count: usize, size: usize) -> *mut u8 {
        // SAFETY: forwarded.
        unsafe { LibcHeap.calloc(count, size) }
    }
    unsafe fn realloc(&self, _ptr: *mut u8, _size: usize) -> *mut u8 {
        std::ptr::null_mut()
    }
    unsafe fn free(&self, ptr: *mut u8) {
        // SAFETY: forwarded.
        unsafe { LibcHeap.free(ptr) }
    }
    fn last_errno(&self) -> i32 {
        libc::ENOMEM
    }
}

fn at(line: u32) -> Provenance {
    Provenance::new("scenario.rs", "harness", line)
}

fn ensure(scenario: &str, ok: bool, detail: impl FnOnce() -> String) -> Result<(), HarnessError> {
    if ok {
        Ok(())
    } else {
        Err(HarnessError::Assertion {
            scenario: scenario.to_string(),
            detail: detail(),
        })
    }
}

// ---------------------------------------------------------------------------
// Clean programs
// ---------------------------------------------------------------------------

fn exact_write_free(f: &dyn HeapFactory) -> Result<(), HarnessError> {
    let heap = f.libc();
    // SAFETY: writes exactly the 16 requested bytes.
    unsafe {
        let p = heap.allocate(16, at(1));
        p.write_bytes(0x5A, 16);
        heap.free(p, at(2));
    }
    Ok(())
}

fn zero_size_free(f: &dyn HeapFactory) -> Result<(), HarnessError> {
    let heap = f.libc();
    // SAFETY: nothing is written to the zero-size block.
    unsafe {
        let p = heap.allocate(0, at(3));
        heap.free(p, at(4));
    }
    Ok(())
}

fn calloc_zeroed(f: &dyn HeapFactory) -> Result<(), HarnessError> {
    let heap = f.libc();
    // SAFETY: reads stay inside the 128 zeroed bytes.
    unsafe {
        let p = heap.allocate_zeroed(8, 16, at(5));
        let nonzero = std::slice::from_raw_parts(p, 128).iter().filter(|&&b| b != 0).count();
        heap.free(p, at(6));
        ensure("calloc_zeroed", nonzero == 0, || format!("{nonzero} non-zero bytes"))
    }
}

fn realloc_round_trip(f: &dyn HeapFactory, name: &str, from: usize, to: usize) -> Result<(), HarnessError> {
    let heap = f.libc();
    // SAFETY: writes stay inside the current payload size.
    unsafe {
        let p = heap.allocate(from, at(7));
        for i in 0..from {
            *p.add(i) = (i % 251) as u8;
        }
        let q = heap.reallocate(p, to, at(8));
        let kept = from.min(to);
        let mismatch = (0..kept).find(|&i| *q.add(i) != (i % 251) as u8);
        q.write_bytes(0x11, to);
        heap.free(q, at(9));
        ensure(name, mismatch.is_none(), || {
            format!("prefix byte {mismatch:?} changed across {from} -> {to}")
        })
    }
}

fn realloc_grow(f: &dyn HeapFactory) -> Result<(), HarnessError> {
    realloc_round_trip(f, "realloc_grow", 16, 64)
}

fn realloc_shrink(f: &dyn HeapFactory) -> Result<(), HarnessError> {
    realloc_round_trip(f, "realloc_shrink", 64, 16)
}

fn realloc_same(f: &dyn HeapFactory) -> Result<(), HarnessError> {
    realloc_round_trip(f, "realloc_same", 32, 32)
}

fn realloc_null(f: &dyn HeapFactory) -> Result<(), HarnessError> {
    let heap = f.libc();
    // SAFETY: realloc(null) allocates; the block is written in bounds.
    unsafe {
        let p = heap.reallocate(std::ptr::null_mut(), 24, at(10));
        ensure("realloc_null", !p.is_null(), || "null block".into())?;
        p.write_bytes(0x22, 24);
        heap.free(p, at(11));
    }
    Ok(())
}

fn free_null(f: &dyn HeapFactory) -> Result<(), HarnessError> {
    let heap = f.libc();
    // SAFETY: null is always accepted.
    unsafe { heap.free(std::ptr::null_mut(), at(12)) };
    Ok(())
}

// ---------------------------------------------------------------------------
// Corrupting programs
// ---------------------------------------------------------------------------

fn overrun_free(f: &dyn HeapFactory) -> Result<(), HarnessError> {
    let heap = f.libc();
    // SAFETY: guarded only; the 17th byte lands in the footer marker.
    unsafe {
        let p = heap.allocate(16, Provenance::new("overrun.c", "fill", 42));
        p.write_bytes(0x41, 17);
        heap.free(p, at(13));
    }
    Ok(())
}

fn overrun_realloc(f: &dyn HeapFactory) -> Result<(), HarnessError> {
    let heap = f.libc();
    // SAFETY: guarded only; the write one past the payload hits the footer.
    unsafe {
        let p = heap.allocate_zeroed(4, 8, Provenance::new("overrun.c", "table", 7));
        *p.add(32) = 0;
        let q = heap.reallocate(p, 64, at(14));
        heap.free(q, at(15));
    }
    Ok(())
}

fn header_smash_free(f: &dyn HeapFactory) -> Result<(), HarnessError> {
    let heap = f.libc();
    // SAFETY: guarded only; the byte before the payload is the header marker.
    unsafe {
        let p = heap.allocate(16, at(16));
        *p.sub(1) = 0;
        heap.free(p, at(17));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Raw heap failures
// ---------------------------------------------------------------------------

fn alloc_failure(f: &dyn HeapFactory) -> Result<(), HarnessError> {
    let heap = f.exhausted();
    // SAFETY: the raw heap never returns memory.
    let p = unsafe { heap.allocate(1024, Provenance::new("oom.c", "grow", 3)) };
    ensure("alloc_failure", p.is_null(), || format!("got block {p:p} from exhausted heap"))
}

fn realloc_failure(f: &dyn HeapFactory) -> Result<(), HarnessError> {
    let heap = f.no_grow();
    // SAFETY: on failure the old block stays live and is freed here.
    unsafe {
        let p = heap.allocate(48, at(18));
        let q = heap.reallocate(p, 4096, Provenance::new("grow.c", "expand", 9));
        ensure("realloc_failure", q.is_null(), || format!("resize returned {q:p}"))?;
        heap.free(p, at(19));
    }
    Ok(())
}

const OVERRUN_FREE: &[&str] = &["Heap memory overrun before 'free' call", "size=16", "overrun.c:fill@42"];
const OVERRUN_REALLOC: &[&str] = &["Heap memory overrun before 'realloc' call", "size=32", "by calloc"];
const HEADER_SMASH: &[&str] = &["ahead of block", "before 'free' call"];
const ALLOC_FAILURE: &[&str] = &["Failed to malloc 1024 bytes", "oom.c:grow@3"];
const REALLOC_FAILURE: &[&str] = &["Failed to realloc 4096 bytes", "previous size=48"];

/// Every scenario, in execution order.
pub static SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "exact_write_free",
        description: "allocate 16, write exactly 16 bytes, free",
        guarded: Expectation::Clean,
        passthrough: Some(Expectation::Clean),
        run: exact_write_free,
    },
    Scenario {
        name: "zero_size_free",
        description: "allocate 0 bytes and free",
        guarded: Expectation::Clean,
        passthrough: Some(Expectation::Clean),
        run: zero_size_free,
    },
    Scenario {
        name: "calloc_zeroed",
        description: "zeroed allocation of 8 x 16 reads back all zero",
        guarded: Expectation::Clean,
        passthrough: Some(Expectation::Clean),
        run: calloc_zeroed,
    },
    Scenario {
        name: "realloc_grow",
        description: "16 -> 64 keeps the first 16 bytes",
        guarded: Expectation::Clean,
        passthrough: Some(Expectation::Clean),
        run: realloc_grow,
    },
    Scenario {
        name: "realloc_shrink",
        description: "64 -> 16 keeps the first 16 bytes",
        guarded: Expectation::Clean,
        passthrough: Some(Expectation::Clean),
        run: realloc_shrink,
    },
    Scenario {
        name: "realloc_same",
        description: "32 -> 32 keeps all bytes",
        guarded: Expectation::Clean,
        passthrough: Some(Expectation::Clean),
        run: realloc_same,
    },
    Scenario {
        name: "realloc_null",
        description: "reallocate(null, 24) behaves as allocate",
        guarded: Expectation::Clean,
        passthrough: Some(Expectation::Clean),
        run: realloc_null,
    },
    Scenario {
        name: "free_null",
        description: "free(null) is a no-op",
        guarded: Expectation::Clean,
        passthrough: Some(Expectation::Clean),
        run: free_null,
    },
    Scenario {
        name: "overrun_free",
        description: "one-byte overrun detected on free",
        guarded: Expectation::Abort { stderr_contains: OVERRUN_FREE },
        passthrough: None,
        run: overrun_free,
    },
    Scenario {
        name: "overrun_realloc",
        description: "one-byte overrun of a zeroed block detected on reallocate",
        guarded: Expectation::Abort { stderr_contains: OVERRUN_REALLOC },
        passthrough: None,
        run: overrun_realloc,
    },
    Scenario {
        name: "header_smash_free",
        description: "underrun into the header marker detected on free",
        guarded: Expectation::Abort { stderr_contains: HEADER_SMASH },
        passthrough: None,
        run: header_smash_free,
    },
    Scenario {
        name: "alloc_failure",
        description: "exhausted raw heap: guarded aborts, passthrough returns null",
        guarded: Expectation::Abort { stderr_contains: ALLOC_FAILURE },
        passthrough: Some(Expectation::Clean),
        run: alloc_failure,
    },
    Scenario {
        name: "realloc_failure",
        description: "raw resize failure: guarded aborts, passthrough returns null",
        guarded: Expectation::Abort { stderr_contains: REALLOC_FAILURE },
        passthrough: Some(Expectation::Clean),
        run: realloc_failure,
    },
];

/// Look up a scenario by name.
pub fn find(name: &str) -> Result<&'static Scenario, HarnessError> {
    SCENARIOS
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| HarnessError::UnknownScenario(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = SCENARIOS.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), SCENARIOS.len());
    }

    #[test]
    fn find_rejects_unknown() {
        assert_eq!(find("overrun_free").unwrap().name, "overrun_free");
        assert!(matches!(find("nope"), Err(HarnessError::UnknownScenario(_))));
    }

    #[test]
    fn corrupting_scenarios_skip_passthrough() {
        for s in SCENARIOS {
            if s.name.starts_with("overrun") || s.name.starts_with("header") {
                assert_eq!(s.expectation(GuardMode::Passthrough), None, "{}", s.name);
                assert!(matches!(s.guarded, Expectation::Abort { .. }), "{}", s.name);
            }
        }
    }

    #[test]
    fn clean_scenarios_pass_in_process() {
        for s in SCENARIOS {
            for mode in [GuardMode::Guarded, GuardMode::Passthrough] {
                if s.expectation(mode) == Some(Expectation::Clean) {
                    s.execute(mode).unwrap_or_else(|e| panic!("{} ({mode:?}): {e}", s.name));
                }
            }
        }
    }
}
