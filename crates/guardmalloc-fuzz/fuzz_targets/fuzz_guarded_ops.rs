#![no_main]
use guardmalloc_core::{GuardedAllocator, HeapAllocator, LibcHeap, Provenance};
use libfuzzer_sys::fuzz_target;

// Well-behaved programs only: every write stays inside its block, so any
// abort or failed check is a bug in the guarded heap.
fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let heap = GuardedAllocator::new(LibcHeap);
    let site = Provenance::new("fuzz_guarded_ops.rs", "fuzz", 0);
    let mut blocks: Vec<(*mut u8, usize, u8)> = Vec::new();

    for chunk in data.chunks(4) {
        if chunk.len() < 4 {
            break;
        }
        let op = chunk[0] % 5;
        let size = usize::from(u16::from_le_bytes([chunk[1], chunk[2]])) % 8192;
        let fill = chunk[3];

        // SAFETY: every pointer below is live, from `heap`, and written in bounds.
        unsafe {
            match op {
                0 => {
                    let p = heap.allocate(size, site);
                    p.write_bytes(fill, size);
                    blocks.push((p, size, fill));
                }
                1 => {
                    let p = heap.allocate_zeroed(1, size, site);
                    assert!(std::slice::from_raw_parts(p, size).iter().all(|&b| b == 0));
                    p.write_bytes(fill, size);
                    blocks.push((p, size, fill));
                }
                2 => {
                    if let Some((p, old, old_fill)) = blocks.pop() {
                        let q = heap.reallocate(p, size, site);
                        let kept = old.min(size);
                        assert!(std::slice::from_raw_parts(q, kept).iter().all(|&b| b == old_fill));
                        q.write_bytes(fill, size);
                        blocks.push((q, size, fill));
                    }
                }
                3 => {
                    if let Some((p, _, _)) = blocks.pop() {
                        heap.free(p, site);
                    }
                }
                _ => {
                    if let Some(&(p, size, _)) = blocks.last() {
                        let info = heap.check(p, site).expect("intact block").expect("guarded");
                        assert_eq!(info.payload_size, size);
                    }
                }
            }
        }
    }

    for (p, _, _) in blocks {
        // SAFETY: remaining blocks are live and freed once.
        unsafe { heap.free(p, site) };
    }
});
