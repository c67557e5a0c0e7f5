//! The whole test binary runs on the guarded heap.

use std::collections::HashMap;

use guardmalloc_core::GuardedGlobal;

#[global_allocator]
static GLOBAL: GuardedGlobal = GuardedGlobal::new();

#[test]
fn std_collections_run_on_guarded_heap() {
    let before = GLOBAL.stats().snapshot();

    let mut v: Vec<u64> = Vec::new();
    for i in 0..10_000 {
        v.push(i);
    }
    let mut map = HashMap::new();
    for i in 0..500u32 {
        map.insert(i, format!("value-{i}"));
    }
    assert_eq!(v.iter().sum::<u64>(), 49_995_000);
    assert_eq!(map[&499], "value-499");
    drop(v);
    drop(map);

    let after = GLOBAL.stats().snapshot();
    assert!(after.allocations > before.allocations);
    assert!(after.reallocations > before.reallocations);
    assert!(after.frees > before.frees);
}

#[test]
fn over_aligned_types_still_work() {
    #[repr(align(64))]
    struct Wide([u8; 64]);

    let boxed = Box::new(Wide([7; 64]));
    assert_eq!(&*boxed as *const Wide as usize % 64, 0);
    assert!(boxed.0.iter().all(|&b| b == 7));
}

#[test]
fn threads_allocate_concurrently() {
    let handles: Vec<_> = (0..4)
        .map(|t| {
            std::thread::spawn(move || {
                let mut strings = Vec::new();
                for i in 0..1_000 {
                    strings.push(format!("{t}:{i}"));
                }
                strings.len()
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), 1_000);
    }
}
