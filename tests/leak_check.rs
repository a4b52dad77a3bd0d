use std::time::Instant;

use jump_map::JumpMap;

mod counting_alloc {
    use std::alloc::{GlobalAlloc, Layout, System};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[global_allocator]
    static ALLOCATOR: CountingAlloc = CountingAlloc;

    static RESIDENT: AtomicUsize = AtomicUsize::new(0);

    pub fn resident_bytes() -> usize {
        RESIDENT.load(Ordering::Relaxed)
    }

    #[derive(Default, Debug, Clone, Copy)]
    struct CountingAlloc;

    unsafe impl GlobalAlloc for CountingAlloc {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let ret = System.alloc(layout);
            if !ret.is_null() {
                RESIDENT.fetch_add(layout.size(), Ordering::Relaxed);
            }
            ret
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            RESIDENT.fetch_sub(layout.size(), Ordering::Relaxed);
            System.dealloc(ptr, layout)
        }
    }
}

#[test]
fn leak_check() {
    let n: u64 = 16 * 1024;
    let concurrency = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(8);

    // a small reclamation buffer keeps the deferred-drop machinery
    // busy instead of letting garbage ride along until the end
    let run = |map: JumpMap<u64, u64, 16>, barrier: &std::sync::Barrier, low_bits: u64| {
        let shift = concurrency.next_power_of_two().trailing_zeros();
        let unique_key = |key: u64| (key << shift) | low_bits;

        barrier.wait();
        for key in 0..n {
            let i = unique_key(key);
            map.insert(i, i);
        }
        for key in 0..n {
            let i = unique_key(key);
            assert!(map.cas(i, Some(&i), i + 1), "failed to cas key {i}");
        }
        let live = map.iter().count();
        assert!(live >= n as usize, "iterator saw {live} of this thread's {n} keys");
        for key in 0..n {
            map.remove(&unique_key(key));
        }
    };

    let before = Instant::now();
    let resident_before = counting_alloc::resident_bytes();

    let map = JumpMap::default();
    std::thread::scope(|s| {
        for _ in 0..4 {
            let barrier = std::sync::Arc::new(std::sync::Barrier::new(concurrency));
            let mut threads = vec![];
            for i in 0..concurrency {
                let map_2 = map.clone();
                let barrier_2 = barrier.clone();

                let thread = s.spawn(move || run(map_2, &barrier_2, u64::try_from(i).unwrap()));
                threads.push(thread);
            }
            for thread in threads {
                thread.join().unwrap();
            }
        }
    });

    drop(map);

    let resident_after = counting_alloc::resident_bytes();
    let written = n * 4 * concurrency as u64 * 2;

    println!(
        "{:.2} million writes/s, {} bytes resident after drop",
        written as f64 / before.elapsed().as_micros().max(1) as f64,
        resident_after.saturating_sub(resident_before),
    );

    assert_eq!(
        resident_after.saturating_sub(resident_before),
        0,
        "leaked {} bytes",
        resident_after.saturating_sub(resident_before)
    );
}
