#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate jump_map;

use jump_map::Hash64;

fuzz_target!(|data: Vec<u64>| {
    let map = jump_map::JumpMap::default();
    let mut model = std::collections::HashSet::new();

    for item in &data {
        map.insert(*item, *item);
        model.insert(*item);
    }

    let items: Vec<(u64, u64)> = map.iter().collect();
    assert_eq!(items.len(), model.len());

    for (key, value) in &items {
        assert_eq!(key, value);
        assert!(model.contains(key));
    }

    for window in items.windows(2) {
        assert!(
            window[0].0.hash64() <= window[1].0.hash64(),
            "iteration left hash order: {} then {}",
            window[0].0,
            window[1].0
        );
    }
});
